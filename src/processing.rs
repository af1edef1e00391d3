use crate::types::FacilityRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Active filter values. Every set field must match; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub region: Option<String>,
    pub primary_mineral: Option<String>,
    pub client_type: Option<String>,
    /// Case-insensitive substring of the facility name.
    #[serde(rename = "q")]
    pub name_query: Option<String>,
}

impl FilterCriteria {
    /// Treats blank values, as sent by cleared dropdowns and inputs, as unset.
    /// Dropdown values are trimmed; a non-blank name query is kept as typed.
    pub fn normalized(self) -> Self {
        fn non_blank(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        Self {
            region: non_blank(self.region),
            primary_mineral: non_blank(self.primary_mineral),
            client_type: non_blank(self.client_type),
            name_query: self.name_query.filter(|q| !q.trim().is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_none()
            && self.primary_mineral.is_none()
            && self.client_type.is_none()
            && self.name_query.is_none()
    }
}

fn exact(expected: &Option<String>, actual: &str) -> bool {
    expected.as_deref().map_or(true, |e| e == actual)
}

/// Single pass over `records`, keeping input order.
pub fn apply<'a>(records: &'a [FacilityRecord], criteria: &FilterCriteria) -> Vec<&'a FacilityRecord> {
    let needle = criteria.name_query.as_deref().map(str::to_lowercase);

    records
        .iter()
        .filter(|r| {
            exact(&criteria.region, &r.region)
                && exact(&criteria.primary_mineral, &r.primary_mineral)
                && exact(&criteria.client_type, &r.client_type)
                && needle
                    .as_deref()
                    .map_or(true, |n| r.name.to_lowercase().contains(n))
        })
        .collect()
}

/// Values offered by the dropdowns, as observed in the data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub regions: Vec<String>,
    pub primary_minerals: Vec<String>,
    pub client_types: Vec<String>,
}

impl FilterOptions {
    pub fn from_records(records: &[FacilityRecord]) -> Self {
        let domain = |field: fn(&FacilityRecord) -> &str| -> Vec<String> {
            records
                .iter()
                .map(field)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(str::to_string)
                .collect()
        };
        Self {
            regions: domain(|r| r.region.as_str()),
            primary_minerals: domain(|r| r.primary_mineral.as_str()),
            client_types: domain(|r| r.client_type.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::sample_records;

    fn names(records: &[&FacilityRecord]) -> Vec<String> {
        records.iter().map(|r| r.name.clone()).collect()
    }

    fn criteria(region: Option<&str>, mineral: Option<&str>, client: Option<&str>, q: Option<&str>) -> FilterCriteria {
        FilterCriteria {
            region: region.map(str::to_string),
            primary_mineral: mineral.map(str::to_string),
            client_type: client.map(str::to_string),
            name_query: q.map(str::to_string),
        }
    }

    #[test]
    fn empty_criteria_keeps_everything_in_order() {
        let records = sample_records();
        let filtered = apply(&records, &FilterCriteria::default());
        let expected: Vec<&FacilityRecord> = records.iter().collect();
        assert_eq!(filtered, expected);
    }

    #[test]
    fn every_result_satisfies_all_set_predicates() {
        let records = sample_records();
        let all = [
            criteria(Some("Cusco"), None, None, None),
            criteria(None, Some("Cobre"), Some("Actual"), None),
            criteria(Some("Puno"), Some("Estaño"), Some("Potencial"), Some("RAF")),
            criteria(Some("Lima"), None, None, None),
        ];
        for c in &all {
            for record in apply(&records, c) {
                assert!(records.contains(record));
                assert!(c.region.as_ref().map_or(true, |v| v == &record.region));
                assert!(c.primary_mineral.as_ref().map_or(true, |v| v == &record.primary_mineral));
                assert!(c.client_type.as_ref().map_or(true, |v| v == &record.client_type));
                assert!(c
                    .name_query
                    .as_ref()
                    .map_or(true, |q| record.name.to_lowercase().contains(&q.to_lowercase())));
            }
        }
    }

    #[test]
    fn applying_twice_changes_nothing() {
        let records = sample_records();
        let c = criteria(None, Some("Cobre"), None, Some("a"));
        let once: Vec<FacilityRecord> = apply(&records, &c).into_iter().cloned().collect();
        let twice: Vec<FacilityRecord> = apply(&once, &c).into_iter().cloned().collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn name_query_ignores_case() {
        let records = sample_records();
        let filtered = apply(&records, &criteria(None, None, None, Some("SAN")));
        assert_eq!(names(&filtered), ["San Rafael", "san rafael"]);
    }

    #[test]
    fn region_and_name_query_combine() {
        let records = sample_records();
        let filtered = apply(&records, &criteria(Some("Cusco"), None, None, Some("cu")));
        assert_eq!(names(&filtered), ["Cusco Norte"]);
    }

    #[test]
    fn no_match_is_an_empty_result() {
        let records = sample_records();
        assert!(apply(&records, &criteria(Some("Tacna"), None, None, None)).is_empty());
        assert!(apply(&[], &FilterCriteria::default()).is_empty());
    }

    #[test]
    fn blank_values_are_normalized_to_unset() {
        let c = criteria(Some(""), Some("  "), Some(" Actual "), Some("")).normalized();
        assert_eq!(c, criteria(None, None, Some("Actual"), None));
        assert!(!c.is_empty());
        assert!(criteria(Some(" "), None, None, None).normalized().is_empty());
    }

    #[test]
    fn name_query_whitespace_is_significant() {
        let c = criteria(None, None, None, Some("san ")).normalized();
        assert_eq!(c.name_query.as_deref(), Some("san "));

        let mut records = sample_records();
        records.push(crate::types::fixtures::facility("Sanchez", "Puno", "Oro", "Actual"));
        let filtered = apply(&records, &c);
        assert_eq!(names(&filtered), ["San Rafael", "san rafael"]);
    }

    #[test]
    fn options_are_sorted_and_distinct() {
        let options = FilterOptions::from_records(&sample_records());
        assert_eq!(options.regions, ["Cusco", "Moquegua", "Puno"]);
        assert_eq!(options.primary_minerals, ["Cobre", "Estaño", "Oro"]);
        assert_eq!(options.client_types, ["Actual", "Potencial"]);
    }
}
