use crate::types::{FacilityRecord, UNAVAILABLE};
use geo::{BoundingRect, MultiPoint, Point};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::Serialize;
use std::collections::HashMap;

// Plotly's default qualitative palette
const PALETTE: [&str; 10] = [
    "#636efa", "#ef553b", "#00cc96", "#ab63fa", "#ffa15a", "#19d3f3", "#ff6692", "#b6e880",
    "#ff97ff", "#fecb52",
];
const FALLBACK_COLOR: &str = "#2f4f4f";

/// Marker colour per deposit type, assigned in order of first appearance over the full
/// record set so colours stay put while filters change.
#[derive(Debug, Clone, Default)]
pub struct DepositPalette {
    legend: Vec<LegendEntry>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub deposit_type: String,
    pub color: &'static str,
}

impl DepositPalette {
    pub fn from_records(records: &[FacilityRecord]) -> Self {
        let mut palette = Self::default();
        for record in records {
            if palette.index.contains_key(&record.deposit_type) {
                continue;
            }
            let slot = palette.legend.len();
            palette.index.insert(record.deposit_type.clone(), slot);
            palette.legend.push(LegendEntry {
                deposit_type: record.deposit_type.clone(),
                color: PALETTE[slot % PALETTE.len()],
            });
        }
        palette
    }

    pub fn color(&self, deposit_type: &str) -> &'static str {
        self.index
            .get(deposit_type)
            .map_or(FALLBACK_COLOR, |&slot| self.legend[slot].color)
    }

    pub fn legend(&self) -> &[LegendEntry] {
        &self.legend
    }
}

/// Projects records into map points. Records without coordinates are skipped.
pub fn to_feature_collection(records: &[&FacilityRecord], palette: &DepositPalette) -> FeatureCollection {
    let features = records
        .iter()
        .filter_map(|record| {
            let coordinates = record.coordinates?;

            let mut properties = JsonObject::new();
            properties.insert("name".into(), record.name.clone().into());
            properties.insert("company".into(), record.company.clone().into());
            properties.insert("region".into(), record.region.clone().into());
            properties.insert("primary_mineral".into(), record.primary_mineral.clone().into());
            properties.insert("deposit_type".into(), record.deposit_type.clone().into());
            properties.insert("client_type".into(), record.client_type.clone().into());
            properties.insert("color".into(), palette.color(&record.deposit_type).into());

            Some(Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::from(&coordinates.point()))),
                id: Some(Id::String(record.name.clone())),
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Extent of the renderable points, `None` for an empty map.
pub fn bounds(records: &[&FacilityRecord]) -> Option<Bounds> {
    let points: Vec<Point<f64>> = records
        .iter()
        .filter_map(|r| r.coordinates.map(|c| c.point()))
        .collect();
    let rect = MultiPoint::new(points).bounding_rect()?;
    Some(Bounds {
        west: rect.min().x,
        south: rect.min().y,
        east: rect.max().x,
        north: rect.max().y,
    })
}

/// Only absolute http(s) URLs become clickable links.
pub fn hyperlink(link: &str) -> Option<String> {
    if link == UNAVAILABLE {
        return None;
    }
    let url = url::Url::parse(link).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| link.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityDetail {
    pub name: String,
    pub company: String,
    pub region: String,
    pub primary_mineral: String,
    pub secondary_minerals: String,
    pub deposit_type: String,
    pub client_type: String,
    /// Shown as text when `link_href` is absent.
    pub link_text: String,
    pub link_href: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Contents of the side panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailPanel {
    pub selected: bool,
    pub title: String,
    pub message: Option<String>,
    pub facility: Option<FacilityDetail>,
}

impl DetailPanel {
    pub fn empty() -> Self {
        Self {
            selected: false,
            title: "Información de la Faena".to_string(),
            message: Some(
                "Haz clic sobre cualquier punto en el mapa para ver los detalles aquí.".to_string(),
            ),
            facility: None,
        }
    }

    pub fn from_record(record: &FacilityRecord) -> Self {
        let link_href = hyperlink(&record.link);
        let link_text = if link_href.is_some() {
            "Abrir enlace".to_string()
        } else {
            record.link.clone()
        };

        Self {
            selected: true,
            title: record.name.clone(),
            message: None,
            facility: Some(FacilityDetail {
                name: record.name.clone(),
                company: record.company.clone(),
                region: record.region.clone(),
                primary_mineral: record.primary_mineral.clone(),
                secondary_minerals: record.secondary_minerals.clone(),
                deposit_type: record.deposit_type.clone(),
                client_type: record.client_type.clone(),
                link_text,
                link_href,
                latitude: record.coordinates.map(|c| c.latitude),
                longitude: record.coordinates.map(|c| c.longitude),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{facility, sample_records};
    use crate::types::Coordinates;

    #[test]
    fn features_skip_records_without_coordinates() {
        let mut lost = facility("Perdida", "Lima", "Oro", "Actual");
        lost.coordinates = None;
        let found = facility("Hallada", "Lima", "Oro", "Actual");
        let records = [&lost, &found];

        let collection = to_feature_collection(&records, &DepositPalette::default());

        assert_eq!(collection.features.len(), 1);
        let feature = &collection.features[0];
        assert_eq!(feature.id, Some(Id::String("Hallada".to_string())));
        assert_eq!(
            feature.property("name").and_then(|v| v.as_str()),
            Some("Hallada")
        );
        assert_eq!(
            feature.geometry.as_ref().map(|g| g.value.clone()),
            Some(Value::Point(vec![-75.0, -12.0]))
        );
    }

    #[test]
    fn palette_is_stable_by_first_appearance() {
        let mut records = sample_records();
        records[1].deposit_type = "Skarn".to_string();
        let palette = DepositPalette::from_records(&records);

        assert_eq!(palette.legend().len(), 2);
        assert_eq!(palette.color("Pórfido"), PALETTE[0]);
        assert_eq!(palette.color("Skarn"), PALETTE[1]);
        assert_eq!(palette.color("Veta"), FALLBACK_COLOR);
    }

    #[test]
    fn bounds_cover_all_points() {
        let mut a = facility("A", "Lima", "Oro", "Actual");
        a.coordinates = Coordinates::new(-9.5, -77.0);
        let mut b = facility("B", "Puno", "Oro", "Actual");
        b.coordinates = Coordinates::new(-16.5, -70.0);

        let extent = bounds(&[&a, &b]).unwrap();

        assert_eq!(
            extent,
            Bounds {
                west: -77.0,
                south: -16.5,
                east: -70.0,
                north: -9.5
            }
        );
        assert_eq!(bounds(&[]), None);
    }

    #[test]
    fn only_scheme_prefixed_links_are_clickable() {
        assert_eq!(
            hyperlink("https://www.antamina.com"),
            Some("https://www.antamina.com".to_string())
        );
        assert_eq!(hyperlink("http://minem.gob.pe/x"), Some("http://minem.gob.pe/x".to_string()));
        assert_eq!(hyperlink("www.antamina.com"), None);
        assert_eq!(hyperlink("ftp://files.example.com"), None);
        assert_eq!(hyperlink(UNAVAILABLE), None);
    }

    #[test]
    fn detail_panel_shows_plain_text_for_missing_link() {
        let record = facility("Tintaya", "Cusco", "Cobre", "Actual");
        let panel = DetailPanel::from_record(&record);

        assert!(panel.selected);
        assert_eq!(panel.title, "Tintaya");
        let detail = panel.facility.unwrap();
        assert_eq!(detail.link_text, UNAVAILABLE);
        assert_eq!(detail.link_href, None);
        assert_eq!(detail.latitude, Some(-12.0));
    }

    #[test]
    fn detail_panel_keeps_malformed_link_as_text() {
        let mut record = facility("Antamina", "Áncash", "Cobre", "Actual");
        record.link = "www.minem.gob.pe/antamina".to_string();

        let detail = DetailPanel::from_record(&record).facility.unwrap();

        assert_eq!(detail.link_text, "www.minem.gob.pe/antamina");
        assert_eq!(detail.link_href, None);
    }

    #[test]
    fn detail_panel_links_valid_urls() {
        let mut record = facility("Antamina", "Áncash", "Cobre", "Actual");
        record.link = "https://www.antamina.com".to_string();

        let detail = DetailPanel::from_record(&record).facility.unwrap();

        assert_eq!(detail.link_text, "Abrir enlace");
        assert_eq!(detail.link_href.as_deref(), Some("https://www.antamina.com"));
    }

    #[test]
    fn empty_panel_has_no_facility() {
        let panel = DetailPanel::empty();
        assert!(!panel.selected);
        assert!(panel.facility.is_none());
        assert!(panel.message.is_some());
    }
}
