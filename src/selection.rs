use crate::types::FacilityRecord;
use serde::Deserialize;
use thiserror::Error;

/// What to do when a clicked name matches more than one facility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// First match in stored order.
    #[default]
    First,
    Reject,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("no facility named '{name}'")]
    NotFound { name: String },
    #[error("{count} facilities share the name '{name}'")]
    Ambiguous { name: String, count: usize },
}

pub fn find_by_name<'a>(
    records: &'a [FacilityRecord],
    name: &str,
    policy: DuplicatePolicy,
) -> Result<&'a FacilityRecord, LookupError> {
    let mut matches = records.iter().filter(|r| r.name == name);
    let first = matches.next().ok_or_else(|| LookupError::NotFound {
        name: name.to_string(),
    })?;

    if policy == DuplicatePolicy::Reject {
        let others = matches.count();
        if others > 0 {
            return Err(LookupError::Ambiguous {
                name: name.to_string(),
                count: others + 1,
            });
        }
    }

    Ok(first)
}
