use serde::{Deserialize, Serialize};

/// Sentinel stored when a region or country could not be resolved.
pub const UNRESOLVED: &str = "N/A";

/// Region and country resolved for a city name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub region: String,
    pub country: String,
}

impl Location {
    pub fn new(region: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            country: country.into(),
        }
    }

    pub fn unresolved() -> Self {
        Self::new(UNRESOLVED, UNRESOLVED)
    }

    /// Builds a location from optional parts, defaulting each missing one to "N/A".
    pub fn from_parts(region: Option<String>, country: Option<String>) -> Self {
        Self {
            region: region.unwrap_or_else(|| UNRESOLVED.to_string()),
            country: country.unwrap_or_else(|| UNRESOLVED.to_string()),
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::unresolved()
    }
}
