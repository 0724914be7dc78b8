use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Placeholder for a missing phone number or email address.
pub const NOT_FOUND: &str = "Not found";
/// Placeholder for a missing street address.
pub const ADDRESS_NOT_FOUND: &str = "Address not found";

/// A business extracted from model output.
///
/// `name` is never empty. Missing contact fields carry the sentinels above so
/// that callers can tell "absent" apart from a real value; `website` and
/// `rating` are simply omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BusinessRecord {
    /// Business name with markdown emphasis removed.
    pub name: String,
    /// Phone number as written by the model, or "Not found".
    pub phone: String,
    /// Email address, or "Not found".
    pub email: String,
    /// Street address, or "Address not found".
    pub address: String,
    /// Website URL, when one was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Rating exactly as emitted, e.g. "4.5/5".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
}

/// A grounding source backing the generated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CitationLink {
    pub uri: String,
    pub title: String,
}

/// Everything one search produces. Replaced wholesale by the next search.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResult {
    /// Unparsed answer text from the model.
    pub raw_text: String,
    pub businesses: Vec<BusinessRecord>,
    pub sources: Vec<CitationLink>,
}

/// Caller-supplied point used to bias retrieval toward nearby results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocationBias {
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationBias {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// A coordinate of exactly zero (or NaN) means "unknown", e.g. a failed
    /// geolocation lookup reported as `0, 0`. Such a bias is not forwarded.
    pub fn is_usable(&self) -> bool {
        is_set(self.latitude) && is_set(self.longitude)
    }
}

fn is_set(coord: f64) -> bool {
    coord != 0.0 && !coord.is_nan()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_or_nan_coordinates_are_not_usable() {
        assert!(LocationBias::new(44.97, -93.26).is_usable());
        assert!(!LocationBias::new(0.0, -93.26).is_usable());
        assert!(!LocationBias::new(44.97, 0.0).is_usable());
        assert!(!LocationBias::new(f64::NAN, 1.0).is_usable());
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let record = BusinessRecord {
            name: "Joe's Cafe".to_string(),
            phone: NOT_FOUND.to_string(),
            email: NOT_FOUND.to_string(),
            address: ADDRESS_NOT_FOUND.to_string(),
            website: None,
            rating: Some("4.5/5".to_string()),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("website").is_none());
        assert_eq!(value["rating"], "4.5/5");
        assert_eq!(value["address"], "Address not found");
    }
}
