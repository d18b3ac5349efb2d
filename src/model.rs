use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::locations::LocationIndex;
use crate::presets::Preset;

/// Body of `GET /api/locations/`: continent name to its countries.
pub type LocationDirectory = BTreeMap<String, Vec<String>>;

pub fn location_index(directory: LocationDirectory) -> LocationIndex {
    directory.into_iter().collect()
}

/// The preset directory is served either bare or wrapped.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum PresetList {
    Bare(Vec<Preset>),
    Wrapped {
        #[serde(default)]
        presets: Vec<Preset>,
    },
}

impl PresetList {
    pub fn into_vec(self) -> Vec<Preset> {
        match self {
            PresetList::Bare(presets) | PresetList::Wrapped { presets } => presets,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct SearchSummary {
    #[serde(default, deserialize_with = "de_opt_u64_from_any")]
    pub count: Option<u64>,
    #[serde(default, rename = "avgTemp", alias = "avg_temp", deserialize_with = "de_opt_f64_from_any")]
    pub avg_temp: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PointLocation {
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub longitude: Option<f64>,
}

/// One pre-aggregated point of a `map-format` search.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct AggregatedPoint {
    #[serde(default)]
    pub location: PointLocation,
    #[serde(default, deserialize_with = "de_opt_u64_from_any")]
    pub count: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub avg_temperature: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub min_temperature: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub max_temperature: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SessionInfo {
    #[serde(default, rename = "isAuthenticated")]
    pub is_authenticated: bool,
    #[serde(default)]
    pub groups: Vec<String>,
}

pub(crate) fn de_string_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

pub(crate) fn de_opt_f64_from_any<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected float-compatible number")),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(trimmed.parse::<f64>().ok())
            }
        }
        Value::Null => Ok(None),
        other => Err(serde::de::Error::custom(format!(
            "expected number or null, got {other}"
        ))),
    }
}

pub(crate) fn de_opt_u64_from_any<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => {
            if let Some(value) = number.as_u64() {
                Ok(Some(value))
            } else if let Some(value) = number.as_f64() {
                Ok(Some(value.max(0.0) as u64))
            } else {
                Ok(None)
            }
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else if let Ok(value) = trimmed.parse::<u64>() {
                Ok(Some(value))
            } else if let Ok(value) = trimmed.parse::<f64>() {
                Ok(Some(value.max(0.0) as u64))
            } else {
                Ok(None)
            }
        }
        Value::Null => Ok(None),
        other => Err(serde::de::Error::custom(format!(
            "expected number or null, got {other}"
        ))),
    }
}
