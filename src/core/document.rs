//! The shared state document and its validity rules.
//!
//! A document is structurally valid if it is a JSON object carrying all of
//! [`REQUIRED_KEYS`] with usable values: a string `project`, an unsigned
//! `version` and object-shaped `metrics` and `assets`. Every other key is
//! carried verbatim, whatever its type. Anything else is [`Corruption`] and
//! must never be handed to a caller as current state.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use std::fmt;
use thiserror::Error;

pub const REQUIRED_KEYS: [&str; 4] = ["project", "metrics", "assets", "version"];

/// Counters every fresh document starts with.
pub const STARTER_METRICS: [&str; 5] = [
    "leads_generated",
    "leads_validated",
    "beta_signups",
    "demo_calls_booked",
    "customers",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub project: String,
    pub version: u64,
    pub metrics: Map<String, JsonValue>,
    pub assets: Map<String, JsonValue>,
    #[serde(
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_by: Option<String>,
    /// Every other key (`domain`, `status`, `blockers`, ...), carried unchanged.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Stamp fields are rewritten on every write, so a hand-edited non-string
/// value is dropped rather than failing the whole document.
fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Some(s),
        _ => None,
    })
}

impl StateDocument {
    /// A version-0 document with zeroed starter counters.
    pub fn fresh(project: &str, domain: &str) -> Self {
        let mut extra = Map::new();
        extra.insert("domain".to_string(), JsonValue::from(domain));
        extra.insert("status".to_string(), JsonValue::from("building"));
        extra.insert("phase".to_string(), JsonValue::from("validation"));
        extra.insert("active_agents".to_string(), JsonValue::Array(Vec::new()));
        extra.insert("blockers".to_string(), JsonValue::Array(Vec::new()));
        Self {
            project: project.to_string(),
            version: 0,
            metrics: STARTER_METRICS
                .iter()
                .map(|name| (name.to_string(), JsonValue::from(0)))
                .collect(),
            assets: Map::new(),
            last_updated: Some(crate::core::time::now_rfc3339()),
            updated_by: None,
            extra,
        }
    }

    /// Integer value of a counter; 0 when absent or not an integer.
    pub fn metric(&self, name: &str) -> i64 {
        self.metrics
            .get(name)
            .and_then(JsonValue::as_i64)
            .unwrap_or(0)
    }

    pub fn set_metric(&mut self, name: &str, value: i64) {
        self.metrics.insert(name.to_string(), JsonValue::from(value));
    }

    /// A non-required field, if present and a string.
    pub fn text_field(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(JsonValue::as_str)
    }

    /// Blockers rendered for display; non-string entries are shown as JSON.
    pub fn blocker_lines(&self) -> Vec<String> {
        match self.extra.get("blockers") {
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| match item {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Business-level checks layered on top of structural validity.
    /// Non-numeric metric values are not counters and are ignored.
    pub fn sanity_issues(&self) -> Vec<SanityIssue> {
        self.metrics
            .iter()
            .filter_map(|(name, value)| match value {
                JsonValue::Number(n) if n.as_f64().is_some_and(|f| f < 0.0) => {
                    Some(SanityIssue::NegativeMetric {
                        name: name.clone(),
                        value: n.clone(),
                    })
                }
                _ => None,
            })
            .collect()
    }

    pub fn is_sane(&self) -> bool {
        self.sanity_issues().is_empty()
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Corruption {
    #[error("unparseable JSON: {0}")]
    Unparseable(String),
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("missing required field: {0}")]
    MissingKey(&'static str),
    #[error("malformed field: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanityIssue {
    NegativeMetric { name: String, value: Number },
}

impl fmt::Display for SanityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanityIssue::NegativeMetric { name, value } => {
                write!(f, "negative {} count ({})", name, value)
            }
        }
    }
}

/// Parses and structurally validates raw document bytes.
pub fn parse_document(bytes: &[u8]) -> Result<StateDocument, Corruption> {
    let value: JsonValue =
        serde_json::from_slice(bytes).map_err(|e| Corruption::Unparseable(e.to_string()))?;
    validate_value(value)
}

pub fn validate_value(value: JsonValue) -> Result<StateDocument, Corruption> {
    let obj = value.as_object().ok_or(Corruption::NotAnObject)?;
    if let Some(missing) = REQUIRED_KEYS.iter().find(|k| !obj.contains_key(**k)) {
        return Err(Corruption::MissingKey(*missing));
    }
    serde_json::from_value(value).map_err(|e| Corruption::Malformed(e.to_string()))
}
