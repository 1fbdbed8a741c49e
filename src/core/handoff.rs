//! Handoff records: write-once audit facts marking a transfer of work between
//! two agents, anchored to the state version at the time of the handoff.

use crate::core::error::{FrontdeskError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::OnceLock;

pub const REQUIRED_SUMMARY_FIELDS: [&str; 4] = ["status", "deliverables", "blockers", "next_steps"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub timestamp: String,
    pub version: u64,
    pub summary: Map<String, JsonValue>,
}

/// Fails with `MissingFieldError` naming the first absent field.
pub fn validate_summary(summary: &Map<String, JsonValue>) -> Result<()> {
    match REQUIRED_SUMMARY_FIELDS
        .iter()
        .find(|field| !summary.contains_key(**field))
    {
        Some(field) => Err(FrontdeskError::MissingFieldError(field.to_string())),
        None => Ok(()),
    }
}

/// Accepts a JSON value that must be an object.
pub fn summary_from_value(value: JsonValue) -> Result<Map<String, JsonValue>> {
    match value {
        JsonValue::Object(map) => Ok(map),
        other => Err(FrontdeskError::ValidationError(format!(
            "handoff summary must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn agent_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").expect("static regex"))
}

/// Agent ids end up in file names, so they are restricted to a safe alphabet.
pub fn validate_agent_id(role: &str, id: &str) -> Result<()> {
    if agent_id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(FrontdeskError::ValidationError(format!(
            "invalid {} agent id '{}': expected 1-64 chars of [A-Za-z0-9._-]",
            role, id
        )))
    }
}

pub fn handoff_file_name(from: &str, to: &str, stamp: &str) -> String {
    format!("handoff_{}_{}_{}.json", from, to, stamp)
}
