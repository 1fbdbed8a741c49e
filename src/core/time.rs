//! Shared timestamp/event helpers for state stamps, snapshot names and envelopes.

use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use ulid::Ulid;

/// Format used inside snapshot and handoff file names. Fixed width, so
/// lexicographic order equals chronological order.
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Second-resolution stamps written by older stores.
const LEGACY_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// RFC 3339 local timestamp with microseconds (e.g. `2026-10-16T09:12:44.118204+02:00`).
pub fn now_rfc3339() -> String {
    Local::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}

/// Clock for file-name stamps. UTC has no daylight-saving fall-back, so name
/// order keeps matching creation order.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub fn file_stamp(at: &DateTime<Utc>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Parses a stamp produced by [`file_stamp`], or a legacy second-resolution one.
pub fn parse_file_stamp(stamp: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(stamp, LEGACY_STAMP_FORMAT))
        .ok()
}

/// Returns the first stamp at or after `at` for which `taken` is false.
pub fn unique_file_stamp<F>(at: DateTime<Utc>, mut taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    let mut candidate = at;
    loop {
        let stamp = file_stamp(&candidate);
        if !taken(&stamp) {
            return stamp;
        }
        candidate += Duration::microseconds(1);
    }
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Standard command response envelope shape used across CLI surfaces.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": now_rfc3339(),
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}
