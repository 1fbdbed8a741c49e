//! Append-only mutation log (`state.events.jsonl`).
//!
//! One line per locked operation, written while the lock is still held, so the
//! log order matches the version order.

use crate::core::backend::StateBackend;
use crate::core::time;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StateEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub version: u64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StateEvent {
    pub fn new(actor: &str, op: &str, version: u64, status: &str) -> Self {
        Self {
            ts: time::now_rfc3339(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            op: op.to_string(),
            version,
            status: status.to_string(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Best effort: the mutation already happened, so a failed log append is
/// reported but not returned.
pub fn record<B: StateBackend>(backend: &B, event: StateEvent) {
    let line = match serde_json::to_string(&event) {
        Ok(line) => line,
        Err(e) => {
            warn!(op = %event.op, error = %e, "failed to encode audit event");
            return;
        }
    };
    if let Err(e) = backend.append_event(&line) {
        warn!(op = %event.op, error = %e, "failed to append audit event");
    }
}
