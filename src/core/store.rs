//! Versioned state store.
//!
//! Every read-modify-write runs under the backend's exclusive lock:
//! read (repairing if needed) -> optional expected-version check -> rotate
//! snapshot history -> stamp version/last_updated/updated_by -> atomic write.
//!
//! Reads never surface an invalid document. A missing live document yields a
//! fresh default; a corrupt one is replaced by the newest valid snapshot, or
//! by a fresh default if none validates.

use crate::core::audit::{self, StateEvent};
use crate::core::backend::{FsBackend, SnapshotId, StateBackend};
use crate::core::config::{DefaultsConfig, StoreConfig};
use crate::core::document::{self, Corruption, StateDocument};
use crate::core::error::Result;
use crate::core::handoff::{self, HandoffRecord};
use crate::core::time;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

/// How the document returned by a read was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReadOutcome {
    /// The live document was valid.
    Current,
    /// No live document, or no valid snapshot to restore.
    Default,
    /// The live document was replaced by this snapshot.
    Restored { snapshot: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    Written { version: u64 },
    /// Nothing was written; re-read and retry.
    Conflict { expected: u64, found: u64 },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SanityReport {
    pub document: StateDocument,
    /// Problems found in the document that was read, before any rollback.
    pub issues: Vec<String>,
    pub outcome: ReadOutcome,
}

impl SanityReport {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub stamp: String,
    /// Creation time decoded from the stamp (UTC), if the stamp parses.
    pub created_at: Option<String>,
    pub version: Option<u64>,
    pub valid: bool,
    pub sha256: String,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InitOutcome {
    Initialized { version: u64 },
    Existing { report: SanityReport },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acceptance {
    Structural,
    StructuralAndSane,
}

enum LiveRead {
    Missing,
    Valid(StateDocument),
    Corrupt(Corruption),
}

pub struct StateStore<B: StateBackend = FsBackend> {
    backend: B,
    max_versions: usize,
    defaults: DefaultsConfig,
}

impl StateStore<FsBackend> {
    /// Opens (creating the root directory if needed) a filesystem store.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let backend = FsBackend::open(config)?;
        Ok(Self::with_backend(
            backend,
            config.max_versions,
            config.defaults.clone(),
        ))
    }
}

impl<B: StateBackend> StateStore<B> {
    pub fn with_backend(backend: B, max_versions: usize, defaults: DefaultsConfig) -> Self {
        Self {
            backend,
            max_versions: max_versions.max(1),
            defaults,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn max_versions(&self) -> usize {
        self.max_versions
    }

    pub fn default_document(&self) -> StateDocument {
        StateDocument::fresh(&self.defaults.project, &self.defaults.domain)
    }

    fn load_live(&self) -> Result<LiveRead> {
        let Some(bytes) = self.backend.read_live()? else {
            return Ok(LiveRead::Missing);
        };
        Ok(match document::parse_document(&bytes) {
            Ok(doc) => LiveRead::Valid(doc),
            Err(reason) => LiveRead::Corrupt(reason),
        })
    }

    pub fn read_state(&self) -> Result<StateDocument> {
        Ok(self.read_state_with_outcome()?.0)
    }

    /// Lock-free on the happy path; takes the lock only to repair.
    pub fn read_state_with_outcome(&self) -> Result<(StateDocument, ReadOutcome)> {
        match self.load_live()? {
            LiveRead::Missing => Ok((self.default_document(), ReadOutcome::Default)),
            LiveRead::Valid(doc) => Ok((doc, ReadOutcome::Current)),
            LiveRead::Corrupt(reason) => {
                warn!(reason = %reason, "state document invalid, attempting rollback");
                let lock = self.backend.lock()?;
                // Another process may have repaired it while we waited.
                self.read_locked(&lock, "read_repair")
            }
        }
    }

    fn read_locked<'s>(
        &'s self,
        lock: &B::Guard<'s>,
        actor: &str,
    ) -> Result<(StateDocument, ReadOutcome)> {
        match self.load_live()? {
            LiveRead::Missing => Ok((self.default_document(), ReadOutcome::Default)),
            LiveRead::Valid(doc) => Ok((doc, ReadOutcome::Current)),
            LiveRead::Corrupt(reason) => {
                warn!(reason = %reason, actor, "state document invalid under lock, rolling back");
                self.rollback_locked(lock, actor, Acceptance::Structural)
            }
        }
    }

    /// Restores the newest valid snapshot as the live document.
    pub fn rollback_to_previous(&self, actor: &str) -> Result<(StateDocument, ReadOutcome)> {
        let lock = self.backend.lock()?;
        self.rollback_locked(&lock, actor, Acceptance::Structural)
    }

    fn rollback_locked<'s>(
        &'s self,
        _lock: &B::Guard<'s>,
        actor: &str,
        acceptance: Acceptance,
    ) -> Result<(StateDocument, ReadOutcome)> {
        let snapshots = self.backend.list_snapshots()?;

        for id in &snapshots {
            let bytes = match self.backend.read_snapshot(id) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(snapshot = %id.name, error = %e, "snapshot unreadable, skipping");
                    continue;
                }
            };
            let doc = match document::parse_document(&bytes) {
                Ok(doc) => doc,
                Err(reason) => {
                    warn!(snapshot = %id.name, reason = %reason, "snapshot invalid, skipping");
                    continue;
                }
            };
            if acceptance == Acceptance::StructuralAndSane && !doc.is_sane() {
                warn!(snapshot = %id.name, "snapshot fails sanity check, skipping");
                continue;
            }

            self.backend.write_live(&bytes)?;
            info!(snapshot = %id.name, version = doc.version, actor, "rolled back state");
            audit::record(
                &self.backend,
                StateEvent::new(actor, "rollback", doc.version, "restored").with_detail(&id.name),
            );
            return Ok((
                doc,
                ReadOutcome::Restored {
                    snapshot: id.name.clone(),
                },
            ));
        }

        if snapshots.is_empty() {
            error!(actor, "no snapshot available, falling back to fresh state");
        } else {
            error!(
                actor,
                checked = snapshots.len(),
                "every snapshot is invalid, falling back to fresh state"
            );
        }
        audit::record(
            &self.backend,
            StateEvent::new(actor, "rollback", 0, "default")
                .with_detail(format!("{} snapshot(s) checked", snapshots.len())),
        );
        Ok((self.default_document(), ReadOutcome::Default))
    }

    /// Prunes history to `max_versions - 1` entries, then snapshots the live
    /// document, leaving at most `max_versions`.
    fn rotate_versions<'s>(&'s self, _lock: &B::Guard<'s>) -> Result<Option<SnapshotId>> {
        let snapshots = self.backend.list_snapshots()?;
        for old in snapshots.iter().skip(self.max_versions - 1) {
            self.backend.remove_snapshot(old)?;
            debug!(snapshot = %old.name, "pruned snapshot");
        }
        let created = self.backend.snapshot_live()?;
        if let Some(id) = &created {
            debug!(snapshot = %id.name, "created snapshot");
        }
        Ok(created)
    }

    /// Writes `document` as the next version.
    ///
    /// With `expected_version`, the write only happens if the current version
    /// still equals it; otherwise `WriteOutcome::Conflict` is returned and
    /// nothing changes. I/O failures propagate and leave the previous live
    /// document in place.
    pub fn write_state(
        &self,
        mut document: StateDocument,
        updated_by: &str,
        expected_version: Option<u64>,
    ) -> Result<WriteOutcome> {
        let lock = self.backend.lock()?;
        let (current, _) = self.read_locked(&lock, updated_by)?;

        if let Some(expected) = expected_version {
            if current.version != expected {
                warn!(
                    expected,
                    found = current.version,
                    agent = updated_by,
                    "version conflict, write refused"
                );
                audit::record(
                    &self.backend,
                    StateEvent::new(updated_by, "write", current.version, "conflict")
                        .with_detail(format!("expected {}", expected)),
                );
                return Ok(WriteOutcome::Conflict {
                    expected,
                    found: current.version,
                });
            }
        }

        let version = current.version + 1;
        document.version = version;
        document.last_updated = Some(time::now_rfc3339());
        document.updated_by = Some(updated_by.to_string());
        let bytes = document.to_json_bytes()?;

        self.rotate_versions(&lock)?;
        self.backend.write_live(&bytes)?;

        info!(version, agent = updated_by, "state written");
        audit::record(
            &self.backend,
            StateEvent::new(updated_by, "write", version, "written"),
        );
        Ok(WriteOutcome::Written { version })
    }

    /// Returns a structurally valid document whose metrics are non-negative,
    /// rolling back if the current one is not.
    pub fn sanity_check(&self, agent: &str) -> Result<StateDocument> {
        Ok(self.sanity_check_report(agent)?.document)
    }

    pub fn sanity_check_report(&self, agent: &str) -> Result<SanityReport> {
        let (doc, outcome) = self.read_state_with_outcome()?;
        let issues: Vec<String> = doc.sanity_issues().iter().map(|i| i.to_string()).collect();
        if issues.is_empty() {
            info!(agent, version = doc.version, "sanity check passed");
            return Ok(SanityReport {
                document: doc,
                issues,
                outcome,
            });
        }

        warn!(
            agent,
            version = doc.version,
            issues = %issues.join(", "),
            "sanity check failed, triggering rollback"
        );
        let lock = self.backend.lock()?;
        let (current, current_outcome) = self.read_locked(&lock, agent)?;
        let (document, outcome) = if current.is_sane() {
            (current, current_outcome)
        } else {
            self.rollback_locked(&lock, agent, Acceptance::StructuralAndSane)?
        };
        Ok(SanityReport {
            document,
            issues,
            outcome,
        })
    }

    /// Records a handoff anchored to the current version. The live document is
    /// not modified.
    pub fn create_handoff(
        &self,
        from_agent: &str,
        to_agent: &str,
        summary: Map<String, JsonValue>,
    ) -> Result<HandoffRecord> {
        handoff::validate_agent_id("from", from_agent)?;
        handoff::validate_agent_id("to", to_agent)?;

        let lock = self.backend.lock()?;
        let (state, _) = self.read_locked(&lock, from_agent)?;

        let record = HandoffRecord {
            id: time::new_event_id(),
            from: from_agent.to_string(),
            to: to_agent.to_string(),
            timestamp: time::now_rfc3339(),
            version: state.version,
            summary,
        };
        handoff::validate_summary(&record.summary)?;

        let mut bytes = serde_json::to_vec_pretty(&record)?;
        bytes.push(b'\n');
        let name = self.backend.write_handoff(from_agent, to_agent, &bytes)?;

        info!(
            from = from_agent,
            to = to_agent,
            version = record.version,
            file = %name,
            "handoff recorded"
        );
        audit::record(
            &self.backend,
            StateEvent::new(from_agent, "handoff", record.version, "written").with_detail(name),
        );
        drop(lock);
        Ok(record)
    }

    /// Snapshot history, newest first.
    pub fn history(&self) -> Result<Vec<SnapshotInfo>> {
        let mut out = Vec::new();
        for id in self.backend.list_snapshots()? {
            let bytes = match self.backend.read_snapshot(&id) {
                Ok(bytes) => bytes,
                // Pruned between listing and reading.
                Err(crate::core::error::FrontdeskError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let parsed = document::parse_document(&bytes);
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            out.push(SnapshotInfo {
                version: parsed.as_ref().ok().map(|d| d.version),
                valid: parsed.is_ok(),
                sha256: format!("{:x}", hasher.finalize()),
                size: bytes.len(),
                created_at: time::parse_file_stamp(&id.stamp).map(|at| {
                    at.and_utc()
                        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
                }),
                name: id.name,
                stamp: id.stamp,
            });
        }
        Ok(out)
    }

    /// Writes the default document as version 1 when no live document
    /// exists; otherwise sanity-checks the existing one.
    pub fn init(&self) -> Result<InitOutcome> {
        if !self.backend.live_exists()? {
            match self.write_state(self.default_document(), "init", Some(0))? {
                WriteOutcome::Written { version } => {
                    info!(version, "state initialized");
                    return Ok(InitOutcome::Initialized { version });
                }
                WriteOutcome::Conflict { found, .. } => {
                    debug!(found, "state initialized concurrently");
                }
            }
        }
        Ok(InitOutcome::Existing {
            report: self.sanity_check_report("main")?,
        })
    }
}
