//! Storage backends for the state store.
//!
//! A backend owns the raw bytes: the live document, the snapshot history, the
//! handoff directory and the audit log, plus the exclusive lock that guards
//! them. It knows nothing about validity or versions; that lives in
//! [`crate::core::store`]. Two implementations ship: [`FsBackend`] for real use
//! and [`MemoryBackend`] for tests.

pub mod fs;
pub mod memory;

pub use fs::FsBackend;
pub use memory::MemoryBackend;

use crate::core::error::Result;
use serde::Serialize;

/// A snapshot in the history, identified by its timestamp-derived name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SnapshotId {
    /// Sort key; later stamps are newer.
    pub stamp: String,
    pub name: String,
}

pub trait StateBackend {
    /// Proof of holding the exclusive lock. Dropping it releases the lock.
    type Guard<'a>
    where
        Self: 'a;

    /// Blocks until the exclusive lock is held.
    fn lock(&self) -> Result<Self::Guard<'_>>;

    fn live_exists(&self) -> Result<bool>;

    /// `None` when no live document exists.
    fn read_live(&self) -> Result<Option<Vec<u8>>>;

    /// Replaces the live document atomically: after an error the previous
    /// bytes are still in place.
    fn write_live(&self, bytes: &[u8]) -> Result<()>;

    /// Copies the live document into a new snapshot. `None` if there is no
    /// live document.
    fn snapshot_live(&self) -> Result<Option<SnapshotId>>;

    /// All snapshots, newest first.
    fn list_snapshots(&self) -> Result<Vec<SnapshotId>>;

    fn read_snapshot(&self, id: &SnapshotId) -> Result<Vec<u8>>;

    fn remove_snapshot(&self, id: &SnapshotId) -> Result<()>;

    /// Stores a handoff under a name no other handoff uses and returns it.
    fn write_handoff(&self, from: &str, to: &str, bytes: &[u8]) -> Result<String>;

    fn append_event(&self, line: &str) -> Result<()>;
}
