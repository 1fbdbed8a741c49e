//! In-memory backend with the same lock and atomic-write contract as the
//! filesystem one. Used to exercise store logic without real files.

use super::{SnapshotId, StateBackend};
use crate::core::error::{FrontdeskError, Result};
use crate::core::handoff;
use crate::core::time;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryInner {
    live: Option<Vec<u8>>,
    snapshots: BTreeMap<String, Vec<u8>>,
    handoffs: BTreeMap<String, Vec<u8>>,
    events: Vec<String>,
    fail_writes: usize,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    lock: Mutex<()>,
    inner: Mutex<MemoryInner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| FrontdeskError::LockError("memory backend state poisoned".to_string()))
    }

    /// Overwrites the live bytes directly, bypassing every check.
    pub fn set_live_raw(&self, bytes: &[u8]) -> Result<()> {
        self.inner()?.live = Some(bytes.to_vec());
        Ok(())
    }

    pub fn live_raw(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.inner()?.live.clone())
    }

    /// Makes the next `n` atomic writes fail as if the disk were full.
    pub fn fail_next_writes(&self, n: usize) -> Result<()> {
        self.inner()?.fail_writes = n;
        Ok(())
    }

    pub fn handoff(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner()?.handoffs.get(name).cloned())
    }

    pub fn handoff_names(&self) -> Result<Vec<String>> {
        Ok(self.inner()?.handoffs.keys().cloned().collect())
    }

    pub fn events(&self) -> Result<Vec<String>> {
        Ok(self.inner()?.events.clone())
    }

    fn take_failure(inner: &mut MemoryInner) -> Result<()> {
        if inner.fail_writes > 0 {
            inner.fail_writes -= 1;
            return Err(FrontdeskError::IoError(std::io::Error::other(
                "simulated write failure",
            )));
        }
        Ok(())
    }
}

impl StateBackend for MemoryBackend {
    type Guard<'a>
        = MutexGuard<'a, ()>
    where
        Self: 'a;

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| FrontdeskError::LockError("memory backend lock poisoned".to_string()))
    }

    fn live_exists(&self) -> Result<bool> {
        Ok(self.inner()?.live.is_some())
    }

    fn read_live(&self) -> Result<Option<Vec<u8>>> {
        self.live_raw()
    }

    fn write_live(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner()?;
        Self::take_failure(&mut inner)?;
        inner.live = Some(bytes.to_vec());
        Ok(())
    }

    fn snapshot_live(&self) -> Result<Option<SnapshotId>> {
        let mut inner = self.inner()?;
        let Some(bytes) = inner.live.clone() else {
            return Ok(None);
        };
        let stamp = time::unique_file_stamp(time::now_utc(), |s| {
            inner.snapshots.contains_key(s)
        });
        inner.snapshots.insert(stamp.clone(), bytes);
        Ok(Some(SnapshotId {
            name: format!("state.prev.{}.json", stamp),
            stamp,
        }))
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotId>> {
        Ok(self
            .inner()?
            .snapshots
            .keys()
            .rev()
            .map(|stamp| SnapshotId {
                name: format!("state.prev.{}.json", stamp),
                stamp: stamp.clone(),
            })
            .collect())
    }

    fn read_snapshot(&self, id: &SnapshotId) -> Result<Vec<u8>> {
        self.inner()?
            .snapshots
            .get(&id.stamp)
            .cloned()
            .ok_or_else(|| FrontdeskError::NotFound(format!("snapshot {}", id.name)))
    }

    fn remove_snapshot(&self, id: &SnapshotId) -> Result<()> {
        self.inner()?.snapshots.remove(&id.stamp);
        Ok(())
    }

    fn write_handoff(&self, from: &str, to: &str, bytes: &[u8]) -> Result<String> {
        let mut inner = self.inner()?;
        Self::take_failure(&mut inner)?;
        let stamp = time::unique_file_stamp(time::now_utc(), |s| {
            inner
                .handoffs
                .contains_key(&handoff::handoff_file_name(from, to, s))
        });
        let name = handoff::handoff_file_name(from, to, &stamp);
        inner.handoffs.insert(name.clone(), bytes.to_vec());
        Ok(name)
    }

    fn append_event(&self, line: &str) -> Result<()> {
        self.inner()?.events.push(line.to_string());
        Ok(())
    }
}
