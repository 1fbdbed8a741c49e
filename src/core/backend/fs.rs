//! Filesystem backend: one directory holding `state.json`, `.state.lock`,
//! `state.prev.<stamp>.json` snapshots, `handoffs/` and the audit log.

use super::{SnapshotId, StateBackend};
use crate::core::atomic;
use crate::core::config::StoreConfig;
use crate::core::error::{FrontdeskError, Result};
use crate::core::handoff;
use crate::core::lock::{self, LockGuard};
use crate::core::time;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

#[derive(Debug)]
pub struct FsBackend {
    root: PathBuf,
    state_path: PathBuf,
    lock_path: PathBuf,
    handoff_dir: PathBuf,
    events_path: PathBuf,
    snapshot_stem: String,
    snapshot_pattern: Regex,
}

impl FsBackend {
    /// Creates the root directory if needed.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        let stem = config.snapshot_stem().to_string();
        // Second-resolution stamps from older stores are still recognized.
        let snapshot_pattern = Regex::new(&format!(
            r"^{}\.prev\.(\d{{8}}_\d{{6}}(?:_\d{{6}})?)\.json$",
            regex::escape(&stem)
        ))
        .map_err(|e| FrontdeskError::ValidationError(format!("snapshot pattern: {}", e)))?;

        Ok(Self {
            root: config.root.clone(),
            state_path: config.state_path(),
            lock_path: config.lock_path(),
            handoff_dir: config.handoff_dir_path(),
            events_path: config.events_path(),
            snapshot_stem: stem,
            snapshot_pattern,
        })
    }

    pub fn snapshot_path(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(&id.name)
    }

    pub fn handoff_dir(&self) -> &std::path::Path {
        &self.handoff_dir
    }

    fn snapshot_name(&self, stamp: &str) -> String {
        format!("{}.prev.{}.json", self.snapshot_stem, stamp)
    }
}

impl StateBackend for FsBackend {
    type Guard<'a>
        = LockGuard
    where
        Self: 'a;

    fn lock(&self) -> Result<LockGuard> {
        lock::acquire_lock(&self.lock_path)
    }

    fn live_exists(&self) -> Result<bool> {
        Ok(self.state_path.try_exists()?)
    }

    fn read_live(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.state_path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_live(&self, bytes: &[u8]) -> Result<()> {
        atomic::atomic_write(&self.state_path, bytes)
    }

    fn snapshot_live(&self) -> Result<Option<SnapshotId>> {
        let Some(bytes) = self.read_live()? else {
            return Ok(None);
        };
        let stamp = time::unique_file_stamp(time::now_utc(), |s| {
            self.root.join(self.snapshot_name(s)).exists()
        });
        let id = SnapshotId {
            name: self.snapshot_name(&stamp),
            stamp,
        };
        atomic::atomic_write(&self.snapshot_path(&id), &bytes)?;
        Ok(Some(id))
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotId>> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(caps) = self.snapshot_pattern.captures(name) {
                snapshots.push(SnapshotId {
                    stamp: caps[1].to_string(),
                    name: name.to_string(),
                });
            }
        }
        snapshots.sort_by(|a, b| b.cmp(a));
        Ok(snapshots)
    }

    fn read_snapshot(&self, id: &SnapshotId) -> Result<Vec<u8>> {
        fs::read(self.snapshot_path(id)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FrontdeskError::NotFound(format!("snapshot {}", id.name)),
            _ => e.into(),
        })
    }

    fn remove_snapshot(&self, id: &SnapshotId) -> Result<()> {
        match fs::remove_file(self.snapshot_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_handoff(&self, from: &str, to: &str, bytes: &[u8]) -> Result<String> {
        fs::create_dir_all(&self.handoff_dir)?;
        let stamp = time::unique_file_stamp(time::now_utc(), |s| {
            self.handoff_dir
                .join(handoff::handoff_file_name(from, to, s))
                .exists()
        });
        let name = handoff::handoff_file_name(from, to, &stamp);
        atomic::atomic_write(&self.handoff_dir.join(&name), bytes)?;
        Ok(name)
    }

    fn append_event(&self, line: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)?;
        writeln!(f, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(root: &std::path::Path) -> FsBackend {
        FsBackend::open(&StoreConfig::at(root)).unwrap()
    }

    #[test]
    fn test_snapshot_requires_live_document() {
        let tmp = tempfile::tempdir().unwrap();
        let b = backend(tmp.path());
        assert!(b.snapshot_live().unwrap().is_none());
        assert!(b.list_snapshots().unwrap().is_empty());
    }

    #[test]
    fn test_snapshots_copy_live_bytes_and_list_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let b = backend(tmp.path());
        b.write_live(b"one").unwrap();
        let first = b.snapshot_live().unwrap().unwrap();
        b.write_live(b"two").unwrap();
        let second = b.snapshot_live().unwrap().unwrap();

        assert!(first.name.starts_with("state.prev."));
        assert_eq!(b.list_snapshots().unwrap(), vec![second.clone(), first.clone()]);
        assert_eq!(b.read_snapshot(&first).unwrap(), b"one");
        assert_eq!(b.read_snapshot(&second).unwrap(), b"two");
    }

    #[test]
    fn test_listing_ignores_unrelated_files_and_accepts_legacy_stamps() {
        let tmp = tempfile::tempdir().unwrap();
        let b = backend(tmp.path());
        fs::write(tmp.path().join("state.prev.20250101_120000.json"), b"{}").unwrap();
        fs::write(tmp.path().join("state.prev.junk.json"), b"{}").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"hi").unwrap();

        let listed = b.list_snapshots().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].stamp, "20250101_120000");
    }

    #[test]
    fn test_removed_or_missing_snapshots() {
        let tmp = tempfile::tempdir().unwrap();
        let b = backend(tmp.path());
        b.write_live(b"x").unwrap();
        let id = b.snapshot_live().unwrap().unwrap();
        b.remove_snapshot(&id).unwrap();
        b.remove_snapshot(&id).unwrap();
        assert!(matches!(
            b.read_snapshot(&id),
            Err(FrontdeskError::NotFound(_))
        ));
    }

    #[test]
    fn test_handoff_names_never_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let b = backend(tmp.path());
        let a = b.write_handoff("scraper", "mailer", b"1").unwrap();
        let c = b.write_handoff("scraper", "mailer", b"2").unwrap();
        assert_ne!(a, c);
        assert_eq!(fs::read(b.handoff_dir().join(&a)).unwrap(), b"1");
        assert_eq!(fs::read(b.handoff_dir().join(&c)).unwrap(), b"2");
    }

    #[test]
    fn test_events_append_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let b = backend(tmp.path());
        b.append_event("{\"op\":\"a\"}").unwrap();
        b.append_event("{\"op\":\"b\"}").unwrap();
        let content = fs::read_to_string(tmp.path().join("state.events.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
