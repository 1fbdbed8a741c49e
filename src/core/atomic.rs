//! Temp-file-then-rename writer.
//!
//! The new content goes to a sibling `<name>.tmp`, is fsynced, then renamed
//! over the target. On any failure the temp file is removed and the target is
//! left exactly as it was.

use crate::core::error::Result;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Runs `fill` against a fresh temp file, then publishes it at `path`.
///
/// `fill` failing, the flush failing, or the rename failing all leave `path`
/// untouched and remove the temp file.
pub fn atomic_write_with<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let temp_path = temp_path_for(path);
    match write_and_publish(path, &temp_path, fill) {
        Ok(()) => Ok(()),
        Err(e) => {
            if temp_path.exists() {
                let _ = fs::remove_file(&temp_path);
            }
            Err(e.into())
        }
    }
}

fn write_and_publish<F>(path: &Path, temp_path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut writer = BufWriter::new(File::create(temp_path)?);
    fill(&mut writer)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);

    fs::rename(temp_path, path)?;
    sync_parent_dir(path);
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    // Makes the rename itself durable; best effort.
    if let Some(parent) = path.parent() {
        let dir = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(d) = File::open(dir) {
            let _ = d.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    atomic_write_with(path, |w| w.write_all(bytes))
}
