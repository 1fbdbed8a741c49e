//! Store location and tunables.
//!
//! The store root is resolved from `--root`, then `FRONTDESK_ROOT`, then the
//! nearest ancestor holding a `.frontdesk/` directory, then `./.frontdesk`.
//! An optional `store.toml` inside the root overrides the defaults below.

use crate::core::error::{FrontdeskError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const ROOT_DIR_NAME: &str = ".frontdesk";
pub const CONFIG_FILE_NAME: &str = "store.toml";
pub const ROOT_ENV_VAR: &str = "FRONTDESK_ROOT";
pub const DEFAULT_MAX_VERSIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub project: String,
    pub domain: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            project: "Revenue Rescue".to_string(),
            domain: "localhost".to_string(),
        }
    }
}

/// The `store.toml` file shape. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreToml {
    pub max_versions: usize,
    pub state_file: String,
    pub lock_file: String,
    pub handoff_dir: String,
    pub events_file: String,
    pub defaults: DefaultsConfig,
}

impl Default for StoreToml {
    fn default() -> Self {
        Self {
            max_versions: DEFAULT_MAX_VERSIONS,
            state_file: "state.json".to_string(),
            lock_file: ".state.lock".to_string(),
            handoff_dir: "handoffs".to_string(),
            events_file: "state.events.jsonl".to_string(),
            defaults: DefaultsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub max_versions: usize,
    pub state_file: String,
    pub lock_file: String,
    pub handoff_dir: String,
    pub events_file: String,
    pub defaults: DefaultsConfig,
}

impl StoreConfig {
    /// Built-in defaults rooted at `root`, ignoring any `store.toml`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self::from_toml(root.into(), StoreToml::default())
    }

    /// Defaults rooted at `root`, overridden by `<root>/store.toml` if present.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config_path = root.join(CONFIG_FILE_NAME);
        let parsed = if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            toml::from_str::<StoreToml>(&content)?
        } else {
            StoreToml::default()
        };
        let config = Self::from_toml(root, parsed);
        config.validate()?;
        Ok(config)
    }

    fn from_toml(root: PathBuf, t: StoreToml) -> Self {
        Self {
            root,
            max_versions: t.max_versions,
            state_file: t.state_file,
            lock_file: t.lock_file,
            handoff_dir: t.handoff_dir,
            events_file: t.events_file,
            defaults: t.defaults,
        }
    }

    pub fn with_max_versions(mut self, max_versions: usize) -> Self {
        self.max_versions = max_versions;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_versions == 0 {
            return Err(FrontdeskError::ValidationError(
                "max_versions must be at least 1".to_string(),
            ));
        }
        for (key, name) in [
            ("state_file", &self.state_file),
            ("lock_file", &self.lock_file),
            ("handoff_dir", &self.handoff_dir),
            ("events_file", &self.events_file),
        ] {
            let plain = !name.is_empty()
                && Path::new(name).file_name().map(|f| f == name.as_str()) == Some(true);
            if !plain {
                return Err(FrontdeskError::ValidationError(format!(
                    "{} must be a plain file name inside the store root, got '{}'",
                    key, name
                )));
            }
        }
        if self.state_file == self.lock_file {
            return Err(FrontdeskError::ValidationError(
                "state_file and lock_file must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(&self.state_file)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(&self.lock_file)
    }

    pub fn handoff_dir_path(&self) -> PathBuf {
        self.root.join(&self.handoff_dir)
    }

    pub fn events_path(&self) -> PathBuf {
        self.root.join(&self.events_file)
    }

    /// Stem used for snapshot names: `state.json` -> `state`.
    pub fn snapshot_stem(&self) -> &str {
        Path::new(&self.state_file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("state")
    }
}

fn find_store_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current_dir = PathBuf::from(start_dir);
    loop {
        let candidate = current_dir.join(ROOT_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        if !current_dir.pop() {
            return None;
        }
    }
}

/// Resolves the store root directory; does not create it.
pub fn resolve_root(flag: Option<PathBuf>, cwd: &Path) -> Result<PathBuf> {
    if let Some(root) = flag {
        return Ok(root);
    }
    match env::var(ROOT_ENV_VAR) {
        Ok(v) if !v.trim().is_empty() => return Ok(PathBuf::from(v)),
        Ok(_) | Err(env::VarError::NotPresent) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(find_store_root(cwd).unwrap_or_else(|| cwd.join(ROOT_DIR_NAME)))
}
