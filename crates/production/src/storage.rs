//! File-backed safety state storage.
//!
//! Every write lands in a temp file that is fsynced and renamed over the
//! primary, after the previous primary has been copied to a backup. The
//! backup lets a reload detect a primary that went backwards.

use chainbft_bft::{SafetyStateStore, StoreError};
use chainbft_types::SafetyState;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Safety state persisted as JSON at `path`, with `path.bak` as backup.
#[derive(Debug, Clone)]
pub struct FileSafetyStore {
    path: PathBuf,
    backup_path: PathBuf,
    temp_path: PathBuf,
}

impl FileSafetyStore {
    /// Open the store at `path`, creating the parent directory if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let backup_path = Self::sibling(&path, "bak");
        let temp_path = Self::sibling(&path, "tmp");
        info!(path = %path.display(), "Opened safety state store");
        Ok(Self {
            path,
            backup_path,
            temp_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    fn sibling(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }

    fn read(path: &Path) -> Result<Option<SafetyState>, StoreError> {
        let contents = match fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))
    }

    fn sync_parent(&self) -> Result<(), StoreError> {
        #[cfg(unix)]
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }
}

impl SafetyStateStore for FileSafetyStore {
    fn load(&self) -> Result<Option<SafetyState>, StoreError> {
        let primary = Self::read(&self.path)?;
        let backup = Self::read(&self.backup_path)?;

        match (primary, backup) {
            (None, None) => {
                debug!(path = %self.path.display(), "No persisted safety state");
                Ok(None)
            }
            (None, Some(_)) => Err(StoreError::Corrupt(format!(
                "{} is missing but its backup exists",
                self.path.display()
            ))),
            (Some(stored), Some(backup)) if stored.regresses_from(&backup) => {
                error!(?stored, ?backup, "Safety state regressed behind its backup");
                Err(StoreError::Regression {
                    stored: Box::new(stored),
                    backup: Box::new(backup),
                })
            }
            (Some(stored), _) => {
                info!(
                    last_voted_view = stored.last_voted_view.0,
                    last_timeout_view = stored.last_timeout_view.0,
                    "Loaded safety state"
                );
                Ok(Some(stored))
            }
        }
    }

    fn persist(&mut self, state: &SafetyState) -> Result<(), StoreError> {
        let encoded =
            serde_json::to_vec(state).map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        match fs::copy(&self.path, &self.backup_path) {
            // The backup must be durable before the primary is replaced
            Ok(_) => File::open(&self.backup_path)?.sync_all()?,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut file = File::create(&self.temp_path)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        fs::rename(&self.temp_path, &self.path)?;
        self.sync_parent()?;

        debug!(
            last_voted_view = state.last_voted_view.0,
            last_timeout_view = state.last_timeout_view.0,
            "Persisted safety state"
        );
        Ok(())
    }
}
