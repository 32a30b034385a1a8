//! JSON file storage
//!
//! A `Store` is a directory holding the app's JSON files. Writes go to a
//! temporary sibling first and are renamed into place, so a crash mid-write
//! never leaves a truncated settings or history file behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::config::app::NAME;
use crate::error::{AppError, Result};

/// Directory of JSON data files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// The platform config directory, e.g. `~/.config/localspeed`
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir().map(|p| p.join(NAME)).ok_or_else(|| {
            AppError::Config(
                "Could not determine config directory. HOME environment variable may not be set."
                    .to_string(),
            )
        })?;
        Ok(Self { dir })
    }

    /// A store rooted at an explicit directory
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Load and parse `file`. A missing or blank file is `None`.
    pub fn load<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        let path = self.path(file);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &path, &e)),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| AppError::Storage(format!("Failed to parse {:?}: {}", path, e)))
    }

    /// Serialize `data` into `file`, creating the directory if needed
    pub fn save<T: Serialize>(&self, file: &str, data: &T) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error("create", &self.dir, &e))?;

        let path = self.path(file);
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| AppError::Storage(format!("Failed to serialize {}: {}", file, e)))?;

        let staging = self.path(&format!(".{file}.tmp"));
        fs::write(&staging, content).map_err(|e| io_error("write", &staging, &e))?;
        fs::rename(&staging, &path).map_err(|e| io_error("replace", &path, &e))?;
        debug!(path = %path.display(), "saved");
        Ok(())
    }

    /// Remove `file`. Missing files are fine.
    pub fn delete(&self, file: &str) -> Result<()> {
        let path = self.path(file);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete", &path, &e)),
        }
    }

    pub fn exists(&self, file: &str) -> bool {
        self.path(file).exists()
    }
}

fn io_error(action: &str, path: &Path, e: &std::io::Error) -> AppError {
    let msg = match e.kind() {
        ErrorKind::PermissionDenied => format!("Permission denied: cannot {action} {:?}", path),
        ErrorKind::ReadOnlyFilesystem => {
            format!("Cannot {action} {:?}: filesystem is read-only", path)
        }
        _ => format!("Failed to {action} {:?}: {}", path, e),
    };
    AppError::Storage(msg)
}
