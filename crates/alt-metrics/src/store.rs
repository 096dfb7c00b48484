// store.rs - Whole-file JSON persistence for metric events.
//
// The metrics file is a single pretty-printed JSON array, rewritten in
// full on every save. It is not an append log: the in-memory buffer is
// the source of truth and the file mirrors it after each flush.
//
// Saves go through a temporary file in the same directory which is then
// renamed over the target, so readers never see a half-written array.

use std::fs::{self, Permissions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::MetricsError;
use crate::event::MetricEvent;

/// Reads and writes the event array at a fixed path.
#[derive(Debug, Clone)]
pub struct EventStore {
    path: PathBuf,
}

impl EventStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load every stored event, oldest first.
    ///
    /// Returns `Ok(None)` when the file does not exist yet (cold start).
    /// A zero-length file loads as an empty list.
    pub fn load(&self) -> Result<Option<Vec<MetricEvent>>, MetricsError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(MetricsError::ReadFailed {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if data.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }

        let events: Vec<MetricEvent> = serde_json::from_str(&data)?;
        Ok(Some(events))
    }

    /// Replace the file contents with `events`.
    pub fn save(&self, events: &[MetricEvent]) -> Result<(), MetricsError> {
        let mut json = serde_json::to_string_pretty(events)?;
        json.push('\n');

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| self.write_failed(source))?;

        // Temp files start out owner-only; keep the target's mode instead.
        let permissions = match fs::metadata(&self.path) {
            Ok(meta) => Some(meta.permissions()),
            Err(_) => default_permissions(),
        };

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|source| self.write_failed(source))?;
        if let Some(permissions) = permissions {
            tmp.as_file()
                .set_permissions(permissions)
                .map_err(|source| self.write_failed(source))?;
        }
        tmp.write_all(json.as_bytes())
            .map_err(|source| self.write_failed(source))?;
        tmp.as_file()
            .sync_all()
            .map_err(|source| self.write_failed(source))?;
        tmp.persist(&self.path)
            .map_err(|e| self.write_failed(e.error))?;
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_failed(&self, source: std::io::Error) -> MetricsError {
        MetricsError::WriteFailed {
            path: self.path.clone(),
            source,
        }
    }
}

/// Mode for a metrics file created from scratch: owner read-write,
/// readable by everyone else.
#[cfg(unix)]
fn default_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<Permissions> {
    None
}
