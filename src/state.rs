/*!
 * Recovery state persistence
 *
 * One pretty-printed JSON document per service and location. Writes go to a
 * temporary file in the destination directory which is then renamed over the
 * target, so readers never observe a half-written entry.
 *
 * Concurrent `fail_az` runs against the same file are not coordinated; the
 * last writer wins.
 */

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::core::ExecutionResult;
use crate::error::{AzError, Result};
use crate::services::ServiceKind;

/// A reversal record stored in a state entry
pub trait StateRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Identifier used to correlate executor outcomes with this record
    fn resource_id(&self) -> String;
}

/// Persisted record of one `fail_az` run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry<R> {
    pub service: ServiceKind,
    pub availability_zone: String,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    /// Resources the failure was applied to (or would be, in a dry run)
    pub resources: Vec<R>,
    /// Per-resource outcomes of the run that produced this entry
    #[serde(default)]
    pub outcomes: Vec<ExecutionResult>,
}

impl<R> StateEntry<R> {
    pub fn new(service: ServiceKind, availability_zone: impl Into<String>, dry_run: bool) -> Self {
        Self {
            service,
            availability_zone: availability_zone.into(),
            dry_run,
            created_at: Utc::now(),
            resources: Vec::new(),
            outcomes: Vec::new(),
        }
    }
}

/// Entry metadata without the service-specific records
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateHeader {
    pub service: ServiceKind,
    pub availability_zone: String,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
}

/// File-backed store for one service's state entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStore {
    service: ServiceKind,
    path: PathBuf,
}

impl StateStore {
    /// Resolve the state file location.
    ///
    /// * no explicit path: `<state_dir or cwd>/fail_az.<service>.json`
    /// * explicit path ending in `.json`: used as-is
    /// * any other explicit path: `.<service>.json` is appended
    ///
    /// # Errors
    ///
    /// [`AzError::Validation`] when the explicit path is a directory.
    pub fn resolve(
        service: ServiceKind,
        explicit: Option<&Path>,
        state_dir: Option<&Path>,
    ) -> Result<Self> {
        let path = match explicit {
            Some(p) if p.is_dir() => {
                return Err(AzError::Validation(format!(
                    "state path {} is a directory; expected a file path",
                    p.display()
                )))
            }
            Some(p) if p.extension().is_some_and(|ext| ext == "json") => p.to_path_buf(),
            Some(p) => {
                let mut name: OsString = p.as_os_str().to_owned();
                name.push(format!(".{service}.json"));
                PathBuf::from(name)
            }
            None => state_dir
                .unwrap_or_else(|| Path::new("."))
                .join(format!("fail_az.{service}.json")),
        };

        Ok(Self { service, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn service(&self) -> ServiceKind {
        self.service
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Atomically write `entry`, replacing any previous file
    pub fn save<R: Serialize>(&self, entry: &StateEntry<R>) -> Result<()> {
        let json = serde_json::to_string_pretty(entry).map_err(|e| AzError::StateIo {
            path: self.path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.io_error(e))?;

        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| self.io_error(e))?;
        write_fully(&mut temp, json.as_bytes()).map_err(|e| self.io_error(e))?;
        temp.persist(&self.path).map_err(|e| self.io_error(e.error))?;

        info!(
            service = %self.service,
            path = %self.path.display(),
            resources = entry.resources.len(),
            "saved recovery state"
        );
        Ok(())
    }

    /// Load the full entry.
    ///
    /// # Errors
    ///
    /// * [`AzError::StateNotFound`] when no file exists
    /// * [`AzError::StateCorrupt`] when the file cannot be parsed or belongs to another service
    pub fn load<R: DeserializeOwned>(&self) -> Result<StateEntry<R>> {
        let contents = self.read()?;
        let entry: StateEntry<R> =
            serde_json::from_str(&contents).map_err(|e| self.corrupt(e.to_string()))?;
        self.check_service(entry.service)?;
        Ok(entry)
    }

    /// Load only the entry metadata
    pub fn header(&self) -> Result<StateHeader> {
        let contents = self.read()?;
        let header: StateHeader =
            serde_json::from_str(&contents).map_err(|e| self.corrupt(e.to_string()))?;
        self.check_service(header.service)?;
        Ok(header)
    }

    /// Refuse to replace the state of a live run unless `overwrite` is set.
    ///
    /// Dry-run state and unreadable files are always replaceable.
    pub fn guard_overwrite(&self, overwrite: bool) -> Result<()> {
        if overwrite || !self.exists() {
            return Ok(());
        }
        match self.header() {
            Ok(header) if !header.dry_run => Err(AzError::StateConflict {
                path: self.path.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Remove the state file; a missing file is not an error
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed recovery state");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn read(&self) -> Result<String> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                AzError::StateNotFound {
                    path: self.path.clone(),
                }
            } else {
                self.io_error(e)
            }
        })?;
        if contents.trim().is_empty() {
            return Err(self.corrupt("file is empty"));
        }
        Ok(contents)
    }

    fn check_service(&self, found: ServiceKind) -> Result<()> {
        if found != self.service {
            return Err(self.corrupt(format!(
                "entry belongs to service '{found}', expected '{}'",
                self.service
            )));
        }
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> AzError {
        AzError::StateCorrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn io_error(&self, source: io::Error) -> AzError {
        AzError::StateIo {
            path: self.path.clone(),
            source,
        }
    }
}

fn write_fully(temp: &mut NamedTempFile, bytes: &[u8]) -> io::Result<()> {
    temp.write_all(bytes)?;
    temp.write_all(b"\n")?;
    temp.as_file().sync_all()
}
