//! Crash checkpoint for long runs.
//!
//! The driver marks a class `in_flight` before probing it and
//! `last_completed` once it is done. If the process dies inside a COM
//! server, the file still names the class that was being probed, and
//! resuming from it skips straight past the culprit.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::{ClassRecord, ComId};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error on checkpoint {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse checkpoint {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Persisted progress of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last class whose probe/projection finished (successfully or not).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<ComId>,
    /// Class being probed right now; only left set if the run died.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_flight: Option<ComId>,
    /// SHA-256 over the run's ordered class ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Checkpoint {
    /// Where the next run should resume (exclusive).
    ///
    /// An `in_flight` class crashed the previous run, so it is skipped too.
    pub fn resume_point(&self) -> Option<&ComId> {
        self.in_flight.as_ref().or(self.last_completed.as_ref())
    }

    /// `true` if the previous run died mid-class.
    pub fn crashed(&self) -> bool {
        self.in_flight.is_some()
    }
}

/// A checkpoint bound to a file; each update is written through immediately.
#[derive(Debug)]
pub struct CheckpointFile {
    path: PathBuf,
    state: Checkpoint,
}

impl CheckpointFile {
    /// Read a checkpoint if one exists.
    pub fn load(path: &Path) -> CheckpointResult<Option<Checkpoint>> {
        if !path.exists() {
            return Ok(None);
        }
        let body = fs::read(path)
            .map_err(|source| CheckpointError::Io { path: path.display().to_string(), source })?;
        let state = serde_json::from_slice(&body)
            .map_err(|source| CheckpointError::Parse { path: path.display().to_string(), source })?;
        Ok(Some(state))
    }

    /// Open for writing, carrying over any previous state.
    pub fn open(path: impl Into<PathBuf>) -> CheckpointResult<Self> {
        let path = path.into();
        let state = Self::load(&path)?.unwrap_or_default();
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &Checkpoint {
        &self.state
    }

    /// Record the fingerprint of the class list this run iterates.
    ///
    /// A mismatch with the stored fingerprint means the resume point was
    /// recorded against a different inventory; that is logged, not fatal.
    pub fn begin(&mut self, fingerprint: String) -> CheckpointResult<()> {
        if let Some(previous) = &self.state.inventory_fingerprint {
            if *previous != fingerprint {
                tracing::warn!(
                    path = %self.path.display(),
                    "class inventory changed since the checkpoint was written"
                );
            }
        }
        self.state.inventory_fingerprint = Some(fingerprint);
        self.persist()
    }

    pub fn mark_in_flight(&mut self, clsid: &ComId) -> CheckpointResult<()> {
        self.state.in_flight = Some(clsid.clone());
        self.persist()
    }

    pub fn mark_completed(&mut self, clsid: &ComId) -> CheckpointResult<()> {
        self.state.in_flight = None;
        self.state.last_completed = Some(clsid.clone());
        self.persist()
    }

    fn persist(&mut self) -> CheckpointResult<()> {
        self.state.updated_at = Some(Utc::now().to_rfc3339());
        let io_err =
            |source: std::io::Error| CheckpointError::Io { path: self.path.display().to_string(), source };
        let body = serde_json::to_vec_pretty(&self.state).map_err(|source| {
            CheckpointError::Parse { path: self.path.display().to_string(), source }
        })?;
        // Write-then-rename so a crash never leaves a torn file behind.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

/// Fingerprint of an ordered class list.
pub fn fingerprint(classes: &[ClassRecord]) -> String {
    let mut hasher = Sha256::new();
    for class in classes {
        hasher.update(class.id.as_str().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_takes_precedence_for_resume() {
        let state = Checkpoint {
            last_completed: Some(ComId::new("{00000000-0000-0000-0000-000000000001}")),
            in_flight: Some(ComId::new("{00000000-0000-0000-0000-000000000002}")),
            ..Checkpoint::default()
        };
        assert!(state.crashed());
        assert_eq!(state.resume_point().map(ComId::as_str), Some("{00000000-0000-0000-0000-000000000002}"));
    }

    #[test]
    fn completion_clears_in_flight_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let id = ComId::new("{00000000-0000-0000-0000-000000000003}");

        let mut file = CheckpointFile::open(&path).unwrap();
        file.mark_in_flight(&id).unwrap();
        assert_eq!(CheckpointFile::load(&path).unwrap().unwrap().in_flight, Some(id.clone()));

        file.mark_completed(&id).unwrap();
        let on_disk = CheckpointFile::load(&path).unwrap().unwrap();
        assert_eq!(on_disk.in_flight, None);
        assert_eq!(on_disk.last_completed, Some(id));
    }

    #[test]
    fn fingerprint_depends_on_order() {
        let a = ClassRecord::new("{00000000-0000-0000-0000-00000000000A}");
        let b = ClassRecord::new("{00000000-0000-0000-0000-00000000000B}");
        assert_ne!(fingerprint(&[a.clone(), b.clone()]), fingerprint(&[b, a]));
    }
}
