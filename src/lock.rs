// src/lock.rs
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::IngestError;

const LOCK_FILE: &str = ".run.lock";

/// Exclusive claim on a data directory for the duration of one run.
/// Released (file removed) on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(data_dir: &Path) -> Result<Self, IngestError> {
        fs::create_dir_all(data_dir).map_err(|e| IngestError::sink_write(data_dir, e))?;
        let path = data_dir.join(LOCK_FILE);
        let mut f = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(IngestError::Locked { path })
            }
            Err(e) => return Err(IngestError::sink_write(&path, e)),
        };
        if let Err(e) = writeln!(f, "{}", std::process::id()) {
            // not returned as a lock, so nothing else would remove the file
            let _ = fs::remove_file(&path);
            return Err(IngestError::sink_write(&path, e));
        }
        Ok(Self { path })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}
