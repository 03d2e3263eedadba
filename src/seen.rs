// src/seen.rs
//! Seen-link ledger: every link ever accepted, across all runs and all feeds.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::sinks::write_atomic;

/// In-memory view of the ledger for one run. Insert-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenSet {
    links: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, link: &str) -> bool {
        self.links.contains(link)
    }

    /// Returns `true` if the link was not present before.
    pub fn add(&mut self, link: impl Into<String>) -> bool {
        self.links.insert(link.into())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(String::as_str)
    }

    fn sorted(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.iter().collect();
        v.sort_unstable();
        v
    }
}

impl<S: Into<String>> FromIterator<S> for SeenSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            links: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    /// JSON array of strings.
    Json,
    /// One link per line; blank lines ignored.
    Lines,
}

/// Durable home of the [`SeenSet`]. Loaded wholesale, overwritten wholesale.
#[derive(Debug, Clone)]
pub struct SeenSetStore {
    path: PathBuf,
    format: Format,
    recover_corrupt: bool,
}

impl SeenSetStore {
    /// Format is picked by extension: `.json` is a JSON array, anything else is line-delimited.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Lines,
        };
        Self {
            path,
            format,
            recover_corrupt: false,
        }
    }

    /// Move an unreadable ledger aside and start empty instead of failing the run.
    pub fn with_recover_corrupt(mut self, on: bool) -> Self {
        self.recover_corrupt = on;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file is the normal first-run case and yields an empty set.
    pub fn load(&self) -> Result<SeenSet, IngestError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.path.display(),
                    "no seen-link state yet, starting empty"
                );
                return Ok(SeenSet::new());
            }
            Err(source) => {
                return Err(IngestError::StoreRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match self.decode(&bytes) {
            Ok(set) => {
                tracing::debug!(
                    path = %self.path.display(),
                    links = set.len(),
                    "seen-link state loaded"
                );
                Ok(set)
            }
            Err(reason) if self.recover_corrupt => {
                let aside = self.quarantine()?;
                tracing::error!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    %reason,
                    "seen-link state corrupt, starting empty"
                );
                Ok(SeenSet::new())
            }
            Err(reason) => Err(IngestError::CorruptState {
                path: self.path.clone(),
                reason,
            }),
        }
    }

    /// Replace the durable form with `set`. Either the old or the new content survives a crash.
    pub fn persist(&self, set: &SeenSet) -> Result<(), IngestError> {
        let body = match self.format {
            Format::Json => serde_json::to_vec_pretty(&set.sorted())
                .map_err(|e| IngestError::sink_write(&self.path, io::Error::other(e)))?,
            Format::Lines => {
                let mut s = String::new();
                for link in set.sorted() {
                    s.push_str(link);
                    s.push('\n');
                }
                s.into_bytes()
            }
        };
        write_atomic(&self.path, &body)?;
        tracing::debug!(
            path = %self.path.display(),
            links = set.len(),
            "seen-link state persisted"
        );
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<SeenSet, String> {
        let text = std::str::from_utf8(bytes).map_err(|e| format!("not utf-8: {e}"))?;
        match self.format {
            Format::Json => {
                let links: Vec<String> =
                    serde_json::from_str(text).map_err(|e| format!("invalid json: {e}"))?;
                Ok(links
                    .into_iter()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect())
            }
            Format::Lines => Ok(text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect()),
        }
    }

    fn quarantine(&self) -> Result<PathBuf, IngestError> {
        let ts = chrono::Utc::now().timestamp();
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{ts}"));
        let aside = PathBuf::from(name);
        fs::rename(&self.path, &aside).map_err(|e| IngestError::sink_write(&aside, e))?;
        Ok(aside)
    }
}
