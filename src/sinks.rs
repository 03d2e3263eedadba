// src/sinks.rs
//! Durable outputs of a run: the append-only news log and the per-day snapshot.

use chrono::NaiveDate;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::ingest::types::Entry;

/// Write `bytes` to `<path>.tmp`, fsync, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IngestError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| IngestError::sink_write(dir, e))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let res = (|| -> io::Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = res {
        let _ = fs::remove_file(&tmp);
        return Err(IngestError::sink_write(path, e));
    }
    sync_parent(path);
    Ok(())
}

/// Flush the directory entry so the rename itself survives a power loss.
/// The new content is already in place, so a failure here is only logged.
#[cfg(unix)]
fn sync_parent(path: &Path) {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        tracing::warn!(dir = %dir.display(), error = %e, "directory fsync after rename failed");
    }
}

// Directories cannot be opened as files on other platforms.
#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

/// A file an append can be cut back from.
trait Truncate: Write {
    fn end(&mut self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl Truncate for fs::File {
    fn end(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Write `buf` whole and sync it, or cut the file back to its previous length.
fn append_all<W: Truncate>(w: &mut W, buf: &[u8]) -> io::Result<()> {
    let start = w.end()?;
    if let Err(e) = w.write_all(buf).and_then(|_| w.sync()) {
        if let Err(undo) = w.truncate_to(start) {
            tracing::error!(error = %undo, len = start, "partial append could not be cut back");
        }
        return Err(e);
    }
    Ok(())
}

/// Unbounded JSON-lines history of every accepted entry. Never rewritten.
#[derive(Debug, Clone)]
pub struct AppendLog {
    path: PathBuf,
}

impl AppendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line per entry, in order. A failed append leaves the log as it was.
    pub fn append(&self, entries: &[Entry]) -> Result<(), IngestError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(entries.len() * 256);
        for e in entries {
            serde_json::to_writer(&mut buf, e)
                .map_err(|err| IngestError::sink_write(&self.path, io::Error::other(err)))?;
            buf.push(b'\n');
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| IngestError::sink_write(dir, e))?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| IngestError::sink_write(&self.path, e))?;
        append_all(&mut f, &buf).map_err(|e| IngestError::sink_write(&self.path, e))
    }

    /// Read back every record. A missing log reads as empty.
    pub fn read_all(&self) -> io::Result<Vec<Entry>> {
        let s = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        s.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            })
            .collect()
    }
}

/// Per-day JSON array of entries. A later run on the same day extends the file.
#[derive(Debug, Clone)]
pub struct PeriodSnapshot {
    dir: PathBuf,
}

impl PeriodSnapshot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, period: NaiveDate) -> PathBuf {
        self.dir.join(format!("news_{}.json", period.format("%Y-%m-%d")))
    }

    /// Entries recorded for `period` so far. A missing file reads as empty.
    pub fn read(&self, period: NaiveDate) -> io::Result<Vec<Entry>> {
        match fs::read_to_string(self.path_for(period)) {
            Ok(s) => serde_json::from_str(&s)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Append `entries` to the snapshot of `period` and rewrite it atomically.
    pub fn extend(&self, period: NaiveDate, entries: &[Entry]) -> Result<(), IngestError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.stage(period, entries)?.commit()
    }

    /// Read the current snapshot of `period` and build its extended form without writing.
    /// Fails when the existing snapshot is unreadable, since rewriting it would lose the
    /// day's earlier entries.
    pub fn stage(
        &self,
        period: NaiveDate,
        entries: &[Entry],
    ) -> Result<StagedSnapshot, IngestError> {
        let path = self.path_for(period);
        let mut all = self
            .read(period)
            .map_err(|e| IngestError::sink_write(&path, e))?;
        all.extend_from_slice(entries);

        let body = serde_json::to_vec_pretty(&all)
            .map_err(|e| IngestError::sink_write(&path, io::Error::other(e)))?;
        Ok(StagedSnapshot { path, body })
    }
}

/// Snapshot content that has been checked and serialized but not yet written.
#[derive(Debug)]
pub struct StagedSnapshot {
    path: PathBuf,
    body: Vec<u8>,
}

impl StagedSnapshot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commit(self) -> Result<(), IngestError> {
        write_atomic(&self.path, &self.body)
    }
}
