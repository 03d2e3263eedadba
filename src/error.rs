// src/error.rs
//! Error taxonomy for a collector run.
//!
//! Feed and entry errors are contained by the pipeline (logged, then skipped).
//! `IngestError` is what aborts a run.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single feed. The pipeline skips the feed and moves on.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport failure, timeout or non-success status.
    #[error("feed unavailable: {address}: {reason}")]
    Unavailable { address: String, reason: String },

    /// The document was fetched but is not a readable RSS/Atom feed.
    #[error("feed malformed: {address}: {reason}")]
    Malformed { address: String, reason: String },
}

impl FeedError {
    pub fn unavailable(address: &str, reason: impl ToString) -> Self {
        Self::Unavailable {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(address: &str, reason: impl ToString) -> Self {
        Self::Malformed {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failure to turn one raw entry into an [`Entry`](crate::ingest::types::Entry).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("entry has no link")]
    MissingLink,

    #[error("invalid publication time {0}")]
    InvalidTimestamp(String),
}

/// Run-level failures. Prior durable state is left intact.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The seen-link file exists but cannot be parsed.
    #[error("seen-link state at {} is corrupt: {reason}", .path.display())]
    CorruptState { path: PathBuf, reason: String },

    /// The seen-link file exists but cannot be read at all.
    #[error("reading seen-link state at {}: {source}", .path.display())]
    StoreRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Durable write to a sink or to the seen-link file failed.
    #[error("writing {}: {source}", .path.display())]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another run holds the lock on the data directory.
    #[error("another run is in progress (lock file {})", .path.display())]
    Locked { path: PathBuf },
}

impl IngestError {
    pub(crate) fn sink_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SinkWrite {
            path: path.into(),
            source,
        }
    }
}
