// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod error;
pub mod ingest;
pub mod lock;
pub mod seen;
pub mod sinks;

// ---- Re-exports for stable public API ----
pub use crate::error::{FeedError, IngestError, NormalizeError};
pub use crate::ingest::types::{Entry, FeedSource, RawEntry, RunBatch};
pub use crate::ingest::{Pipeline, PipelineConfig, RunReport};
pub use crate::seen::{SeenSet, SeenSetStore};
