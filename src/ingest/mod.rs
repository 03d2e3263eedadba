// src/ingest/mod.rs
pub mod config;
pub mod normalize;
pub mod providers;
pub mod scheduler;
pub mod types;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::ingest::normalize::{link_of, normalize_entry};
use crate::ingest::types::{FeedSource, RunBatch};
use crate::lock::RunLock;
use crate::seen::SeenSetStore;
use crate::sinks::{AppendLog, PeriodSnapshot};

/// Indian Standard Time, the offset published times are shifted to by default.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 5 * 60 + 30;

pub const SEEN_FILE: &str = "seen_links.json";
pub const LOG_FILE: &str = "all_news.jsonl";

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_entries_total", "Raw entries returned by feeds.");
        describe_counter!("ingest_accepted_total", "Entries accepted as new.");
        describe_counter!(
            "ingest_duplicate_total",
            "Entries skipped because their link was already seen."
        );
        describe_counter!("ingest_empty_link_total", "Entries skipped for an empty link.");
        describe_counter!(
            "ingest_entry_errors_total",
            "Entries skipped because normalization failed."
        );
        describe_counter!("ingest_feed_errors_total", "Feed fetch/parse errors.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
    });
}

/// Everything a run needs besides the feed source.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Feed addresses, processed in this order.
    pub feeds: Vec<String>,
    pub data_dir: PathBuf,
    /// Offset that `published_at` and the snapshot day are expressed in.
    pub utc_offset: FixedOffset,
    /// Move a corrupt seen-link file aside instead of failing.
    pub recover_corrupt_state: bool,
}

impl PipelineConfig {
    pub fn new(feeds: Vec<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            feeds,
            data_dir: data_dir.into(),
            utc_offset: offset_from_minutes(DEFAULT_UTC_OFFSET_MINUTES).unwrap_or(Utc.fix()),
            recover_corrupt_state: false,
        }
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn with_recover_corrupt_state(mut self, on: bool) -> Self {
        self.recover_corrupt_state = on;
        self
    }
}

/// `None` when outside ±23:59.
pub fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}

/// Outcome of one run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Newly accepted entries, in feed order then entry order.
    pub batch: RunBatch,
    /// Day the snapshot was written for (the run's day in the configured offset).
    pub period: Option<NaiveDate>,
    pub feeds_ok: usize,
    pub feeds_failed: Vec<String>,
    pub duplicates: usize,
    pub empty_links: usize,
    pub entry_errors: usize,
}

impl RunReport {
    pub fn accepted(&self) -> usize {
        self.batch.len()
    }
}

/// Fetch → dedup → normalize → persist, over a fixed list of feeds.
pub struct Pipeline {
    cfg: PipelineConfig,
    source: Box<dyn FeedSource>,
    store: SeenSetStore,
    log: AppendLog,
    snapshot: PeriodSnapshot,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig, source: Box<dyn FeedSource>) -> Self {
        let store = SeenSetStore::open(cfg.data_dir.join(SEEN_FILE))
            .with_recover_corrupt(cfg.recover_corrupt_state);
        let log = AppendLog::new(cfg.data_dir.join(LOG_FILE));
        let snapshot = PeriodSnapshot::new(&cfg.data_dir);
        Self {
            cfg,
            source,
            store,
            log,
            snapshot,
        }
    }

    /// Use a different seen-link file, e.g. a legacy line-delimited `seen_links.txt`.
    pub fn with_seen_store(mut self, path: &Path) -> Self {
        self.store = SeenSetStore::open(path).with_recover_corrupt(self.cfg.recover_corrupt_state);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn seen_store(&self) -> &SeenSetStore {
        &self.store
    }

    pub fn append_log(&self) -> &AppendLog {
        &self.log
    }

    pub fn snapshot(&self) -> &PeriodSnapshot {
        &self.snapshot
    }

    /// Run once. `now` supplies the fallback publication time and the snapshot day.
    ///
    /// Feed and entry failures are logged and skipped. Store and sink failures abort
    /// the run; nothing is persisted to the seen-link file unless the sinks succeeded.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunReport, IngestError> {
        ensure_metrics_described();
        let _lock = RunLock::acquire(&self.cfg.data_dir)?;

        let mut seen = self.store.load()?;
        let mut report = RunReport::default();

        for address in &self.cfg.feeds {
            tracing::info!(feed = %address, source = self.source.name(), "fetching");
            let raws = match self.source.fetch(address).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(feed = %address, error = %e, "feed skipped");
                    counter!("ingest_feed_errors_total").increment(1);
                    report.feeds_failed.push(address.clone());
                    continue;
                }
            };
            report.feeds_ok += 1;
            counter!("ingest_entries_total").increment(raws.len() as u64);

            let mut accepted_here = 0usize;
            for raw in &raws {
                let Some(link) = link_of(raw) else {
                    tracing::debug!(feed = %address, "entry without link skipped");
                    report.empty_links += 1;
                    counter!("ingest_empty_link_total").increment(1);
                    continue;
                };
                if seen.contains(link) {
                    report.duplicates += 1;
                    counter!("ingest_duplicate_total").increment(1);
                    continue;
                }

                match normalize_entry(raw, address, self.cfg.utc_offset, now) {
                    Ok(entry) => {
                        seen.add(entry.identifier.clone());
                        report.batch.push(entry);
                        accepted_here += 1;
                    }
                    Err(e) => {
                        tracing::warn!(feed = %address, %link, error = %e, "entry skipped");
                        report.entry_errors += 1;
                        counter!("ingest_entry_errors_total").increment(1);
                    }
                }
            }
            tracing::info!(
                feed = %address,
                entries = raws.len(),
                accepted = accepted_here,
                "feed processed"
            );
        }

        counter!("ingest_accepted_total").increment(report.batch.len() as u64);
        gauge!("ingest_pipeline_last_run_ts").set(now.timestamp() as f64);

        if report.batch.is_empty() {
            tracing::info!("no new entries, durable state untouched");
            return Ok(report);
        }

        let period = now.with_timezone(&self.cfg.utc_offset).date_naive();
        // everything that can be checked is checked before the log is touched
        let staged = self.snapshot.stage(period, &report.batch)?;
        self.log.append(&report.batch)?;
        staged.commit()?;
        self.store.persist(&seen)?;
        report.period = Some(period);

        tracing::info!(
            accepted = report.batch.len(),
            seen = seen.len(),
            %period,
            "run persisted"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_range_is_checked() {
        assert_eq!(
            offset_from_minutes(330).unwrap().local_minus_utc(),
            19_800
        );
        assert_eq!(offset_from_minutes(-300).unwrap().local_minus_utc(), -18_000);
        assert!(offset_from_minutes(24 * 60).is_none());
        assert!(offset_from_minutes(i32::MAX).is_none());
    }

    #[test]
    fn default_config_uses_ist() {
        let cfg = PipelineConfig::new(vec![], "data");
        assert_eq!(cfg.utc_offset.local_minus_utc(), 19_800);
        assert!(!cfg.recover_corrupt_state);
    }
}
