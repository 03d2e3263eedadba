// src/ingest/scheduler.rs
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::ingest::Pipeline;

/// Run the pipeline every `every`, starting immediately. A failed run is logged and
/// the next tick tries again.
pub fn spawn_scheduler(pipeline: Arc<Pipeline>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now();
            counter!("ingest_runs_total").increment(1);

            match pipeline.run(now).await {
                Ok(report) => tracing::info!(
                    target: "ingest",
                    accepted = report.accepted(),
                    duplicates = report.duplicates,
                    failed_feeds = report.feeds_failed.len(),
                    "scheduled run finished"
                ),
                Err(e) => tracing::error!(target: "ingest", error = %e, "scheduled run failed"),
            }
        }
    })
}
