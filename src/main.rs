//! feed-ledger — binary entrypoint.
//! Collects new items from the configured feeds once, or on an interval with `--every-secs`.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_ledger::ingest::config::resolve_feeds;
use feed_ledger::ingest::providers::http::HttpFeedSource;
use feed_ledger::ingest::scheduler::spawn_scheduler;
use feed_ledger::ingest::{offset_from_minutes, DEFAULT_UTC_OFFSET_MINUTES};
use feed_ledger::{Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "feed-ledger",
    about = "Collect new items from RSS/Atom feeds into a deduplicated news log"
)]
struct Cli {
    /// Feed addresses to use instead of the configured list
    #[arg(long, num_args = 1..)]
    feeds: Vec<String>,

    /// TOML (`feeds = [...]`) or JSON file with feed addresses
    #[arg(long)]
    feeds_file: Option<PathBuf>,

    /// Directory holding the seen-link file, the news log and daily snapshots
    #[arg(long, env = "FEED_LEDGER_DATA_DIR", default_value = "news_data")]
    data_dir: PathBuf,

    /// Seen-link file to use instead of <data-dir>/seen_links.json (non-.json = one link per line)
    #[arg(long, env = "FEED_LEDGER_SEEN_FILE")]
    seen_file: Option<PathBuf>,

    /// Per-feed fetch timeout in seconds
    #[arg(long, env = "FEED_LEDGER_TIMEOUT_SECS", default_value_t = 15)]
    timeout_secs: u64,

    /// Offset from UTC, in minutes, for published times and the snapshot day
    #[arg(
        long,
        env = "FEED_LEDGER_UTC_OFFSET_MINUTES",
        default_value_t = DEFAULT_UTC_OFFSET_MINUTES,
        allow_negative_numbers = true
    )]
    utc_offset_minutes: i32,

    /// Move a corrupt seen-link file aside and start empty instead of failing
    #[arg(long, env = "FEED_LEDGER_RECOVER_CORRUPT", default_value_t = false)]
    recover_corrupt_state: bool,

    /// Keep running, collecting every N seconds
    #[arg(long, env = "FEED_LEDGER_EVERY_SECS")]
    every_secs: Option<u64>,
}

/// Logs go to stderr. `RUST_LOG` overrides the default filter;
/// `FEED_LEDGER_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_ledger=info,warn"));
    let json = std::env::var("FEED_LEDGER_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let feeds = resolve_feeds(&cli.feeds, cli.feeds_file.as_deref())?;
    let offset = offset_from_minutes(cli.utc_offset_minutes)
        .ok_or_else(|| anyhow!("utc offset {} minutes is out of range", cli.utc_offset_minutes))?;

    let cfg = PipelineConfig::new(feeds, &cli.data_dir)
        .with_utc_offset(offset)
        .with_recover_corrupt_state(cli.recover_corrupt_state);
    let source = HttpFeedSource::new(Duration::from_secs(cli.timeout_secs))?;

    let mut pipeline = Pipeline::new(cfg, Box::new(source));
    if let Some(p) = &cli.seen_file {
        pipeline = pipeline.with_seen_store(p);
    }

    if let Some(secs) = cli.every_secs {
        anyhow::ensure!(secs > 0, "--every-secs must be positive");
        tracing::info!(
            every_secs = secs,
            feeds = pipeline.config().feeds.len(),
            "scheduler started"
        );
        let handle = spawn_scheduler(Arc::new(pipeline), Duration::from_secs(secs));
        tokio::select! {
            res = handle => res.context("scheduler task ended")?,
            _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, stopping"),
        }
        return Ok(());
    }

    let report = pipeline
        .run(chrono::Utc::now())
        .await
        .context("collector run failed")?;

    if report.accepted() > 0 {
        let snapshot = report
            .period
            .map(|d| pipeline.snapshot().path_for(d).display().to_string())
            .unwrap_or_default();
        println!("Saved {} new articles to {}", report.accepted(), snapshot);
    } else {
        println!("No new articles found in this run.");
    }
    if !report.feeds_failed.is_empty() {
        tracing::warn!(failed = ?report.feeds_failed, "some feeds were skipped");
    }
    Ok(())
}
