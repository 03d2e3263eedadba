// tests/ingest_pipeline.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use feed_ledger::ingest::providers::fixture::FixtureFeedSource;
use feed_ledger::ingest::types::PublishedParts;
use feed_ledger::{
    FeedError, FeedSource, IngestError, Pipeline, PipelineConfig, RawEntry, SeenSetStore,
};
use std::fs;
use std::path::Path;

const MARKETS: &str = "https://markets.example.test/rss";
const COMPANIES: &str = "https://companies.example.test/atom";
const MISSING: &str = "https://down.example.test/rss";
const BROKEN: &str = "https://broken.example.test/rss";

const MARKETS_XML: &str = include_str!("fixtures/markets_rss.xml");
const COMPANIES_XML: &str = include_str!("fixtures/companies_atom.xml");
const BROKEN_XML: &str = include_str!("fixtures/broken.xml");

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn fixtures() -> FixtureFeedSource {
    FixtureFeedSource::new()
        .with_feed(MARKETS, MARKETS_XML)
        .with_feed(COMPANIES, COMPANIES_XML)
        .with_feed(BROKEN, BROKEN_XML)
}

fn pipeline(dir: &Path, feeds: &[&str]) -> Pipeline {
    let cfg = PipelineConfig::new(feeds.iter().map(|s| s.to_string()).collect(), dir);
    Pipeline::new(cfg, Box::new(fixtures()))
}

fn links(p: &Pipeline) -> Vec<String> {
    p.append_log()
        .read_all()
        .unwrap()
        .into_iter()
        .map(|e| e.identifier)
        .collect()
}

#[tokio::test]
async fn first_run_accepts_entries_in_feed_order() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), &[MARKETS, COMPANIES]);

    let report = p.run(now()).await.unwrap();
    let got: Vec<&str> = report.batch.iter().map(|e| e.identifier.as_str()).collect();
    assert_eq!(
        got,
        vec![
            "https://markets.example.test/news/sensex-ends-higher",
            "https://markets.example.test/news/rupee-steady",
            "https://markets.example.test/news/gold-slips",
            "https://companies.example.test/news/infosys-wins-deal",
        ]
    );
    assert_eq!(report.empty_links, 1);
    // the syndicated copy in the atom feed shares a link with the rss item
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.period, NaiveDate::from_ymd_opt(2024, 3, 1));

    // both sinks and the seen-link file see the same batch
    assert_eq!(links(&p), got);
    let day = report.period.unwrap();
    assert_eq!(p.snapshot().read(day).unwrap(), report.batch);
    let seen = p.seen_store().load().unwrap();
    assert_eq!(seen.len(), 4);
}

#[tokio::test]
async fn second_run_with_unchanged_feeds_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), &[MARKETS, COMPANIES]);

    let first = p.run(now()).await.unwrap();
    assert_eq!(first.accepted(), 4);
    let seen_path = dir.path().join("seen_links.json");
    let seen_before = fs::read(&seen_path).unwrap();
    let log_before = fs::read(p.append_log().path()).unwrap();

    let second = p.run(now() + chrono::Duration::hours(1)).await.unwrap();
    assert_eq!(second.accepted(), 0);
    assert_eq!(second.duplicates, 5);
    assert_eq!(second.period, None);
    assert_eq!(fs::read(&seen_path).unwrap(), seen_before);
    assert_eq!(fs::read(p.append_log().path()).unwrap(), log_before);
}

#[tokio::test]
async fn same_link_in_two_feeds_is_accepted_once() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), &[COMPANIES, MARKETS]);

    let report = p.run(now()).await.unwrap();
    let sensex: Vec<_> = report
        .batch
        .iter()
        .filter(|e| e.identifier == "https://markets.example.test/news/sensex-ends-higher")
        .collect();
    assert_eq!(sensex.len(), 1);
    // first feed wins
    assert_eq!(sensex[0].source_feed, COMPANIES);
    assert_eq!(sensex[0].summary, "Same story, different feed.");
}

#[tokio::test]
async fn failing_feed_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), &[MARKETS, MISSING, COMPANIES]);

    let report = p.run(now()).await.unwrap();
    assert_eq!(report.feeds_failed, vec![MISSING.to_string()]);
    assert_eq!(report.feeds_ok, 2);
    assert!(report.batch.iter().any(|e| e.source_feed == MARKETS));
    assert!(report.batch.iter().any(|e| e.source_feed == COMPANIES));
}

#[tokio::test]
async fn malformed_feed_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), &[BROKEN, MARKETS]);

    let report = p.run(now()).await.unwrap();
    assert_eq!(report.feeds_failed, vec![BROKEN.to_string()]);
    assert_eq!(report.accepted(), 3);
}

#[tokio::test]
async fn empty_links_never_reach_sinks_or_seen_set() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), &[MARKETS]);

    p.run(now()).await.unwrap();
    assert!(links(&p).iter().all(|l| !l.trim().is_empty()));
    let seen = p.seen_store().load().unwrap();
    assert!(seen.iter().all(|l| !l.trim().is_empty()));
    assert!(!seen.contains(""));
}

#[tokio::test]
async fn missing_or_unparseable_time_falls_back_to_now() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), &[MARKETS]);
    let report = p.run(now()).await.unwrap();

    let by_link = |l: &str| {
        report
            .batch
            .iter()
            .find(|e| e.identifier == l)
            .cloned()
            .unwrap()
    };

    let rupee = by_link("https://markets.example.test/news/rupee-steady");
    assert_eq!(rupee.published_at.to_rfc3339(), "2024-03-01T17:30:00+05:30");
    let gold = by_link("https://markets.example.test/news/gold-slips");
    assert_eq!(gold.published_at, rupee.published_at);

    let sensex = by_link("https://markets.example.test/news/sensex-ends-higher");
    assert_eq!(sensex.published_at.to_rfc3339(), "2024-03-01T15:45:30+05:30");
    assert_eq!(sensex.title, "Sensex ends higher as banks rally");
}

#[tokio::test]
async fn summary_falls_back_to_alternate_field() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), &[MARKETS, COMPANIES]);
    let report = p.run(now()).await.unwrap();

    let rupee = &report.batch[1];
    assert_eq!(rupee.summary, "Forex traders stay cautious.");
    // atom: summary preferred over content
    let infosys = &report.batch[3];
    assert_eq!(infosys.summary, "IT major signs multi-year contract.");
    assert_eq!(infosys.published_at.to_rfc3339(), "2024-03-01T12:00:00+05:30");
}

#[tokio::test]
async fn later_run_same_day_extends_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    let p1 = pipeline(dir.path(), &[MARKETS]);
    p1.run(now()).await.unwrap();
    let p2 = pipeline(dir.path(), &[MARKETS, COMPANIES]);
    let r2 = p2.run(now() + chrono::Duration::hours(2)).await.unwrap();
    assert_eq!(r2.accepted(), 1);

    assert_eq!(p2.snapshot().read(day).unwrap().len(), 4);
    assert_eq!(links(&p2).len(), 4);
}

#[tokio::test]
async fn snapshot_day_follows_configured_offset() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), &[MARKETS]);
    // 20:00 UTC is already the next day at +05:30
    let late = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
    let report = p.run(late).await.unwrap();
    assert_eq!(report.period, NaiveDate::from_ymd_opt(2024, 3, 2));
    assert!(dir.path().join("news_2024-03-02.json").exists());
}

#[tokio::test]
async fn corrupt_seen_state_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("seen_links.json"), "not json").unwrap();
    let p = pipeline(dir.path(), &[MARKETS]);

    let err = p.run(now()).await.unwrap_err();
    assert!(matches!(err, IngestError::CorruptState { .. }));
    assert!(!p.append_log().path().exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("seen_links.json")).unwrap(),
        "not json"
    );
}

#[tokio::test]
async fn corrupt_seen_state_can_be_recovered() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("seen_links.json"), "not json").unwrap();
    let cfg = PipelineConfig::new(vec![MARKETS.to_string()], dir.path())
        .with_recover_corrupt_state(true);
    let p = Pipeline::new(cfg, Box::new(fixtures()));

    let report = p.run(now()).await.unwrap();
    assert_eq!(report.accepted(), 3);
    assert_eq!(p.seen_store().load().unwrap().len(), 3);
}

#[tokio::test]
async fn legacy_line_seen_file_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = dir.path().join("seen_links.txt");
    fs::write(
        &legacy,
        concat!(
            "https://markets.example.test/news/sensex-ends-higher\n",
            "https://markets.example.test/news/gold-slips\n",
        ),
    )
    .unwrap();
    let p = pipeline(dir.path(), &[MARKETS]).with_seen_store(&legacy);

    let report = p.run(now()).await.unwrap();
    assert_eq!(report.accepted(), 1);
    let lines = fs::read_to_string(&legacy).unwrap();
    assert_eq!(lines.lines().count(), 3);
}

#[tokio::test]
async fn concurrent_run_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let _held = feed_ledger::lock::RunLock::acquire(dir.path()).unwrap();
    let p = pipeline(dir.path(), &[MARKETS]);
    assert!(matches!(
        p.run(now()).await.unwrap_err(),
        IngestError::Locked { .. }
    ));
}

struct BadTimeSource;

#[async_trait]
impl FeedSource for BadTimeSource {
    async fn fetch(&self, _address: &str) -> Result<Vec<RawEntry>, FeedError> {
        Ok(vec![
            RawEntry {
                link: Some("https://x.test/bad-time".into()),
                published: Some(PublishedParts {
                    year: 2024,
                    month: 2,
                    day: 30,
                    hour: 0,
                    minute: 0,
                    second: 0,
                }),
                ..Default::default()
            },
            RawEntry {
                link: Some("https://x.test/ok".into()),
                title: Some("ok".into()),
                ..Default::default()
            },
        ])
    }

    fn name(&self) -> &'static str {
        "bad-time"
    }
}

#[tokio::test]
async fn entry_that_fails_normalization_is_skipped_and_not_marked_seen() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig::new(vec!["https://x.test/rss".into()], dir.path());
    let p = Pipeline::new(cfg, Box::new(BadTimeSource));

    let report = p.run(now()).await.unwrap();
    assert_eq!(report.entry_errors, 1);
    assert_eq!(report.accepted(), 1);
    assert_eq!(report.batch[0].identifier, "https://x.test/ok");

    let seen = SeenSetStore::open(dir.path().join("seen_links.json"))
        .load()
        .unwrap();
    assert!(!seen.contains("https://x.test/bad-time"));
}

#[tokio::test]
async fn run_with_nothing_new_creates_no_state() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(dir.path(), &[MISSING]);

    let report = p.run(now()).await.unwrap();
    assert_eq!(report.accepted(), 0);
    assert!(!dir.path().join("seen_links.json").exists());
    assert!(!p.append_log().path().exists());
    // lock is released
    assert!(!dir.path().join(".run.lock").exists());
}

#[tokio::test]
async fn unreadable_snapshot_fails_the_run_before_the_log_is_touched() {
    let dir = tempfile::tempdir().unwrap();
    let snap_path = dir.path().join("news_2024-03-01.json");
    fs::write(&snap_path, "[{broken").unwrap();
    let p = pipeline(dir.path(), &[MARKETS]);

    for _ in 0..2 {
        let err = p.run(now()).await.unwrap_err();
        assert!(matches!(err, IngestError::SinkWrite { .. }));
    }
    assert!(!p.append_log().path().exists());
    assert!(!dir.path().join("seen_links.json").exists());
    assert_eq!(fs::read_to_string(&snap_path).unwrap(), "[{broken");

    // once the snapshot is repaired the same entries go through exactly once
    fs::write(&snap_path, "[]").unwrap();
    let report = p.run(now()).await.unwrap();
    assert_eq!(report.accepted(), 3);
    assert_eq!(links(&p).len(), 3);
}
