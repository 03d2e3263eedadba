// src/ingest/config.rs
use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "FEED_LEDGER_FEEDS_PATH";

/// Built-in feed table: (address, included by default).
pub const DEFAULT_FEEDS: &[(&str, bool)] = &[
    ("https://economictimes.indiatimes.com/rss/markets.cms", true),
    (
        "https://economictimes.indiatimes.com/markets/stocks/rssfeeds/2146843.cms",
        true,
    ),
    ("https://www.moneycontrol.com/rss/latestnews.xml", true),
    ("https://www.moneycontrol.com/rss/MCtopnews.xml", true),
    ("https://www.livemint.com/rss/markets", true),
    ("https://www.livemint.com/rss/companies", true),
    ("https://www.livemint.com/rss/money", true),
    ("https://www.business-standard.com/rss/markets-106.rss", true),
    ("https://www.cnbc.com/id/10000664/device/rss/rss.html", true),
];

pub fn default_feeds() -> Vec<String> {
    DEFAULT_FEEDS
        .iter()
        .filter(|(_, on)| *on)
        .map(|(addr, _)| addr.to_string())
        .collect()
}

/// Load a feed list from an explicit path. Supports TOML (`feeds = [...]`) or a JSON array.
pub fn load_feeds_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed list from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let feeds = parse_feeds(&content, ext.as_str())
        .with_context(|| format!("parsing feed list {}", path.display()))?;
    if feeds.is_empty() {
        bail!("feed list {} is empty", path.display());
    }
    Ok(feeds)
}

/// Files probed, in order, when neither the CLI nor `$FEED_LEDGER_FEEDS_PATH` names a list.
const CANDIDATES: &[&str] = &["config/feeds.toml", "config/feeds.json"];

/// `$FEED_LEDGER_FEEDS_PATH` (must exist), then the first existing [`CANDIDATES`] file,
/// then the built-in [`DEFAULT_FEEDS`].
pub fn load_feeds_default() -> Result<Vec<String>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let path = PathBuf::from(p);
        if !path.exists() {
            bail!("{ENV_PATH} points to non-existent path {}", path.display());
        }
        return load_feeds_from(&path);
    }
    match CANDIDATES.iter().map(Path::new).find(|p| p.exists()) {
        Some(path) => load_feeds_from(path),
        None => Ok(default_feeds()),
    }
}

/// Feeds given at invocation win; then an explicit file; then [`load_feeds_default`].
pub fn resolve_feeds(cli_feeds: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let from_cli = clean_list(cli_feeds.to_vec());
    if !from_cli.is_empty() {
        return Ok(from_cli);
    }
    match file {
        Some(p) => load_feeds_from(p),
        None => load_feeds_default(),
    }
}

/// The extension decides the format; an unknown one is tried as JSON, then TOML.
fn parse_feeds(s: &str, ext: &str) -> Result<Vec<String>> {
    match ext {
        "toml" => parse_toml(s),
        "json" => parse_json(s),
        _ => parse_json(s)
            .or_else(|_| parse_toml(s))
            .map_err(|_| anyhow!("unsupported feed list format")),
    }
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlFeeds {
        feeds: Vec<String>,
    }
    let v: TomlFeeds = toml::from_str(s)?;
    Ok(clean_list(v.feeds))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim, drop blanks and drop repeats. First occurrence keeps its position.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_string()) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_dedup_and_keep_order() {
        let toml =
            r#"feeds = [" https://b.test/rss ", "", "https://a.test/rss", "https://b.test/rss"]"#;
        assert_eq!(
            parse_toml(toml).unwrap(),
            vec!["https://b.test/rss".to_string(), "https://a.test/rss".to_string()]
        );
        let json = r#"["https://z.test/rss", "  https://a.test/rss  ", ""]"#;
        assert_eq!(
            parse_json(json).unwrap(),
            vec!["https://z.test/rss".to_string(), "https://a.test/rss".to_string()]
        );
    }

    #[test]
    fn unknown_format_is_an_error() {
        assert!(parse_feeds("feeds: - a", "yaml").is_err());
    }

    #[test]
    fn extension_picks_the_format() {
        let json = r#"["https://a.test/rss"]"#;
        let toml = r#"feeds = ["https://a.test/rss"]"#;
        assert!(parse_feeds(json, "json").is_ok());
        assert!(parse_feeds(json, "toml").is_err());
        assert!(parse_feeds(toml, "json").is_err());
        // no extension: either shape is accepted
        assert_eq!(parse_feeds(toml, "").unwrap(), parse_feeds(json, "").unwrap());
    }

    #[test]
    fn cli_feeds_win() {
        let cli = vec!["https://x.test/rss".to_string(), " ".to_string()];
        assert_eq!(
            resolve_feeds(&cli, None).unwrap(),
            vec!["https://x.test/rss".to_string()]
        );
    }

    #[test]
    fn default_table_is_all_included() {
        assert_eq!(default_feeds().len(), DEFAULT_FEEDS.len());
    }
}
