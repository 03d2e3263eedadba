// src/ingest/providers/feed_xml.rs
//! RSS 2.0, RSS 1.0 (RDF) and Atom documents into [`RawEntry`] lists.
//!
//! Elements are matched on their qualified name as written, so extension elements such as
//! `<atom:link>`, `<media:description>` or `<dc:creator>` never shadow the core fields.

use anyhow::{anyhow, bail, Context, Result};
use metrics::histogram;
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, UtcOffset};

use crate::ingest::types::{PublishedParts, RawEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    /// `<rss>` and `<rdf:RDF>`: entries are `<item>`.
    Rss,
    /// `<feed>`: entries are `<entry>`.
    Atom,
}

impl Dialect {
    fn of_root(local_name: &[u8]) -> Result<Self> {
        match local_name {
            b"rss" | b"RDF" => Ok(Self::Rss),
            b"feed" => Ok(Self::Atom),
            other => Err(anyhow!(
                "unsupported feed root element <{}>",
                String::from_utf8_lossy(other)
            )),
        }
    }

    fn entry_tag(self) -> &'static [u8] {
        match self {
            Self::Rss => b"item",
            Self::Atom => b"entry",
        }
    }

    fn slot_for(self, qname: &[u8]) -> Option<Slot> {
        match (self, qname) {
            (Self::Rss, b"link") => Some(Slot::Link),
            (Self::Rss, b"pubDate") => Some(Slot::Published),
            (Self::Rss, b"dc:date") => Some(Slot::Updated),
            (Self::Rss, b"description") => Some(Slot::Description),
            (Self::Atom, b"id") => Some(Slot::Id),
            (Self::Atom, b"published") => Some(Slot::Published),
            (Self::Atom, b"updated") => Some(Slot::Updated),
            (Self::Atom, b"content") => Some(Slot::Description),
            (_, b"title") => Some(Slot::Title),
            (_, b"summary") => Some(Slot::Summary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Link,
    Id,
    Title,
    Published,
    Updated,
    Summary,
    Description,
}

/// Child element whose text is being collected.
struct OpenField {
    slot: Slot,
    level: usize,
    text: String,
}

/// Fields of one item/entry. The first occurrence of each field wins.
#[derive(Debug, Default)]
struct Draft {
    link: Option<String>,
    id: Option<String>,
    title: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<String>,
    description: Option<String>,
}

impl Draft {
    fn fill(&mut self, slot: Slot, value: String) {
        let target = match slot {
            Slot::Link => &mut self.link,
            Slot::Id => &mut self.id,
            Slot::Title => &mut self.title,
            Slot::Published => &mut self.published,
            Slot::Updated => &mut self.updated,
            Slot::Summary => &mut self.summary,
            Slot::Description => &mut self.description,
        };
        if target.is_none() {
            *target = Some(value);
        }
    }

    /// Atom `<link>`: the first one with `rel="alternate"` or no rel.
    fn take_atom_link(&mut self, e: &BytesStart) {
        if self.link.is_some() {
            return;
        }
        let mut href = None;
        let mut alternate = true;
        for attr in e.attributes().flatten() {
            match attr.key.as_ref() {
                b"href" => href = Some(decode_text(&attr.value)),
                b"rel" => alternate = decode_text(&attr.value) == "alternate",
                _ => {}
            }
        }
        if alternate {
            self.link = href.filter(|h| !h.is_empty());
        }
    }

    fn into_raw(self) -> RawEntry {
        let link = self.link.or_else(|| {
            self.id
                .filter(|id| id.starts_with("http://") || id.starts_with("https://"))
        });
        let published = self
            .published
            .as_deref()
            .and_then(parse_published)
            .or_else(|| self.updated.as_deref().and_then(parse_published));
        RawEntry {
            link,
            title: self.title,
            published,
            summary: self.summary,
            description: self.description,
        }
    }
}

/// Parse an RSS/Atom timestamp and decompose it in UTC. Unparseable input yields `None`.
pub fn parse_published(ts: &str) -> Option<PublishedParts> {
    let ts = ts.trim();
    let dt = OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()?
        .to_offset(UtcOffset::UTC);
    Some(PublishedParts {
        year: dt.year(),
        month: u8::from(dt.month()) as u32,
        day: dt.day() as u32,
        hour: dt.hour() as u32,
        minute: dt.minute() as u32,
        second: dt.second() as u32,
    })
}

/// Parse a feed document. The root element picks the dialect.
///
/// Only broken XML or an unknown root fails the document; odd or missing fields inside
/// one entry just leave that entry's fields empty.
pub fn parse_feed(xml: &str) -> Result<Vec<RawEntry>> {
    let t0 = std::time::Instant::now();
    let out = read_entries(xml)?;
    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    Ok(out)
}

fn read_entries(xml: &str) -> Result<Vec<RawEntry>> {
    let mut reader = Reader::from_str(xml);
    let mut dialect: Option<Dialect> = None;
    let mut depth = 0usize;
    let mut entry: Option<(usize, Draft)> = None;
    let mut field: Option<OpenField> = None;
    let mut out = Vec::new();

    loop {
        let pos = reader.buffer_position();
        let ev = reader
            .read_event()
            .with_context(|| format!("parsing feed xml near byte {pos}"))?;
        match ev {
            Event::Start(e) => {
                depth += 1;
                let Some(d) = dialect else {
                    dialect = Some(Dialect::of_root(e.local_name().as_ref())?);
                    continue;
                };
                match entry.as_mut() {
                    None => {
                        if e.name().as_ref() == d.entry_tag() {
                            entry = Some((depth, Draft::default()));
                        }
                    }
                    Some((at, draft)) if depth == *at + 1 && field.is_none() => {
                        let qname = e.name();
                        if d == Dialect::Atom && qname.as_ref() == b"link" {
                            draft.take_atom_link(&e);
                        } else if let Some(slot) = d.slot_for(qname.as_ref()) {
                            field = Some(OpenField {
                                slot,
                                level: depth,
                                text: String::new(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let Some(d) = dialect else {
                    Dialect::of_root(e.local_name().as_ref())?;
                    return Ok(out);
                };
                match entry.as_mut() {
                    None if e.name().as_ref() == d.entry_tag() => {
                        out.push(Draft::default().into_raw());
                    }
                    Some((at, draft)) if depth == *at && d == Dialect::Atom => {
                        if e.name().as_ref() == b"link" {
                            draft.take_atom_link(&e);
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(f) = &mut field {
                    f.text.push_str(&decode_text(&t));
                }
            }
            Event::CData(c) => {
                if let Some(f) = &mut field {
                    f.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                if field.as_ref().is_some_and(|f| f.level == depth) {
                    if let (Some(f), Some((_, draft))) = (field.take(), &mut entry) {
                        draft.fill(f.slot, f.text.replace('\u{a0}', " ").trim().to_string());
                    }
                }
                if entry.as_ref().is_some_and(|(at, _)| *at == depth) {
                    if let Some((_, draft)) = entry.take() {
                        out.push(draft.into_raw());
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => {
                if dialect.is_none() {
                    bail!("document has no root element");
                }
                if depth != 0 {
                    bail!("document ends inside an open element");
                }
                return Ok(out);
            }
            _ => {}
        }
    }
}

/// Text or attribute bytes with XML and HTML named entities resolved.
/// A reference that cannot be resolved leaves the text as written.
fn decode_text(raw: &[u8]) -> String {
    let raw = String::from_utf8_lossy(raw);
    match unescape_with(&raw, resolve_html5_entity) {
        Ok(s) => s.into_owned(),
        Err(_) => raw.to_string(),
    }
}
