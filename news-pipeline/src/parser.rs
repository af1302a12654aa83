use crate::traits::FeedAdapter;
use crate::types::{FeedFormat, FetchError, ParsedEntry, ParsedFeed};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// How far into the document we look when sniffing the root element.
const SNIFF_WINDOW: usize = 4096;

/// Picks the adapter for a feed body and falls back to tolerant extraction
/// when the structured parse fails.
pub struct FeedParser {
    rss2: Rss2Adapter,
    atom: AtomAdapter,
    fallback: FallbackAdapter,
}

impl FeedParser {
    pub fn new() -> Self {
        Self {
            rss2: Rss2Adapter,
            atom: AtomAdapter,
            fallback: FallbackAdapter,
        }
    }

    fn adapter_for(&self, format: FeedFormat) -> &dyn FeedAdapter {
        match format {
            FeedFormat::Rss2 => &self.rss2,
            FeedFormat::Atom => &self.atom,
            FeedFormat::Fallback => &self.fallback,
        }
    }

    pub fn parse_feed(&self, content: &str) -> Result<ParsedFeed, FetchError> {
        let content = normalize_encoding(content);
        if content.is_empty() {
            return Err(FetchError::FeedParseError("empty feed body".to_string()));
        }

        let adapter = self.adapter_for(sniff_format(&content));
        let format = adapter.format();
        debug!("Parsing feed content ({} bytes) as {:?}", content.len(), format);

        let parsed = match adapter.parse(&content) {
            Ok(feed) => feed,
            Err(e) if format != FeedFormat::Fallback => {
                warn!("Structured {:?} parse failed ({}), trying fallback extraction", format, e);
                match self.fallback.parse(&content) {
                    Ok(feed) => feed,
                    Err(_) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        let parsed = drop_repeated_links(parsed);
        info!("Parsed {:?} feed with {} entries", parsed.format, parsed.entries.len());
        Ok(parsed)
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let head = sniff_head(content);
        head.contains("<rss")
            || head.contains("<feed")
            || head.contains("<rdf:rdf")
            || head.contains("<channel")
    }
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}

fn sniff_head(content: &str) -> String {
    content
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(SNIFF_WINDOW)
        .collect::<String>()
        .to_lowercase()
}

/// Root-element sniffing. RDF (RSS 1.0) goes through the RSS adapter.
pub fn sniff_format(content: &str) -> FeedFormat {
    let head = sniff_head(content);
    let rss = ["<rss", "<rdf:rdf"].iter().filter_map(|tag| head.find(tag)).min();
    let atom = head.find("<feed");

    match (rss, atom) {
        (Some(r), Some(a)) if a < r => FeedFormat::Atom,
        (Some(_), _) => FeedFormat::Rss2,
        (None, Some(_)) => FeedFormat::Atom,
        (None, None) => FeedFormat::Fallback,
    }
}

/// Strip BOM and control characters, normalize line endings and replace
/// undecodable sequences with a space.
pub fn normalize_encoding(content: &str) -> String {
    content
        .trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .map(|c| if c == '\u{fffd}' { ' ' } else { c })
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

/// A feed can list the same item twice; keep the first occurrence of a link.
fn drop_repeated_links(mut feed: ParsedFeed) -> ParsedFeed {
    let mut seen_urls = HashSet::new();
    let before = feed.entries.len();
    feed.entries.retain(|entry| entry.url.is_empty() || seen_urls.insert(entry.url.clone()));
    let removed = before - feed.entries.len();
    if removed > 0 {
        debug!("Removed {} repeated entries within one feed", removed);
    }
    feed
}

fn parse_with_feed_rs(content: &str, format: FeedFormat) -> Result<ParsedFeed, FetchError> {
    let feed = parser::parse(content.as_bytes())
        .map_err(|e| FetchError::FeedParseError(format!("Failed to parse feed: {}", e)))?;

    let title = feed.title.map(|t| t.content);
    let entries = feed
        .entries
        .into_iter()
        .map(|entry| convert_entry(entry, format))
        .collect();

    Ok(ParsedFeed {
        format,
        title,
        entries,
    })
}

fn convert_entry(entry: feed_rs::model::Entry, format: FeedFormat) -> ParsedEntry {
    let title = entry.title.map(|t| t.content).unwrap_or_default();

    // Atom marks the article link as rel="alternate"; RSS has a single <link>
    let url = match format {
        FeedFormat::Atom => entry
            .links
            .iter()
            .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.clone()),
        _ => entry.links.first().map(|l| l.href.clone()),
    }
    .unwrap_or_default();

    let description = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body));

    ParsedEntry {
        title,
        url,
        description,
        published_at: entry.published.map(|dt| dt.with_timezone(&Utc)),
        updated_at: entry.updated.map(|dt| dt.with_timezone(&Utc)),
    }
}

/// RSS 2.0 (and RDF) documents.
pub struct Rss2Adapter;

impl FeedAdapter for Rss2Adapter {
    fn format(&self) -> FeedFormat {
        FeedFormat::Rss2
    }

    fn parse(&self, content: &str) -> Result<ParsedFeed, FetchError> {
        parse_with_feed_rs(content, FeedFormat::Rss2)
    }
}

/// Atom 1.0 documents.
pub struct AtomAdapter;

impl FeedAdapter for AtomAdapter {
    fn format(&self) -> FeedFormat {
        FeedFormat::Atom
    }

    fn parse(&self, content: &str) -> Result<ParsedFeed, FetchError> {
        parse_with_feed_rs(content, FeedFormat::Atom)
    }
}

static ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(?:item|entry)\b[^>]*>(.*?)</(?:item|entry)>").unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").unwrap());
static LINK_TEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<link\b[^>]*>(.*?)</link>").unwrap());
static LINK_HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<link\b[^>]*?href\s*=\s*["']([^"']+)["']"#).unwrap());
static DESCRIPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<description\b[^>]*>(.*?)</description>").unwrap());
static SUMMARY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<summary\b[^>]*>(.*?)</summary>").unwrap());
static CONTENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<content\b[^>]*>(.*?)</content>").unwrap());
static PUB_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<pubDate\b[^>]*>(.*?)</pubDate>").unwrap());
static PUBLISHED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(?:published|dc:date)\b[^>]*>(.*?)</(?:published|dc:date)>").unwrap());
static UPDATED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<updated\b[^>]*>(.*?)</updated>").unwrap());
static CDATA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());

/// Tolerant extraction for documents the structured parsers reject:
/// unknown roots, unescaped ampersands, truncated bodies.
pub struct FallbackAdapter;

impl FallbackAdapter {
    fn capture(re: &Regex, block: &str) -> Option<String> {
        re.captures(block)
            .and_then(|c| c.get(1))
            .map(|m| unwrap_cdata(m.as_str()))
            .filter(|s| !s.is_empty())
    }
}

fn unwrap_cdata(raw: &str) -> String {
    CDATA_RE.replace_all(raw, "$1").trim().to_string()
}

fn parse_loose_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl FeedAdapter for FallbackAdapter {
    fn format(&self) -> FeedFormat {
        FeedFormat::Fallback
    }

    fn parse(&self, content: &str) -> Result<ParsedFeed, FetchError> {
        let mut entries = Vec::new();

        for item in ITEM_RE.captures_iter(content) {
            let block = match item.get(1) {
                Some(m) => m.as_str(),
                None => continue,
            };
            let title = match Self::capture(&TITLE_RE, block) {
                Some(title) => title,
                None => continue,
            };
            let url = Self::capture(&LINK_TEXT_RE, block)
                .or_else(|| Self::capture(&LINK_HREF_RE, block))
                .unwrap_or_default();
            let description = Self::capture(&DESCRIPTION_RE, block)
                .or_else(|| Self::capture(&SUMMARY_RE, block))
                .or_else(|| Self::capture(&CONTENT_RE, block));
            let published_at = Self::capture(&PUB_DATE_RE, block)
                .or_else(|| Self::capture(&PUBLISHED_RE, block))
                .and_then(|d| parse_loose_date(&d));
            let updated_at = Self::capture(&UPDATED_RE, block).and_then(|d| parse_loose_date(&d));

            entries.push(ParsedEntry {
                title,
                url,
                description,
                published_at,
                updated_at,
            });
        }

        if entries.is_empty() {
            return Err(FetchError::FeedParseError(
                "no feed items found in document".to_string(),
            ));
        }

        // The channel title sits before the first item
        let head = content.split("<item").next().unwrap_or(content);
        let head = head.split("<entry").next().unwrap_or(head);
        let title = Self::capture(&TITLE_RE, head);

        Ok(ParsedFeed {
            format: FeedFormat::Fallback,
            title,
            entries,
        })
    }
}
