mod common;

use chrono::{Duration, Utc};
use common::{atom_feed, init_tracing, rss_feed};
use news_pipeline::parser::{normalize_encoding, sniff_format, FallbackAdapter};
use news_pipeline::{FeedAdapter, FeedFormat, FeedParser, FetchError};
use tracing::info;

#[test]
fn test_sniff_format() {
    init_tracing();

    assert_eq!(sniff_format("<?xml version=\"1.0\"?><rss version=\"2.0\"><channel/></rss>"), FeedFormat::Rss2);
    assert_eq!(
        sniff_format("\u{feff}  <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\"></rdf:RDF>"),
        FeedFormat::Rss2
    );
    assert_eq!(
        sniff_format("<?xml version=\"1.0\"?><feed xmlns=\"http://www.w3.org/2005/Atom\"></feed>"),
        FeedFormat::Atom
    );
    assert_eq!(sniff_format("<html><body>Not found</body></html>"), FeedFormat::Fallback);
}

#[test]
fn test_rss2_feed_parsing() {
    init_tracing();

    let published = Utc::now() - Duration::hours(2);
    let xml = rss_feed(
        "Tech Daily",
        &[
            ("First story", "https://example.com/1", Some(published), "<p>Hello <b>world</b></p>"),
            ("Second story", "https://example.com/2", None, "plain"),
        ],
    );

    let feed = FeedParser::new().parse_feed(&xml).expect("valid rss");
    info!("Parsed {} entries", feed.entries.len());

    assert_eq!(feed.format, FeedFormat::Rss2);
    assert_eq!(feed.title.as_deref(), Some("Tech Daily"));
    assert_eq!(feed.entries.len(), 2);
    assert_eq!(feed.entries[0].title, "First story");
    assert_eq!(feed.entries[0].url, "https://example.com/1");
    assert_eq!(
        feed.entries[0].published_at.map(|d| d.timestamp()),
        Some(published.timestamp())
    );
    assert!(feed.entries[0]
        .description
        .as_deref()
        .unwrap_or_default()
        .contains("Hello"));
    assert!(feed.entries[1].published_at.is_none());
}

#[test]
fn test_atom_feed_prefers_alternate_link() {
    init_tracing();

    let published = Utc::now() - Duration::hours(1);
    let xml = atom_feed(
        "Science Weekly",
        &[("Comet spotted", "https://science.example.com/comet", Some(published), "A bright comet")],
    );

    let feed = FeedParser::new().parse_feed(&xml).expect("valid atom");

    assert_eq!(feed.format, FeedFormat::Atom);
    assert_eq!(feed.entries.len(), 1);
    assert_eq!(feed.entries[0].title, "Comet spotted");
    assert_eq!(feed.entries[0].url, "https://science.example.com/comet");
    assert!(feed.entries[0].published_at.is_some());
}

#[test]
fn test_repeated_links_within_feed_are_dropped() {
    init_tracing();

    let xml = rss_feed(
        "Dupes",
        &[
            ("Story", "https://example.com/same", None, ""),
            ("Story again", "https://example.com/same", None, ""),
            ("Other", "https://example.com/other", None, ""),
        ],
    );

    let feed = FeedParser::new().parse_feed(&xml).expect("valid rss");
    assert_eq!(feed.entries.len(), 2);
}

#[test]
fn test_fallback_adapter_extracts_items_from_unknown_root() {
    init_tracing();

    let doc = r#"<export>
        <title>Loose export</title>
        <item>
            <title><![CDATA[Rocket lands safely]]></title>
            <link>https://space.example.com/rocket</link>
            <pubDate>Tue, 10 Jun 2025 09:00:00 +0000</pubDate>
            <description>Booster recovered &amp; reused</description>
        </item>
        <item>
            <title>Second</title>
            <link href="https://space.example.com/second"/>
        </item>
    </export>"#;

    let feed = FeedParser::new().parse_feed(doc).expect("fallback parse");

    assert_eq!(feed.format, FeedFormat::Fallback);
    assert_eq!(feed.title.as_deref(), Some("Loose export"));
    assert_eq!(feed.entries.len(), 2);
    assert_eq!(feed.entries[0].title, "Rocket lands safely");
    assert_eq!(feed.entries[0].url, "https://space.example.com/rocket");
    assert!(feed.entries[0].published_at.is_some());
    assert_eq!(feed.entries[1].url, "https://space.example.com/second");
}

#[test]
fn test_truncated_rss_still_yields_items() {
    init_tracing();

    // Cut off mid-document; either the structured parser or the fallback must recover the item
    let doc = "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Cut</title>\
               <item><title>Survivor</title><link>https://example.com/survivor</link></item>\
               <item><title>Half";

    let feed = FeedParser::new().parse_feed(doc).expect("recovered feed");
    assert!(feed.entries.iter().any(|e| e.title == "Survivor"));
}

#[test]
fn test_non_feed_documents_are_parse_errors() {
    init_tracing();

    let parser = FeedParser::new();
    for doc in ["", "   ", "<html><body>Service unavailable</body></html>", "not xml at all"] {
        match parser.parse_feed(doc) {
            Err(FetchError::FeedParseError(reason)) => info!("Rejected as expected: {}", reason),
            other => panic!("expected FeedParseError for {:?}, got {:?}", doc, other.map(|f| f.entries.len())),
        }
    }

    assert!(FallbackAdapter.parse("<html></html>").is_err());
    assert!(!FeedParser::is_valid_feed_content("<html></html>"));
    assert!(FeedParser::is_valid_feed_content("<rss version=\"2.0\"></rss>"));
}

#[test]
fn test_normalize_encoding() {
    assert_eq!(normalize_encoding("\u{feff}Title\r\nwith\u{0007}bell"), "Title\nwithbell");
    assert_eq!(normalize_encoding("bad\u{fffd}byte"), "bad byte");
    assert_eq!(normalize_encoding("  padded  "), "padded");
}
