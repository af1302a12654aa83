#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use news_pipeline::normalize::{fold_title, story_id, title_shingles};
use news_pipeline::{Category, FeedTransport, FetchError, RawEntry, SourceDescriptor, Story};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

/// What a scripted URL answers with.
#[derive(Clone)]
pub enum Scripted {
    Body(String),
    Fail(FetchError),
    /// Never answers; only the caller's timeout or a stop ends it.
    Hang,
}

/// In-memory transport keyed by URL.
pub struct StaticTransport {
    responses: HashMap<String, Scripted>,
    calls: AtomicUsize,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, url: &str, response: Scripted) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedTransport for StaticTransport {
    fn transport_name(&self) -> String {
        "static".to_string()
    }

    async fn get(&self, url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(url) {
            Some(Scripted::Body(body)) => Ok(body.clone()),
            Some(Scripted::Fail(error)) => Err(error.clone()),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(FetchError::SourceUnreachable(format!("no route to {}", url))),
        }
    }
}

pub fn source(name: &str, weight: u32) -> SourceDescriptor {
    SourceDescriptor::new(
        name,
        &format!("https://{}.example.com/feed.xml", name.to_lowercase()),
        Category::Tech,
        weight,
    )
}

/// (title, link, pubDate, description)
pub type Item<'a> = (&'a str, &'a str, Option<DateTime<Utc>>, &'a str);

pub fn rss_feed(title: &str, items: &[Item<'_>]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n<channel>\n<title>{}</title>\n<link>https://example.com/</link>\n<description>test feed</description>\n",
        title
    );
    for (item_title, link, published, description) in items {
        xml.push_str("<item>\n");
        xml.push_str(&format!("<title>{}</title>\n", item_title));
        xml.push_str(&format!("<link>{}</link>\n", link));
        if let Some(published) = published {
            xml.push_str(&format!("<pubDate>{}</pubDate>\n", published.to_rfc2822()));
        }
        xml.push_str(&format!("<description><![CDATA[{}]]></description>\n", description));
        xml.push_str("</item>\n");
    }
    xml.push_str("</channel>\n</rss>\n");
    xml
}

pub fn atom_feed(title: &str, items: &[Item<'_>]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<feed xmlns=\"http://www.w3.org/2005/Atom\">\n<title>{}</title>\n<id>urn:test:{}</id>\n<updated>2024-01-01T00:00:00Z</updated>\n",
        title, title
    );
    for (index, (item_title, link, published, description)) in items.iter().enumerate() {
        xml.push_str("<entry>\n");
        xml.push_str(&format!("<title>{}</title>\n", item_title));
        xml.push_str(&format!("<id>urn:test:{}:{}</id>\n", title, index));
        xml.push_str(&format!("<link rel=\"self\" href=\"{}.json\"/>\n", link));
        xml.push_str(&format!("<link rel=\"alternate\" href=\"{}\"/>\n", link));
        if let Some(published) = published {
            xml.push_str(&format!("<published>{}</published>\n", published.to_rfc3339()));
            xml.push_str(&format!("<updated>{}</updated>\n", published.to_rfc3339()));
        }
        xml.push_str(&format!("<summary>{}</summary>\n", description));
        xml.push_str("</entry>\n");
    }
    xml.push_str("</feed>\n");
    xml
}

pub fn raw(source: &str, title: &str, link: &str, published_at: Option<DateTime<Utc>>) -> RawEntry {
    RawEntry {
        source_name: source.to_string(),
        title: title.to_string(),
        link: link.to_string(),
        published_at,
        summary: String::new(),
    }
}

/// A deduplicated story ready for analysis.
pub fn story(source: &SourceDescriptor, title: &str, summary: &str, order: usize) -> Story {
    let link = format!("https://news.example.com/{}", order);
    let mut story = Story::new(
        story_id(&fold_title(title), &link),
        title.to_string(),
        link,
        source,
        Utc::now(),
        false,
        summary.to_string(),
        title_shingles(title),
        order,
    );
    story.mark_deduplicated();
    story
}
