use crate::types::{FeedFormat, FetchError, ParsedFeed};
use async_trait::async_trait;

/// Trait for pulling raw feed bodies over some transport (HTTP, fixtures, etc.)
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Human-readable name for this transport
    fn transport_name(&self) -> String;

    /// Fetch the raw body behind a feed URL.
    /// Implementations classify failures into `FetchError` kinds; the caller
    /// applies the overall per-source timeout.
    async fn get(&self, url: &str) -> std::result::Result<String, FetchError>;
}

/// One parser per feed dialect. Selected by sniffing the document root.
pub trait FeedAdapter: Send + Sync {
    fn format(&self) -> FeedFormat;

    fn parse(&self, content: &str) -> std::result::Result<ParsedFeed, FetchError>;
}
