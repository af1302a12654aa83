use crate::parser::{normalize_encoding, FeedParser};
use crate::signal::StopSignal;
use crate::traits::FeedTransport;
use crate::types::{FetchConfig, FetchError, RawEntry, Result, SourceDescriptor, SourceFailure};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// HTTP feed transport with per-host request spacing.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Claim the next request slot for the URL's host and wait for it.
    /// The lock is only held while reserving, so other hosts are not blocked.
    async fn apply_rate_limit(&self, url: &str) -> std::result::Result<(), FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::SourceUnreachable(format!("invalid url: {}", e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| FetchError::SourceUnreachable("url has no host".to_string()))?
            .to_string();

        let min_interval = Duration::from_millis(self.config.per_host_interval_ms);
        let slot = {
            let mut rate_limiter = self.rate_limiter.write().await;
            let now = Instant::now();
            let slot = match rate_limiter.get(&host) {
                Some(next_free) if *next_free > now => *next_free,
                _ => now,
            };
            rate_limiter.insert(host.clone(), slot + min_interval);
            slot
        };

        if slot > Instant::now() {
            debug!("Rate limiting {}: waiting {:?}", host, slot - Instant::now());
            tokio::time::sleep_until(slot).await;
        }
        Ok(())
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::SourceTimeout {
                seconds: self.config.timeout_seconds,
            }
        } else {
            FetchError::SourceUnreachable(e.to_string())
        }
    }
}

#[async_trait]
impl FeedTransport for Fetcher {
    fn transport_name(&self) -> String {
        "http".to_string()
    }

    async fn get(&self, url: &str) -> std::result::Result<String, FetchError> {
        self.apply_rate_limit(url).await?;

        debug!("Fetching feed: {}", url);
        let response = self.client.get(url).send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::SourceUnreachable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let max_bytes = self.config.max_feed_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > max_bytes {
                return Err(FetchError::SourceUnreachable(format!(
                    "Feed too large: {}MB",
                    content_length as usize / (1024 * 1024)
                )));
            }
        }

        let content = response.text().await.map_err(|e| self.classify(e))?;
        if content.len() > max_bytes {
            return Err(FetchError::SourceUnreachable(format!(
                "Feed too large: {}MB",
                content.len() / (1024 * 1024)
            )));
        }

        info!("Successfully fetched feed: {} ({} bytes)", url, content.len());
        Ok(content)
    }
}

/// Fetch one source and turn it into raw entries: timeout, parse, recency
/// window, per-source cap, encoding cleanup.
pub async fn fetch_source<T: FeedTransport + ?Sized>(
    transport: &T,
    source: &SourceDescriptor,
    config: &FetchConfig,
    now: DateTime<Utc>,
) -> std::result::Result<Vec<RawEntry>, SourceFailure> {
    let fail = |error: FetchError| SourceFailure {
        source_name: source.name.clone(),
        error,
    };

    let timeout = Duration::from_secs(config.timeout_seconds);
    let body = match tokio::time::timeout(timeout, transport.get(&source.url)).await {
        Ok(result) => result.map_err(fail)?,
        Err(_) => {
            return Err(fail(FetchError::SourceTimeout {
                seconds: config.timeout_seconds,
            }))
        }
    };

    let feed = FeedParser::new().parse_feed(&body).map_err(fail)?;
    let cutoff = now - ChronoDuration::hours(config.recency_window_hours);

    let total = feed.entries.len();
    let entries: Vec<RawEntry> = feed
        .entries
        .into_iter()
        .filter(|entry| {
            // Undated entries are kept; the normalizer stamps them with fetch time
            match entry.published_at.or(entry.updated_at) {
                Some(ts) => ts >= cutoff,
                None => true,
            }
        })
        .take(config.max_entries_per_source)
        .map(|entry| RawEntry {
            source_name: source.name.clone(),
            title: normalize_encoding(&entry.title),
            link: entry.url.trim().to_string(),
            published_at: entry.published_at.or(entry.updated_at),
            summary: normalize_encoding(entry.description.as_deref().unwrap_or_default()),
        })
        .collect();

    debug!(
        "{}: kept {} of {} entries (window {}h, cap {})",
        source.name,
        entries.len(),
        total,
        config.recency_window_hours,
        config.max_entries_per_source
    );
    Ok(entries)
}

/// Everything the fetch stage produced, in source-list order.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub entries: Vec<RawEntry>,
    pub attempted: usize,
    pub succeeded: Vec<String>,
    pub failures: Vec<SourceFailure>,
}

impl FetchOutcome {
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.succeeded.is_empty()
    }
}

/// Fetch every source with bounded concurrency. A stop request makes
/// in-flight and not-yet-started sources report `Cancelled`; entries from
/// sources that already finished are kept.
pub async fn fetch_all<T: FeedTransport + ?Sized>(
    transport: &T,
    sources: &[SourceDescriptor],
    config: &FetchConfig,
    stop: &StopSignal,
) -> FetchOutcome {
    let now = Utc::now();
    let limit = config.max_concurrent_fetches.max(1);
    info!(
        "Fetching {} feeds over {} (concurrency {})",
        sources.len(),
        transport.transport_name(),
        limit
    );

    let mut results: Vec<(usize, std::result::Result<Vec<RawEntry>, SourceFailure>)> =
        stream::iter(sources.iter().enumerate())
            .map(|(index, source)| async move {
                let result = tokio::select! {
                    biased;
                    _ = stop.cancelled() => Err(SourceFailure {
                        source_name: source.name.clone(),
                        error: FetchError::Cancelled,
                    }),
                    result = fetch_source(transport, source, config, now) => result,
                };
                (index, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;

    results.sort_by_key(|(index, _)| *index);

    let mut outcome = FetchOutcome {
        attempted: sources.len(),
        ..Default::default()
    };
    for (index, result) in results {
        match result {
            Ok(entries) => {
                info!("Fetched {} entries from {}", entries.len(), sources[index].name);
                outcome.succeeded.push(sources[index].name.clone());
                outcome.entries.extend(entries);
            }
            Err(failure) => {
                match failure.error {
                    FetchError::Cancelled => warn!("Fetch of {} cancelled", failure.source_name),
                    _ => error!("Failed to fetch {}: {}", failure.source_name, failure.error),
                }
                outcome.failures.push(failure);
            }
        }
    }

    info!(
        "Fetch complete: {}/{} sources succeeded, {} entries",
        outcome.succeeded.len(),
        outcome.attempted,
        outcome.entries.len()
    );
    outcome
}
