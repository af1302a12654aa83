use crate::parser::FeedParser;
use crate::signal::StopSignal;
use crate::traits::FeedTransport;
use crate::types::{FetchConfig, FetchError, SourceDescriptor};
use crate::utils::url::extract_domain;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{info, warn};

/// What a reachable feed looked like when checked.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedHealth {
    pub feed_title: Option<String>,
    pub entries: usize,
}

/// Outcome of checking one configured source.
#[derive(Debug, Clone)]
pub struct SourceCheck {
    pub source: SourceDescriptor,
    pub host: Option<String>,
    pub result: std::result::Result<FeedHealth, FetchError>,
}

impl SourceCheck {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fetch one source and confirm the body is a feed document that parses.
/// Unlike a normal run, no recency window or entry cap is applied.
pub async fn check_source<T: FeedTransport + ?Sized>(
    transport: &T,
    source: &SourceDescriptor,
    config: &FetchConfig,
) -> SourceCheck {
    let timeout = Duration::from_secs(config.timeout_seconds);
    let result = match tokio::time::timeout(timeout, transport.get(&source.url)).await {
        Ok(Ok(body)) => inspect_body(&body),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(FetchError::SourceTimeout {
            seconds: config.timeout_seconds,
        }),
    };

    SourceCheck {
        source: source.clone(),
        host: extract_domain(&source.url),
        result,
    }
}

fn inspect_body(body: &str) -> std::result::Result<FeedHealth, FetchError> {
    if !FeedParser::is_valid_feed_content(body) {
        return Err(FetchError::FeedParseError(
            "response is not an RSS or Atom document".to_string(),
        ));
    }
    let feed = FeedParser::new().parse_feed(body)?;
    Ok(FeedHealth {
        feed_title: feed.title,
        entries: feed.entries.len(),
    })
}

/// Check every source concurrently. Results come back in source-list order;
/// a stop request marks unfinished checks as cancelled.
pub async fn verify_sources<T: FeedTransport + ?Sized>(
    transport: &T,
    sources: &[SourceDescriptor],
    config: &FetchConfig,
    stop: &StopSignal,
) -> Vec<SourceCheck> {
    info!(
        "Verifying {} sources over {} transport",
        sources.len(),
        transport.transport_name()
    );

    let mut checks: Vec<(usize, SourceCheck)> = stream::iter(sources.iter().enumerate())
        .map(|(index, source)| async move {
            let check = tokio::select! {
                biased;
                _ = stop.cancelled() => SourceCheck {
                    source: source.clone(),
                    host: extract_domain(&source.url),
                    result: Err(FetchError::Cancelled),
                },
                check = check_source(transport, source, config) => check,
            };
            (index, check)
        })
        .buffer_unordered(config.max_concurrent_fetches.max(1))
        .collect()
        .await;
    checks.sort_by_key(|(index, _)| *index);

    let checks: Vec<SourceCheck> = checks.into_iter().map(|(_, check)| check).collect();
    for check in &checks {
        if let Err(e) = &check.result {
            warn!("Source {} failed verification: {}", check.source.name, e);
        }
    }
    info!(
        "Verification complete: {}/{} sources valid",
        checks.iter().filter(|c| c.is_ok()).count(),
        checks.len()
    );
    checks
}

/// Plain-text table, one line per source, followed by a tally.
pub fn render_checks(checks: &[SourceCheck]) -> String {
    let name_width = checks.iter().map(|c| c.source.name.chars().count()).max().unwrap_or(0);
    let mut out = String::new();

    for check in checks {
        let host = check.host.as_deref().unwrap_or("-");
        let line = match &check.result {
            Ok(health) => format!(
                "OK    {:<width$}  {}  {} entries  {}",
                check.source.name,
                host,
                health.entries,
                health.feed_title.as_deref().unwrap_or("(untitled)"),
                width = name_width
            ),
            Err(e) => format!(
                "FAIL  {:<width$}  {}  {}: {}",
                check.source.name,
                host,
                e.kind().as_str(),
                e,
                width = name_width
            ),
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }

    let valid = checks.iter().filter(|c| c.is_ok()).count();
    out.push_str(&format!("{}/{} sources valid\n", valid, checks.len()));
    out
}

/// Descriptors of the sources that passed, ready to be saved as a `--sources` file.
pub fn valid_sources(checks: &[SourceCheck]) -> Vec<SourceDescriptor> {
    checks
        .iter()
        .filter(|c| c.is_ok())
        .map(|c| c.source.clone())
        .collect()
}
