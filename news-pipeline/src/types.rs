use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
// Use the interfaces crate for the handoff types
pub use interfaces::defs::{
    AlternateSource, Category, FailedSource, InvestmentValue, RunReport, RunSummary,
    SourceDescriptor, Story, StoryAnalysis, StoryStatus, TargetLanguage,
};

/// One feed item as read off the wire, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub source_name: String,
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss2,
    Atom,
    Fallback,
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub format: FeedFormat,
    pub title: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_entries_per_source: usize,
    pub recency_window_hours: i64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
    pub max_concurrent_fetches: usize,
    pub max_summary_chars: usize,
    /// Minimum spacing between two requests to the same host.
    pub per_host_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "News-Pipeline/1.0".to_string(),
            timeout_seconds: 15,
            max_entries_per_source: 15,
            recency_window_hours: 48,
            max_feed_size_mb: 10,
            max_redirects: 5,
            max_concurrent_fetches: 8,
            max_summary_chars: 500,
            per_host_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub language: TargetLanguage,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout_seconds: u64,
    /// Upper bound on prompt characters spent on story payloads per request.
    pub max_batch_chars: usize,
    pub max_batch_stories: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub min_request_interval_ms: u64,
    pub max_parallel_batches: usize,
    pub temperature: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            language: TargetLanguage::ZhCn,
            endpoint: "https://open.bigmodel.cn/api/paas/v4/chat/completions".to_string(),
            model: "glm-4-flash".to_string(),
            api_key: None,
            request_timeout_seconds: 30,
            max_batch_chars: 6000,
            max_batch_stories: 8,
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            min_request_interval_ms: 500,
            max_parallel_batches: 2,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub dedup: DedupConfig,
    pub analysis: AnalysisConfig,
    /// Hard ceiling on total fetch time before the run moves on.
    pub run_budget_seconds: u64,
    /// Stories sent to analysis after dedup.
    pub max_stories: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            dedup: DedupConfig::default(),
            analysis: AnalysisConfig::default(),
            run_budget_seconds: 300,
            max_stories: 100,
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.dedup.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::Configuration(format!(
                "similarity threshold must be within 0.0..=1.0, got {}",
                threshold
            )));
        }
        if self.fetch.recency_window_hours <= 0 {
            return Err(PipelineError::Configuration(format!(
                "recency window must be positive, got {}h",
                self.fetch.recency_window_hours
            )));
        }
        if self.max_stories == 0 {
            return Err(PipelineError::Configuration("max_stories must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchErrorKind {
    SourceUnreachable,
    SourceTimeout,
    FeedParseError,
    Cancelled,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::SourceUnreachable => "source_unreachable",
            FetchErrorKind::SourceTimeout => "source_timeout",
            FetchErrorKind::FeedParseError => "feed_parse_error",
            FetchErrorKind::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("source timed out after {seconds}s")]
    SourceTimeout { seconds: u64 },

    #[error("feed parse error: {0}")]
    FeedParseError(String),

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::SourceUnreachable(_) => FetchErrorKind::SourceUnreachable,
            FetchError::SourceTimeout { .. } => FetchErrorKind::SourceTimeout,
            FetchError::FeedParseError(_) => FetchErrorKind::FeedParseError,
            FetchError::Cancelled => FetchErrorKind::Cancelled,
        }
    }
}

/// A fetch failure tagged with the source it belongs to.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source_name: String,
    pub error: FetchError,
}

impl From<&SourceFailure> for FailedSource {
    fn from(failure: &SourceFailure) -> Self {
        Self {
            source_name: failure.source_name.clone(),
            kind: failure.error.kind().as_str().to_string(),
            reason: failure.error.to_string(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("transient analysis error: {0}")]
    Transient(String),

    #[error("permanent analysis error: {0}")]
    Permanent(String),

    #[error("analysis cancelled")]
    Cancelled,
}

impl AnalysisError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalysisError::Transient(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
