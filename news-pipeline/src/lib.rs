pub mod analysis;
pub mod dedup;
pub mod fetcher;
pub mod llm_adapter;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod rate_limit;
pub mod retry;
pub mod signal;
pub mod sources;
pub mod traits;
pub mod types;
pub mod utils;
pub mod verify;

pub use analysis::{AnalysisClient, AnalysisStats};
pub use dedup::{DedupOutcome, Deduplicator};
pub use fetcher::{fetch_all, fetch_source, FetchOutcome, Fetcher};
pub use llm_adapter::{ChatCompletionsAdapter, DisabledAdapter, LlmAdapter, MockLlmAdapter};
pub use normalize::Normalizer;
pub use parser::FeedParser;
pub use pipeline::{cap_stories, rank_stories, NewsPipeline, RunState};
pub use rate_limit::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use signal::{stop_channel, StopHandle, StopSignal};
pub use sources::SourceRegistry;
pub use traits::{FeedAdapter, FeedTransport};
pub use types::*;
pub use verify::{check_source, render_checks, valid_sources, verify_sources, FeedHealth, SourceCheck};
