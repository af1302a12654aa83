use crate::analysis::AnalysisClient;
use crate::dedup::Deduplicator;
use crate::fetcher::{fetch_all, FetchOutcome};
use crate::llm_adapter::LlmAdapter;
use crate::normalize::Normalizer;
use crate::signal::{stop_channel, StopSignal};
use crate::traits::FeedTransport;
use crate::types::{FailedSource, PipelineConfig, RunReport, RunSummary, SourceDescriptor, Story, StoryStatus};
use crate::utils::time::format_duration;
use chrono::Utc;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Forward-only run state. `partial_failure` on the pipeline is tracked
/// alongside it without changing the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Fetching,
    Normalizing,
    Analyzing,
    Done,
}

/// Sequences fetch, normalize/dedup and analysis for one run.
pub struct NewsPipeline {
    transport: Arc<dyn FeedTransport>,
    analysis: AnalysisClient,
    config: PipelineConfig,
    stop: StopSignal,
    state: RunState,
    transitions: Vec<RunState>,
    partial_failure: bool,
}

impl NewsPipeline {
    pub fn new(transport: Arc<dyn FeedTransport>, adapter: Arc<dyn LlmAdapter>, config: PipelineConfig) -> Self {
        let analysis = AnalysisClient::new(adapter, config.analysis.clone());
        Self {
            transport,
            analysis,
            config,
            stop: StopSignal::never(),
            state: RunState::Init,
            transitions: vec![RunState::Init],
            partial_failure: false,
        }
    }

    /// Observe an external stop request (Ctrl-C, caller deadline).
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state the last run passed through, in order.
    pub fn transitions(&self) -> &[RunState] {
        &self.transitions
    }

    pub fn partial_failure(&self) -> bool {
        self.partial_failure
    }

    fn transition(&mut self, next: RunState) {
        info!("Pipeline state: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    /// Run the whole pipeline once. Never fails: per-source and per-story
    /// errors end up in the summary, and a run with no usable source
    /// finishes with an empty story list.
    pub async fn run(&mut self, sources: &[SourceDescriptor]) -> RunReport {
        let started = Instant::now();
        let generated_at = Utc::now();
        self.state = RunState::Init;
        self.transitions = vec![RunState::Init];
        self.partial_failure = false;

        let mut summary = RunSummary {
            sources_attempted: sources.len(),
            ..Default::default()
        };

        self.transition(RunState::Fetching);
        let (outcome, budget_exceeded) = self.fetch_within_budget(sources).await;
        summary.budget_exceeded = budget_exceeded;
        summary.sources_succeeded = outcome.succeeded.len();
        summary.sources_failed = outcome.failures.len();
        summary.failed_sources = outcome.failures.iter().map(FailedSource::from).collect();
        summary.stories_fetched = outcome.entries.len();
        if !outcome.failures.is_empty() {
            self.partial_failure = true;
        }

        self.transition(RunState::Normalizing);
        let stories = Normalizer::new(sources, self.config.fetch.max_summary_chars).normalize(outcome.entries, generated_at);
        let dedup = Deduplicator::from_config(&self.config.dedup).deduplicate(stories);
        summary.duplicates_merged = dedup.merged;
        summary.stories_deduplicated = dedup.stories.len();

        let (mut stories, trimmed) = cap_stories(dedup.stories, self.config.max_stories);
        summary.stories_trimmed = trimmed;

        self.transition(RunState::Analyzing);
        let stats = self.analysis.analyze(&mut stories, &self.stop).await;
        summary.analysis_batches = stats.batches;
        summary.analysis_batches_failed = stats.batches_failed;
        summary.stories_analyzed = stats.analyzed;
        summary.stories_failed = stats.failed;
        if stats.failed > 0 {
            self.partial_failure = true;
        }

        let stories = rank_stories(stories);
        summary.partial_failure = self.partial_failure;
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        self.transition(RunState::Done);

        info!(
            "Run finished in {}: {}/{} sources ok, {} fetched, {} after dedup, {} analyzed, {} failed",
            format_duration(started.elapsed()),
            summary.sources_succeeded,
            summary.sources_attempted,
            summary.stories_fetched,
            summary.stories_deduplicated,
            summary.stories_analyzed,
            summary.stories_failed
        );

        RunReport {
            run_id: Uuid::new_v4(),
            date: generated_at.date_naive(),
            generated_at,
            language: self.config.analysis.language,
            stories,
            summary,
        }
    }

    /// Fetch under the run budget. When the budget runs out (or the external
    /// stop fires) in-flight fetches are cancelled and whatever already
    /// arrived moves on to normalization.
    async fn fetch_within_budget(&self, sources: &[SourceDescriptor]) -> (FetchOutcome, bool) {
        let (fetch_handle, fetch_signal) = stop_channel();
        let budget = Duration::from_secs(self.config.run_budget_seconds);

        let fetch = fetch_all(self.transport.as_ref(), sources, &self.config.fetch, &fetch_signal);
        tokio::pin!(fetch);
        let deadline = tokio::time::sleep(budget);
        tokio::pin!(deadline);

        tokio::select! {
            outcome = &mut fetch => (outcome, false),
            _ = &mut deadline => {
                warn!("Run budget of {} exceeded during fetch, continuing with partial results", format_duration(budget));
                fetch_handle.stop();
                ((&mut fetch).await, true)
            }
            _ = self.stop.cancelled() => {
                warn!("Stop requested during fetch, continuing with partial results");
                fetch_handle.stop();
                ((&mut fetch).await, false)
            }
        }
    }
}

/// Keep the `max` newest stories (heavier source, then dedup order on ties)
/// and hand them back in dedup order. Returns how many were dropped.
pub fn cap_stories(stories: Vec<Story>, max: usize) -> (Vec<Story>, usize) {
    if stories.len() <= max {
        return (stories, 0);
    }
    let trimmed = stories.len() - max;

    let mut indexed: Vec<(usize, Story)> = stories.into_iter().enumerate().collect();
    indexed.sort_by_key(|(position, story)| (Reverse(story.published_at), Reverse(story.source_weight), *position));
    indexed.truncate(max);
    indexed.sort_by_key(|(position, _)| *position);

    warn!("Trimming {} older stories beyond the cap of {}", trimmed, max);
    (indexed.into_iter().map(|(_, story)| story).collect(), trimmed)
}

/// Analyzed stories by relevance (highest first), then source weight, then
/// dedup order. Stories without analysis follow in dedup order.
pub fn rank_stories(stories: Vec<Story>) -> Vec<Story> {
    let (mut analyzed, failed): (Vec<(usize, Story)>, Vec<(usize, Story)>) = stories
        .into_iter()
        .enumerate()
        .partition(|(_, s)| s.status() == StoryStatus::Analyzed);

    analyzed.sort_by_key(|(position, story)| {
        let score = story.analysis().and_then(|a| a.relevance_score).unwrap_or(0);
        (Reverse(score), Reverse(story.source_weight), *position)
    });

    analyzed
        .into_iter()
        .chain(failed)
        .map(|(_, story)| story)
        .collect()
}
