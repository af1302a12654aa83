use crate::llm_adapter::LlmAdapter;
use crate::rate_limit::RateLimiter;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::signal::StopSignal;
use crate::types::{AnalysisConfig, AnalysisError, InvestmentValue, Story, StoryAnalysis, TargetLanguage};
use crate::utils::text::preview;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What gets sent to the model for one story.
#[derive(Debug, Serialize)]
pub struct StoryPayload<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub summary: &'a str,
    pub source: &'a str,
    pub category: &'a str,
}

impl<'a> StoryPayload<'a> {
    pub fn from_story(story: &'a Story) -> Self {
        Self {
            id: &story.id,
            title: &story.title,
            summary: &story.raw_summary,
            source: &story.source_name,
            category: story.category.as_str(),
        }
    }

    /// Characters this payload occupies inside the prompt.
    pub fn prompt_chars(&self) -> usize {
        serde_json::to_string_pretty(self)
            .map(|s| s.chars().count())
            .unwrap_or_else(|_| self.title.chars().count() + self.summary.chars().count())
    }
}

/// Group story indices into batches under a character and count budget.
/// A story is never split; one that alone exceeds the budget gets a batch
/// of its own.
pub fn plan_batches(stories: &[Story], max_chars: usize, max_stories: usize) -> Vec<Vec<usize>> {
    let max_stories = max_stories.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_chars = 0;

    for (index, story) in stories.iter().enumerate() {
        let chars = StoryPayload::from_story(story).prompt_chars();
        let over_budget = current_chars + chars > max_chars || current.len() >= max_stories;
        if !current.is_empty() && over_budget {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push(index);
        current_chars += chars;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Line that introduces the story payload array at the end of every prompt.
pub const STORIES_MARKER: &str = "Stories (JSON):";

pub fn build_prompt(payloads: &[StoryPayload<'_>], language: TargetLanguage) -> String {
    let stories = serde_json::to_string_pretty(payloads).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"Analyze each news story below for investors and independent developers.
Write every text field in {language} ({code}).

Return one JSON object of the form {{"results": [ ... ]}} with exactly one element per story:
{{
  "id": "<the story id, copied verbatim>",
  "translated_title": "<the title in {language}>",
  "core_summary": "<one-sentence core point, 15-30 words>",
  "investment_value": "high | medium | low | none",
  "fund_signal": "<buy / sell / hold plus a concrete fund direction, or 'not applicable'>",
  "developer_impact": "<practical impact on independent developers, 30-50 words>",
  "relevance_score": <integer 1-10>,
  "keywords": ["<keyword>", "<keyword>", "<keyword>"]
}}

Rules:
1. Base the analysis only on the given title and summary.
2. Use "none" for investment_value when the story has no investment angle.
3. Score relevance objectively.
4. Output JSON only, no commentary.

{marker}
{stories}"#,
        language = language.display_name(),
        code = language.code(),
        marker = STORIES_MARKER,
        stories = stories,
    )
}

/// Models like to wrap JSON in Markdown fences.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default, alias = "core_point", alias = "coreSummary")]
    core_summary: Option<Value>,
    #[serde(default, alias = "investmentValue")]
    investment_value: Option<Value>,
    #[serde(default, alias = "dev_impact", alias = "developerImpact")]
    developer_impact: Option<Value>,
    #[serde(default, alias = "relevanceScore")]
    relevance_score: Option<Value>,
    #[serde(default, alias = "key_words")]
    keywords: Option<Value>,
    #[serde(default, alias = "translatedTitle")]
    translated_title: Option<Value>,
    #[serde(default, alias = "fundSignal")]
    fund_signal: Option<Value>,
}

fn non_empty_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_score(value: Option<&Value>) -> Option<u8> {
    let score = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !score.is_finite() {
        return None;
    }
    Some(score.round().clamp(1.0, 10.0) as u8)
}

fn to_analysis(value: Value, language: TargetLanguage) -> Result<StoryAnalysis, String> {
    let raw: RawAnalysis = serde_json::from_value(value).map_err(|e| format!("malformed analysis: {}", e))?;

    let core_summary = non_empty_text(raw.core_summary.as_ref()).ok_or("missing core_summary")?;
    let developer_impact = non_empty_text(raw.developer_impact.as_ref()).ok_or("missing developer_impact")?;
    let label = non_empty_text(raw.investment_value.as_ref()).ok_or("missing investment_value")?;
    let investment_value =
        InvestmentValue::from_label(&label).ok_or_else(|| format!("invalid investment_value: {}", label))?;

    let keywords = match raw.keywords {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|k| non_empty_text(Some(k)))
            .collect(),
        Some(Value::String(s)) => s
            .split([',', '，'])
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    Ok(StoryAnalysis {
        core_summary,
        investment_value,
        developer_impact,
        language,
        relevance_score: parse_score(raw.relevance_score.as_ref()),
        keywords,
        translated_title: non_empty_text(raw.translated_title.as_ref()),
        fund_signal: non_empty_text(raw.fund_signal.as_ref()),
    })
}

/// Parse a model response into per-id outcomes for exactly the ids sent.
/// A body that is not JSON at all fails the whole attempt: truncated JSON is
/// transient (worth a retry), anything else permanent.
pub fn parse_response(
    content: &str,
    expected_ids: &[String],
    language: TargetLanguage,
) -> Result<HashMap<String, Result<StoryAnalysis, String>>, AnalysisError> {
    let body = strip_code_fences(content);
    let root: Value = serde_json::from_str(body).map_err(|e| {
        if e.classify() == serde_json::error::Category::Eof {
            AnalysisError::Transient(format!("truncated model response: {}", e))
        } else {
            AnalysisError::Permanent(format!("unparsable model response: {}: {}", e, preview(body, 120)))
        }
    })?;

    let mut by_id: HashMap<String, Value> = HashMap::new();
    let items = match root {
        Value::Object(mut map) => match map.remove("results").or_else(|| map.remove("stories")) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(AnalysisError::Permanent("results is not an array".to_string()));
            }
            None => {
                // {"<id>": {...}, ...}
                for (id, value) in map {
                    by_id.insert(id, value);
                }
                Vec::new()
            }
        },
        Value::Array(items) => items,
        _ => return Err(AnalysisError::Permanent("model response is not a JSON object".to_string())),
    };
    for item in items {
        if let Some(id) = item.get("id").and_then(Value::as_str).map(str::to_string) {
            by_id.entry(id).or_insert(item);
        }
    }

    Ok(expected_ids
        .iter()
        .map(|id| {
            let outcome = match by_id.remove(id) {
                Some(value) => to_analysis(value, language),
                None => Err("story id missing from model response".to_string()),
            };
            (id.clone(), outcome)
        })
        .collect())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnalysisStats {
    pub batches: usize,
    pub batches_failed: usize,
    pub analyzed: usize,
    pub failed: usize,
}

/// Batches stories to the model with retry, rate limiting and bounded
/// parallelism.
pub struct AnalysisClient {
    adapter: Arc<dyn LlmAdapter>,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    config: AnalysisConfig,
}

impl AnalysisClient {
    pub fn new(adapter: Arc<dyn LlmAdapter>, config: AnalysisConfig) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(Duration::from_millis(config.min_request_interval_ms)));
        Self::with_rate_limiter(adapter, config, rate_limiter)
    }

    /// Share one limiter between several clients hitting the same provider.
    pub fn with_rate_limiter(adapter: Arc<dyn LlmAdapter>, config: AnalysisConfig, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            adapter,
            rate_limiter,
            retry_policy: RetryPolicy::from_config(&config),
            config,
        }
    }

    /// Analyze every story in place. Each story ends up analyzed or failed;
    /// none is dropped.
    pub async fn analyze(&self, stories: &mut [Story], stop: &StopSignal) -> AnalysisStats {
        let batches = plan_batches(stories, self.config.max_batch_chars, self.config.max_batch_stories);
        let mut stats = AnalysisStats {
            batches: batches.len(),
            ..Default::default()
        };
        if batches.is_empty() {
            return stats;
        }
        info!(
            "Analyzing {} stories in {} batches via {}",
            stories.len(),
            batches.len(),
            self.adapter.adapter_name()
        );

        let jobs: Vec<(usize, Vec<usize>, Vec<String>, String)> = batches
            .into_iter()
            .enumerate()
            .map(|(batch_no, indices)| {
                let payloads: Vec<StoryPayload<'_>> =
                    indices.iter().map(|&i| StoryPayload::from_story(&stories[i])).collect();
                let prompt = build_prompt(&payloads, self.config.language);
                let ids = indices.iter().map(|&i| stories[i].id.clone()).collect();
                (batch_no, indices, ids, prompt)
            })
            .collect();

        let results: Vec<(usize, Vec<usize>, Result<HashMap<String, Result<StoryAnalysis, String>>, AnalysisError>)> =
            stream::iter(jobs)
                .map(|(batch_no, indices, ids, prompt)| async move {
                    let result = self.run_batch(batch_no, &prompt, &ids, stop).await;
                    (batch_no, indices, result)
                })
                .buffer_unordered(self.config.max_parallel_batches.max(1))
                .collect()
                .await;

        for (batch_no, indices, result) in results {
            match result {
                Ok(mut outcomes) => {
                    for i in indices {
                        let story = &mut stories[i];
                        let outcome = outcomes
                            .remove(&story.id)
                            .unwrap_or_else(|| Err("story id missing from model response".to_string()));
                        match outcome {
                            Ok(analysis) => {
                                story.mark_analyzed(analysis);
                                stats.analyzed += 1;
                            }
                            Err(reason) => {
                                warn!("Analysis failed for '{}': {}", story.title, reason);
                                story.mark_analysis_failed(reason);
                                stats.failed += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Batch {} failed: {}", batch_no, e);
                    stats.batches_failed += 1;
                    for i in indices {
                        stories[i].mark_analysis_failed(e.to_string());
                        stats.failed += 1;
                    }
                }
            }
        }

        info!(
            "Analysis complete: {} analyzed, {} failed, {}/{} batches failed",
            stats.analyzed, stats.failed, stats.batches_failed, stats.batches
        );
        stats
    }

    async fn run_batch(
        &self,
        batch_no: usize,
        prompt: &str,
        ids: &[String],
        stop: &StopSignal,
    ) -> Result<HashMap<String, Result<StoryAnalysis, String>>, AnalysisError> {
        let mut retry = self.retry_policy.start();
        let request_timeout = Duration::from_secs(self.config.request_timeout_seconds);

        loop {
            if stop.is_stopped() {
                return Err(AnalysisError::Cancelled);
            }

            let attempt = async {
                self.rate_limiter.acquire().await;
                let content = match tokio::time::timeout(request_timeout, self.adapter.complete(prompt)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(AnalysisError::Transient(format!(
                            "request timed out after {}s",
                            self.config.request_timeout_seconds
                        )))
                    }
                };
                debug!("Batch {} response: {}", batch_no, preview(&content, 200));
                parse_response(&content, ids, self.config.language)
            };

            let result = tokio::select! {
                biased;
                _ = stop.cancelled() => Err(AnalysisError::Cancelled),
                result = attempt => result,
            };

            let error = match result {
                Ok(outcomes) => return Ok(outcomes),
                Err(AnalysisError::Cancelled) => return Err(AnalysisError::Cancelled),
                Err(e) => e,
            };

            match retry.record_failure(&error) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "Batch {} attempt {} failed ({}), retrying in {:?}",
                        batch_no,
                        retry.attempts(),
                        error,
                        delay
                    );
                    tokio::select! {
                        biased;
                        _ = stop.cancelled() => return Err(AnalysisError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp => {
                    error!("Batch {} giving up after {} attempts: {}", batch_no, retry.attempts(), error);
                    return Err(error);
                }
            }
        }
    }
}
