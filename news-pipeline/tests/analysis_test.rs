mod common;

use backoff::Clock;
use common::{init_tracing, source, story};
use news_pipeline::analysis::{build_prompt, parse_response, plan_batches, StoryPayload, STORIES_MARKER};
use news_pipeline::{
    AnalysisClient, AnalysisConfig, AnalysisError, InvestmentValue, MockLlmAdapter, RateLimiter,
    RetryDecision, RetryPolicy, StopSignal, Story, StoryStatus, TargetLanguage,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Clone)]
struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

fn test_config() -> AnalysisConfig {
    AnalysisConfig {
        language: TargetLanguage::En,
        initial_backoff_ms: 10,
        max_backoff_ms: 100,
        min_request_interval_ms: 0,
        ..AnalysisConfig::default()
    }
}

fn three_stories() -> Vec<Story> {
    let wire = source("Wire", 2);
    vec![
        story(&wire, "Chipmaker unveils new GPU", "A faster GPU for AI training.", 0),
        story(&wire, "Rust 2.0 roadmap published", "Language team outlines plans.", 1),
        story(&wire, "Startup raises series B", "Funding for developer tools.", 2),
    ]
}

#[test]
fn test_batches_never_split_a_story() {
    init_tracing();

    let wire = source("Wire", 1);
    let long = "lorem ipsum ".repeat(80);
    let stories: Vec<Story> = (0..7)
        .map(|i| story(&wire, &format!("Story number {}", i), &long, i))
        .collect();
    let one = StoryPayload::from_story(&stories[0]).prompt_chars();
    info!("One payload is {} chars", one);

    let batches = plan_batches(&stories, one * 2 + 10, 8);

    // Every story lands in exactly one batch, in order
    let flattened: Vec<usize> = batches.iter().flatten().copied().collect();
    assert_eq!(flattened, (0..7).collect::<Vec<_>>());
    for batch in &batches {
        let chars: usize = batch.iter().map(|&i| StoryPayload::from_story(&stories[i]).prompt_chars()).sum();
        assert!(chars <= one * 2 + 10 || batch.len() == 1);
        assert!(batch.len() <= 2);
    }

    // A story bigger than the whole budget still goes out, alone
    let oversize = plan_batches(&stories[..2], 10, 8);
    assert_eq!(oversize, vec![vec![0], vec![1]]);

    // The count cap applies too
    let capped = plan_batches(&stories, usize::MAX, 3);
    assert_eq!(capped.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 1]);

    assert!(plan_batches(&[], 1000, 8).is_empty());
}

#[test]
fn test_prompt_carries_ids_and_language() {
    let stories = three_stories();
    let payloads: Vec<StoryPayload<'_>> = stories.iter().map(StoryPayload::from_story).collect();
    let prompt = build_prompt(&payloads, TargetLanguage::Ja);

    assert!(prompt.contains("Japanese"));
    assert!(prompt.contains("Chipmaker unveils new GPU"));
    assert_eq!(
        MockLlmAdapter::prompt_ids(&prompt),
        stories.iter().map(|s| s.id.clone()).collect::<Vec<_>>()
    );
}

#[test]
fn test_schema_example_is_not_a_story_id() {
    init_tracing();

    let stories = three_stories();
    let single = [StoryPayload::from_story(&stories[0])];
    let prompt = build_prompt(&single, TargetLanguage::En);

    // The response schema shows an "id" field before the payload
    assert!(prompt.find("\"id\"").unwrap() < prompt.find(STORIES_MARKER).unwrap());
    assert_eq!(MockLlmAdapter::prompt_ids(&prompt), vec![stories[0].id.clone()]);

    let response: serde_json::Value = serde_json::from_str(&MockLlmAdapter::canned_response(&prompt)).unwrap();
    assert_eq!(response["results"].as_array().map(Vec::len), Some(1));
    assert!(MockLlmAdapter::prompt_ids("no payload here").is_empty());
}

#[test]
fn test_parse_response_handles_partial_results() {
    init_tracing();

    let ids = vec!["a1".to_string(), "b2".to_string(), "c3".to_string(), "d4".to_string()];
    let body = json!({
        "results": [
            {
                "id": "a1",
                "core_summary": "GPU launch",
                "investment_value": "HIGH",
                "developer_impact": "Cheaper training",
                "relevance_score": "12",
                "keywords": ["gpu", "ai"],
                "translated_title": "GPU launch title"
            },
            { "id": "b2", "core_point": "Roadmap", "investment_value": "低", "dev_impact": "Plan ahead", "key_words": "rust, roadmap" },
            { "id": "c3", "core_summary": "Funding", "investment_value": "sky-high", "developer_impact": "More tools" }
        ]
    })
    .to_string();
    let fenced = format!("```json\n{}\n```", body);

    let outcomes = parse_response(&fenced, &ids, TargetLanguage::En).expect("parsable");

    let a1 = outcomes["a1"].as_ref().expect("a1 analyzed");
    assert_eq!(a1.investment_value, InvestmentValue::High);
    assert_eq!(a1.relevance_score, Some(10));
    assert_eq!(a1.keywords, vec!["gpu", "ai"]);
    assert_eq!(a1.translated_title.as_deref(), Some("GPU launch title"));
    assert_eq!(a1.language, TargetLanguage::En);

    let b2 = outcomes["b2"].as_ref().expect("b2 analyzed via aliases");
    assert_eq!(b2.investment_value, InvestmentValue::Low);
    assert_eq!(b2.keywords, vec!["rust", "roadmap"]);
    assert_eq!(b2.relevance_score, None);

    assert!(outcomes["c3"].as_ref().unwrap_err().contains("investment_value"));
    assert!(outcomes["d4"].as_ref().unwrap_err().contains("missing"));
}

#[test]
fn test_non_finite_scores_are_dropped() {
    let ids = vec!["n".to_string(), "i".to_string(), "z".to_string()];
    let body = json!({
        "results": [
            { "id": "n", "core_summary": "A", "investment_value": "low", "developer_impact": "B", "relevance_score": "NaN" },
            { "id": "i", "core_summary": "A", "investment_value": "low", "developer_impact": "B", "relevance_score": "inf" },
            { "id": "z", "core_summary": "A", "investment_value": "low", "developer_impact": "B", "relevance_score": 0 }
        ]
    })
    .to_string();

    let outcomes = parse_response(&body, &ids, TargetLanguage::En).expect("parsable");

    assert_eq!(outcomes["n"].as_ref().map(|a| a.relevance_score), Ok(None));
    assert_eq!(outcomes["i"].as_ref().map(|a| a.relevance_score), Ok(None));
    // Finite out-of-range scores are still clamped into 1..=10
    assert_eq!(outcomes["z"].as_ref().map(|a| a.relevance_score), Ok(Some(1)));
}

#[test]
fn test_parse_response_accepts_id_keyed_object() {
    let ids = vec!["x".to_string()];
    let body = json!({
        "x": { "coreSummary": "Keyed", "investmentValue": "none", "developerImpact": "None really" }
    })
    .to_string();

    let outcomes = parse_response(&body, &ids, TargetLanguage::ZhCn).expect("parsable");
    assert_eq!(outcomes["x"].as_ref().map(|a| a.investment_value), Ok(InvestmentValue::None));
}

#[test]
fn test_parse_response_error_classes() {
    let ids = vec!["x".to_string()];

    let truncated = r#"{"results": [{"id": "x", "core_summary": "cut of"#;
    assert!(matches!(
        parse_response(truncated, &ids, TargetLanguage::En),
        Err(AnalysisError::Transient(_))
    ));

    assert!(matches!(
        parse_response("Sorry, I cannot help with that.", &ids, TargetLanguage::En),
        Err(AnalysisError::Permanent(_))
    ));
}

#[test]
fn test_retry_state_machine_with_manual_clock() {
    init_tracing();

    let policy = RetryPolicy {
        max_attempts: 5,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(400),
        multiplier: 2.0,
        max_elapsed: Some(Duration::from_secs(2)),
    };
    let transient = AnalysisError::Transient("HTTP 503".to_string());

    let mut retry = policy.start_with_clock(ManualClock::new());
    let mut delays = Vec::new();
    loop {
        match retry.record_failure(&transient) {
            RetryDecision::RetryAfter(delay) => delays.push(delay.as_millis()),
            RetryDecision::GiveUp => break,
        }
    }
    assert_eq!(delays, vec![100, 200, 400, 400]);
    assert_eq!(retry.attempts(), 5);
    assert!(retry.is_exhausted());

    // Permanent errors stop immediately
    let mut retry = policy.start_with_clock(ManualClock::new());
    assert_eq!(
        retry.record_failure(&AnalysisError::Permanent("HTTP 401".to_string())),
        RetryDecision::GiveUp
    );
    assert_eq!(retry.attempts(), 1);

    // Total retry time is bounded as well
    let clock = ManualClock::new();
    let mut retry = policy.start_with_clock(clock.clone());
    assert!(matches!(retry.record_failure(&transient), RetryDecision::RetryAfter(_)));
    clock.advance(Duration::from_secs(5));
    assert_eq!(retry.record_failure(&transient), RetryDecision::GiveUp);
}

#[test]
fn test_slow_attempts_keep_their_full_retry_budget() {
    let config = AnalysisConfig {
        max_attempts: 3,
        initial_backoff_ms: 100,
        max_backoff_ms: 300,
        ..AnalysisConfig::default()
    };
    let policy = RetryPolicy::from_config(&config);
    assert_eq!(policy.max_elapsed, None);

    let transient = AnalysisError::Transient("request timed out after 30s".to_string());
    let clock = ManualClock::new();
    let mut retry = policy.start_with_clock(clock.clone());

    // Each attempt takes far longer than the whole backoff schedule
    clock.advance(Duration::from_secs(30));
    assert_eq!(retry.record_failure(&transient), RetryDecision::RetryAfter(Duration::from_millis(100)));
    clock.advance(Duration::from_secs(30));
    assert_eq!(retry.record_failure(&transient), RetryDecision::RetryAfter(Duration::from_millis(200)));
    clock.advance(Duration::from_secs(30));
    assert_eq!(retry.record_failure(&transient), RetryDecision::GiveUp);
    assert_eq!(retry.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_spaces_requests() {
    init_tracing();

    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(500)));
    let start = tokio::time::Instant::now();

    let waits = futures::future::join_all((0..3).map(|_| {
        let limiter = limiter.clone();
        async move { limiter.acquire().await }
    }))
    .await;

    let mut waits: Vec<u128> = waits.iter().map(|w| w.as_millis()).collect();
    waits.sort();
    assert_eq!(waits, vec![0, 500, 1000]);
    assert!(start.elapsed() >= Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    init_tracing();

    let adapter = Arc::new(MockLlmAdapter::new("flaky".to_string()).with_responses(vec![
        Err(AnalysisError::Transient("HTTP 429".to_string())),
        Err(AnalysisError::Transient("HTTP 502".to_string())),
    ]));
    let client = AnalysisClient::new(adapter.clone(), test_config());
    let mut stories = three_stories();

    let stats = client.analyze(&mut stories, &StopSignal::never()).await;

    assert_eq!(adapter.calls(), 3);
    assert_eq!(stats.analyzed, 3);
    assert_eq!(stats.batches_failed, 0);
    assert!(stories.iter().all(|s| s.status() == StoryStatus::Analyzed));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_the_whole_batch() {
    init_tracing();

    let adapter = Arc::new(MockLlmAdapter::new("down".to_string()).with_responses(vec![
        Err(AnalysisError::Transient("HTTP 500".to_string())),
        Err(AnalysisError::Transient("HTTP 500".to_string())),
        Err(AnalysisError::Transient("HTTP 500".to_string())),
        Err(AnalysisError::Transient("HTTP 500".to_string())),
    ]));
    let client = AnalysisClient::new(adapter.clone(), test_config());
    let mut stories = three_stories();

    let stats = client.analyze(&mut stories, &StopSignal::never()).await;

    assert_eq!(adapter.calls(), 3);
    assert_eq!(stats.batches_failed, 1);
    assert_eq!(stats.failed, 3);
    for story in &stories {
        assert_eq!(story.status(), StoryStatus::AnalysisFailed);
        assert!(story.analysis().is_none());
        assert!(story.analysis_error().is_some());
    }
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    init_tracing();

    let adapter = Arc::new(
        MockLlmAdapter::new("denied".to_string())
            .with_responses(vec![Err(AnalysisError::Permanent("HTTP 401".to_string()))]),
    );
    let client = AnalysisClient::new(adapter.clone(), test_config());
    let mut stories = three_stories();

    let stats = client.analyze(&mut stories, &StopSignal::never()).await;

    assert_eq!(adapter.calls(), 1);
    assert_eq!(stats.failed, 3);
}

#[tokio::test]
async fn test_stopped_client_marks_everything_failed() {
    init_tracing();

    let adapter = Arc::new(MockLlmAdapter::new("idle".to_string()));
    let client = AnalysisClient::new(adapter.clone(), test_config());
    let mut stories = three_stories();
    let (handle, signal) = news_pipeline::stop_channel();
    handle.stop();

    let stats = client.analyze(&mut stories, &signal).await;

    assert_eq!(adapter.calls(), 0);
    assert_eq!(stats.failed, 3);
    assert!(stories.iter().all(|s| s.status() == StoryStatus::AnalysisFailed));
}

#[tokio::test]
async fn test_batches_run_with_bounded_parallelism() {
    init_tracing();

    let wire = source("Wire", 1);
    let mut stories: Vec<Story> = (0..10)
        .map(|i| story(&wire, &format!("Independent headline {}", i), "short", i))
        .collect();
    let config = AnalysisConfig {
        max_batch_stories: 3,
        max_parallel_batches: 2,
        ..test_config()
    };
    let adapter = Arc::new(MockLlmAdapter::new("parallel".to_string()));
    let client = AnalysisClient::new(adapter.clone(), config);

    let stats = client.analyze(&mut stories, &StopSignal::never()).await;

    assert_eq!(stats.batches, 4);
    assert_eq!(adapter.calls(), 4);
    assert_eq!(stats.analyzed, 10);
    for prompt in adapter.prompts().await {
        assert!(MockLlmAdapter::prompt_ids(&prompt).len() <= 3);
    }
}
