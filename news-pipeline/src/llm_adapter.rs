use crate::analysis::STORIES_MARKER;
use crate::types::{AnalysisConfig, AnalysisError, PipelineError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Trait for LLM adapters that turn one prompt into one completion
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Get the name of this LLM adapter
    fn adapter_name(&self) -> String;

    /// Send one prompt and return the raw completion text.
    /// Rate limits, 5xx and timeouts come back as `Transient`.
    async fn complete(&self, prompt: &str) -> std::result::Result<String, AnalysisError>;
}

const SYSTEM_PROMPT: &str = "You are a professional news analyst. Always answer with a single JSON object and nothing else.";

/// OpenAI-style chat completions endpoint (Zhipu GLM by default).
pub struct ChatCompletionsAdapter {
    http: Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

impl ChatCompletionsAdapter {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PipelineError::Configuration("missing API key for analysis endpoint".to_string()))?;

        let http = Client::builder()
            .user_agent("News-Pipeline/1.0")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }
}

fn classify_status(status: StatusCode, body: &str) -> AnalysisError {
    let message = format!("HTTP {}: {}", status.as_u16(), crate::utils::text::preview(body, 200));
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        AnalysisError::Transient(message)
    } else {
        AnalysisError::Permanent(message)
    }
}

#[async_trait]
impl LlmAdapter for ChatCompletionsAdapter {
    fn adapter_name(&self) -> String {
        format!("chat-completions ({})", self.model)
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, AnalysisError> {
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
        };

        debug!("Sending {} prompt chars to {}", prompt.chars().count(), self.endpoint);
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    AnalysisError::Transient(e.to_string())
                } else {
                    AnalysisError::Permanent(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: Resp = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Transient(e.to_string())
            } else {
                AnalysisError::Permanent(format!("unexpected response shape: {}", e))
            }
        })?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AnalysisError::Permanent("empty completion".to_string()))
    }
}

/// Fails every request permanently; used when no API key is configured so the
/// run still completes with every story marked failed.
pub struct DisabledAdapter;

#[async_trait]
impl LlmAdapter for DisabledAdapter {
    fn adapter_name(&self) -> String {
        "disabled".to_string()
    }

    async fn complete(&self, _prompt: &str) -> std::result::Result<String, AnalysisError> {
        Err(AnalysisError::Permanent("analysis disabled: no API key configured".to_string()))
    }
}

type Responder = Box<dyn Fn(&str) -> std::result::Result<String, AnalysisError> + Send + Sync>;

/// Mock LLM adapter for development and testing.
/// Serves scripted responses first, then the responder (if any), then a
/// canned analysis for every story id found in the prompt.
pub struct MockLlmAdapter {
    name: String,
    scripted: Mutex<VecDeque<std::result::Result<String, AnalysisError>>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockLlmAdapter {
    pub fn new(name: String) -> Self {
        Self {
            name,
            scripted: Mutex::new(VecDeque::new()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_responses(self, responses: Vec<std::result::Result<String, AnalysisError>>) -> Self {
        Self {
            scripted: Mutex::new(responses.into_iter().collect()),
            ..self
        }
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<String, AnalysisError> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    /// Story ids from the payload array at the end of a batch prompt, in
    /// prompt order. The schema example above the payload is not a story.
    pub fn prompt_ids(prompt: &str) -> Vec<String> {
        let Some(start) = prompt.rfind(STORIES_MARKER) else {
            return Vec::new();
        };
        let payload = prompt[start + STORIES_MARKER.len()..].trim();
        match serde_json::from_str::<Vec<Value>>(payload) {
            Ok(stories) => stories
                .iter()
                .filter_map(|s| s.get("id").and_then(Value::as_str).map(str::to_string))
                .collect(),
            Err(e) => {
                warn!("Mock adapter could not read story payload: {}", e);
                Vec::new()
            }
        }
    }

    pub fn canned_analysis(id: &str) -> Value {
        json!({
            "id": id,
            "core_summary": format!("Summary of {}", id),
            "investment_value": "medium",
            "fund_signal": "Watch related sector funds",
            "developer_impact": "Worth tracking for developers",
            "relevance_score": 6,
            "keywords": ["mock", "news"]
        })
    }

    /// Well-formed response covering every id in the prompt.
    pub fn canned_response(prompt: &str) -> String {
        let results: Vec<Value> = Self::prompt_ids(prompt)
            .iter()
            .map(|id| Self::canned_analysis(id))
            .collect();
        json!({ "results": results }).to_string()
    }
}

#[async_trait]
impl LlmAdapter for MockLlmAdapter {
    fn adapter_name(&self) -> String {
        format!("Mock LLM Adapter ({})", self.name)
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, AnalysisError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().await.push(prompt.to_string());

        if let Some(scripted) = self.scripted.lock().await.pop_front() {
            if let Err(e) = &scripted {
                warn!("Mock adapter call {} scripted to fail: {}", call, e);
            }
            return scripted;
        }

        match &self.responder {
            Some(responder) => responder(prompt),
            None => {
                info!("Mock adapter call {}: canned response", call);
                Ok(Self::canned_response(prompt))
            }
        }
    }
}
