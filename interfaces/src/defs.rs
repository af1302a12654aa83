use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Tech,
    Science,
    Society,
    International,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Tech,
        Category::Science,
        Category::Society,
        Category::International,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tech => "tech",
            Category::Science => "science",
            Category::Society => "society",
            Category::International => "international",
            Category::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Tech => "Technology",
            Category::Science => "Science",
            Category::Society => "Society",
            Category::International => "International",
            Category::Other => "Other",
        }
    }

}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "technology" => return Ok(Category::Tech),
            "world" => return Ok(Category::International),
            _ => {}
        }
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
                format!("unknown category: {} (expected one of {})", s.trim(), known.join(", "))
            })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured feed. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub url: String,
    pub category: Category,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl SourceDescriptor {
    pub fn new(name: &str, url: &str, category: Category, weight: u32) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            category,
            weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TargetLanguage {
    #[default]
    #[serde(rename = "zh-CN")]
    ZhCn,
    #[serde(rename = "zh-TW")]
    ZhTw,
    #[serde(rename = "en")]
    En,
    #[serde(rename = "ja")]
    Ja,
    #[serde(rename = "ko")]
    Ko,
}

impl TargetLanguage {
    pub fn code(&self) -> &'static str {
        match self {
            TargetLanguage::ZhCn => "zh-CN",
            TargetLanguage::ZhTw => "zh-TW",
            TargetLanguage::En => "en",
            TargetLanguage::Ja => "ja",
            TargetLanguage::Ko => "ko",
        }
    }

    /// Name used inside model prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            TargetLanguage::ZhCn => "Simplified Chinese",
            TargetLanguage::ZhTw => "Traditional Chinese",
            TargetLanguage::En => "English",
            TargetLanguage::Ja => "Japanese",
            TargetLanguage::Ko => "Korean",
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TargetLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "zh-cn" | "zh" => Ok(TargetLanguage::ZhCn),
            "zh-tw" => Ok(TargetLanguage::ZhTw),
            "en" => Ok(TargetLanguage::En),
            "ja" => Ok(TargetLanguage::Ja),
            "ko" => Ok(TargetLanguage::Ko),
            other => Err(format!("unsupported target language: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentValue {
    High,
    Medium,
    Low,
    None,
}

impl InvestmentValue {
    /// Lenient parse of whatever rating label the model produced.
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.trim().to_lowercase();
        match lower.as_str() {
            "high" | "高" => Some(InvestmentValue::High),
            "medium" | "mid" | "moderate" | "中" => Some(InvestmentValue::Medium),
            "low" | "低" => Some(InvestmentValue::Low),
            "none" | "n/a" | "not applicable" | "无" | "不适用" => Some(InvestmentValue::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentValue::High => "high",
            InvestmentValue::Medium => "medium",
            InvestmentValue::Low => "low",
            InvestmentValue::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryAnalysis {
    pub core_summary: String,
    pub investment_value: InvestmentValue,
    pub developer_impact: String,
    pub language: TargetLanguage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund_signal: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Fetched,
    Deduplicated,
    Analyzed,
    AnalysisFailed,
}

impl StoryStatus {
    fn rank(&self) -> u8 {
        match self {
            StoryStatus::Fetched => 0,
            StoryStatus::Deduplicated => 1,
            StoryStatus::Analyzed | StoryStatus::AnalysisFailed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }
}

/// Another source that carried the same story; kept for citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternateSource {
    pub source_name: String,
    pub title: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub title: String,
    pub link: String,
    pub source_name: String,
    pub category: Category,
    pub source_weight: u32,
    pub published_at: DateTime<Utc>,
    /// True when the feed gave no date and `published_at` is the fetch time.
    pub published_estimated: bool,
    pub raw_summary: String,
    #[serde(default, skip_serializing)]
    pub cluster_key: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_sources: Vec<AlternateSource>,
    /// Position in the fetched set; decides the last tie-break.
    #[serde(skip)]
    pub fetch_order: usize,
    analysis: Option<StoryAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    analysis_error: Option<String>,
    status: StoryStatus,
}

impl Story {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        title: String,
        link: String,
        source: &SourceDescriptor,
        published_at: DateTime<Utc>,
        published_estimated: bool,
        raw_summary: String,
        cluster_key: BTreeSet<String>,
        fetch_order: usize,
    ) -> Self {
        Self {
            id,
            title,
            link,
            source_name: source.name.clone(),
            category: source.category,
            source_weight: source.weight,
            published_at,
            published_estimated,
            raw_summary,
            cluster_key,
            alternate_sources: Vec::new(),
            fetch_order,
            analysis: None,
            analysis_error: None,
            status: StoryStatus::Fetched,
        }
    }

    pub fn status(&self) -> StoryStatus {
        self.status
    }

    pub fn analysis(&self) -> Option<&StoryAnalysis> {
        self.analysis.as_ref()
    }

    pub fn analysis_error(&self) -> Option<&str> {
        self.analysis_error.as_deref()
    }

    /// Moves the status forward. Returns false (and changes nothing) for
    /// backward or sideways moves, including leaving a terminal state.
    pub fn advance(&mut self, next: StoryStatus) -> bool {
        if next.rank() <= self.status.rank() {
            return false;
        }
        self.status = next;
        true
    }

    pub fn mark_deduplicated(&mut self) -> bool {
        self.advance(StoryStatus::Deduplicated)
    }

    pub fn mark_analyzed(&mut self, analysis: StoryAnalysis) -> bool {
        if !self.advance(StoryStatus::Analyzed) {
            return false;
        }
        self.analysis = Some(analysis);
        self.analysis_error = None;
        true
    }

    pub fn mark_analysis_failed(&mut self, reason: impl Into<String>) -> bool {
        if !self.advance(StoryStatus::AnalysisFailed) {
            return false;
        }
        self.analysis = None;
        self.analysis_error = Some(reason.into());
        true
    }

    /// Title in the target language when the model supplied one.
    pub fn display_title(&self) -> &str {
        self.analysis
            .as_ref()
            .and_then(|a| a.translated_title.as_deref())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedSource {
    pub source_name: String,
    pub kind: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub sources_attempted: usize,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub failed_sources: Vec<FailedSource>,
    pub stories_fetched: usize,
    pub stories_deduplicated: usize,
    pub duplicates_merged: usize,
    pub stories_trimmed: usize,
    pub stories_analyzed: usize,
    pub stories_failed: usize,
    pub analysis_batches: usize,
    pub analysis_batches_failed: usize,
    pub partial_failure: bool,
    pub budget_exceeded: bool,
    pub elapsed_ms: u64,
}

/// Single in-memory handoff from the pipeline to whatever renders it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub language: TargetLanguage,
    pub stories: Vec<Story>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    pub fn by_category(&self) -> BTreeMap<Category, Vec<&Story>> {
        let mut grouped: BTreeMap<Category, Vec<&Story>> = BTreeMap::new();
        for story in &self.stories {
            grouped.entry(story.category).or_default().push(story);
        }
        grouped
    }
}
