use crate::sources::builtin::default_sources;
use crate::types::{Category, PipelineError, Result, SourceDescriptor};
use crate::utils::url::is_valid_feed_url;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Static list of feed descriptors, validated once at startup.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self> {
        let mut names = HashSet::new();
        for source in &sources {
            if source.name.trim().is_empty() {
                return Err(PipelineError::Configuration(format!(
                    "source with url {} has no name",
                    source.url
                )));
            }
            if !names.insert(source.name.as_str()) {
                return Err(PipelineError::Configuration(format!(
                    "duplicate source name: {}",
                    source.name
                )));
            }
            if !is_valid_feed_url(&source.url) {
                return Err(PipelineError::Configuration(format!(
                    "invalid feed url for {}: {}",
                    source.name, source.url
                )));
            }
        }
        Ok(Self { sources })
    }

    /// Registry over the built-in feed list.
    pub fn builtin() -> Self {
        Self {
            sources: default_sources(),
        }
    }

    /// Parse a JSON array of descriptors.
    pub fn from_json(json: &str) -> Result<Self> {
        let sources: Vec<SourceDescriptor> = serde_json::from_str(json)?;
        Self::new(sources)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let registry = Self::from_json(&json)?;
        info!("Loaded {} sources from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn by_category(&self, category: Category) -> Vec<&SourceDescriptor> {
        self.sources.iter().filter(|s| s.category == category).collect()
    }

    /// Keep only the given categories; an empty filter keeps everything.
    pub fn filtered(&self, categories: &[Category]) -> Self {
        if categories.is_empty() {
            return self.clone();
        }
        Self {
            sources: self
                .sources
                .iter()
                .filter(|s| categories.contains(&s.category))
                .cloned()
                .collect(),
        }
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
