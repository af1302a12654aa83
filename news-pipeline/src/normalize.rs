use crate::types::{RawEntry, SourceDescriptor, Story};
use crate::utils::{is_stop_word, text::smart_truncate};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};
use url::Url;

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]*>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Decode entities, strip tags, collapse whitespace.
pub fn clean_text(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    // Feeds sometimes double-escape, so decode once more after stripping
    let decoded = html_escape::decode_html_entities(&stripped);
    RE_WS.replace_all(&decoded, " ").trim().to_string()
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF     // kana
        | 0x3400..=0x4DBF   // CJK ext A
        | 0x4E00..=0x9FFF   // CJK unified
        | 0xAC00..=0xD7AF   // hangul
        | 0xF900..=0xFAFF)
}

/// Lower-cased title with punctuation folded to spaces.
pub fn fold_title(title: &str) -> String {
    let folded: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    RE_WS.replace_all(&folded, " ").trim().to_string()
}

fn split_tokens(folded: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in folded.split_whitespace() {
        let mut latin = String::new();
        for c in word.chars() {
            if is_cjk(c) {
                if !latin.is_empty() {
                    tokens.push(std::mem::take(&mut latin));
                }
                tokens.push(c.to_string());
            } else {
                latin.push(c);
            }
        }
        if !latin.is_empty() {
            tokens.push(latin);
        }
    }
    tokens
}

/// Order-insensitive token set of a title. Stop words are dropped unless
/// that would leave nothing.
pub fn title_shingles(title: &str) -> BTreeSet<String> {
    let tokens = split_tokens(&fold_title(title));
    let filtered: BTreeSet<String> = tokens
        .iter()
        .filter(|t| !is_stop_word(t))
        .cloned()
        .collect();
    if filtered.is_empty() {
        tokens.into_iter().collect()
    } else {
        filtered
    }
}

pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Resolve a possibly relative link against the feed URL.
pub fn resolve_link(base: &str, link: &str) -> String {
    let link = link.trim();
    if link.is_empty() {
        return String::new();
    }
    if let Ok(absolute) = Url::parse(link) {
        return absolute.to_string();
    }
    match Url::parse(base).and_then(|b| b.join(link)) {
        Ok(resolved) => resolved.to_string(),
        Err(e) => {
            debug!("Could not resolve link {} against {}: {}", link, base, e);
            link.to_string()
        }
    }
}

/// Stable id over the folded title and the absolute link.
pub fn story_id(folded_title: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(folded_title.as_bytes());
    hasher.update(b"\n");
    hasher.update(link.as_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Maps raw feed entries onto the canonical `Story` shape.
pub struct Normalizer<'a> {
    sources: HashMap<&'a str, &'a SourceDescriptor>,
    max_summary_chars: usize,
}

impl<'a> Normalizer<'a> {
    pub fn new(sources: &'a [SourceDescriptor], max_summary_chars: usize) -> Self {
        Self {
            sources: sources.iter().map(|s| (s.name.as_str(), s)).collect(),
            max_summary_chars,
        }
    }

    /// Entries keep their input order, which becomes the fetch order used by
    /// dedup tie-breaks. Entries with no usable title are dropped.
    pub fn normalize(&self, entries: Vec<RawEntry>, fetched_at: DateTime<Utc>) -> Vec<Story> {
        let total = entries.len();
        let mut stories = Vec::with_capacity(total);

        for entry in entries {
            let source = match self.sources.get(entry.source_name.as_str()) {
                Some(source) => *source,
                None => {
                    warn!("Dropping entry from unknown source: {}", entry.source_name);
                    continue;
                }
            };

            let title = clean_text(&entry.title);
            let cluster_key = title_shingles(&title);
            if title.is_empty() || cluster_key.is_empty() {
                debug!("Dropping untitled entry from {}", source.name);
                continue;
            }

            let link = resolve_link(&source.url, &entry.link);
            let id = story_id(&fold_title(&title), &link);
            let raw_summary = smart_truncate(&clean_text(&entry.summary), self.max_summary_chars);
            let (published_at, published_estimated) = match entry.published_at {
                Some(ts) => (ts, false),
                None => (fetched_at, true),
            };

            let fetch_order = stories.len();
            stories.push(Story::new(
                id,
                title,
                link,
                source,
                published_at,
                published_estimated,
                raw_summary,
                cluster_key,
                fetch_order,
            ));
        }

        info!("Normalized {} of {} entries into stories", stories.len(), total);
        stories
    }
}
