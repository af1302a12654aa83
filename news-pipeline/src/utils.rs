/// Check if a word is a common stop word
pub fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the" | "and" | "or" | "but" | "in" | "on" | "at" | "to" | "for" | "of" | "with" | "by" |
        "a" | "an" | "is" | "are" | "was" | "were" | "be" | "been" | "have" | "has" | "had" |
        "do" | "does" | "did" | "will" | "would" | "could" | "should" | "may" | "might" | "must" |
        "can" | "this" | "that" | "these" | "those" | "as" | "from" | "its" | "it" | "after" |
        "over" | "into" | "about" | "new" | "says" | "said"
    )
}

/// Text processing utilities
pub mod text {
    /// Truncate text to at most `max_chars` characters (ellipsis included), trying
    /// to break at a sentence or word boundary. Never splits a multi-byte character.
    pub fn smart_truncate(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }

        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        if let Some(last_sentence) = truncated.rfind(|c: char| c == '.' || c == '。') {
            let cut = last_sentence + truncated[last_sentence..].chars().next().map(char::len_utf8).unwrap_or(1);
            // Only keep the sentence cut when it doesn't throw away most of the text
            if cut > truncated.len() / 2 {
                return truncated[..cut].to_string();
            }
        }
        if let Some(last_space) = truncated.rfind(' ') {
            if last_space > truncated.len() / 2 {
                return format!("{}...", &truncated[..last_space]);
            }
        }
        format!("{}...", truncated)
    }

    /// Log-friendly preview of a model response or feed body.
    pub fn preview(text: &str, max_chars: usize) -> String {
        let count = text.chars().count();
        if count <= max_chars {
            text.to_string()
        } else {
            let head: String = text.chars().take(max_chars).collect();
            format!("{}…(+{} chars)", head, count - max_chars)
        }
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Extract host from URL
    pub fn extract_domain(url_str: &str) -> Option<String> {
        if let Ok(url) = Url::parse(url_str) {
            url.host_str().map(|d| d.to_string())
        } else {
            None
        }
    }

    /// Validate RSS feed URL format
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        if let Ok(url) = Url::parse(url_str) {
            (url.scheme() == "http" || url.scheme() == "https") && url.host_str().is_some()
        } else {
            false
        }
    }
}

/// Time utilities
pub mod time {
    use std::time::Duration;

    /// Format duration in human-readable form
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();

        if total_seconds < 1 {
            format!("{}ms", duration.as_millis())
        } else if total_seconds < 60 {
            format!("{:.1}s", duration.as_secs_f64())
        } else if total_seconds < 3600 {
            format!("{}m{}s", total_seconds / 60, total_seconds % 60)
        } else {
            format!("{}h{}m", total_seconds / 3600, (total_seconds % 3600) / 60)
        }
    }
}
