use anyhow::Result;

use crate::defs::{Category, RunReport, Story};

/// Turns a finished run into one output document.
pub trait ReportRenderer {
    fn format_name(&self) -> &'static str;
    fn file_extension(&self) -> &'static str;
    fn render(&self, report: &RunReport) -> Result<String>;
}

/// `news_report_<date>.<ext>`, one file per format per day.
pub fn report_file_name(report: &RunReport, renderer: &dyn ReportRenderer) -> String {
    format!("news_report_{}.{}", report.date.format("%Y-%m-%d"), renderer.file_extension())
}

pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn format_name(&self) -> &'static str {
        "json"
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, report: &RunReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

pub struct MarkdownRenderer;

impl ReportRenderer for MarkdownRenderer {
    fn format_name(&self) -> &'static str {
        "markdown"
    }

    fn file_extension(&self) -> &'static str {
        "md"
    }

    fn render(&self, report: &RunReport) -> Result<String> {
        let mut lines: Vec<String> = Vec::new();
        let summary = &report.summary;

        lines.push(format!("# Daily News Briefing - {}", report.date.format("%Y-%m-%d")));
        lines.push(format!(
            "**Generated**: {}",
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        lines.push(format!("**Stories**: {}", report.stories.len()));
        lines.push(format!(
            "**Sources**: {}/{} succeeded",
            summary.sources_succeeded, summary.sources_attempted
        ));
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());

        if report.is_empty() {
            lines.push("No news today.".to_string());
            lines.push(String::new());
            push_failed_sources(&mut lines, report);
            return Ok(lines.join("\n"));
        }

        let grouped = report.by_category();

        lines.push("## Overview".to_string());
        lines.push(String::new());
        for category in Category::ALL {
            let count = grouped.get(&category).map(|v| v.len()).unwrap_or(0);
            if count > 0 || category != Category::Other {
                lines.push(format!("- **{}**: {}", category.label(), count));
            }
        }
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());

        for (category, stories) in &grouped {
            lines.push(format!("## {}", category.label()));
            lines.push(String::new());
            for (index, story) in stories.iter().enumerate() {
                push_story(&mut lines, index + 1, story);
                lines.push(String::new());
            }
            lines.push("---".to_string());
            lines.push(String::new());
        }

        push_failed_sources(&mut lines, report);

        lines.push("## Disclaimer".to_string());
        lines.push(String::new());
        lines.push("This briefing is for reference only and is not investment advice.".to_string());
        lines.push(String::new());
        lines.push("*Generated automatically*".to_string());

        Ok(lines.join("\n"))
    }
}

fn push_story(lines: &mut Vec<String>, index: usize, story: &Story) {
    lines.push(format!("### {}. {}", index, story.display_title()));
    lines.push(String::new());

    match story.analysis() {
        Some(analysis) => {
            lines.push(format!("> **Core point**: {}", analysis.core_summary));
            lines.push(format!(
                "> **Investment value**: {}",
                analysis.investment_value.as_str()
            ));
            if let Some(signal) = analysis.fund_signal.as_deref().filter(|s| !s.is_empty()) {
                lines.push(format!("> **Fund signal**: {}", signal));
            }
            lines.push(format!("> **Developer impact**: {}", analysis.developer_impact));
            if let Some(score) = analysis.relevance_score {
                lines.push(format!("> **Relevance**: {}/10", score));
            }
            if !analysis.keywords.is_empty() {
                let tags = analysis
                    .keywords
                    .iter()
                    .take(5)
                    .map(|k| format!("`{}`", k))
                    .collect::<Vec<_>>()
                    .join(" ");
                lines.push(format!("> **Tags**: {}", tags));
            }
        }
        None => {
            lines.push("> *Analysis unavailable*".to_string());
            if !story.raw_summary.is_empty() {
                lines.push(format!("> {}", story.raw_summary));
            }
        }
    }

    if story.link.is_empty() {
        lines.push(format!("> **Source**: {}", story.source_name));
    } else {
        lines.push(format!("> **Source**: [{}]({})", story.source_name, story.link));
    }
    for alternate in &story.alternate_sources {
        lines.push(format!("> **Also reported by**: [{}]({})", alternate.source_name, alternate.link));
    }
}

fn push_failed_sources(lines: &mut Vec<String>, report: &RunReport) {
    if report.summary.failed_sources.is_empty() {
        return;
    }
    lines.push("## Unavailable sources".to_string());
    lines.push(String::new());
    for failed in &report.summary.failed_sources {
        lines.push(format!("- {} ({}): {}", failed.source_name, failed.kind, failed.reason));
    }
    lines.push(String::new());
}
