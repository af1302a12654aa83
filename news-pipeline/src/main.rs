use anyhow::Context;
use clap::Parser;
use interfaces::{report_file_name, JsonRenderer, MarkdownRenderer, ReportRenderer};
use news_pipeline::{
    render_checks, stop_channel, valid_sources, verify_sources, Category, ChatCompletionsAdapter, DisabledAdapter,
    Fetcher, LlmAdapter, NewsPipeline, PipelineConfig, SourceRegistry, TargetLanguage,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

/// Fetch, deduplicate and analyze today's news into a dated briefing.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// API key for the chat-completions endpoint; without it every story is reported unanalyzed
    #[arg(long, env = "ZHIPU_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, default_value = "https://open.bigmodel.cn/api/paas/v4/chat/completions")]
    endpoint: String,

    #[arg(long, default_value = "glm-4-flash")]
    model: String,

    /// Output language: zh-CN, zh-TW, en, ja, ko
    #[arg(long, env = "TARGET_LANGUAGE", default_value = "zh-CN")]
    language: TargetLanguage,

    /// JSON file with an array of {name, url, category, weight}
    #[arg(long)]
    sources: Option<PathBuf>,

    /// Only fetch these categories (repeatable): tech, science, society, international, other
    #[arg(long = "category")]
    categories: Vec<Category>,

    /// Title similarity at or above which two stories are merged
    #[arg(long, default_value_t = 0.6)]
    threshold: f64,

    #[arg(long, default_value_t = 48)]
    recency_hours: i64,

    #[arg(long, default_value_t = 300)]
    run_budget_secs: u64,

    /// Write news_report_<date>.json and .md here instead of printing Markdown
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Check every source for a reachable, parsable feed and exit
    #[arg(long)]
    verify_sources: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt().with_env_filter(filter).with_target(false).init();

    let cli = Cli::parse();
    info!("Starting news pipeline ({} output)", cli.language);

    let registry = match &cli.sources {
        Some(path) => SourceRegistry::load(path)
            .await
            .with_context(|| format!("loading sources from {}", path.display()))?,
        None => SourceRegistry::builtin(),
    };
    let registry = registry.filtered(&cli.categories);
    anyhow::ensure!(!registry.is_empty(), "no sources configured for the selected categories");
    info!("Using {} sources", registry.len());

    let mut config = PipelineConfig::default();
    config.dedup.similarity_threshold = cli.threshold;
    config.fetch.recency_window_hours = cli.recency_hours;
    config.run_budget_seconds = cli.run_budget_secs;
    config.analysis.language = cli.language;
    config.analysis.endpoint = cli.endpoint.clone();
    config.analysis.model = cli.model.clone();
    config.analysis.api_key = cli.api_key.clone();
    config.validate().context("invalid configuration")?;

    let transport = Arc::new(Fetcher::new(config.fetch.clone()).context("building HTTP client")?);

    let (stop_handle, stop_signal) = stop_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with partial results");
            stop_handle.stop();
        }
    });

    if cli.verify_sources {
        let checks = verify_sources(transport.as_ref(), registry.sources(), &config.fetch, &stop_signal).await;
        print!("{}", render_checks(&checks));
        if let Some(dir) = &cli.output_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
            let path = dir.join("verified_sources.json");
            tokio::fs::write(&path, serde_json::to_string_pretty(&valid_sources(&checks))?)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote valid sources to {}", path.display());
        }
        return Ok(());
    }

    let adapter: Arc<dyn LlmAdapter> = match ChatCompletionsAdapter::new(&config.analysis) {
        Ok(adapter) => Arc::new(adapter),
        Err(e) => {
            warn!("AI analysis disabled: {}", e);
            Arc::new(DisabledAdapter)
        }
    };

    let mut pipeline = NewsPipeline::new(transport, adapter, config).with_stop_signal(stop_signal);
    let report = pipeline.run(registry.sources()).await;

    if report.summary.sources_succeeded == 0 {
        error!("No source could be fetched");
    }

    match &cli.output_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
            let renderers: [&dyn ReportRenderer; 2] = [&JsonRenderer, &MarkdownRenderer];
            for renderer in renderers {
                let path = dir.join(report_file_name(&report, renderer));
                let body = renderer.render(&report)?;
                tokio::fs::write(&path, body)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("Wrote {} report to {}", renderer.format_name(), path.display());
            }
        }
        None => println!("{}", MarkdownRenderer.render(&report)?),
    }

    Ok(())
}
