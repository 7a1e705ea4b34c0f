use anyhow::{Context, Result};
use clap::Parser;
use peakreel::config::Config;
use peakreel::media::check_tools;
use peakreel::{print_summary, HighlightPipeline};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "peakreel")]
#[command(version, about = "Cut a highlight reel from a video's peak moments")]
#[command(long_about = "Ask Google Gemini for the most engaging moments of a video, pack them into a duration budget, and join them into one reel with FFmpeg.")]
struct Cli {
    /// Source video URL (http, https, file) or local path
    source: String,

    /// Directory for the finished reel (defaults to the configured output dir)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// File name for the finished reel
    #[arg(short = 'n', long)]
    filename: Option<String>,

    /// Maximum total reel duration in seconds
    #[arg(short, long)]
    budget: Option<f64>,

    /// Shortest clip kept when the last segment has to be truncated
    #[arg(short, long)]
    min_clip: Option<f64>,

    /// Number of clips extracted in parallel
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Disable progress spinners
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Load configuration, then let flags override it
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(budget) = cli.budget {
        config.budget_seconds = budget;
    }
    if let Some(min_clip) = cli.min_clip {
        config.min_clip_seconds = min_clip;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    config.validate().context("Configuration validation failed")?;

    let pipeline = HighlightPipeline::from_config(&config)
        .context("Failed to set up pipeline")?
        .with_progress(!cli.no_progress);

    check_tools(pipeline.runner())
        .await
        .context("FFmpeg is required")?;

    info!("Source:  {}", cli.source);
    info!(
        "Budget:  {:.1}s (min clip {:.1}s)",
        config.budget_seconds, config.min_clip_seconds
    );
    info!("Model:   {}", config.gemini_model);

    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping after the current stage");
        flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not install Ctrl+C handler: {}", e);
    }

    let result = pipeline
        .run_with_cancel(
            &cli.source,
            cli.output_dir.as_deref(),
            cli.filename.as_deref(),
            cancelled,
        )
        .await
        .context("Highlight generation failed")?;

    print_summary(&result);

    Ok(())
}
