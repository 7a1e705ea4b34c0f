use crate::allocate::{allocate, clamp_to_source};
use crate::config::Config;
use crate::detect::{GeminiClient, MomentDetector};
use crate::error::{ReelError, Result};
use crate::fetch::SourceFetcher;
use crate::media::{concatenate, extract_clip, probe, ProcessRunner, TranscodeRunner};
use crate::segment::{ExtractedClip, HighlightPlan, SourceAsset};
use crate::workspace::Workspace;
use console::style;
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for the highlight pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum total reel duration in seconds.
    pub budget_seconds: f64,
    /// Shortest truncated clip worth keeping.
    pub min_clip_seconds: f64,
    /// Number of clips extracted in parallel.
    pub concurrency: usize,
    /// Default directory for finished reels.
    pub output_dir: Option<PathBuf>,
    /// Parent directory for run workspaces.
    pub scratch_dir: Option<PathBuf>,
    /// Show progress spinners.
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            budget_seconds: 15.0,
            min_clip_seconds: 1.0,
            concurrency: 2,
            output_dir: None,
            scratch_dir: None,
            show_progress: true,
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            budget_seconds: config.budget_seconds,
            min_clip_seconds: config.min_clip_seconds,
            concurrency: config.concurrency,
            output_dir: config.output_dir.clone(),
            scratch_dir: config.scratch_dir.clone(),
            show_progress: true,
        }
    }
}

/// Stages of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Fetching,
    Detecting,
    Allocating,
    Extracting,
    Concatenating,
    Finalizing,
    Done,
}

impl PipelineStage {
    /// Position among the working stages, 1-based.
    fn number(self) -> usize {
        self as usize + 1
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Fetching => "fetching",
            PipelineStage::Detecting => "detecting",
            PipelineStage::Allocating => "allocating",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Concatenating => "concatenating",
            PipelineStage::Finalizing => "finalizing",
            PipelineStage::Done => "done",
        };
        write!(f, "{name}")
    }
}

const WORKING_STAGES: usize = 6;

/// Statistics from a highlight run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub fetch_time: Duration,
    pub detection_time: Duration,
    pub extraction_time: Duration,
    pub concat_time: Duration,
    /// Proposals returned by the detector.
    pub proposals: usize,
    pub planned_segments: usize,
    pub truncated_segments: usize,
    /// Sum of planned segment durations, in seconds.
    pub reel_duration: f64,
    pub source_duration: Option<f64>,
    pub source_bytes: u64,
    pub reel_bytes: u64,
}

/// Result of a successful run.
#[derive(Debug)]
pub struct PipelineResult {
    pub run_id: Uuid,
    /// Final location of the reel, outside the workspace.
    pub output_path: PathBuf,
    pub plan: HighlightPlan,
    pub stats: PipelineStats,
}

/// Turns a source video URL into a highlight reel.
///
/// Every run gets its own workspace, so one pipeline can serve many concurrent
/// runs.
pub struct HighlightPipeline {
    fetcher: SourceFetcher,
    detector: MomentDetector,
    runner: Arc<dyn TranscodeRunner>,
    config: PipelineConfig,
}

impl HighlightPipeline {
    pub fn new(
        fetcher: SourceFetcher,
        detector: MomentDetector,
        runner: Arc<dyn TranscodeRunner>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            fetcher,
            detector,
            runner,
            config,
        }
    }

    /// Build a pipeline backed by Gemini and the local FFmpeg install.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.gemini_api_key.as_ref().ok_or_else(|| {
            ReelError::Config(
                "Gemini API key not set. Set GEMINI_API_KEY environment variable.".to_string(),
            )
        })?;

        let service = GeminiClient::new(api_key.clone()).with_model(config.gemini_model.clone());
        let runner = ProcessRunner::new()
            .with_binaries(config.ffmpeg_path.clone(), config.ffprobe_path.clone())
            .with_timeout(config.tool_timeout());

        Ok(Self::new(
            SourceFetcher::new().with_timeout(config.fetch_timeout()),
            MomentDetector::new(Arc::new(service), config.budget_seconds),
            Arc::new(runner),
            PipelineConfig::from(config),
        ))
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    pub fn runner(&self) -> &dyn TranscodeRunner {
        self.runner.as_ref()
    }

    /// Produce a highlight reel for `source_url`.
    ///
    /// The reel is written to `output_dir` (default: the configured output
    /// directory, else the system temp dir) as `output_filename` (default
    /// `highlight-<run id>.mp4`). The workspace is removed before this returns,
    /// whether the run succeeded or not.
    pub async fn run(
        &self,
        source_url: &str,
        output_dir: Option<&Path>,
        output_filename: Option<&str>,
    ) -> Result<PipelineResult> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.run_with_cancel(source_url, output_dir, output_filename, cancelled)
            .await
    }

    /// Produce a highlight reel, checking `cancelled` between stages.
    pub async fn run_with_cancel(
        &self,
        source_url: &str,
        output_dir: Option<&Path>,
        output_filename: Option<&str>,
        cancelled: Arc<AtomicBool>,
    ) -> Result<PipelineResult> {
        let mut workspace = match &self.config.scratch_dir {
            Some(dir) => Workspace::open_in(dir)?,
            None => Workspace::open()?,
        };
        let run_id = workspace.id();
        info!("Run {} started for {}", run_id, source_url);

        let mut run = RunState {
            stage: PipelineStage::Fetching,
            cancelled,
        };
        let result = self
            .execute(&mut run, &mut workspace, source_url, output_dir, output_filename)
            .await;

        if let Err(e) = workspace.cleanup() {
            warn!("Run {} cleanup failed: {}", run_id, e);
        }

        match &result {
            Ok(result) => info!("Run {} done: {:?}", run_id, result.output_path),
            Err(e) => error!("Run {} failed while {}: {}", run_id, run.stage, e),
        }

        result
    }

    async fn execute(
        &self,
        run: &mut RunState,
        workspace: &mut Workspace,
        source_url: &str,
        output_dir: Option<&Path>,
        output_filename: Option<&str>,
    ) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let mut stats = PipelineStats::default();

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 1: Fetch the source
        // ═══════════════════════════════════════════════════════════════════════
        run.enter(PipelineStage::Fetching)?;
        let stage_start = Instant::now();
        let pb = self.spinner("Fetching source...");

        let mut source = self.fetcher.fetch(source_url, workspace).await?;
        self.probe_source(&mut source).await;

        finish(pb, format!("✓ Fetched source ({} bytes)", source.size_bytes));
        stats.fetch_time = stage_start.elapsed();
        stats.source_bytes = source.size_bytes;
        stats.source_duration = source.duration;

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 2: Detect moments
        // ═══════════════════════════════════════════════════════════════════════
        run.enter(PipelineStage::Detecting)?;
        let stage_start = Instant::now();
        let pb = self.spinner("Detecting peak moments...");

        let proposals = self.detector.detect(&source.path).await?;

        finish(pb, format!("✓ {} moments proposed", proposals.len()));
        stats.detection_time = stage_start.elapsed();
        stats.proposals = proposals.len();

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 3: Pack proposals into the budget
        // ═══════════════════════════════════════════════════════════════════════
        run.enter(PipelineStage::Allocating)?;

        let proposals = match source.duration {
            Some(duration) => clamp_to_source(proposals, duration),
            None => proposals,
        };
        let plan = allocate(
            &proposals,
            self.config.budget_seconds,
            self.config.min_clip_seconds,
        );

        if plan.is_empty() {
            return Err(ReelError::NoHighlights(if stats.proposals == 0 {
                "detector returned no usable segments".to_string()
            } else {
                format!(
                    "none of {} proposals fit a {:.1}s budget",
                    stats.proposals, self.config.budget_seconds
                )
            }));
        }

        info!(
            "Planned {} segments ({:.2}s of {:.2}s budget, {} truncated)",
            plan.len(),
            plan.total_duration(),
            self.config.budget_seconds,
            plan.truncated_count()
        );
        stats.planned_segments = plan.len();
        stats.truncated_segments = plan.truncated_count();
        stats.reel_duration = plan.total_duration();

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 4: Extract clips
        // ═══════════════════════════════════════════════════════════════════════
        run.enter(PipelineStage::Extracting)?;
        let stage_start = Instant::now();

        let clips = self.extract_all(workspace, &source, &plan).await?;
        stats.extraction_time = stage_start.elapsed();

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 5: Join clips
        // ═══════════════════════════════════════════════════════════════════════
        run.enter(PipelineStage::Concatenating)?;
        let stage_start = Instant::now();
        let pb = self.spinner("Joining clips...");

        let manifest = workspace.file_path("concat", "txt");
        let reel_path = workspace.file_path("reel", "mp4");
        let reel = concatenate(self.runner.as_ref(), &clips, &manifest, &reel_path).await?;

        for clip in &clips {
            if let Err(e) = fs::remove_file(&clip.path).await {
                debug!("Could not remove clip {:?}: {}", clip.path, e);
            }
        }

        finish(pb, format!("✓ Joined {} clips", reel.clip_count));
        stats.concat_time = stage_start.elapsed();
        stats.reel_bytes = reel.size_bytes;

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 6: Move the reel out of the workspace
        // ═══════════════════════════════════════════════════════════════════════
        run.enter(PipelineStage::Finalizing)?;

        let destination = self.destination(output_dir, output_filename, workspace.id());
        move_file(&reel.path, &destination).await?;
        info!("Reel written to {:?}", destination);

        run.stage = PipelineStage::Done;
        stats.total_time = start_time.elapsed();

        Ok(PipelineResult {
            run_id: workspace.id(),
            output_path: destination,
            plan,
            stats,
        })
    }

    /// Record the source duration; probe failures only cost the clamp step.
    async fn probe_source(&self, source: &mut SourceAsset) {
        match probe(self.runner.as_ref(), &source.path).await {
            Ok(info) => {
                debug!(
                    "Source format {:?}, duration {:?}",
                    info.format_name, info.duration
                );
                source.duration = info.duration;
            }
            Err(e) => warn!("Could not probe source: {}", e),
        }
    }

    /// Extract every planned segment, returning clips in plan order.
    ///
    /// The first failure aborts the extractions still running.
    async fn extract_all(
        &self,
        workspace: &mut Workspace,
        source: &SourceAsset,
        plan: &HighlightPlan,
    ) -> Result<Vec<ExtractedClip>> {
        let jobs: Vec<_> = plan
            .time_segments()
            .enumerate()
            .map(|(index, segment)| {
                let output = workspace.file_path(&format!("clip-{index:02}"), "mp4");
                (index, segment, output)
            })
            .collect();
        let total = jobs.len();

        info!(
            "Extracting {} clips (concurrency: {})",
            total, self.config.concurrency
        );

        let progress_bar = if self.config.show_progress {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} clips")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        // Use semaphore to limit concurrency
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut futures = FuturesUnordered::new();

        for (index, segment, output) in jobs {
            let sem = semaphore.clone();
            let runner = self.runner.clone();
            let source_path = source.path.clone();
            let pb = progress_bar.clone();

            futures.push(async move {
                let _permit = sem
                    .acquire()
                    .await
                    .map_err(|_| ReelError::transcode("Extraction pool closed", ""))?;

                let clip = extract_clip(runner.as_ref(), &source_path, segment, index, &output).await;
                if let Some(ref pb) = pb {
                    pb.inc(1);
                }
                clip
            });
        }

        let mut clips = Vec::with_capacity(total);
        while let Some(result) = futures.next().await {
            match result {
                Ok(clip) => clips.push(clip),
                Err(e) => {
                    if let Some(pb) = &progress_bar {
                        pb.abandon_with_message("Extraction failed");
                    }
                    warn!(
                        "Extraction failed, abandoning {} remaining clips",
                        total - clips.len() - 1
                    );
                    return Err(e);
                }
            }
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Extraction complete");
        }

        // Completion order is arbitrary; the reel follows the plan.
        clips.sort_by_key(|c| c.index);
        Ok(clips)
    }

    fn destination(&self, output_dir: Option<&Path>, filename: Option<&str>, run_id: Uuid) -> PathBuf {
        let dir = output_dir
            .map(Path::to_path_buf)
            .or_else(|| self.config.output_dir.clone())
            .unwrap_or_else(std::env::temp_dir);

        // Only the final component is honored so the reel stays inside `dir`.
        let name = filename
            .and_then(|f| Path::new(f).file_name())
            .map(|f| f.to_os_string())
            .unwrap_or_else(|| format!("highlight-{}.mp4", run_id.simple()).into());

        dir.join(name)
    }

    fn spinner(&self, message: &'static str) -> Option<ProgressBar> {
        if !self.config.show_progress {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    }
}

/// Progress of one run through the stages.
struct RunState {
    stage: PipelineStage,
    cancelled: Arc<AtomicBool>,
}

impl RunState {
    fn enter(&mut self, next: PipelineStage) -> Result<()> {
        debug_assert!(next >= self.stage, "stages only move forward");
        self.stage = next;

        if self.cancelled.load(Ordering::Relaxed) {
            return Err(ReelError::Cancelled);
        }

        info!("Stage {}/{}: {}", next.number(), WORKING_STAGES, next);
        Ok(())
    }
}

fn finish(pb: Option<ProgressBar>, message: String) {
    if let Some(pb) = pb {
        pb.finish_with_message(message);
    }
}

/// Move `from` to `to`, copying when a rename is not possible.
///
/// A failed copy removes a partial file at `to`, but never one that was
/// already there.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    if let Err(e) = fs::rename(from, to).await {
        debug!("Rename to {:?} failed ({}), copying", to, e);
        let existed = fs::try_exists(to).await.unwrap_or(true);
        if let Err(e) = fs::copy(from, to).await {
            if !existed {
                let _ = fs::remove_file(to).await;
            }
            return Err(ReelError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write reel to {}: {e}", to.display()),
            )));
        }
    }

    Ok(())
}

/// Print a summary of the pipeline results.
pub fn print_summary(result: &PipelineResult) {
    let stats = &result.stats;

    println!();
    println!("{}", style("═══════════════════════════════════════════════════════════════").cyan());
    println!("{}", style("                    Highlight Reel Complete                     ").cyan().bold());
    println!("{}", style("═══════════════════════════════════════════════════════════════").cyan());
    println!();
    println!("  Output:     {}", style(result.output_path.display()).green());
    println!(
        "  Reel:       {:.1}s from {} clips ({} truncated)",
        stats.reel_duration, stats.planned_segments, stats.truncated_segments
    );
    println!("  Proposals:  {}", stats.proposals);
    if let Some(duration) = stats.source_duration {
        println!("  Source:     {:.1}s, {} bytes", duration, stats.source_bytes);
    }
    println!();
    println!("  Segments:");
    for planned in &result.plan.segments {
        let marker = if planned.truncated { " (truncated)" } else { "" };
        println!("    #{} {}{}", planned.rank + 1, planned.segment, marker);
    }
    println!();
    println!("  Timing:");
    println!("    Fetch:       {:.2}s", stats.fetch_time.as_secs_f64());
    println!("    Detect:      {:.2}s", stats.detection_time.as_secs_f64());
    println!("    Extract:     {:.2}s", stats.extraction_time.as_secs_f64());
    println!("    Join:        {:.2}s", stats.concat_time.as_secs_f64());
    println!("    Total:       {:.2}s", stats.total_time.as_secs_f64());
    println!();
    println!("{}", style("═══════════════════════════════════════════════════════════════").cyan());
}
