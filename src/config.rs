use crate::detect::gemini::DEFAULT_MODEL;
use crate::error::{ReelError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Maximum total duration of the reel, in seconds.
    pub budget_seconds: f64,
    /// Shortest clip worth keeping when the last segment is truncated.
    pub min_clip_seconds: f64,
    /// Number of clips extracted in parallel.
    pub concurrency: usize,
    pub tool_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Where finished reels are placed when the caller gives no directory.
    pub output_dir: Option<PathBuf>,
    /// Parent directory for per-run workspaces.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            budget_seconds: 15.0,
            min_clip_seconds: 1.0,
            concurrency: 2,
            tool_timeout_secs: 300,
            fetch_timeout_secs: 600,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            output_dir: None,
            scratch_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                match toml::from_str::<Config>(&contents) {
                    Ok(file_config) => config = file_config,
                    Err(e) => warn!("Ignoring invalid config file {:?}: {}", config_path, e),
                }
            }
        }

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override fields from environment variables, looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Some(model) = var("PEAKREEL_MODEL") {
            self.gemini_model = model;
        }
        if let Some(budget) = var("PEAKREEL_BUDGET_SECONDS").and_then(|v| v.parse().ok()) {
            self.budget_seconds = budget;
        }
        if let Some(min_clip) = var("PEAKREEL_MIN_CLIP_SECONDS").and_then(|v| v.parse().ok()) {
            self.min_clip_seconds = min_clip;
        }
        if let Some(concurrency) = var("PEAKREEL_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.concurrency = concurrency;
        }
        if let Some(timeout) = var("PEAKREEL_TOOL_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.tool_timeout_secs = timeout;
        }
        if let Some(dir) = var("PEAKREEL_OUTPUT_DIR") {
            self.output_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gemini_api_key.is_none() {
            return Err(ReelError::Config(
                "GEMINI_API_KEY not set. Get one at https://aistudio.google.com/apikey".to_string(),
            ));
        }

        if !(self.budget_seconds.is_finite() && self.budget_seconds > 0.0) {
            return Err(ReelError::Config(format!(
                "Budget must be a positive number of seconds, got {}",
                self.budget_seconds
            )));
        }

        if !(self.min_clip_seconds.is_finite() && self.min_clip_seconds >= 0.0) {
            return Err(ReelError::Config(format!(
                "Minimum clip length must not be negative, got {}",
                self.min_clip_seconds
            )));
        }

        if self.min_clip_seconds > self.budget_seconds {
            return Err(ReelError::Config(format!(
                "Minimum clip length ({}s) exceeds the budget ({}s)",
                self.min_clip_seconds, self.budget_seconds
            )));
        }

        if self.concurrency == 0 {
            return Err(ReelError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.tool_timeout_secs == 0 || self.fetch_timeout_secs == 0 {
            return Err(ReelError::Config(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("peakreel").join("config.toml"))
    }
}
