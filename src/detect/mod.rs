pub mod gemini;
pub mod parse;

pub use gemini::GeminiClient;
pub use parse::{parse_segments, ParseOutcome};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{ReelError, Result};
use crate::segment::SegmentProposal;

/// Raw video handed to a detection service.
#[derive(Debug, Clone)]
pub struct VideoPayload {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: String,
}

/// A content-understanding backend that answers an instruction about a video
/// with free-form text.
///
/// Transport, authentication, and service failures must be returned as
/// [`ReelError::Detection`].
#[async_trait]
pub trait DetectionService: Send + Sync {
    async fn generate(&self, instruction: &str, video: &VideoPayload) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Get the MIME type for a video file.
pub fn video_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        Some("3gp") => "video/3gpp",
        Some("flv") => "video/x-flv",
        _ => "video/mp4",
    }
}

/// Asks a detection service for peak moments and turns its answer into
/// ranked proposals.
pub struct MomentDetector {
    service: Arc<dyn DetectionService>,
    budget_seconds: f64,
}

impl MomentDetector {
    pub fn new(service: Arc<dyn DetectionService>, budget_seconds: f64) -> Self {
        Self {
            service,
            budget_seconds,
        }
    }

    /// Build the detection instruction.
    pub fn build_prompt(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str("Watch this video and find its most engaging moments.\n\n");
        prompt.push_str("Pick 3 to 5 high-engagement segments, each 2 to 4 seconds long.\n");
        prompt.push_str(&format!(
            "The combined duration of all segments must not exceed {:.1} seconds.\n",
            self.budget_seconds
        ));
        prompt.push_str("Order the segments from most to least engaging.\n\n");
        prompt.push_str("Respond with only a JSON array of [start, end] pairs in seconds, e.g.\n");
        prompt.push_str("[[12.0, 15.5], [42.0, 45.0]]\n");

        prompt
    }

    /// Propose segments for the video at `path`, in service order.
    ///
    /// An empty result means the service answered without usable segments.
    pub async fn detect(&self, path: &Path) -> Result<Vec<SegmentProposal>> {
        let bytes = fs::read(path).await.map_err(|e| {
            ReelError::Detection(format!("Failed to read {}: {e}", path.display()))
        })?;

        let video = VideoPayload {
            bytes,
            mime_type: video_mime_type(path),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "video.mp4".to_string()),
        };

        info!(
            "Requesting moments from {} ({} bytes, {})",
            self.service.name(),
            video.bytes.len(),
            video.mime_type
        );

        let response = self.service.generate(&self.build_prompt(), &video).await?;
        debug!("Detector response: {}", &response[..floor_char_boundary(&response, 500)]);

        let proposals = SegmentProposal::ranked(parse_segments(&response));
        info!("Detector proposed {} segments", proposals.len());

        Ok(proposals)
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
