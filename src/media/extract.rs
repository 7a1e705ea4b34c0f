use std::ffi::OsString;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ReelError, Result};
use crate::segment::{ExtractedClip, TimeSegment};

use super::runner::{Tool, TranscodeRunner};

/// Video frame rate every clip is normalized to.
pub const CLIP_FRAME_RATE: u32 = 30;

/// Audio sample rate every clip is normalized to.
pub const CLIP_SAMPLE_RATE: u32 = 48000;

/// Build the FFmpeg arguments to cut `segment` out of `source`.
///
/// Seeking happens on the input and the clip is fully re-encoded, so the cut is
/// frame-accurate and every clip shares one codec layout for stream-copy concat.
pub fn extract_args(source: &Path, segment: &TimeSegment, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |s: &str| args.push(OsString::from(s));

    push("-y");
    push("-hide_banner");
    push("-loglevel");
    push("error");
    push("-ss");
    push(&format!("{:.3}", segment.start()));
    push("-i");
    args.push(source.as_os_str().to_os_string());

    let rate = CLIP_FRAME_RATE.to_string();
    let sample_rate = CLIP_SAMPLE_RATE.to_string();
    let duration = format!("{:.3}", segment.duration());
    args.extend(
        [
            "-t",
            duration.as_str(),
            "-map",
            "0:v:0",
            "-map",
            "0:a:0?",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-crf",
            "20",
            "-pix_fmt",
            "yuv420p",
            "-r",
            rate.as_str(),
            "-c:a",
            "aac",
            "-b:a",
            "128k",
            "-ar",
            sample_rate.as_str(),
            "-ac",
            "2",
            "-avoid_negative_ts",
            "make_zero",
            "-movflags",
            "+faststart",
        ]
        .iter()
        .map(OsString::from),
    );
    args.push(output.as_os_str().to_os_string());
    args
}

/// Cut one planned segment out of the source into `output`.
pub async fn extract_clip(
    runner: &dyn TranscodeRunner,
    source: &Path,
    segment: TimeSegment,
    index: usize,
    output: &Path,
) -> Result<ExtractedClip> {
    if !source.exists() {
        return Err(ReelError::transcode(
            format!("Source file not found: {}", source.display()),
            "",
        ));
    }

    debug!("Extracting clip {} {} to {:?}", index, segment, output);

    let args = extract_args(source, &segment, output);
    let result = runner
        .run(Tool::Ffmpeg, &args)
        .await
        .map_err(|e| ReelError::transcode(format!("Clip {index}: {e}"), ""))?;

    if !result.success() {
        return Err(ReelError::transcode(
            format!("Clip {index} {segment}: ffmpeg {}", result.describe_exit()),
            &result.stderr,
        ));
    }

    let size = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        return Err(ReelError::transcode(
            format!("Clip {index} {segment}: output was not created"),
            &result.stderr,
        ));
    }

    info!("Extracted clip {} {} ({} bytes)", index, segment, size);

    Ok(ExtractedClip {
        path: output.to_path_buf(),
        segment,
        index,
    })
}
