use std::ffi::OsString;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ReelError, Result};

use super::runner::{Tool, TranscodeRunner};

/// Container-level metadata reported by FFprobe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub duration: Option<f64>,
    pub format_name: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    format_name: Option<String>,
}

/// Parse `ffprobe -of json -show_entries format=...` output.
pub fn parse_probe_output(stdout: &str) -> Result<MediaInfo> {
    let parsed: ProbeOutput = serde_json::from_str(stdout)?;
    let format = match parsed.format {
        Some(format) => format,
        None => return Ok(MediaInfo::default()),
    };

    let duration = format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(MediaInfo {
        duration,
        format_name: format.format_name,
    })
}

/// Query duration and container format of a media file.
pub async fn probe(runner: &dyn TranscodeRunner, path: &Path) -> Result<MediaInfo> {
    let mut args: Vec<OsString> = [
        "-v",
        "error",
        "-show_entries",
        "format=duration,format_name",
        "-of",
        "json",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(path.as_os_str().to_os_string());

    let result = runner
        .run(Tool::Ffprobe, &args)
        .await
        .map_err(|e| ReelError::transcode(format!("Probe of {}: {e}", path.display()), ""))?;

    if !result.success() {
        return Err(ReelError::transcode(
            format!("Probe of {}: ffprobe {}", path.display(), result.describe_exit()),
            &result.stderr,
        ));
    }

    let info = parse_probe_output(&result.stdout)?;
    debug!("Probed {:?}: {:?}", path, info);
    Ok(info)
}

/// Check that both FFmpeg and FFprobe can be executed.
pub async fn check_tools(runner: &dyn TranscodeRunner) -> Result<()> {
    for tool in [Tool::Ffmpeg, Tool::Ffprobe] {
        let result = runner
            .run(tool, &[OsString::from("-version")])
            .await
            .map_err(|e| {
                ReelError::Config(format!(
                    "{e}. Install FFmpeg with: brew install ffmpeg (macOS) or apt install ffmpeg (Linux)"
                ))
            })?;

        if !result.success() {
            return Err(ReelError::Config(format!(
                "{tool} -version failed with {}",
                result.describe_exit()
            )));
        }
        debug!("{} is available", tool);
    }
    Ok(())
}
