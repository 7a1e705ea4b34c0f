use std::ffi::OsString;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ReelError, Result};
use crate::segment::{ExtractedClip, HighlightReel};

use super::runner::{Tool, TranscodeRunner};

/// Build an FFmpeg concat demuxer manifest, one `file '<path>'` line per clip.
pub fn create_concat_manifest(clips: &[ExtractedClip]) -> String {
    clips
        .iter()
        .map(|clip| {
            let path = clip.path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{path}'\n")
        })
        .collect()
}

fn concat_args(manifest: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(manifest.as_os_str().to_os_string());
    args.extend(["-c", "copy", "-movflags", "+faststart"].iter().map(OsString::from));
    args.push(output.as_os_str().to_os_string());
    args
}

/// Join clips, in the order given, into `output`.
///
/// The manifest is written to `manifest`; callers own both paths.
pub async fn concatenate(
    runner: &dyn TranscodeRunner,
    clips: &[ExtractedClip],
    manifest: &Path,
    output: &Path,
) -> Result<HighlightReel> {
    if clips.is_empty() {
        return Err(ReelError::concatenation("No clips to join", ""));
    }

    for clip in clips {
        if !clip.path.exists() {
            return Err(ReelError::concatenation(
                format!("Clip {} missing at {}", clip.index, clip.path.display()),
                "",
            ));
        }
    }

    let manifest_content = create_concat_manifest(clips);
    tokio::fs::write(manifest, &manifest_content).await.map_err(|e| {
        ReelError::concatenation(format!("Failed to write manifest {}: {e}", manifest.display()), "")
    })?;
    debug!("Concat manifest ({} clips): {:?}", clips.len(), manifest);

    let result = runner
        .run(Tool::Ffmpeg, &concat_args(manifest, output))
        .await
        .map_err(|e| ReelError::concatenation(e.to_string(), ""))?;

    if !result.success() {
        return Err(ReelError::concatenation(
            format!("ffmpeg {}", result.describe_exit()),
            &result.stderr,
        ));
    }

    let size_bytes = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
    if size_bytes == 0 {
        return Err(ReelError::concatenation(
            format!("Output {} missing or empty", output.display()),
            &result.stderr,
        ));
    }

    info!("Joined {} clips into {:?} ({} bytes)", clips.len(), output, size_bytes);

    Ok(HighlightReel {
        path: output.to_path_buf(),
        size_bytes,
        clip_count: clips.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::runner::{ToolError, ToolOutput};
    use crate::segment::TimeSegment;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records the manifest it was given and writes the output file.
    struct RecordingRunner {
        manifest: Mutex<Option<String>>,
        exit_code: i32,
    }

    impl RecordingRunner {
        fn new(exit_code: i32) -> Self {
            Self {
                manifest: Mutex::new(None),
                exit_code,
            }
        }
    }

    #[async_trait]
    impl TranscodeRunner for RecordingRunner {
        async fn run(&self, _tool: Tool, args: &[OsString]) -> std::result::Result<ToolOutput, ToolError> {
            let input = args.iter().position(|a| a == "-i").unwrap();
            let manifest = std::fs::read_to_string(&args[input + 1]).unwrap();
            *self.manifest.lock().unwrap() = Some(manifest);

            if self.exit_code == 0 {
                std::fs::write(PathBuf::from(args.last().unwrap()), b"reel").unwrap();
            }
            Ok(ToolOutput {
                exit_code: Some(self.exit_code),
                stdout: String::new(),
                stderr: "concat error".to_string(),
            })
        }
    }

    fn clip(dir: &Path, name: &str, index: usize) -> ExtractedClip {
        let path = dir.join(name);
        std::fs::write(&path, b"clip").unwrap();
        ExtractedClip {
            path,
            segment: TimeSegment::new(index as f64, index as f64 + 1.0).unwrap(),
            index,
        }
    }

    #[test]
    fn test_manifest_preserves_order_and_escapes_quotes() {
        let clips = vec![
            ExtractedClip {
                path: PathBuf::from("/tmp/b.mp4"),
                segment: TimeSegment::new(0.0, 1.0).unwrap(),
                index: 0,
            },
            ExtractedClip {
                path: PathBuf::from("/tmp/it's.mp4"),
                segment: TimeSegment::new(5.0, 6.0).unwrap(),
                index: 1,
            },
        ];
        let manifest = create_concat_manifest(&clips);
        let lines: Vec<&str> = manifest.lines().collect();

        assert_eq!(lines, vec!["file '/tmp/b.mp4'", r"file '/tmp/it'\''s.mp4'"]);
    }

    #[tokio::test]
    async fn test_concatenate_success() {
        let dir = TempDir::new().unwrap();
        let clips = vec![clip(dir.path(), "z.mp4", 0), clip(dir.path(), "a.mp4", 1)];
        let runner = RecordingRunner::new(0);
        let output = dir.path().join("reel.mp4");

        let reel = concatenate(&runner, &clips, &dir.path().join("list.txt"), &output)
            .await
            .unwrap();

        assert_eq!(reel.path, output);
        assert_eq!(reel.clip_count, 2);
        assert_eq!(reel.size_bytes, 4);

        let manifest = runner.manifest.lock().unwrap().clone().unwrap();
        let z = manifest.find("z.mp4").unwrap();
        let a = manifest.find("a.mp4").unwrap();
        assert!(z < a, "clips must keep the given order");
    }

    #[tokio::test]
    async fn test_concatenate_missing_clip() {
        let dir = TempDir::new().unwrap();
        let mut clips = vec![clip(dir.path(), "a.mp4", 0)];
        clips.push(ExtractedClip {
            path: dir.path().join("gone.mp4"),
            segment: TimeSegment::new(1.0, 2.0).unwrap(),
            index: 1,
        });
        let runner = RecordingRunner::new(0);

        let result = concatenate(
            &runner,
            &clips,
            &dir.path().join("list.txt"),
            &dir.path().join("reel.mp4"),
        )
        .await;

        assert!(matches!(result, Err(ReelError::Concatenation { .. })));
        assert!(runner.manifest.lock().unwrap().is_none(), "tool must not run");
    }

    #[tokio::test]
    async fn test_concatenate_nonzero_exit() {
        let dir = TempDir::new().unwrap();
        let clips = vec![clip(dir.path(), "a.mp4", 0)];
        let runner = RecordingRunner::new(1);

        let result = concatenate(
            &runner,
            &clips,
            &dir.path().join("list.txt"),
            &dir.path().join("reel.mp4"),
        )
        .await;

        match result {
            Err(ReelError::Concatenation { diagnostics, .. }) => {
                assert_eq!(diagnostics, "concat error")
            }
            other => panic!("Expected Concatenation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concatenate_empty_clip_list() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new(0);
        let result = concatenate(
            &runner,
            &[],
            &dir.path().join("list.txt"),
            &dir.path().join("reel.mp4"),
        )
        .await;
        assert!(matches!(result, Err(ReelError::Concatenation { .. })));
    }
}
