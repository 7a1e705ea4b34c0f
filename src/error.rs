use thiserror::Error;

/// Number of trailing diagnostic lines kept from a failed tool invocation.
const DIAGNOSTIC_TAIL_LINES: usize = 20;

#[derive(Error, Debug)]
pub enum ReelError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Detection failed: {0}")]
    Detection(String),

    #[error("No usable highlights: {0}")]
    NoHighlights(String),

    #[error("Transcode failed: {message}{}", format_diagnostics(.diagnostics))]
    Transcode { message: String, diagnostics: String },

    #[error("Concatenation failed: {message}{}", format_diagnostics(.diagnostics))]
    Concatenation { message: String, diagnostics: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReelError {
    pub fn transcode(message: impl Into<String>, stderr: &str) -> Self {
        ReelError::Transcode {
            message: message.into(),
            diagnostics: tail(stderr),
        }
    }

    pub fn concatenation(message: impl Into<String>, stderr: &str) -> Self {
        ReelError::Concatenation {
            message: message.into(),
            diagnostics: tail(stderr),
        }
    }
}

fn tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let skip = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    lines[skip..].join("\n")
}

fn format_diagnostics(diagnostics: &str) -> String {
    if diagnostics.is_empty() {
        String::new()
    } else {
        format!("\n{diagnostics}")
    }
}

pub type Result<T> = std::result::Result<T, ReelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcode_keeps_stderr_tail() {
        let stderr: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let err = ReelError::transcode("ffmpeg exited with 1", &stderr);

        match &err {
            ReelError::Transcode { diagnostics, .. } => {
                assert_eq!(diagnostics.lines().count(), DIAGNOSTIC_TAIL_LINES);
                assert!(diagnostics.ends_with("line 49"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("Transcode failed: ffmpeg exited with 1\n"));
    }

    #[test]
    fn test_empty_diagnostics_not_rendered() {
        let err = ReelError::concatenation("missing clip", "");
        assert_eq!(err.to_string(), "Concatenation failed: missing clip");
    }
}
