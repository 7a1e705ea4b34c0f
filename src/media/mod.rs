pub mod concat;
pub mod extract;
pub mod probe;
pub mod runner;

pub use concat::{concatenate, create_concat_manifest};
pub use extract::{extract_args, extract_clip};
pub use probe::{check_tools, parse_probe_output, probe, MediaInfo};
pub use runner::{ProcessRunner, Tool, ToolError, ToolOutput, TranscodeRunner};
