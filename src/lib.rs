pub mod allocate;
pub mod config;
pub mod detect;
pub mod error;
pub mod fetch;
pub mod media;
pub mod pipeline;
pub mod segment;
pub mod workspace;

pub use allocate::allocate;
pub use config::Config;
pub use error::{ReelError, Result};
pub use pipeline::{
    print_summary, HighlightPipeline, PipelineConfig, PipelineResult, PipelineStage, PipelineStats,
};
pub use segment::{HighlightPlan, SegmentProposal, TimeSegment};
pub use workspace::Workspace;
