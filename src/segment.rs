use std::fmt;
use std::path::PathBuf;

/// A `[start, end)` interval inside the source video, in seconds.
///
/// Only constructible through [`TimeSegment::new`], which enforces
/// `0 <= start < end` with both bounds finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSegment {
    start: f64,
    end: f64,
}

impl TimeSegment {
    pub fn new(start: f64, end: f64) -> Option<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || start >= end {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Get the duration of this segment in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl fmt::Display for TimeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}s, {:.3}s]", self.start, self.end)
    }
}

/// A candidate moment returned by the detector.
///
/// `rank` is the position in the detector's output; lower ranks are packed first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentProposal {
    pub segment: TimeSegment,
    pub rank: usize,
}

impl SegmentProposal {
    /// Rank a list of segments by their order.
    pub fn ranked(segments: Vec<TimeSegment>) -> Vec<SegmentProposal> {
        segments
            .into_iter()
            .enumerate()
            .map(|(rank, segment)| SegmentProposal { segment, rank })
            .collect()
    }
}

/// A segment accepted into the plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedSegment {
    pub segment: TimeSegment,
    /// Rank of the proposal this segment came from.
    pub rank: usize,
    /// Whether the segment was shortened to fit the budget.
    pub truncated: bool,
}

/// Ordered segments selected for the reel, in selection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighlightPlan {
    pub segments: Vec<PlannedSegment>,
}

impl HighlightPlan {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.segment.duration()).sum()
    }

    pub fn truncated_count(&self) -> usize {
        self.segments.iter().filter(|s| s.truncated).count()
    }

    pub fn time_segments(&self) -> impl Iterator<Item = TimeSegment> + '_ {
        self.segments.iter().map(|s| s.segment)
    }
}

/// The fetched source video.
#[derive(Debug, Clone)]
pub struct SourceAsset {
    pub url: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Duration reported by the probe, if it succeeded.
    pub duration: Option<f64>,
}

/// A clip cut from the source for one planned segment.
#[derive(Debug, Clone)]
pub struct ExtractedClip {
    pub path: PathBuf,
    pub segment: TimeSegment,
    /// Position of the segment in the plan.
    pub index: usize,
}

/// The joined output file.
#[derive(Debug, Clone)]
pub struct HighlightReel {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub clip_count: usize,
}
