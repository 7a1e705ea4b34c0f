use tracing::debug;

use crate::segment::{HighlightPlan, PlannedSegment, SegmentProposal, TimeSegment};

/// Pack proposals into a plan whose total duration never exceeds `budget_seconds`.
///
/// Proposals are considered in the order given. A proposal that fits is taken
/// as-is. The first one that does not fit is shortened to the remaining budget
/// when at least `min_clip_seconds` remain, and the pass stops there either way.
pub fn allocate(
    proposals: &[SegmentProposal],
    budget_seconds: f64,
    min_clip_seconds: f64,
) -> HighlightPlan {
    let mut plan = HighlightPlan::default();
    let mut cumulative = 0.0;

    for proposal in proposals {
        let duration = proposal.segment.duration();

        if cumulative + duration <= budget_seconds {
            plan.segments.push(PlannedSegment {
                segment: proposal.segment,
                rank: proposal.rank,
                truncated: false,
            });
            cumulative += duration;
            continue;
        }

        let remaining = budget_seconds - cumulative;
        if remaining > 0.0 && remaining >= min_clip_seconds {
            if let Some(segment) = truncate_to_fit(proposal.segment, cumulative, budget_seconds) {
                debug!(
                    "Truncating proposal {} from {} to {}",
                    proposal.rank, proposal.segment, segment
                );
                plan.segments.push(PlannedSegment {
                    segment,
                    rank: proposal.rank,
                    truncated: true,
                });
            }
        } else {
            debug!(
                "Dropping proposal {} ({:.2}s) with {:.2}s of budget left",
                proposal.rank, duration, remaining
            );
        }
        break;
    }

    plan
}

/// Shorten `segment` so that `cumulative + duration` stays within the budget.
///
/// `start + remaining` can round up, so the end is stepped down one ulp at a
/// time until the sum fits exactly.
fn truncate_to_fit(segment: TimeSegment, cumulative: f64, budget_seconds: f64) -> Option<TimeSegment> {
    const MAX_STEPS: usize = 64;

    let start = segment.start();
    let mut end = start + (budget_seconds - cumulative);

    for _ in 0..MAX_STEPS {
        let candidate = TimeSegment::new(start, end)?;
        if cumulative + candidate.duration() <= budget_seconds {
            return Some(candidate);
        }
        end = next_down(end);
    }

    None
}

/// Largest `f64` below a positive finite `x`.
fn next_down(x: f64) -> f64 {
    f64::from_bits(x.to_bits() - 1)
}

/// Restrict proposals to the probed source duration.
///
/// Proposals starting at or after the end of the source are dropped; ends past
/// it are clamped. Ranks are kept so the allocator sees the detector's order.
pub fn clamp_to_source(proposals: Vec<SegmentProposal>, source_duration: f64) -> Vec<SegmentProposal> {
    proposals
        .into_iter()
        .filter_map(|p| {
            let end = p.segment.end().min(source_duration);
            match TimeSegment::new(p.segment.start(), end) {
                Some(segment) => Some(SegmentProposal {
                    segment,
                    rank: p.rank,
                }),
                None => {
                    debug!(
                        "Dropping proposal {} {} outside source ({:.2}s)",
                        p.rank, p.segment, source_duration
                    );
                    None
                }
            }
        })
        .collect()
}
