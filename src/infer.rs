//! # Inference
//!
//! Turns raw chain latencies into cache topology. Two stages:
//!
//! 1. Sweep stride across powers of two, probing spans 1..=16 at each level
//!    and recording where latency jumps. A jump that persists across many
//!    stride scales is an associativity conflict: its span position is the
//!    number of ways, and the stride at which it vanishes going downward
//!    marks the footprint of one way. Footprint times ways gives the cache
//!    size; the smallest consistent candidate is the L1.
//! 2. With `(size, ways)` known, sweep a line-length candidate `L` and probe
//!    at stride `size/ways + L`. Once `L` reaches the real line size the
//!    chain nodes stop colliding in a single set and the first jump position
//!    moves out (or vanishes); the first `L` where that happens yields
//!    `line size = L * ways`.

use crate::ProbeError;
use crate::format_size;
use crate::probe::LatencySource;
use log::{debug, info};
use std::collections::BTreeSet;

/// Relative latency increase that counts as crossing a structural boundary
const JUMP_THRESHOLD: f64 = 0.10;

/// Smallest stride of the size/associativity sweep
const INITIAL_STRIDE: usize = 16;

/// Spans probed per stride level
const SPAN_SWEEP: usize = 16;

/// Once two consecutive levels agree at or beyond this stride, the
/// associativity signal is too coarse to still be a small-cache artifact
const STABLE_STRIDE: usize = 256 * 1024;

/// Largest auxiliary span probed per line-length candidate
const LINE_SPAN_LIMIT: usize = 1024;

/// The durable result of the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    /// Capacity in bytes
    pub size: usize,
    /// Ways per set
    pub associativity: usize,
    /// Line length in bytes
    pub line_size: usize,
}

/// Run both inference stages against a latency source.
pub fn characterize(
    source: &mut impl LatencySource,
    arena_size: usize,
) -> Result<CacheInfo, ProbeError> {
    let (size, associativity) = infer_size_associativity(source, arena_size)?;
    let line_size = infer_line_size(source, size, associativity)?;
    Ok(CacheInfo {
        size,
        associativity,
        line_size,
    })
}

/// Indices of samples that jumped by more than [`JUMP_THRESHOLD`] relative
/// to their predecessor. For a sweep over consecutive 1-based parameter
/// values, a returned index is exactly the parameter value immediately
/// preceding the jump, i.e. the last configuration still inside the
/// structural boundary. The first sample has no predecessor and never
/// jumps; decreases never jump.
pub fn jump_positions(samples: &[u64]) -> BTreeSet<usize> {
    let mut jumps = BTreeSet::new();
    for v in 1..samples.len() {
        let (prev, cur) = (samples[v - 1] as f64, samples[v] as f64);
        if cur > 0.0 && (cur - prev) / cur > JUMP_THRESHOLD {
            jumps.insert(v);
        }
    }
    jumps
}

/// Stage 1: minimal `(size, associativity)` consistent with the observed
/// jumps across stride scales.
pub fn infer_size_associativity(
    source: &mut impl LatencySource,
    arena_size: usize,
) -> Result<(usize, usize), ProbeError> {
    let (levels, final_stride) = sweep_stride_levels(source, arena_size)?;

    let mut candidates = combine_levels(&levels, final_stride);
    candidates.sort_unstable();
    let &(size, associativity) = candidates.first().ok_or(ProbeError::NoCacheCandidate)?;

    info!(
        "inferred cache size {} ({size} B), associativity {associativity}",
        format_size(size as u64)
    );
    Ok((size, associativity))
}

/// Probe spans 1..=[`SPAN_SWEEP`] at each power-of-two stride and collect
/// the jump set per level, in increasing-stride order. Stops early once the
/// jump set repeats at or beyond [`STABLE_STRIDE`] (the repeat level itself
/// is not recorded); always terminates at the `arena_size / 16` bound,
/// which also keeps every probed chain inside the arena. Returns the levels
/// and the stride value at termination, one doubling past the last
/// recorded level.
fn sweep_stride_levels(
    source: &mut impl LatencySource,
    arena_size: usize,
) -> Result<(Vec<BTreeSet<usize>>, usize), ProbeError> {
    let mut levels: Vec<BTreeSet<usize>> = Vec::new();
    let mut stride = INITIAL_STRIDE;

    while stride < arena_size / 16 {
        let samples: Vec<u64> = (1..=SPAN_SWEEP)
            .map(|span| source.latency_ns(stride, span))
            .collect();
        let jumps = jump_positions(&samples);
        debug!(
            "stride {}: jump positions {:?}",
            format_size(stride as u64),
            jumps
        );

        let unchanged = levels.last().is_none_or(|prev| *prev == jumps);
        if unchanged && stride >= STABLE_STRIDE {
            break;
        }
        levels.push(jumps);
        stride *= 2;
    }

    if levels.is_empty() {
        return Err(ProbeError::NoStrideLevels);
    }
    Ok((levels, stride))
}

/// Walk the recorded levels from largest stride down. The active set starts
/// as the final level's jump positions; when a position is absent from the
/// current level it disappeared on the way down. The tracking stride at that
/// moment is the stride of the previous, larger level, the last one where
/// the jump was present; stride times position gives the conflicting
/// footprint: a `(size, associativity)` candidate.
fn combine_levels(levels: &[BTreeSet<usize>], final_stride: usize) -> Vec<(usize, usize)> {
    let mut candidates = Vec::new();
    let Some(last) = levels.last() else {
        return candidates;
    };

    let mut active = last.clone();
    let mut stride = final_stride;
    for level in levels.iter().rev() {
        active.retain(|&pos| {
            if level.contains(&pos) {
                true
            } else {
                candidates.push((stride * pos, pos));
                false
            }
        });
        stride /= 2;
    }
    candidates
}

/// Stage 2: line size, given the inferred `(size, associativity)`.
///
/// For each candidate line length `L` the probe stride is one way-footprint
/// plus `L`, so consecutive nodes land `L` bytes apart in set-index terms.
/// Below the true line size they pile into few sets and the auxiliary span
/// sweep jumps early; at the true line size the nodes spread out and the
/// first jump position grows past the previous candidate's, or leaves the
/// observable span window entirely. Either signal accepts
/// `L * associativity`.
pub fn infer_line_size(
    source: &mut impl LatencySource,
    cache_size: usize,
    associativity: usize,
) -> Result<usize, ProbeError> {
    let way_size = cache_size / associativity;
    let mut previous_first_jump: Option<usize> = None;

    let mut line = 1;
    while line <= cache_size {
        let mut samples = Vec::new();
        let mut span = 1;
        while span <= LINE_SPAN_LIMIT {
            samples.push(source.latency_ns(way_size + line, span + 1));
            span *= 2;
        }
        // Sample index i holds span 2^i, so the first jumping index maps
        // back to the auxiliary span value that jumped.
        let first_jump = jump_positions(&samples).first().map(|&idx| 1usize << idx);
        debug!("line candidate {line}: first jump at span {first_jump:?}");

        match (previous_first_jump, first_jump) {
            (Some(prev), Some(cur)) if cur > prev => {
                info!("line size stabilized at candidate {line}");
                return Ok(line * associativity);
            }
            (Some(_), None) => {
                info!("line size stabilized at candidate {line} (jump left the span window)");
                return Ok(line * associativity);
            }
            _ => previous_first_jump = first_jump,
        }
        line *= 2;
    }

    Err(ProbeError::LineSizeUnresolved)
}
