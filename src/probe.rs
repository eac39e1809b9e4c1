//! # Latency probe
//!
//! Turns one `(stride, span)` chain configuration into a single latency
//! figure by timing repeated full traversals of the chain. The traversal is
//! a serially dependent load chain (each load's address is the previous
//! load's value), so out-of-order hardware cannot overlap the accesses and
//! the measured time is dominated by the access latency of whichever cache
//! level the chain's footprint lands in.

use crate::arena::Arena;
use std::hint::black_box;
use std::sync::atomic::{Ordering, compiler_fence};
use std::time::Instant;

/// Traversal iterations per trial, amortizing timing overhead
pub const ITERATIONS: usize = 1_000_000;

/// Wall-clock trials per configuration; the reported latency is their mean
pub const TRIALS: usize = 20;

/// The seam between measurement and inference: anything that can map a
/// `(stride, span)` chain configuration to a latency in nanoseconds.
/// Inference is generic over this so tests can substitute synthetic cache
/// models for real hardware.
pub trait LatencySource {
    fn latency_ns(&mut self, stride: usize, span: usize) -> u64;
}

/// The real thing: builds chains in an [`Arena`] and times traversals with
/// the system monotonic clock.
pub struct MemoryProbe {
    arena: Arena,
}

impl MemoryProbe {
    pub fn new(arena: Arena) -> Self {
        MemoryProbe { arena }
    }

    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }
}

impl LatencySource for MemoryProbe {
    /// Build the chain once, then run [`TRIALS`] timed traversals of
    /// [`ITERATIONS`] dependent loads each and return the truncating mean of
    /// the per-trial nanosecond counts. No outlier rejection.
    fn latency_ns(&mut self, stride: usize, span: usize) -> u64 {
        self.arena.build_chain(stride, span);

        let mut trial_ns = Vec::with_capacity(TRIALS);
        for _ in 0..TRIALS {
            trial_ns.push(timed_traversal(&self.arena));
        }
        trial_ns.iter().sum::<u64>() / TRIALS as u64
    }
}

/// One timed traversal: exactly [`ITERATIONS`] chain steps starting at
/// offset 0.
///
/// `black_box` keeps the working offset opaque every step, so the load chain
/// can neither be folded to its final value nor hoisted out of the timed
/// region; the compiler fences pin the timing reads to the loop boundary.
#[inline(never)]
fn timed_traversal(arena: &Arena) -> u64 {
    let base = arena.base_ptr();
    let mut offset = 0usize;

    compiler_fence(Ordering::SeqCst);
    let start = Instant::now();

    for _ in 0..ITERATIONS {
        offset = unsafe { (base.add(offset) as *const usize).read_unaligned() };
        offset = black_box(offset);
    }

    compiler_fence(Ordering::SeqCst);
    let elapsed = start.elapsed();

    black_box(offset);
    elapsed.as_nanos() as u64
}
