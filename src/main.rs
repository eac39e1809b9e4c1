//! L1 Data-Cache Characterization via Pointer Chasing
//!
//! Determines L1d capacity, set associativity, and line size purely from
//! memory-access latency, with no CPUID and no sysfs. A cyclic pointer chain is
//! built at a chosen `(stride, span)`, traversed a million times per timed
//! trial, and latency jumps across stride/span sweeps reveal where the
//! cache's structural boundaries sit.

use l1_probe_rs::arena::Arena;
use l1_probe_rs::probe::MemoryProbe;
use l1_probe_rs::{characterize, format_size};
use log::{error, info, warn};
use std::env::set_var;
use std::process;

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Probe arena size; every chain the sweeps build fits inside it
const ARENA_SIZE: usize = 1 << 30;

/// Best-effort measurement hygiene: pin to one core so the chain stays in
/// one L1d across trials, and raise priority so the scheduler preempts the
/// timed loops less often.
fn pin_measurement_thread() {
    match core_affinity::get_core_ids().and_then(|ids| ids.into_iter().next()) {
        Some(core) => {
            if !core_affinity::set_for_current(core) {
                warn!(
                    "Couldn't pin to CPU core {} (NOTE: this is expected on macOS)",
                    core.id
                );
            }
        }
        None => warn!("No CPU cores enumerated; running unpinned"),
    }

    if thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max).is_err() {
        warn!("Couldn't set maximum thread priority");
    }
}

fn main() {
    if std::env::var_os("RUST_LOG").is_none() {
        unsafe { set_var("RUST_LOG", "INFO") };
    }
    env_logger::init();

    pin_measurement_thread();

    info!("allocating {} probe arena", format_size(ARENA_SIZE as u64));
    let arena = match Arena::allocate(ARENA_SIZE) {
        Ok(arena) => arena,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let mut probe = MemoryProbe::new(arena);
    let arena_len = probe.arena_len();
    match characterize(&mut probe, arena_len) {
        Ok(cache) => {
            println!(
                "L1 cache: size = {}, associativity = {}, line size = {}",
                cache.size, cache.associativity, cache.line_size
            );
        }
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}
