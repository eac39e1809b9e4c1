//! Error type for the probe pipeline
//!
//! There is no recoverable-error taxonomy here: every variant is fatal to
//! the measurement. The binary logs the error and exits without printing a
//! result line, so a bad run can never be mistaken for a good one.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    /// The probe arena could not be reserved
    #[error("failed to allocate {bytes} byte probe arena")]
    Allocation { bytes: usize },

    /// The stride sweep gathered no jump-set levels at all
    #[error("stride sweep recorded no levels; arena too small for the sweep range")]
    NoStrideLevels,

    /// No latency jump survived the cross-stride combination step
    #[error(
        "no cache candidate derived from latency jumps; \
         hardware does not exhibit the expected jump structure"
    )]
    NoCacheCandidate,

    /// The line-size sweep never stabilized
    #[error("line size probe never stabilized up to the cache size")]
    LineSizeUnresolved,
}
