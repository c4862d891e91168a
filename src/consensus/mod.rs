//! Consensus signatures across replicates.
//!
//! Rows sharing a replicate key are collapsed into one consensus row, by
//! coordinate-wise median or by MODZ (correlation-weighted average).

mod aggregate;
mod group;
mod median;
mod modz;
mod signatures;

pub use aggregate::{consensus, ConsensusConfig, ConsensusMethod};
pub use group::{partition, ReplicateGroup};
pub use median::median_consensus;
pub use modz::{modz_consensus, modz_weights, ModzConfig};
pub use signatures::{build_consensus_signatures, ConsensusPlan};
