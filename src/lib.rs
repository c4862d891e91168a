//! Composable Consensus Profiles Library
//!
//! This library provides modular primitives for turning per-well
//! image-based ("Cell Painting") profiles into consensus signatures and
//! batch-corrected (sphered) profiles.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (ProfileTable, Schema, Variable) and I/O
//! - **dose**: Dose recoding onto a reference concentration ladder
//! - **select**: Feature selection (variance, correlation, missingness, blocklist, outliers)
//! - **consensus**: Replicate aggregation (median, MODZ)
//! - **normalize**: Normalization to controls and sphering/whitening
//! - **stats**: Shared statistics (correlation, median, MAD)
//! - **pipeline**: Pipeline composition and batch execution
//!
//! # Example
//!
//! ```no_run
//! use composable_profiles::prelude::*;
//!
//! // Load a plate of profiles
//! let profiles = ProfileTable::from_csv("SQ00014812_normalized.csv.gz").unwrap();
//!
//! // Select features, build consensus signatures, then sphere
//! let spherized = Pipeline::new()
//!     .recode_dose(DoseConfig::default())
//!     .feature_select(FeatureSelectConfig::default())
//!     .consensus_signatures(ConsensusPlan::default())
//!     .spherize(SpherizeConfig::default())
//!     .run(&profiles)
//!     .unwrap();
//!
//! spherized
//!     .to_csv("consensus_spherized.csv.gz", &OutputOptions::default())
//!     .unwrap();
//! ```

pub mod consensus;
pub mod data;
pub mod dose;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod select;
pub mod stats;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::consensus::{
        build_consensus_signatures, consensus, modz_weights, partition, ConsensusConfig,
        ConsensusMethod, ConsensusPlan, ModzConfig, ReplicateGroup,
    };
    pub use crate::data::{
        format_significant, group_label, ControlSpec, OutputOptions, ProfileTable, Schema,
        Variable, METADATA_PREFIX,
    };
    pub use crate::dose::{assign_dose_levels, recode_dose, DoseCode, DoseConfig, DoseMode};
    pub use crate::error::{ProfileError, Result};
    pub use crate::normalize::{
        normalize, spherize, spherize_grouped, NormalizeConfig, NormalizeMethod, SpherizeConfig,
        SpherizeMethod, Whitener,
    };
    pub use crate::pipeline::{
        run_batches, BatchJob, BatchOutcome, Pipeline, PipelineConfig, PipelineStep,
    };
    pub use crate::select::{
        feature_select, feature_select_grouped, FeatureSelectConfig, FeatureSelectOp,
        SelectionResult,
    };
    pub use crate::stats::Similarity;
}
