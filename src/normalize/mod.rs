//! Normalization of profiles against a control population.
//!
//! - **Standardize**, **Robustize**, **MadRobustize**: per-feature
//!   location/scale fit on the controls
//! - **Spherize**: whitening fit on the controls, optionally per
//!   stratification group

pub mod scale;
pub mod spherize;

pub use scale::{normalize, NormalizeConfig, NormalizeMethod, MAD_NORMAL_SCALE};
pub use spherize::{spherize, spherize_grouped, SpherizeConfig, SpherizeMethod, Whitener};
