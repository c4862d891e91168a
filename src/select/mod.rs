//! Feature selection: shrinking the feature set before aggregation.
//!
//! Each operation lives in its own module and can be used directly; the
//! [`feature_select`] runner composes them in a configured order.

pub mod blocklist;
pub mod correlation;
pub mod missing;
pub mod outlier;
mod selector;
pub mod variance;

pub use blocklist::{drop_blocklisted, load_blocklist};
pub use correlation::correlation_threshold;
pub use missing::drop_na_columns;
pub use outlier::drop_outlier_rows;
pub use selector::{
    feature_select, feature_select_grouped, FeatureSelectConfig, FeatureSelectOp, OpReport,
    SelectionResult,
};
pub use variance::{variance_threshold, VarianceRule};
