//! Numeric helpers shared by selection, consensus and normalization.

pub mod correlation;
pub mod descriptive;

pub use correlation::{pearson, rank_average, spearman, Similarity};
pub use descriptive::{mad, mean, median, population_std_dev, quantile, variance};
