//! MODZ: moderated z-score consensus.
//!
//! Replicates are weighted by how well they agree with the rest of their
//! group. For a group of `n` replicate rows:
//!
//! 1. Correlate every pair of rows (Spearman by default), using the features
//!    observed in both rows.
//! 2. Clip correlations below `min_correlation` up to it; undefined
//!    correlations count as the floor.
//! 3. Weight each row by the sum of its clipped correlations with the other
//!    rows and normalize the weights to sum to one. If every weight is zero
//!    the rows are weighted equally.
//! 4. The consensus is the weighted sum of the rows.

use crate::error::{ProfileError, Result};
use crate::stats::Similarity;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// MODZ configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ModzConfig {
    /// Correlation between replicate rows (default: Spearman).
    pub similarity: Similarity,
    /// Floor applied to pairwise correlations (default: 0.0).
    ///
    /// Must lie in `[0, 1]`; values outside are rejected with
    /// [`ProfileError::InvalidParameter`] by [`modz_weights`].
    pub min_correlation: f64,
}

impl Default for ModzConfig {
    fn default() -> Self {
        Self {
            similarity: Similarity::Spearman,
            min_correlation: 0.0,
        }
    }
}

/// Normalized replicate weights for one group (rows × features).
pub fn modz_weights(replicates: &DMatrix<f64>, config: &ModzConfig) -> Result<Vec<f64>> {
    if !(0.0..=1.0).contains(&config.min_correlation) {
        return Err(ProfileError::InvalidParameter(
            "MODZ correlation floor must be between 0 and 1".to_string(),
        ));
    }
    let n = replicates.nrows();
    if n == 0 {
        return Err(ProfileError::EmptyData(
            "Cannot aggregate an empty replicate group".to_string(),
        ));
    }
    if n == 1 {
        return Ok(vec![1.0]);
    }

    let rows: Vec<Vec<f64>> = replicates
        .row_iter()
        .map(|r| r.iter().copied().collect())
        .collect();

    let mut raw = vec![0.0; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let r = config.similarity.correlate(&rows[i], &rows[j]);
            let clipped = if r.is_nan() {
                config.min_correlation
            } else {
                r.max(config.min_correlation)
            };
            raw[i] += clipped;
            raw[j] += clipped;
        }
    }

    let total: f64 = raw.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        tracing::debug!(replicates = n, "no positive replicate agreement, weighting equally");
        return Ok(vec![1.0 / n as f64; n]);
    }
    Ok(raw.into_iter().map(|w| w / total).collect())
}

/// MODZ consensus vector of one replicate group.
///
/// A NaN in any replicate for a feature makes that consensus value NaN.
pub fn modz_consensus(replicates: &DMatrix<f64>, config: &ModzConfig) -> Result<Vec<f64>> {
    let weights = modz_weights(replicates, config)?;
    Ok(replicates
        .column_iter()
        .map(|col| col.iter().zip(weights.iter()).map(|(x, w)| x * w).sum())
        .collect())
}
