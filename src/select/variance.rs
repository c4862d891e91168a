//! Removing constant and near-constant feature columns.

use crate::data::ProfileTable;
use crate::error::{ProfileError, Result};
use crate::stats::variance;
use rayon::prelude::*;

/// Thresholds for the variance filter.
#[derive(Debug, Clone, Copy)]
pub struct VarianceRule {
    /// Columns with sample variance at or below this value are dropped.
    pub min_variance: f64,
    /// Second-most-common over most-common value count below which a column is suspicious.
    pub freq_cut: f64,
    /// Distinct values over rows below which a column is suspicious.
    pub unique_cut: f64,
}

/// Whether a column is constant or near-constant.
///
/// Missing values are ignored. A column is dropped when it has fewer than
/// two distinct values, when its variance is at or below `min_variance`, or
/// when it is both dominated by one value (`freq_cut`) and has few distinct
/// values (`unique_cut`).
fn is_low_variance(column: &[f64], rule: &VarianceRule) -> bool {
    let mut present: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.len() < 2 {
        return true;
    }
    if variance(&present) <= rule.min_variance {
        return true;
    }

    present.sort_by(|a, b| a.total_cmp(b));
    let mut counts: Vec<usize> = Vec::new();
    let mut run = 1;
    for w in present.windows(2) {
        if w[0] == w[1] {
            run += 1;
        } else {
            counts.push(run);
            run = 1;
        }
    }
    counts.push(run);
    if counts.len() < 2 {
        return true;
    }
    counts.sort_unstable_by(|a, b| b.cmp(a));

    let freq_ratio = counts[1] as f64 / counts[0] as f64;
    let unique_ratio = counts.len() as f64 / present.len() as f64;
    freq_ratio < rule.freq_cut && unique_ratio < rule.unique_cut
}

/// Candidate features failing the variance rule.
pub fn variance_exclusions(
    table: &ProfileTable,
    candidates: &[usize],
    rule: &VarianceRule,
) -> Result<Vec<usize>> {
    if rule.min_variance < 0.0 || !(0.0..=1.0).contains(&rule.freq_cut) || !(0.0..=1.0).contains(&rule.unique_cut) {
        return Err(ProfileError::InvalidParameter(
            "Variance thresholds must be non-negative and cuts within [0, 1]".to_string(),
        ));
    }
    Ok(candidates
        .par_iter()
        .copied()
        .filter(|&f| is_low_variance(&table.feature_column(f), rule))
        .collect())
}

/// Drop every feature column failing the variance rule.
pub fn variance_threshold(table: &ProfileTable, rule: &VarianceRule) -> Result<ProfileTable> {
    let all: Vec<usize> = (0..table.n_features()).collect();
    let excluded = variance_exclusions(table, &all, rule)?;
    let keep: Vec<usize> = all.into_iter().filter(|f| !excluded.contains(f)).collect();
    table.subset_features(&keep)
}
