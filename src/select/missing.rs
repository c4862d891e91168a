//! Dropping feature columns with too many missing values.

use crate::data::ProfileTable;
use crate::error::{ProfileError, Result};
use rayon::prelude::*;

/// Candidate features whose missing fraction exceeds `cutoff`.
///
/// A cutoff of 0 drops any column with at least one missing value.
pub fn na_exclusions(table: &ProfileTable, candidates: &[usize], cutoff: f64) -> Result<Vec<usize>> {
    if !(0.0..=1.0).contains(&cutoff) {
        return Err(ProfileError::InvalidParameter(
            "Missing-value cutoff must be between 0 and 1".to_string(),
        ));
    }
    let n_rows = table.n_rows();
    if n_rows == 0 {
        return Ok(Vec::new());
    }
    Ok(candidates
        .par_iter()
        .copied()
        .filter(|&f| {
            let n_missing = table.features().column(f).iter().filter(|v| v.is_nan()).count();
            n_missing as f64 / n_rows as f64 > cutoff
        })
        .collect())
}

/// Drop every feature column whose missing fraction exceeds `cutoff`.
pub fn drop_na_columns(table: &ProfileTable, cutoff: f64) -> Result<ProfileTable> {
    let all: Vec<usize> = (0..table.n_features()).collect();
    let excluded = na_exclusions(table, &all, cutoff)?;
    let keep: Vec<usize> = all.into_iter().filter(|f| !excluded.contains(f)).collect();
    table.subset_features(&keep)
}
