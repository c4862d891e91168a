//! Removing wells with extreme feature values.

use crate::data::ProfileTable;
use crate::error::{ProfileError, Result};

/// Rows whose largest absolute candidate-feature value exceeds `cutoff`.
///
/// Missing values are ignored when taking the maximum.
pub fn outlier_rows(table: &ProfileTable, candidates: &[usize], cutoff: f64) -> Result<Vec<usize>> {
    if cutoff.is_nan() || cutoff <= 0.0 {
        return Err(ProfileError::InvalidParameter(
            "Outlier cutoff must be positive".to_string(),
        ));
    }
    Ok((0..table.n_rows())
        .filter(|&row| {
            candidates
                .iter()
                .map(|&f| table.get(row, f).abs())
                .filter(|v| !v.is_nan())
                .any(|v| v > cutoff)
        })
        .collect())
}

/// Drop rows with any feature beyond `cutoff` in absolute value.
pub fn drop_outlier_rows(table: &ProfileTable, cutoff: f64) -> Result<ProfileTable> {
    let all: Vec<usize> = (0..table.n_features()).collect();
    let outliers = outlier_rows(table, &all, cutoff)?;
    let keep: Vec<usize> = (0..table.n_rows()).filter(|r| !outliers.contains(r)).collect();
    table.subset_rows(&keep)
}
