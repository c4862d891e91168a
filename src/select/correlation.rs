//! Redundancy reduction by pairwise feature correlation.

use crate::data::ProfileTable;
use crate::error::{ProfileError, Result};
use crate::stats::{pearson, variance};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Variance of the non-missing values of a column.
fn present_variance(column: &[f64]) -> f64 {
    let present: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
    variance(&present)
}

/// Candidate features made redundant by a more variable correlated partner.
///
/// Pairs (i, j) with i < j in candidate order whose absolute Pearson
/// correlation exceeds `threshold` are visited in order; when neither member
/// has been dropped yet, the one with lower variance goes. Equal (or
/// undefined) variances drop the column whose name sorts later.
pub fn correlation_exclusions(
    table: &ProfileTable,
    candidates: &[usize],
    threshold: f64,
) -> Result<Vec<usize>> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ProfileError::InvalidParameter(
            "Correlation threshold must be between 0 and 1".to_string(),
        ));
    }

    let columns: Vec<Vec<f64>> = candidates.iter().map(|&f| table.feature_column(f)).collect();
    let variances: Vec<f64> = columns.par_iter().map(|c| present_variance(c)).collect();
    let names = table.feature_names();

    let pairs: Vec<(usize, usize)> = (0..columns.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let columns = &columns;
            (i + 1..columns.len()).filter_map(move |j| {
                let r = pearson(&columns[i], &columns[j]);
                (r.abs() > threshold).then_some((i, j))
            })
        })
        .collect();

    let mut dropped = vec![false; columns.len()];
    for (i, j) in pairs {
        if dropped[i] || dropped[j] {
            continue;
        }
        let loser = match variances[i].partial_cmp(&variances[j]) {
            Some(Ordering::Less) => i,
            Some(Ordering::Greater) => j,
            _ => {
                if names[candidates[i]] > names[candidates[j]] {
                    i
                } else {
                    j
                }
            }
        };
        dropped[loser] = true;
    }

    Ok(candidates
        .iter()
        .zip(dropped)
        .filter_map(|(&f, d)| d.then_some(f))
        .collect())
}

/// Drop redundant feature columns across the whole table.
pub fn correlation_threshold(table: &ProfileTable, threshold: f64) -> Result<ProfileTable> {
    let all: Vec<usize> = (0..table.n_features()).collect();
    let excluded = correlation_exclusions(table, &all, threshold)?;
    let keep: Vec<usize> = all.into_iter().filter(|f| !excluded.contains(f)).collect();
    table.subset_features(&keep)
}
