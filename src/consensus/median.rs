//! Coordinate-wise median consensus.

use crate::error::{ProfileError, Result};
use crate::stats::median;
use nalgebra::DMatrix;

/// Median of each feature column across the replicate rows.
///
/// A NaN anywhere in a column makes that consensus value NaN.
pub fn median_consensus(replicates: &DMatrix<f64>) -> Result<Vec<f64>> {
    if replicates.nrows() == 0 {
        return Err(ProfileError::EmptyData(
            "Cannot aggregate an empty replicate group".to_string(),
        ));
    }
    Ok(replicates
        .column_iter()
        .map(|col| {
            let values: Vec<f64> = col.iter().copied().collect();
            median(&values)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_row_is_identity() {
        let row = DMatrix::from_row_slice(1, 3, &[0.1, -2.5, 7.0]);
        assert_eq!(median_consensus(&row).unwrap(), vec![0.1, -2.5, 7.0]);
    }

    #[test]
    fn test_even_group_averages_central_values() {
        let m = DMatrix::from_row_slice(4, 1, &[1.0, 10.0, 3.0, 2.0]);
        assert_eq!(median_consensus(&m).unwrap(), vec![2.5]);
    }

    #[test]
    fn test_nan_propagates_per_feature() {
        let m = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, f64::NAN, 2.0, 3.0, 3.0]);
        let out = median_consensus(&m).unwrap();
        assert!(out[0].is_nan());
        assert_eq!(out[1], 2.0);
    }

    #[test]
    fn test_empty_group_is_error() {
        assert!(median_consensus(&DMatrix::zeros(0, 2)).is_err());
    }
}
