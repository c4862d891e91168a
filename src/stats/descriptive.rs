//! NaN-aware descriptive statistics.
//!
//! Every function here returns NaN when any input is NaN, so a missing value
//! in a profile stays visible in whatever is computed from it.

use statrs::statistics::{Data, Median, OrderStatistics, Statistics};

/// Arithmetic mean; NaN for empty input.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().mean()
}

/// Sample variance with `n - 1` in the denominator; NaN for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    values.iter().variance()
}

/// Population standard deviation (`n` in the denominator); NaN for empty input.
pub fn population_std_dev(values: &[f64]) -> f64 {
    values.iter().population_std_dev()
}

/// Median, averaging the two central order statistics for even lengths.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    Data::new(values.to_vec()).median()
}

/// Quantile at `tau` in `[0, 1]`.
pub fn quantile(values: &[f64], tau: f64) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    Data::new(values.to_vec()).quantile(tau)
}

/// Median absolute deviation from the median (unscaled).
pub fn mad(values: &[f64]) -> f64 {
    let center = median(values);
    if center.is_nan() {
        return f64::NAN;
    }
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[7.0]), 7.0);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(median(&[1.0, f64::NAN, 3.0]).is_nan());
        assert!(mad(&[1.0, f64::NAN]).is_nan());
        assert!(variance(&[1.0, f64::NAN, 2.0]).is_nan());
        assert!(median(&[]).is_nan());
        assert!(population_std_dev(&[]).is_nan());
    }

    #[test]
    fn test_variance_is_sample_variance() {
        assert!((variance(&[1.0, 2.0, 3.0, 4.0]) - 1.6666666666666667).abs() < 1e-12);
        assert!(variance(&[5.0]).is_nan());
    }

    #[test]
    fn test_mad() {
        // median 3, deviations [2,1,0,1,2] -> 1
        assert_eq!(mad(&[1.0, 2.0, 3.0, 4.0, 5.0]), 1.0);
    }

    #[test]
    fn test_quantile_bounds() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&values, 0.0), 1.0);
        assert_eq!(quantile(&values, 1.0), 5.0);
        assert_eq!(quantile(&values, 0.5), 3.0);
    }
}
