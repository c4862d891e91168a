//! Per-feature normalization to a control population.

use crate::data::{ControlSpec, ProfileTable};
use crate::error::{ProfileError, Result};
use crate::normalize::spherize::{SpherizeMethod, Whitener};
use crate::stats::{mad, median, population_std_dev, quantile};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Consistency constant making the MAD estimate the normal standard deviation.
pub const MAD_NORMAL_SCALE: f64 = 1.4826;

/// Normalization method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMethod {
    /// `(x - mean) / sd`
    #[default]
    Standardize,
    /// `(x - median) / IQR`
    Robustize,
    /// `(x - median) / (1.4826 * MAD + epsilon)`
    MadRobustize,
    /// Whitening; see [`crate::normalize::spherize`].
    Spherize,
}

impl fmt::Display for NormalizeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NormalizeMethod::Standardize => "standardize",
            NormalizeMethod::Robustize => "robustize",
            NormalizeMethod::MadRobustize => "mad_robustize",
            NormalizeMethod::Spherize => "spherize",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub method: NormalizeMethod,
    /// Rows statistics are fit on; `None` fits on all rows.
    pub control: Option<ControlSpec>,
    /// Added to the scaled MAD (default: 1e-18).
    pub mad_epsilon: f64,
    pub spherize_method: SpherizeMethod,
    /// Eigenvalue regularization for sphering (default: 1e-6).
    pub spherize_epsilon: f64,
    pub spherize_center: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            method: NormalizeMethod::Standardize,
            control: None,
            mad_epsilon: 1e-18,
            spherize_method: SpherizeMethod::Zca,
            spherize_epsilon: 1e-6,
            spherize_center: true,
        }
    }
}

/// Location and scale of one feature.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FeatureScale {
    center: f64,
    scale: f64,
}

/// Fit location/scale from the finite values of one feature.
///
/// A zero or undefined scale is replaced by 1 so that constant features
/// are only centered.
fn fit_feature(values: &[f64], config: &NormalizeConfig) -> FeatureScale {
    let observed: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let (center, scale) = match config.method {
        NormalizeMethod::Standardize => {
            let center = observed.iter().sum::<f64>() / observed.len() as f64;
            (center, population_std_dev(&observed))
        }
        NormalizeMethod::Robustize => (
            median(&observed),
            quantile(&observed, 0.75) - quantile(&observed, 0.25),
        ),
        NormalizeMethod::MadRobustize => (
            median(&observed),
            MAD_NORMAL_SCALE * mad(&observed) + config.mad_epsilon,
        ),
        NormalizeMethod::Spherize => (0.0, 1.0),
    };
    let scale = if scale.is_finite() && scale != 0.0 { scale } else { 1.0 };
    FeatureScale { center, scale }
}

fn fit_rows(table: &ProfileTable, control: &Option<ControlSpec>) -> Result<Vec<usize>> {
    match control {
        None => Ok((0..table.n_rows()).collect()),
        Some(spec) => {
            let rows = spec.indices(table)?;
            if rows.is_empty() {
                return Err(ProfileError::NoControls {
                    group: "all".to_string(),
                    control: spec.to_string(),
                });
            }
            Ok(rows)
        }
    }
}

/// Normalize every feature against statistics of the control rows.
///
/// Missing values are skipped when fitting and stay missing in the output.
pub fn normalize(table: &ProfileTable, config: &NormalizeConfig) -> Result<ProfileTable> {
    if table.n_rows() == 0 {
        return Err(ProfileError::EmptyData("Cannot normalize an empty table".to_string()));
    }
    let rows = fit_rows(table, &config.control)?;
    let reference = table.features().select_rows(rows.iter());

    if config.method == NormalizeMethod::Spherize {
        let whitener = Whitener::fit(
            &reference,
            config.spherize_method,
            config.spherize_epsilon,
            config.spherize_center,
        )?;
        return table.with_features(whitener.apply(table.features())?);
    }

    let scales: Vec<FeatureScale> = (0..table.n_features())
        .into_par_iter()
        .map(|j| {
            let values: Vec<f64> = reference.column(j).iter().copied().collect();
            fit_feature(&values, config)
        })
        .collect();

    let x = table.features();
    let normalized = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| {
        (x[(i, j)] - scales[j].center) / scales[j].scale
    });

    tracing::info!(
        method = %config.method,
        reference_rows = rows.len(),
        rows = table.n_rows(),
        "normalized features"
    );
    table.with_features(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Schema, Variable};

    const TOL: f64 = 1e-10;

    fn create_test_table() -> ProfileTable {
        let schema = Schema::new(
            vec!["Metadata_broad_sample".to_string()],
            vec!["f1".to_string(), "f2".to_string()],
        )
        .unwrap();
        let samples = ["DMSO", "DMSO", "DMSO", "DMSO", "cpd1"];
        ProfileTable::new(
            schema,
            vec![samples.iter().map(|s| Variable::from(*s)).collect()],
            DMatrix::from_row_slice(
                5,
                2,
                &[
                    1.0, 5.0, //
                    2.0, 5.0, //
                    3.0, 5.0, //
                    4.0, f64::NAN, //
                    10.0, 7.0,
                ],
            ),
        )
        .unwrap()
    }

    fn with_controls(method: NormalizeMethod) -> NormalizeConfig {
        NormalizeConfig {
            method,
            control: Some(ControlSpec::default()),
            ..NormalizeConfig::default()
        }
    }

    #[test]
    fn test_standardize_to_controls() {
        let out = normalize(&create_test_table(), &with_controls(NormalizeMethod::Standardize)).unwrap();
        // controls f1: mean 2.5, population sd sqrt(1.25)
        let sd = 1.25_f64.sqrt();
        assert!((out.get(0, 0) - (1.0 - 2.5) / sd).abs() < TOL);
        assert!((out.get(4, 0) - (10.0 - 2.5) / sd).abs() < TOL);
        // f2 is constant among controls: centered only
        assert!((out.get(0, 1)).abs() < TOL);
        assert!((out.get(4, 1) - 2.0).abs() < TOL);
        assert!(out.get(3, 1).is_nan());
    }

    #[test]
    fn test_mad_robustize() {
        let out = normalize(&create_test_table(), &with_controls(NormalizeMethod::MadRobustize)).unwrap();
        // f1 controls: median 2.5, MAD 1.0
        let scale = MAD_NORMAL_SCALE + 1e-18;
        assert!((out.get(4, 0) - 7.5 / scale).abs() < TOL);
    }

    #[test]
    fn test_robustize_uses_iqr() {
        let out = normalize(&create_test_table(), &with_controls(NormalizeMethod::Robustize)).unwrap();
        let observed = [1.0, 2.0, 3.0, 4.0];
        let iqr = quantile(&observed, 0.75) - quantile(&observed, 0.25);
        assert!((out.get(4, 0) - 7.5 / iqr).abs() < TOL);
    }

    #[test]
    fn test_all_rows_when_no_control() {
        let config = NormalizeConfig::default();
        let out = normalize(&create_test_table(), &config).unwrap();
        let col: Vec<f64> = out.feature_column(0);
        let mean: f64 = col.iter().sum::<f64>() / col.len() as f64;
        assert!(mean.abs() < TOL);
    }

    #[test]
    fn test_missing_controls() {
        let config = NormalizeConfig {
            control: Some(ControlSpec::new("Metadata_broad_sample", "vehicle")),
            ..NormalizeConfig::default()
        };
        assert!(matches!(
            normalize(&create_test_table(), &config),
            Err(ProfileError::NoControls { .. })
        ));
    }

    #[test]
    fn test_spherize_without_features() {
        let table = create_test_table().subset_features(&[]).unwrap();
        for method in [NormalizeMethod::Spherize, NormalizeMethod::Standardize] {
            let out = normalize(&table, &with_controls(method)).unwrap();
            assert_eq!(out.n_rows(), 5);
            assert_eq!(out.n_features(), 0);
        }
    }
}
