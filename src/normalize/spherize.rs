//! Sphering (whitening) against a control population.
//!
//! A whitening map `W` is fit from the control rows only and then applied
//! to every row as `W · (x − μ)`, where `μ` is the control mean. After the
//! transform the controls have (approximately) zero mean and identity
//! covariance, which removes plate and batch structure shared by all wells.
//!
//! # Methods
//!
//! With the control covariance `Σ = U Λ Uᵀ` and `D = diag(1/√(λ + ε))`:
//!
//! - **ZCA**: `W = U D Uᵀ` (stays closest to the input features)
//! - **PCA**: `W = D Uᵀ` (rotates onto principal axes)
//! - **ZCA-cor** / **PCA-cor**: the same on the correlation matrix
//!   `P = V^{-1/2} Σ V^{-1/2}`, followed by `V^{-1/2}` scaling
//!
//! # Reference
//!
//! Kessy A, Lewin A, Strimmer K. Optimal whitening and decorrelation.
//! The American Statistician 72, 309-314 (2018).

use crate::data::{group_label, ControlSpec, ProfileTable};
use crate::error::{ProfileError, Result};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_EIGEN_ITER: usize = 10_000;

/// Whitening variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpherizeMethod {
    #[default]
    Zca,
    Pca,
    ZcaCor,
    PcaCor,
}

impl fmt::Display for SpherizeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpherizeMethod::Zca => "ZCA",
            SpherizeMethod::Pca => "PCA",
            SpherizeMethod::ZcaCor => "ZCA-cor",
            SpherizeMethod::PcaCor => "PCA-cor",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for sphering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpherizeConfig {
    pub method: SpherizeMethod,
    /// Added to every eigenvalue before inversion (default: 1e-6).
    pub epsilon: f64,
    /// Subtract the control mean before whitening (default: true).
    pub center: bool,
    /// Rows the transform is fit on.
    pub control: ControlSpec,
    /// Metadata columns defining independent populations; empty = one population.
    pub strata: Vec<String>,
}

impl Default for SpherizeConfig {
    fn default() -> Self {
        Self {
            method: SpherizeMethod::Zca,
            epsilon: 1e-6,
            center: true,
            control: ControlSpec::default(),
            strata: Vec::new(),
        }
    }
}

/// A fitted whitening transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Whitener {
    /// Mean subtracted before whitening: the control mean, or zeros when
    /// not centering.
    pub mean: DVector<f64>,
    /// Whitening matrix `W` (features × features).
    pub transform: DMatrix<f64>,
}

impl Whitener {
    /// Fit on a control matrix (rows × features).
    pub fn fit(
        controls: &DMatrix<f64>,
        method: SpherizeMethod,
        epsilon: f64,
        center: bool,
    ) -> Result<Self> {
        if epsilon.is_nan() || epsilon < 0.0 {
            return Err(ProfileError::InvalidParameter(format!(
                "Sphering epsilon must be non-negative, got {}",
                epsilon
            )));
        }
        let k = controls.nrows();
        let m = controls.ncols();
        if k < 2 {
            return Err(ProfileError::EmptyData(format!(
                "Sphering needs at least 2 control rows, got {}",
                k
            )));
        }

        if controls.iter().any(|v| !v.is_finite()) {
            return Err(ProfileError::Numerical(
                "Control features contain missing or non-finite values".to_string(),
            ));
        }

        if m == 0 {
            tracing::warn!("sphering a table with no feature columns");
            return Ok(Self {
                mean: DVector::zeros(0),
                transform: DMatrix::zeros(0, 0),
            });
        }

        // The covariance is always taken around the control mean; `center`
        // only decides whether the mean is subtracted when applying.
        let control_mean = controls.row_mean().transpose();
        let centered = center_rows(controls, &control_mean);
        let cov = centered.transpose() * &centered / (k - 1) as f64;
        let mean = if center { control_mean } else { DVector::zeros(m) };

        let transform = match method {
            SpherizeMethod::Zca => inverse_sqrt(&cov, epsilon, true)?,
            SpherizeMethod::Pca => inverse_sqrt(&cov, epsilon, false)?,
            SpherizeMethod::ZcaCor | SpherizeMethod::PcaCor => {
                let inv_sd = DVector::from_iterator(m, cov.diagonal().iter().map(|v| 1.0 / v.sqrt()));
                let scale = DMatrix::from_diagonal(&inv_sd);
                let corr = &scale * &cov * &scale;
                let symmetric = method == SpherizeMethod::ZcaCor;
                inverse_sqrt(&corr, epsilon, symmetric)? * scale
            }
        };

        if transform.iter().any(|v| !v.is_finite()) {
            return Err(ProfileError::Numerical(format!(
                "{} whitening matrix is not finite; controls may contain missing or constant features",
                method
            )));
        }
        Ok(Self { mean, transform })
    }

    /// Apply `W · (x − μ)` to every row of `x`.
    pub fn apply(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if x.ncols() != self.mean.len() {
            return Err(ProfileError::DimensionMismatch {
                expected: self.mean.len(),
                actual: x.ncols(),
            });
        }
        if x.ncols() == 0 {
            return Ok(x.clone());
        }
        Ok(center_rows(x, &self.mean) * self.transform.transpose())
    }
}

fn center_rows(x: &DMatrix<f64>, mean: &DVector<f64>) -> DMatrix<f64> {
    let mut centered = x.clone();
    for (j, mut col) in centered.column_iter_mut().enumerate() {
        col.add_scalar_mut(-mean[j]);
    }
    centered
}

/// `Λ^{-1/2} Uᵀ`, or `U Λ^{-1/2} Uᵀ` when `symmetric`, with eigenvalues
/// sorted in decreasing order and regularized by `epsilon`.
fn inverse_sqrt(sym: &DMatrix<f64>, epsilon: f64, symmetric: bool) -> Result<DMatrix<f64>> {
    if sym.iter().any(|v| !v.is_finite()) {
        return Err(ProfileError::Numerical(
            "Covariance is not finite; controls may contain constant features".to_string(),
        ));
    }
    if sym.nrows() == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    let eigen = SymmetricEigen::try_new(sym.clone(), f64::EPSILON, MAX_EIGEN_ITER).ok_or_else(|| {
        ProfileError::Numerical("Eigendecomposition of control covariance did not converge".to_string())
    })?;
    let n = eigen.eigenvalues.len();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let u = eigen.eigenvectors.select_columns(order.iter());
    let d = DVector::from_iterator(
        n,
        order
            .iter()
            .map(|&i| 1.0 / (eigen.eigenvalues[i].max(0.0) + epsilon).sqrt()),
    );

    let projected = DMatrix::from_diagonal(&d) * u.transpose();
    Ok(if symmetric { &u * projected } else { projected })
}

fn spherize_rows(table: &ProfileTable, config: &SpherizeConfig, group: &str) -> Result<ProfileTable> {
    let controls = config.control.indices(table)?;
    if controls.len() < 2 {
        return Err(ProfileError::NoControls {
            group: group.to_string(),
            control: config.control.to_string(),
        });
    }
    let control_matrix = table.features().select_rows(controls.iter());
    let whitener = Whitener::fit(&control_matrix, config.method, config.epsilon, config.center)?;
    tracing::debug!(
        group,
        controls = controls.len(),
        rows = table.n_rows(),
        method = %config.method,
        "fitted whitening transform"
    );
    table.with_features(whitener.apply(table.features())?)
}

/// Fit on the controls of the whole table and transform every row.
///
/// `config.strata` is ignored; see [`spherize_grouped`].
pub fn spherize(table: &ProfileTable, config: &SpherizeConfig) -> Result<ProfileTable> {
    spherize_rows(table, config, "all").map_err(|e| e.in_stage("", "all", "spherize"))
}

/// Sphere each stratification group against its own controls.
///
/// Groups are fit and transformed independently (in parallel) and stacked
/// in order of first appearance. A group with fewer than two controls is an
/// error naming that group.
pub fn spherize_grouped(table: &ProfileTable, config: &SpherizeConfig) -> Result<ProfileTable> {
    if config.strata.is_empty() {
        return spherize(table, config);
    }
    let groups = table.partition(&config.strata)?;

    let parts: Vec<ProfileTable> = groups
        .par_iter()
        .map(|(key, rows)| {
            let label = group_label(key);
            let sub = table.subset_rows(rows)?;
            spherize_rows(&sub, config, &label).map_err(|e| e.in_stage("", &label, "spherize"))
        })
        .collect::<Result<_>>()?;

    tracing::info!(
        groups = parts.len(),
        rows = table.n_rows(),
        method = %config.method,
        "spherized profiles"
    );
    ProfileTable::concat(&parts)
}
