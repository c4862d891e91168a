//! Nearest-rung dose recoding.

use crate::data::{ControlSpec, ProfileTable, Variable};
use crate::error::{ProfileError, Result};
use serde::{Deserialize, Serialize};

/// Reference concentrations (µM) of the primary dose plate layout.
pub const PRIMARY_DOSE_LADDER: [f64; 7] = [0.04, 0.12, 0.37, 1.11, 3.33, 10.0, 20.0];

/// What a recoded dose reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DoseMode {
    /// 1-based position on the ladder (0 for controls and missing).
    #[default]
    Level,
    /// The ladder concentration itself.
    Value,
}

/// A recoded dose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DoseCode {
    Level(u32),
    Value(f64),
}

impl DoseCode {
    /// The "no dose" code for a mode.
    pub fn zero(mode: DoseMode) -> Self {
        match mode {
            DoseMode::Level => DoseCode::Level(0),
            DoseMode::Value => DoseCode::Value(0.0),
        }
    }

    fn into_variable(self) -> Variable {
        match self {
            DoseCode::Level(l) => Variable::Integer(l as i64),
            DoseCode::Value(v) => Variable::Number(v),
        }
    }
}

/// Configuration for table-level dose recoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoseConfig {
    /// Ascending reference concentrations.
    pub ladder: Vec<f64>,
    /// Column holding the measured concentration.
    pub concentration_column: String,
    /// Column receiving the recoded dose (added or replaced).
    pub output_column: String,
    pub mode: DoseMode,
    /// Control rows are forced to dose 0.
    pub control: ControlSpec,
}

impl Default for DoseConfig {
    fn default() -> Self {
        Self {
            ladder: PRIMARY_DOSE_LADDER.to_vec(),
            concentration_column: "Metadata_mmoles_per_liter".to_string(),
            output_column: "Metadata_dose_recode".to_string(),
            mode: DoseMode::Level,
            control: ControlSpec::default(),
        }
    }
}

fn validate_ladder(ladder: &[f64]) -> Result<()> {
    if ladder.is_empty() {
        return Err(ProfileError::InvalidParameter("Dose ladder is empty".to_string()));
    }
    if ladder.iter().any(|d| !d.is_finite() || *d <= 0.0) {
        return Err(ProfileError::InvalidParameter(
            "Dose ladder values must be positive and finite".to_string(),
        ));
    }
    if ladder.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ProfileError::InvalidParameter(
            "Dose ladder must be strictly ascending".to_string(),
        ));
    }
    Ok(())
}

/// Snap a concentration to its nearest ladder rung.
///
/// Ties go to the lower rung. NaN maps to the zero code.
pub fn recode_dose(x: f64, ladder: &[f64], mode: DoseMode) -> Result<DoseCode> {
    validate_ladder(ladder)?;
    if x.is_nan() {
        return Ok(DoseCode::zero(mode));
    }

    let mut best = 0;
    let mut best_dist = (ladder[0] - x).abs();
    for (i, dose) in ladder.iter().enumerate().skip(1) {
        let dist = (dose - x).abs();
        // strict: the first minimal element wins
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }

    Ok(match mode {
        DoseMode::Level => DoseCode::Level(best as u32 + 1),
        DoseMode::Value => DoseCode::Value(ladder[best]),
    })
}

/// Recode every row's concentration into `config.output_column`.
///
/// Missing or non-numeric concentrations count as NaN. Control rows get the
/// zero code whatever their recorded concentration.
pub fn assign_dose_levels(table: &ProfileTable, config: &DoseConfig) -> Result<ProfileTable> {
    validate_ladder(&config.ladder)?;
    let concentrations = table.metadata_column(&config.concentration_column)?;
    let is_control = config.control.mask(table)?;

    let codes: Vec<Variable> = concentrations
        .iter()
        .zip(is_control.iter())
        .map(|(conc, &control)| {
            if control {
                return Ok(DoseCode::zero(config.mode).into_variable());
            }
            let x = conc.as_number().unwrap_or(f64::NAN);
            recode_dose(x, &config.ladder, config.mode).map(DoseCode::into_variable)
        })
        .collect::<Result<_>>()?;

    let n_controls = is_control.iter().filter(|&&c| c).count();
    tracing::debug!(
        column = %config.output_column,
        rows = table.n_rows(),
        controls = n_controls,
        "recoded doses"
    );
    table.with_metadata_column(&config.output_column, codes)
}
