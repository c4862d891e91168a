//! Two-track consensus signatures: controls per well, treatments per compound.

use crate::consensus::aggregate::{consensus, ConsensusConfig, ConsensusMethod};
use crate::consensus::modz::ModzConfig;
use crate::data::{ControlSpec, ProfileTable, Variable};
use crate::error::{ProfileError, Result};
use serde::{Deserialize, Serialize};

/// Which rows are controls and how each track is keyed.
///
/// Control columns absent from the treatment key (typically the well) are
/// filled with `collapsed_value` in treatment consensus rows, so both
/// tracks share the control key layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusPlan {
    pub control: ControlSpec,
    /// Key of the control track; also the metadata layout of the output.
    pub control_columns: Vec<String>,
    /// Key of the treatment track.
    pub treatment_columns: Vec<String>,
    pub collapsed_value: String,
    pub method: ConsensusMethod,
    pub modz: ModzConfig,
}

impl Default for ConsensusPlan {
    fn default() -> Self {
        let control_columns: Vec<String> = [
            "Metadata_Plate_Map_Name",
            "Metadata_broad_sample",
            "Metadata_pert_well",
            "Metadata_mmoles_per_liter",
            "Metadata_dose_recode",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        let treatment_columns = control_columns
            .iter()
            .filter(|c| c.as_str() != "Metadata_pert_well")
            .cloned()
            .collect();
        Self {
            control: ControlSpec::default(),
            control_columns,
            treatment_columns,
            collapsed_value: "collapsed".to_string(),
            method: ConsensusMethod::Modz,
            modz: ModzConfig::default(),
        }
    }
}

impl ConsensusPlan {
    fn track(&self, columns: &[String]) -> ConsensusConfig {
        ConsensusConfig {
            method: self.method,
            replicate_columns: columns.to_vec(),
            modz: self.modz,
        }
    }
}

/// Build consensus signatures for controls and treatments and stack them.
///
/// Control rows are aggregated per control key, all other rows per
/// treatment key. Control consensus rows come first.
pub fn build_consensus_signatures(table: &ProfileTable, plan: &ConsensusPlan) -> Result<ProfileTable> {
    let mask = plan.control.mask(table)?;
    let (controls, treatments): (Vec<usize>, Vec<usize>) =
        (0..table.n_rows()).partition(|&i| mask[i]);

    let mut parts = Vec::with_capacity(2);

    if !controls.is_empty() {
        let sub = table.subset_rows(&controls)?;
        let out = consensus(&sub, &plan.track(&plan.control_columns))
            .map_err(|e| e.in_stage("", "", "control consensus"))?;
        parts.push(out);
    } else {
        tracing::warn!(control = %plan.control, "no control rows, emitting treatment signatures only");
    }

    if !treatments.is_empty() {
        let sub = table.subset_rows(&treatments)?;
        let mut out = consensus(&sub, &plan.track(&plan.treatment_columns))
            .map_err(|e| e.in_stage("", "", "treatment consensus"))?;
        for col in &plan.control_columns {
            if out.schema().metadata_index(col).is_none() {
                out = out.with_constant_metadata(col, Variable::from(plan.collapsed_value.as_str()))?;
            }
        }
        parts.push(out.select_metadata(&plan.control_columns)?);
    }

    if parts.is_empty() {
        return Err(ProfileError::EmptyData("Cannot aggregate an empty table".to_string()));
    }
    tracing::info!(
        controls = controls.len(),
        treatments = treatments.len(),
        "built consensus signatures"
    );
    ProfileTable::concat(&parts)
}
