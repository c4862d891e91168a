//! Collapse replicate groups into one consensus row each.

use crate::consensus::group::{partition, ReplicateGroup};
use crate::consensus::median::median_consensus;
use crate::consensus::modz::{modz_consensus, ModzConfig};
use crate::data::{ProfileTable, Schema, Variable};
use crate::error::{ProfileError, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How replicates are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    /// Coordinate-wise median.
    #[default]
    Median,
    /// Correlation-weighted moderated z-score.
    Modz,
}

impl fmt::Display for ConsensusMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusMethod::Median => write!(f, "median"),
            ConsensusMethod::Modz => write!(f, "modz"),
        }
    }
}

/// Configuration for consensus aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub method: ConsensusMethod,
    /// Metadata columns forming the replicate key, in output order.
    pub replicate_columns: Vec<String>,
    pub modz: ModzConfig,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            method: ConsensusMethod::Median,
            replicate_columns: vec![
                "Metadata_Plate_Map_Name".to_string(),
                "Metadata_broad_sample".to_string(),
                "Metadata_mmoles_per_liter".to_string(),
                "Metadata_dose_recode".to_string(),
            ],
            modz: ModzConfig::default(),
        }
    }
}

impl ConsensusConfig {
    /// Config for `method` over the given key columns.
    pub fn new(method: ConsensusMethod, replicate_columns: &[&str]) -> Self {
        Self {
            method,
            replicate_columns: replicate_columns.iter().map(|c| c.to_string()).collect(),
            modz: ModzConfig::default(),
        }
    }
}

fn aggregate_group(
    table: &ProfileTable,
    group: &ReplicateGroup,
    config: &ConsensusConfig,
) -> Result<Vec<f64>> {
    let replicates = table.features().select_rows(group.rows.iter());
    match config.method {
        ConsensusMethod::Median => median_consensus(&replicates),
        ConsensusMethod::Modz => modz_consensus(&replicates, &config.modz),
    }
}

/// Aggregate each replicate group of `table` into one consensus row.
///
/// The output carries the key columns (in configured order) as metadata,
/// followed by every feature column of the input. Key values are copied
/// from the first row of each group.
pub fn consensus(table: &ProfileTable, config: &ConsensusConfig) -> Result<ProfileTable> {
    if table.n_rows() == 0 {
        return Err(ProfileError::EmptyData("Cannot aggregate an empty table".to_string()));
    }
    let key_idx = table.schema().require_metadata(&config.replicate_columns)?;
    let groups = partition(table, &config.replicate_columns)?;

    let rows: Vec<Vec<f64>> = groups
        .par_iter()
        .map(|g| {
            aggregate_group(table, g, config)
                .map_err(|e| e.in_stage("", &g.label(), &format!("consensus ({})", config.method)))
        })
        .collect::<Result<_>>()?;

    let n_features = table.n_features();
    let mut features = DMatrix::zeros(groups.len(), n_features);
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            features[(i, j)] = v;
        }
    }

    let metadata: Vec<Vec<Variable>> = key_idx
        .iter()
        .map(|&c| groups.iter().map(|g| table.metadata_at(g.rows[0], c).clone()).collect())
        .collect();

    tracing::info!(
        method = %config.method,
        rows = table.n_rows(),
        groups = groups.len(),
        features = n_features,
        "aggregated replicates"
    );

    let schema = Schema::new(config.replicate_columns.clone(), table.feature_names().to_vec())?;
    ProfileTable::new(schema, metadata, features)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-10;

    fn create_test_table() -> ProfileTable {
        let schema = Schema::new(
            vec![
                "Metadata_Well".to_string(),
                "Metadata_broad_sample".to_string(),
                "Metadata_dose_recode".to_string(),
            ],
            vec!["f1".to_string(), "f2".to_string(), "f3".to_string()],
        )
        .unwrap();
        let wells = ["A01", "A02", "B01", "B02", "C01"];
        let samples = ["cpd1", "cpd1", "DMSO", "DMSO", "cpd2"];
        let doses = [3_i64, 3, 0, 0, 1];
        ProfileTable::new(
            schema,
            vec![
                wells.iter().map(|s| Variable::from(*s)).collect(),
                samples.iter().map(|s| Variable::from(*s)).collect(),
                doses.iter().map(|&d| Variable::from(d)).collect(),
            ],
            DMatrix::from_row_slice(
                5,
                3,
                &[
                    1.0, 2.0, 3.0, //
                    3.0, 2.0, 1.0, //
                    0.0, 0.5, 1.0, //
                    0.2, 0.6, 1.4, //
                    9.0, 8.0, 7.0,
                ],
            ),
        )
        .unwrap()
    }

    #[test]
    fn test_median_consensus_table() {
        let table = create_test_table();
        let config = ConsensusConfig::new(
            ConsensusMethod::Median,
            &["Metadata_dose_recode", "Metadata_broad_sample"],
        );
        let out = consensus(&table, &config).unwrap();

        assert_eq!(out.n_rows(), 3);
        assert_eq!(out.metadata_names(), &["Metadata_dose_recode", "Metadata_broad_sample"]);
        assert_eq!(out.feature_names(), &["f1", "f2", "f3"]);
        assert_eq!(out.metadata_at(0, 1), &Variable::from("cpd1"));
        assert_eq!(out.metadata_at(1, 0), &Variable::Integer(0));
        assert_eq!(out.row_features(0), vec![2.0, 2.0, 2.0]);
        assert_eq!(out.row_features(2), vec![9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_modz_consensus_table() {
        let table = create_test_table();
        let config = ConsensusConfig::new(ConsensusMethod::Modz, &["Metadata_broad_sample"]);
        let out = consensus(&table, &config).unwrap();

        // cpd1 replicates are anti-correlated: equal weights
        assert_eq!(out.row_features(0), vec![2.0, 2.0, 2.0]);
        // DMSO replicates are perfectly rank-correlated: equal weights as well
        let dmso = out.row_features(1);
        assert!((dmso[0] - 0.1).abs() < TOL);
        assert!((dmso[2] - 1.2).abs() < TOL);
        // singleton is identity
        assert_eq!(out.row_features(2), vec![9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_missing_key_column() {
        let table = create_test_table();
        let config = ConsensusConfig::new(ConsensusMethod::Median, &["Metadata_Plate"]);
        assert!(matches!(
            consensus(&table, &config),
            Err(ProfileError::MissingColumn(_))
        ));
    }
}
