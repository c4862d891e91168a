//! Ordered application of feature-selection operations.

use crate::data::{group_label, ProfileTable};
use crate::error::{ProfileError, Result};
use crate::select::blocklist::{blocklist_exclusions, load_blocklist};
use crate::select::correlation::correlation_exclusions;
use crate::select::missing::na_exclusions;
use crate::select::outlier::outlier_rows;
use crate::select::variance::{variance_exclusions, VarianceRule};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// A named feature-selection operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSelectOp {
    /// Drop columns whose missing fraction exceeds `na_cutoff`.
    DropNaColumns,
    /// Drop constant and near-constant columns.
    VarianceThreshold,
    /// Drop one member of each highly correlated pair.
    CorrelationThreshold,
    /// Drop columns named in the blocklist.
    Blocklist,
    /// Drop rows with extreme values.
    DropOutliers,
}

impl fmt::Display for FeatureSelectOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureSelectOp::DropNaColumns => "drop_na_columns",
            FeatureSelectOp::VarianceThreshold => "variance_threshold",
            FeatureSelectOp::CorrelationThreshold => "correlation_threshold",
            FeatureSelectOp::Blocklist => "blocklist",
            FeatureSelectOp::DropOutliers => "drop_outliers",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for [`feature_select`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSelectConfig {
    /// Operations, applied in order.
    pub operations: Vec<FeatureSelectOp>,
    /// Candidate features; `None` means every feature column of the table.
    /// Features outside the candidate set pass through untouched.
    pub features: Option<Vec<String>>,
    /// Maximum tolerated fraction of missing values per column.
    pub na_cutoff: f64,
    /// Columns at or below this sample variance are dropped.
    pub min_variance: f64,
    /// Frequency-ratio cut for near-constant columns.
    pub freq_cut: f64,
    /// Unique-ratio cut for near-constant columns.
    pub unique_cut: f64,
    /// Absolute correlation above which one of a pair is dropped.
    pub corr_threshold: f64,
    /// Absolute value above which a row is an outlier.
    pub outlier_cutoff: f64,
    /// Feature names to exclude.
    pub blocklist: Vec<String>,
    /// Optional file with more names to exclude.
    pub blocklist_file: Option<PathBuf>,
}

impl Default for FeatureSelectConfig {
    fn default() -> Self {
        Self {
            operations: vec![
                FeatureSelectOp::VarianceThreshold,
                FeatureSelectOp::CorrelationThreshold,
                FeatureSelectOp::DropNaColumns,
                FeatureSelectOp::Blocklist,
            ],
            features: None,
            na_cutoff: 0.0,
            min_variance: 0.0,
            freq_cut: 0.05,
            unique_cut: 0.01,
            corr_threshold: 0.9,
            outlier_cutoff: 500.0,
            blocklist: Vec::new(),
            blocklist_file: None,
        }
    }
}

impl FeatureSelectConfig {
    /// Use a different operation sequence.
    pub fn with_operations(mut self, operations: &[FeatureSelectOp]) -> Self {
        self.operations = operations.to_vec();
        self
    }

    /// Inline blocklist plus the contents of `blocklist_file`, if any.
    pub fn resolved_blocklist(&self) -> Result<Vec<String>> {
        let mut names = self.blocklist.clone();
        if let Some(path) = &self.blocklist_file {
            names.extend(load_blocklist(path)?);
        }
        Ok(names)
    }

    fn variance_rule(&self) -> VarianceRule {
        VarianceRule {
            min_variance: self.min_variance,
            freq_cut: self.freq_cut,
            unique_cut: self.unique_cut,
        }
    }
}

/// What one operation removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpReport {
    /// Partition the operation ran on (`all` when ungrouped).
    pub scope: String,
    pub op: FeatureSelectOp,
    pub features_before: usize,
    pub features_after: usize,
    pub rows_before: usize,
    pub rows_after: usize,
    /// Names of dropped feature columns.
    pub removed: Vec<String>,
}

impl fmt::Display for OpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: features {} -> {}, rows {} -> {}",
            self.scope,
            self.op,
            self.features_before,
            self.features_after,
            self.rows_before,
            self.rows_after
        )
    }
}

/// Output of feature selection.
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub table: ProfileTable,
    pub reports: Vec<OpReport>,
}

impl SelectionResult {
    /// True when no feature columns survived.
    ///
    /// Selection never fails for this reason; callers decide what an empty
    /// feature set means for them.
    pub fn is_degenerate(&self) -> bool {
        self.table.n_features() == 0
    }
}

/// Apply `config.operations` in order.
///
/// Columns only ever shrink; `DropOutliers` is the one operation that
/// removes rows instead.
pub fn feature_select(table: &ProfileTable, config: &FeatureSelectConfig) -> Result<SelectionResult> {
    feature_select_scoped(table, config, "all")
}

fn feature_select_scoped(
    table: &ProfileTable,
    config: &FeatureSelectConfig,
    scope: &str,
) -> Result<SelectionResult> {
    let blocklist = config.resolved_blocklist()?;
    let mut candidates: Vec<String> = match &config.features {
        Some(names) => {
            for n in names {
                if table.schema().feature_index(n).is_none() {
                    return Err(ProfileError::MissingColumn(n.clone()));
                }
            }
            names.clone()
        }
        None => table.feature_names().to_vec(),
    };

    let mut current = table.clone();
    let mut reports = Vec::with_capacity(config.operations.len());

    for &op in &config.operations {
        let features_before = current.n_features();
        let rows_before = current.n_rows();
        let idx: Vec<usize> = candidates
            .iter()
            .filter_map(|n| current.schema().feature_index(n))
            .collect();

        let excluded = match op {
            FeatureSelectOp::DropOutliers => {
                let outliers = outlier_rows(&current, &idx, config.outlier_cutoff)?;
                let keep: Vec<usize> = (0..current.n_rows())
                    .filter(|r| !outliers.contains(r))
                    .collect();
                current = current.subset_rows(&keep)?;
                Vec::new()
            }
            FeatureSelectOp::DropNaColumns => na_exclusions(&current, &idx, config.na_cutoff)?,
            FeatureSelectOp::VarianceThreshold => {
                variance_exclusions(&current, &idx, &config.variance_rule())?
            }
            FeatureSelectOp::CorrelationThreshold => {
                correlation_exclusions(&current, &idx, config.corr_threshold)?
            }
            FeatureSelectOp::Blocklist => blocklist_exclusions(&current, &idx, &blocklist),
        };

        let excluded: HashSet<usize> = excluded.into_iter().collect();
        let mut removed: Vec<String> = excluded
            .iter()
            .map(|&f| current.feature_names()[f].clone())
            .collect();
        removed.sort();
        if !excluded.is_empty() {
            let keep: Vec<usize> = (0..current.n_features())
                .filter(|f| !excluded.contains(f))
                .collect();
            current = current.subset_features(&keep)?;
            candidates.retain(|n| !removed.contains(n));
        }

        let report = OpReport {
            scope: scope.to_string(),
            op,
            features_before,
            features_after: current.n_features(),
            rows_before,
            rows_after: current.n_rows(),
            removed,
        };
        tracing::debug!("{}", report);
        reports.push(report);
    }

    if current.n_features() == 0 {
        tracing::warn!(scope, "feature selection left no feature columns");
    }
    tracing::info!(
        scope,
        features_before = table.n_features(),
        features_after = current.n_features(),
        rows = current.n_rows(),
        "feature selection complete"
    );

    Ok(SelectionResult {
        table: current,
        reports,
    })
}

/// Run feature selection separately within each stratification group.
///
/// Only features surviving in every group are kept; the per-group tables
/// are then stacked in order of first group appearance.
pub fn feature_select_grouped(
    table: &ProfileTable,
    strata: &[String],
    config: &FeatureSelectConfig,
) -> Result<SelectionResult> {
    if strata.is_empty() {
        return feature_select(table, config);
    }
    let groups = table.partition(strata)?;

    let results: Vec<SelectionResult> = groups
        .par_iter()
        .map(|(key, rows)| {
            let label = group_label(key);
            let sub = table.subset_rows(rows)?;
            feature_select_scoped(&sub, config, &label)
                .map_err(|e| e.in_stage("", &label, "feature_select"))
        })
        .collect::<Result<_>>()?;

    let shared: Vec<String> = table
        .feature_names()
        .iter()
        .filter(|n| results.iter().all(|r| r.table.schema().feature_index(n).is_some()))
        .cloned()
        .collect();

    let tables: Vec<ProfileTable> = results
        .iter()
        .map(|r| r.table.select_features(&shared))
        .collect::<Result<_>>()?;
    let reports = results.into_iter().flat_map(|r| r.reports).collect();

    Ok(SelectionResult {
        table: ProfileTable::concat(&tables)?,
        reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Schema, Variable};
    use nalgebra::DMatrix;

    fn create_test_table() -> ProfileTable {
        // 6 rows x 5 features
        // const: constant; dup: 2 * good; gap: one missing; bad: blocklisted
        let schema = Schema::new(
            vec!["Metadata_cell_line".to_string()],
            ["good", "const", "dup", "gap", "bad"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap();
        let nan = f64::NAN;
        let features = DMatrix::from_row_slice(
            6,
            5,
            &[
                1.0, 5.0, 2.0, 1.0, 3.0, //
                2.0, 5.0, 4.0, nan, 1.0, //
                3.0, 5.0, 6.0, 2.0, 4.0, //
                4.0, 5.0, 8.0, 5.0, 1.0, //
                5.0, 5.0, 10.0, 3.0, 5.0, //
                6.0, 5.0, 12.0, 4.0, 9.0,
            ],
        );
        let lines: Vec<Variable> = ["A549", "A549", "A549", "MCF7", "MCF7", "MCF7"]
            .iter()
            .map(|s| Variable::from(*s))
            .collect();
        ProfileTable::new(schema, vec![lines], features).unwrap()
    }

    fn config() -> FeatureSelectConfig {
        FeatureSelectConfig {
            blocklist: vec!["bad".to_string()],
            ..FeatureSelectConfig::default()
        }
    }

    #[test]
    fn test_default_sequence() {
        let result = feature_select(&create_test_table(), &config()).unwrap();
        assert_eq!(result.table.feature_names(), &["dup"]);
        assert_eq!(result.reports.len(), 4);
        assert_eq!(result.reports[0].removed, vec!["const"]);
        assert!(!result.is_degenerate());
    }

    #[test]
    fn test_output_is_subset_and_excludes_blocklist() {
        let table = create_test_table();
        let result = feature_select(&table, &config()).unwrap();
        let input: HashSet<&String> = table.feature_names().iter().collect();
        for name in result.table.feature_names() {
            assert!(input.contains(name));
            assert_ne!(name, "bad");
        }
        for w in result.reports.windows(2) {
            assert!(w[1].features_before <= w[0].features_before);
        }
    }

    #[test]
    fn test_candidate_subset_leaves_others_untouched() {
        let cfg = FeatureSelectConfig {
            features: Some(vec!["good".to_string(), "gap".to_string()]),
            ..config()
        };
        let result = feature_select(&create_test_table(), &cfg).unwrap();
        // const, dup and bad were not candidates
        assert_eq!(result.table.feature_names(), &["good", "const", "dup", "bad"]);
    }

    #[test]
    fn test_degenerate_result_is_not_an_error() {
        let cfg = FeatureSelectConfig {
            blocklist: ["good", "const", "dup", "gap", "bad"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..FeatureSelectConfig::default()
        }
        .with_operations(&[FeatureSelectOp::Blocklist, FeatureSelectOp::DropNaColumns]);
        let result = feature_select(&create_test_table(), &cfg).unwrap();
        assert!(result.is_degenerate());
        assert_eq!(result.table.n_rows(), 6);
        assert_eq!(result.reports.len(), 2);
    }

    #[test]
    fn test_drop_outliers_removes_rows() {
        let cfg = FeatureSelectConfig {
            outlier_cutoff: 8.5,
            ..config()
        }
        .with_operations(&[FeatureSelectOp::DropOutliers]);
        let result = feature_select(&create_test_table(), &cfg).unwrap();
        // rows 4 (dup = 10) and 5 (dup = 12, bad = 9) exceed the cutoff
        assert_eq!(result.table.n_rows(), 4);
        assert_eq!(result.table.n_features(), 5);
    }

    #[test]
    fn test_unknown_candidate_feature() {
        let cfg = FeatureSelectConfig {
            features: Some(vec!["missing".to_string()]),
            ..config()
        };
        assert!(matches!(
            feature_select(&create_test_table(), &cfg),
            Err(ProfileError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_grouped_keeps_intersection() {
        let cfg = FeatureSelectConfig::default().with_operations(&[FeatureSelectOp::DropNaColumns]);
        let result = feature_select_grouped(
            &create_test_table(),
            &["Metadata_cell_line".to_string()],
            &cfg,
        )
        .unwrap();
        // gap is missing only within the A549 group, so it goes everywhere
        assert_eq!(result.table.feature_names(), &["good", "const", "dup", "bad"]);
        assert_eq!(result.table.n_rows(), 6);
        assert_eq!(result.reports.len(), 2);
        assert_eq!(result.reports[0].scope, "A549");
    }
}
