//! Pipeline runner for composing and executing profile processing steps.

use crate::consensus::{build_consensus_signatures, consensus, ConsensusConfig, ConsensusPlan};
use crate::data::{OutputOptions, ProfileTable, Variable};
use crate::dose::{assign_dose_levels, DoseConfig};
use crate::error::{ProfileError, Result};
use crate::normalize::{normalize, spherize_grouped, NormalizeConfig, SpherizeConfig};
use crate::pipeline::batch::BatchJob;
use crate::select::{feature_select, feature_select_grouped, FeatureSelectConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A step in the processing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineStep {
    // === Annotation ===
    /// Recode concentrations onto the dose ladder.
    RecodeDose(DoseConfig),
    /// Replace missing values of a metadata column.
    FillMetadata { column: String, value: String },
    /// Set a metadata column to one value on every row.
    SetMetadata { column: String, value: String },

    // === Feature Selection ===
    /// Feature selection over the whole table.
    FeatureSelect(FeatureSelectConfig),
    /// Feature selection per stratification group, keeping shared survivors.
    FeatureSelectGrouped {
        strata: Vec<String>,
        config: FeatureSelectConfig,
    },

    // === Normalization ===
    /// Per-feature normalization to controls.
    Normalize(NormalizeConfig),
    /// Whitening against controls, per stratification group.
    Spherize(SpherizeConfig),

    // === Aggregation ===
    /// Collapse replicate groups.
    Consensus(ConsensusConfig),
    /// Controls per well plus treatments per compound.
    ConsensusSignatures(ConsensusPlan),
}

impl PipelineStep {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStep::RecodeDose(_) => "recode_dose",
            PipelineStep::FillMetadata { .. } => "fill_metadata",
            PipelineStep::SetMetadata { .. } => "set_metadata",
            PipelineStep::FeatureSelect(_) => "feature_select",
            PipelineStep::FeatureSelectGrouped { .. } => "feature_select_grouped",
            PipelineStep::Normalize(_) => "normalize",
            PipelineStep::Spherize(_) => "spherize",
            PipelineStep::Consensus(_) => "consensus",
            PipelineStep::ConsensusSignatures(_) => "consensus_signatures",
        }
    }

    fn apply(&self, table: ProfileTable) -> Result<ProfileTable> {
        match self {
            PipelineStep::RecodeDose(config) => assign_dose_levels(&table, config),
            PipelineStep::FillMetadata { column, value } => {
                table.fill_missing(column, &Variable::parse(value))
            }
            PipelineStep::SetMetadata { column, value } => {
                table.with_constant_metadata(column, Variable::parse(value))
            }
            PipelineStep::FeatureSelect(config) => Ok(feature_select(&table, config)?.table),
            PipelineStep::FeatureSelectGrouped { strata, config } => {
                Ok(feature_select_grouped(&table, strata, config)?.table)
            }
            PipelineStep::Normalize(config) => normalize(&table, config),
            PipelineStep::Spherize(config) => spherize_grouped(&table, config),
            PipelineStep::Consensus(config) => consensus(&table, config),
            PipelineStep::ConsensusSignatures(plan) => build_consensus_signatures(&table, plan),
        }
    }
}

/// Pipeline configuration for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name of the pipeline.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Steps to execute.
    pub steps: Vec<PipelineStep>,
    /// Batches to run the steps on.
    #[serde(default)]
    pub batches: Vec<BatchJob>,
    /// How batch outputs are written.
    #[serde(default)]
    pub output: OutputOptions,
}

impl PipelineConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that batch names and output paths are unique.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut outputs = HashSet::new();
        for job in &self.batches {
            if !names.insert(job.name.as_str()) {
                return Err(ProfileError::Pipeline(format!(
                    "Duplicate batch name '{}'",
                    job.name
                )));
            }
            if !outputs.insert(job.output.as_path()) {
                return Err(ProfileError::Pipeline(format!(
                    "Batch '{}' writes to {:?}, which another batch also writes",
                    job.name, job.output
                )));
            }
        }
        Ok(())
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }
}

/// Builder for constructing and running processing pipelines.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
    name: String,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            name: "unnamed".to_string(),
        }
    }

    /// Create from a config.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            steps: config.steps.clone(),
            name: config.name.clone(),
        }
    }

    /// Set the pipeline name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Add dose recoding.
    pub fn recode_dose(mut self, config: DoseConfig) -> Self {
        self.steps.push(PipelineStep::RecodeDose(config));
        self
    }

    /// Fill missing values of a metadata column, e.g. unknown MOA.
    pub fn fill_metadata(mut self, column: &str, value: &str) -> Self {
        self.steps.push(PipelineStep::FillMetadata {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Set a metadata column to a constant.
    pub fn set_metadata(mut self, column: &str, value: &str) -> Self {
        self.steps.push(PipelineStep::SetMetadata {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Add feature selection.
    pub fn feature_select(mut self, config: FeatureSelectConfig) -> Self {
        self.steps.push(PipelineStep::FeatureSelect(config));
        self
    }

    /// Add per-group feature selection.
    pub fn feature_select_grouped(mut self, strata: &[&str], config: FeatureSelectConfig) -> Self {
        self.steps.push(PipelineStep::FeatureSelectGrouped {
            strata: strata.iter().map(|s| s.to_string()).collect(),
            config,
        });
        self
    }

    /// Add normalization to controls.
    pub fn normalize(mut self, config: NormalizeConfig) -> Self {
        self.steps.push(PipelineStep::Normalize(config));
        self
    }

    /// Add sphering.
    pub fn spherize(mut self, config: SpherizeConfig) -> Self {
        self.steps.push(PipelineStep::Spherize(config));
        self
    }

    /// Add consensus aggregation.
    pub fn consensus(mut self, config: ConsensusConfig) -> Self {
        self.steps.push(PipelineStep::Consensus(config));
        self
    }

    /// Add two-track consensus signatures.
    pub fn consensus_signatures(mut self, plan: ConsensusPlan) -> Self {
        self.steps.push(PipelineStep::ConsensusSignatures(plan));
        self
    }

    /// Convert to config for serialization.
    pub fn to_config(&self, description: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            name: self.name.clone(),
            description: description.map(String::from),
            steps: self.steps.clone(),
            batches: Vec::new(),
            output: OutputOptions::default(),
        }
    }

    /// Run the pipeline on a table.
    ///
    /// A failing step is reported with its position and name.
    pub fn run(&self, table: &ProfileTable) -> Result<ProfileTable> {
        let mut current = table.clone();

        for (i, step) in self.steps.iter().enumerate() {
            tracing::debug!(
                pipeline = %self.name,
                step = i + 1,
                name = step.name(),
                rows = current.n_rows(),
                features = current.n_features(),
                "applying step"
            );
            current = step
                .apply(current)
                .map_err(|e| e.in_stage("", "all", &format!("step {} ({})", i + 1, step.name())))?;
        }

        tracing::info!(
            pipeline = %self.name,
            steps = self.steps.len(),
            rows = current.n_rows(),
            features = current.n_features(),
            "pipeline finished"
        );
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ConsensusMethod;
    use crate::data::Schema;
    use crate::select::FeatureSelectOp;
    use nalgebra::DMatrix;

    fn create_test_table() -> ProfileTable {
        let schema = Schema::new(
            vec![
                "Metadata_broad_sample".to_string(),
                "Metadata_mmoles_per_liter".to_string(),
                "Metadata_moa".to_string(),
            ],
            vec!["f1".to_string(), "f2".to_string(), "f3".to_string()],
        )
        .unwrap();
        let samples = ["DMSO", "DMSO", "DMSO", "cpd1", "cpd1", "cpd2"];
        let conc = [0.0, 0.0, 0.0, 0.35, 0.38, 10.2];
        let moa = [None, None, None, Some("kinase inhibitor"), Some("kinase inhibitor"), None];
        ProfileTable::new(
            schema,
            vec![
                samples.iter().map(|s| Variable::from(*s)).collect(),
                conc.iter().map(|&c| Variable::from(c)).collect(),
                moa.iter()
                    .map(|m| m.map_or(Variable::Missing, Variable::from))
                    .collect(),
            ],
            DMatrix::from_row_slice(
                6,
                3,
                &[
                    0.1, 1.0, 5.0, //
                    0.3, 1.0, 4.0, //
                    0.2, 1.0, 6.0, //
                    2.0, 1.0, 1.0, //
                    2.2, 1.0, 2.0, //
                    4.0, 1.0, 9.0,
                ],
            ),
        )
        .unwrap()
    }

    #[test]
    fn test_pipeline_builder() {
        let pipeline = Pipeline::new()
            .name("test")
            .recode_dose(DoseConfig::default())
            .fill_metadata("Metadata_moa", "unknown")
            .consensus(ConsensusConfig::default());
        assert_eq!(pipeline.steps().len(), 3);
        assert_eq!(pipeline.steps()[1].name(), "fill_metadata");
    }

    #[test]
    fn test_pipeline_run() {
        let select = FeatureSelectConfig::default()
            .with_operations(&[FeatureSelectOp::VarianceThreshold]);
        let pipeline = Pipeline::new()
            .recode_dose(DoseConfig::default())
            .fill_metadata("Metadata_moa", "unknown")
            .feature_select(select)
            .consensus(ConsensusConfig::new(
                ConsensusMethod::Median,
                &["Metadata_broad_sample", "Metadata_dose_recode", "Metadata_moa"],
            ));

        let out = pipeline.run(&create_test_table()).unwrap();
        // DMSO, cpd1 @ level 3, cpd2 @ level 6
        assert_eq!(out.n_rows(), 3);
        assert_eq!(out.feature_names(), &["f1", "f3"]);
        assert_eq!(out.metadata_at(1, 1), &Variable::Integer(3));
        assert_eq!(out.metadata_at(2, 1), &Variable::Integer(6));
        assert_eq!(out.metadata_at(0, 2), &Variable::from("unknown"));
        assert!((out.get(1, 0) - 2.1).abs() < 1e-10);
    }

    #[test]
    fn test_failing_step_names_position() {
        let pipeline = Pipeline::new()
            .fill_metadata("Metadata_moa", "unknown")
            .consensus(ConsensusConfig::new(ConsensusMethod::Median, &["Metadata_Plate"]));
        let err = pipeline.run(&create_test_table()).unwrap_err();
        match err {
            ProfileError::Stage { operation, source, .. } => {
                assert_eq!(operation, "step 2 (consensus)");
                assert!(matches!(*source, ProfileError::MissingColumn(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_config_yaml_roundtrip() {
        let pipeline = Pipeline::new()
            .name("yaml-test")
            .recode_dose(DoseConfig::default())
            .spherize(SpherizeConfig::default());
        let config = pipeline.to_config(Some("round trip"));
        let yaml = config.to_yaml().unwrap();
        let loaded = PipelineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(loaded.name, "yaml-test");
        assert_eq!(loaded.steps.len(), 2);
        assert_eq!(loaded.steps[1].name(), "spherize");
    }

    #[test]
    fn test_duplicate_batch_output_rejected() {
        let yaml = r#"
name: dup
description: null
steps: []
batches:
  - name: a
    inputs: [a.csv]
    output: out.csv.gz
  - name: b
    inputs: [b.csv]
    output: out.csv.gz
"#;
        assert!(matches!(
            PipelineConfig::from_yaml(yaml),
            Err(ProfileError::Pipeline(_))
        ));
    }

    #[test]
    fn test_config_from_handwritten_yaml() {
        let yaml = r#"
name: batch-2
description: median consensus
steps:
  - FillMetadata:
      column: Metadata_moa
      value: unknown
  - Consensus:
      method: modz
      replicate_columns: [Metadata_broad_sample]
batches:
  - name: plate1
    inputs: [plate1.csv.gz]
    output: out/plate1_consensus.csv.gz
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.batches.len(), 1);
        match &config.steps[1] {
            PipelineStep::Consensus(c) => {
                assert_eq!(c.method, ConsensusMethod::Modz);
                assert_eq!(c.modz.min_correlation, 0.0);
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }
}
