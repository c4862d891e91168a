//! Independent batch runs with atomic outputs.

use crate::data::{OutputOptions, ProfileTable};
use crate::error::{ProfileError, Result};
use crate::pipeline::runner::Pipeline;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One experimental cohort: plate files in, one profile table out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub name: String,
    /// Plate-level profile files, stacked in order.
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

impl BatchJob {
    pub fn new(name: &str, inputs: Vec<PathBuf>, output: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            inputs,
            output,
        }
    }
}

/// Shape of a successfully written batch output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub input_rows: usize,
    pub rows: usize,
    pub features: usize,
}

/// Result of one batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub name: String,
    pub output: PathBuf,
    pub result: Result<BatchSummary>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Load and stack the plate files of a batch.
pub fn load_batch(job: &BatchJob) -> Result<ProfileTable> {
    if job.inputs.is_empty() {
        return Err(ProfileError::EmptyData(format!("Batch '{}' has no inputs", job.name)));
    }
    let plates: Vec<ProfileTable> = job
        .inputs
        .iter()
        .map(ProfileTable::from_csv)
        .collect::<Result<_>>()?;
    ProfileTable::concat(&plates)
}

fn run_batch(pipeline: &Pipeline, job: &BatchJob, options: &OutputOptions) -> Result<BatchSummary> {
    let table = load_batch(job).map_err(|e| e.in_stage(&job.name, "", "load"))?;
    let out = pipeline
        .run(&table)
        .map_err(|e| e.in_stage(&job.name, "", "run"))?;
    out.to_csv(&job.output, options)
        .map_err(|e| e.in_stage(&job.name, "", "write"))?;
    Ok(BatchSummary {
        input_rows: table.n_rows(),
        rows: out.n_rows(),
        features: out.n_features(),
    })
}

/// Run the pipeline on every batch in parallel.
///
/// Batches fail independently: an error in one batch is reported in its
/// outcome, leaves no output file for that batch, and does not affect the
/// others. Outcomes follow the order of `jobs`.
pub fn run_batches(
    pipeline: &Pipeline,
    jobs: &[BatchJob],
    options: &OutputOptions,
) -> Vec<BatchOutcome> {
    jobs.par_iter()
        .map(|job| {
            let result = run_batch(pipeline, job, options);
            match &result {
                Ok(summary) => tracing::info!(
                    batch = %job.name,
                    rows = summary.rows,
                    features = summary.features,
                    output = %job.output.display(),
                    "batch finished"
                ),
                Err(e) => tracing::error!(batch = %job.name, error = %e, "batch failed"),
            }
            BatchOutcome {
                name: job.name.clone(),
                output: job.output.clone(),
                result,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{ConsensusConfig, ConsensusMethod};
    use crate::normalize::SpherizeConfig;
    use crate::select::{FeatureSelectConfig, FeatureSelectOp};
    use std::fs;
    use tempfile::tempdir;

    const PLATE: &str = "\
Metadata_Plate,Metadata_Well,Metadata_broad_sample,f1,f2
P1,A01,DMSO,0.1,1.0
P1,A02,DMSO,0.3,1.2
P1,B01,cpd1,2.0,-1.0
P1,B02,cpd1,2.2,-0.8
";

    const FLAT_PLATE: &str = "\
Metadata_Plate,Metadata_Well,Metadata_broad_sample,f1,f2
P2,A01,DMSO,1.0,3.0
P2,A02,DMSO,1.0,3.0
P2,B01,cpd1,1.0,3.0
P2,B02,cpd1,1.0,3.0
";

    #[test]
    fn test_failed_batch_does_not_affect_sibling() {
        let dir = tempdir().unwrap();
        let plate = dir.path().join("plate.csv");
        fs::write(&plate, PLATE).unwrap();

        let good = BatchJob::new("good", vec![plate.clone()], dir.path().join("good.csv.gz"));
        let bad = BatchJob::new(
            "bad",
            vec![plate, dir.path().join("missing.csv")],
            dir.path().join("bad.csv.gz"),
        );
        let pipeline = Pipeline::new().consensus(ConsensusConfig::new(
            ConsensusMethod::Median,
            &["Metadata_broad_sample"],
        ));

        let outcomes = run_batches(&pipeline, &[good, bad], &OutputOptions::default());
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_success());
        assert!(!outcomes[1].is_success());
        assert!(dir.path().join("good.csv.gz").exists());
        assert!(!dir.path().join("bad.csv.gz").exists());

        match &outcomes[1].result {
            Err(ProfileError::Stage { batch, operation, .. }) => {
                assert_eq!(batch, "bad");
                assert_eq!(operation, "load");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            outcomes[0].result.as_ref().unwrap(),
            &BatchSummary {
                input_rows: 4,
                rows: 2,
                features: 2
            }
        );
    }

    #[test]
    fn test_empty_batch() {
        let job = BatchJob::new("empty", Vec::new(), PathBuf::from("out.csv"));
        assert!(load_batch(&job).is_err());
    }

    #[test]
    fn test_batch_without_features_runs_beside_healthy_batch() {
        let dir = tempdir().unwrap();
        let plate = dir.path().join("plate.csv");
        let flat = dir.path().join("flat.csv");
        fs::write(&plate, PLATE).unwrap();
        fs::write(&flat, FLAT_PLATE).unwrap();

        let jobs = [
            BatchJob::new("flat", vec![flat], dir.path().join("flat.csv.gz")),
            BatchJob::new("good", vec![plate], dir.path().join("good.csv.gz")),
        ];
        // every column of the flat plate is constant, so selection leaves
        // nothing to sphere
        let pipeline = Pipeline::new()
            .feature_select(
                FeatureSelectConfig::default().with_operations(&[FeatureSelectOp::VarianceThreshold]),
            )
            .spherize(SpherizeConfig::default());

        let outcomes = run_batches(&pipeline, &jobs, &OutputOptions::default());
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.is_success()));
        assert_eq!(outcomes[0].result.as_ref().unwrap().features, 0);
        assert_eq!(outcomes[0].result.as_ref().unwrap().rows, 4);
        assert_eq!(outcomes[1].result.as_ref().unwrap().features, 2);
        assert!(dir.path().join("flat.csv.gz").exists());
        assert!(dir.path().join("good.csv.gz").exists());
    }
}
