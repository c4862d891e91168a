//! Basic example building consensus signatures from replicate plates.
//!
//! This example shows how to:
//! 1. Create synthetic well-level profiles for three replicate plates
//! 2. Recode doses and select features
//! 3. Collapse replicates into MODZ consensus signatures
//! 4. Sphere the signatures against the DMSO controls

use composable_profiles::prelude::*;
use nalgebra::DMatrix;

const FEATURES: [&str; 6] = [
    "Cells_AreaShape_Area",
    "Cells_AreaShape_Perimeter",
    "Cells_Intensity_MeanIntensity_DNA",
    "Nuclei_Texture_Contrast_DNA",
    "Cytoplasm_Granularity_1_RNA",
    "Image_Count_Cells",
];

fn main() -> Result<()> {
    println!("=== Composable Profiles Example ===\n");

    let table = create_example_data()?;
    let controls = ControlSpec::default().indices(&table)?;

    println!("Data dimensions:");
    println!("  Wells:    {}", table.n_rows());
    println!("  Features: {}", table.n_features());
    println!("  Controls: {}", controls.len());
    println!();

    // Feature selection on its own, to see what each operation removes
    println!("=== Feature Selection ===\n");

    let selection = feature_select(&table, &FeatureSelectConfig::default())?;
    for report in &selection.reports {
        println!("  {}", report);
    }
    println!("Kept: {:?}", selection.table.feature_names());
    println!();

    // Full pipeline
    println!("=== Running Consensus Pipeline ===\n");

    let signatures = Pipeline::new()
        .name("consensus-example")
        .recode_dose(DoseConfig::default())
        .feature_select(FeatureSelectConfig::default())
        .consensus_signatures(ConsensusPlan::default())
        .spherize(SpherizeConfig::default())
        .run(&table)?;

    println!("Pipeline complete!");
    println!("  Signatures: {}", signatures.n_rows());
    println!("  Features:   {}", signatures.n_features());
    println!();

    println!("=== Consensus Signatures ===\n");
    let sample = signatures.schema().metadata_index("Metadata_broad_sample");
    let well = signatures.schema().metadata_index("Metadata_pert_well");
    let dose = signatures.schema().metadata_index("Metadata_dose_recode");
    println!("{:<12} {:<10} {:>5}  {}", "Sample", "Well", "Dose", "Features");
    println!("{}", "-".repeat(60));

    for row in 0..signatures.n_rows() {
        let cell = |column: Option<usize>| {
            column
                .map(|c| signatures.metadata_at(row, c).to_string())
                .unwrap_or_default()
        };
        let values: Vec<String> = signatures
            .row_features(row)
            .iter()
            .map(|v| format_significant(*v, 3))
            .collect();
        println!(
            "{:<12} {:<10} {:>5}  {}",
            cell(sample),
            cell(well),
            cell(dose),
            values.join(" ")
        );
    }

    Ok(())
}

/// Three replicate plates sharing one plate map: eight DMSO wells and two
/// compounds at three doses each.
fn create_example_data() -> Result<ProfileTable> {
    let mut noise = Noise(42);
    let mut plate_map = Vec::new();
    let mut samples = Vec::new();
    let mut wells = Vec::new();
    let mut concentrations = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for plate in 0..3 {
        let mut layout: Vec<(String, &str, f64)> = (1..=8)
            .map(|i| (format!("A{:02}", i), "DMSO", 0.0))
            .collect();
        for (c, compound) in ["BRD-K001", "BRD-K002"].iter().enumerate() {
            for (d, conc) in [0.12, 1.11, 10.0].iter().enumerate() {
                layout.push((format!("B{:02}", c * 3 + d + 1), *compound, *conc));
            }
        }

        for (well, sample, conc) in layout {
            // compound effects grow with log dose
            let effect = if sample == "DMSO" { 0.0 } else { conc.ln_1p() };
            let sign = if sample == "BRD-K001" { 1.0 } else { -1.0 };
            let area = 500.0 + 40.0 * effect * sign + 20.0 * noise.sample() + plate as f64;
            rows.push(vec![
                area,
                2.0 * area + noise.sample(),
                0.8 - 0.05 * effect + 0.02 * noise.sample(),
                3.0 + 0.3 * noise.sample(),
                1.5 + 0.1 * effect + 0.1 * noise.sample(),
                100.0,
            ]);
            plate_map.push(Variable::from("H-BIOA-001"));
            samples.push(Variable::from(sample));
            wells.push(Variable::from(well.as_str()));
            concentrations.push(Variable::from(conc));
        }
    }

    let schema = Schema::new(
        vec![
            "Metadata_Plate_Map_Name".to_string(),
            "Metadata_broad_sample".to_string(),
            "Metadata_pert_well".to_string(),
            "Metadata_mmoles_per_liter".to_string(),
        ],
        FEATURES.iter().map(|f| f.to_string()).collect(),
    )?;
    let features = DMatrix::from_fn(rows.len(), FEATURES.len(), |i, j| rows[i][j]);
    ProfileTable::new(schema, vec![plate_map, samples, wells, concentrations], features)
}

/// Deterministic values in [-1, 1).
struct Noise(u64);

impl Noise {
    fn sample(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }
}
