//! Recoding continuous concentrations onto an ordinal dose ladder.

pub mod recode;

pub use recode::{assign_dose_levels, recode_dose, DoseCode, DoseConfig, DoseMode, PRIMARY_DOSE_LADDER};
