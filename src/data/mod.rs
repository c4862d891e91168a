//! Data structures for image-based profiles.

mod control;
pub mod output;
mod profile_table;
mod schema;
mod variable;

pub use control::ControlSpec;
pub use output::{format_significant, OutputOptions};
pub use profile_table::{group_label, ProfileTable};
pub use schema::{Schema, METADATA_PREFIX};
pub use variable::Variable;
