//! Selection of the control (vehicle) subpopulation.

use crate::data::ProfileTable;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rows whose `column` equals `value` are controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSpec {
    pub column: String,
    pub value: String,
}

impl Default for ControlSpec {
    fn default() -> Self {
        Self {
            column: "Metadata_broad_sample".to_string(),
            value: "DMSO".to_string(),
        }
    }
}

impl ControlSpec {
    pub fn new(column: &str, value: &str) -> Self {
        Self {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    /// Per-row control flags for a table.
    pub fn mask(&self, table: &ProfileTable) -> Result<Vec<bool>> {
        let column = table.metadata_column(&self.column)?;
        Ok(column.iter().map(|v| v.key() == self.value).collect())
    }

    /// Row indices of the controls in a table.
    pub fn indices(&self, table: &ProfileTable) -> Result<Vec<usize>> {
        Ok(self
            .mask(table)?
            .into_iter()
            .enumerate()
            .filter_map(|(i, is_control)| is_control.then_some(i))
            .collect())
    }
}

impl fmt::Display for ControlSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} == '{}'", self.column, self.value)
    }
}
