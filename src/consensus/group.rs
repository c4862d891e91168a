//! Replicate groups: rows sharing a key over designated metadata columns.

use crate::data::{group_label, ProfileTable};
use crate::error::Result;

/// Rows of a table that share one replicate key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicateGroup {
    /// Canonical key values, one per key column.
    pub key: Vec<String>,
    /// Row indices into the source table, in table order.
    pub rows: Vec<usize>,
}

impl ReplicateGroup {
    /// Number of replicates.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the group has no rows. Never the case for groups from [`partition`].
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Key rendered for logs and errors.
    pub fn label(&self) -> String {
        group_label(&self.key)
    }
}

/// Partition a table into replicate groups, in first-appearance order.
pub fn partition(table: &ProfileTable, key_columns: &[String]) -> Result<Vec<ReplicateGroup>> {
    Ok(table
        .partition(key_columns)?
        .into_iter()
        .map(|(key, rows)| ReplicateGroup { key, rows })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Schema, Variable};
    use nalgebra::DMatrix;

    #[test]
    fn test_partition_first_appearance() {
        let schema = Schema::new(
            vec!["Metadata_broad_sample".to_string(), "Metadata_dose_recode".to_string()],
            vec!["f1".to_string()],
        )
        .unwrap();
        let table = ProfileTable::new(
            schema,
            vec![
                ["B", "A", "B", "A"].iter().map(|s| Variable::from(*s)).collect(),
                [1_i64, 2, 1, 2].iter().map(|&d| Variable::from(d)).collect(),
            ],
            DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]),
        )
        .unwrap();

        let keys = vec!["Metadata_broad_sample".to_string(), "Metadata_dose_recode".to_string()];
        let groups = partition(&table, &keys).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, vec!["B", "1"]);
        assert_eq!(groups[0].rows, vec![0, 2]);
        assert_eq!(groups[1].label(), "A/2");
        assert_eq!(groups[1].len(), 2);
    }

    #[test]
    fn test_partition_missing_column() {
        let schema = Schema::new(vec!["Metadata_Well".to_string()], vec!["f1".to_string()]).unwrap();
        let table = ProfileTable::new(
            schema,
            vec![vec![Variable::from("A01")]],
            DMatrix::from_row_slice(1, 1, &[0.0]),
        )
        .unwrap();
        assert!(partition(&table, &["Metadata_Plate".to_string()]).is_err());
    }
}
