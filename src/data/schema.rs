//! Explicit partition of table columns into metadata and features.
//!
//! The naming-convention split happens once, in [`Schema::infer`]. Every stage
//! after that works from the stored partition.

use crate::error::{ProfileError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Prefix that marks a metadata column in profile files.
pub const METADATA_PREFIX: &str = "Metadata_";

/// Declared metadata and feature columns of a profile table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    metadata: Vec<String>,
    features: Vec<String>,
}

impl Schema {
    /// Create a schema from explicit column lists.
    ///
    /// Column names must be unique across both lists.
    pub fn new(metadata: Vec<String>, features: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for name in metadata.iter().chain(features.iter()) {
            if !seen.insert(name.as_str()) {
                return Err(ProfileError::InvalidParameter(format!(
                    "Duplicate column '{}'",
                    name
                )));
            }
        }
        Ok(Self { metadata, features })
    }

    /// Split headers by the metadata naming prefix.
    pub fn infer(headers: &[String], prefix: &str) -> Result<Self> {
        let (metadata, features): (Vec<String>, Vec<String>) = headers
            .iter()
            .cloned()
            .partition(|h| h.starts_with(prefix));
        Self::new(metadata, features)
    }

    /// Metadata column names in order.
    pub fn metadata(&self) -> &[String] {
        &self.metadata
    }

    /// Feature column names in order.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Number of metadata columns.
    pub fn n_metadata(&self) -> usize {
        self.metadata.len()
    }

    /// Number of feature columns.
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Position of a metadata column.
    pub fn metadata_index(&self, name: &str) -> Option<usize> {
        self.metadata.iter().position(|m| m == name)
    }

    /// Position of a feature column.
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f == name)
    }

    /// Resolve metadata column names to positions, failing on the first absent one.
    pub fn require_metadata(&self, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|n| {
                self.metadata_index(n)
                    .ok_or_else(|| ProfileError::MissingColumn(n.clone()))
            })
            .collect()
    }

    /// Check that `other` declares the same feature set (order may differ).
    pub fn check_features(&self, other: &Schema) -> Result<()> {
        let mine: HashSet<&str> = self.features.iter().map(String::as_str).collect();
        let theirs: HashSet<&str> = other.features.iter().map(String::as_str).collect();

        let mut missing: Vec<String> = mine
            .difference(&theirs)
            .map(|s| s.to_string())
            .collect();
        let mut unexpected: Vec<String> = theirs
            .difference(&mine)
            .map(|s| s.to_string())
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            return Ok(());
        }
        missing.sort();
        unexpected.sort();
        Err(ProfileError::SchemaMismatch {
            missing,
            unexpected,
        })
    }

    pub(crate) fn with_features(&self, features: Vec<String>) -> Self {
        Self {
            metadata: self.metadata.clone(),
            features,
        }
    }

    pub(crate) fn with_metadata(&self, metadata: Vec<String>) -> Self {
        Self {
            metadata,
            features: self.features.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_infer_splits_by_prefix() {
        let schema = Schema::infer(
            &headers(&["Metadata_Plate", "Cells_AreaShape_Area", "Metadata_Well", "Nuclei_Intensity"]),
            METADATA_PREFIX,
        )
        .unwrap();
        assert_eq!(schema.metadata(), &["Metadata_Plate", "Metadata_Well"]);
        assert_eq!(schema.features(), &["Cells_AreaShape_Area", "Nuclei_Intensity"]);
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = Schema::new(headers(&["Metadata_Plate"]), headers(&["a", "a"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_require_metadata_names_missing_column() {
        let schema = Schema::new(headers(&["Metadata_Plate"]), headers(&["a"])).unwrap();
        match schema.require_metadata(&headers(&["Metadata_Well"])) {
            Err(ProfileError::MissingColumn(c)) => assert_eq!(c, "Metadata_Well"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_check_features_reports_both_sides() {
        let a = Schema::new(vec![], headers(&["x", "y", "z"])).unwrap();
        let b = Schema::new(vec![], headers(&["z", "y", "w"])).unwrap();
        match a.check_features(&b) {
            Err(ProfileError::SchemaMismatch { missing, unexpected }) => {
                assert_eq!(missing, vec!["x"]);
                assert_eq!(unexpected, vec!["w"]);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let c = Schema::new(vec![], headers(&["z", "x", "y"])).unwrap();
        assert!(a.check_features(&c).is_ok());
    }
}
