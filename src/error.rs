//! Error types for the composable-profiles library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid value '{value}' at row {row}, column '{column}'")]
    InvalidValue {
        value: String,
        row: usize,
        column: String,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Schema mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("No control rows ({control}) in group '{group}'")]
    NoControls { group: String, control: String },

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("batch '{batch}', group '{group}', {operation}: {source}")]
    Stage {
        batch: String,
        group: String,
        operation: String,
        #[source]
        source: Box<ProfileError>,
    },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProfileError {
    /// Wrap an error with the batch, group and operation where it occurred.
    ///
    /// Context already attached by an inner stage wins; only blank fields
    /// are filled in.
    pub fn in_stage(self, batch: &str, group: &str, operation: &str) -> Self {
        let fill = |current: String, outer: &str| {
            if current.is_empty() {
                outer.to_string()
            } else {
                current
            }
        };
        match self {
            ProfileError::Stage {
                batch: b,
                group: g,
                operation: o,
                source,
            } => ProfileError::Stage {
                batch: fill(b, batch),
                group: fill(g, group),
                operation: fill(o, operation),
                source,
            },
            other => ProfileError::Stage {
                batch: batch.to_string(),
                group: group.to_string(),
                operation: operation.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, ProfileError>;
