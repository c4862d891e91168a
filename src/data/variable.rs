//! Metadata cell values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A metadata value: free text, a number, an integer code, or missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Identifiers and categorical labels (plate, well, compound, MOA).
    Text(String),
    /// Continuous values such as concentrations.
    Number(f64),
    /// Integer codes such as the recoded dose level.
    Integer(i64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Parse a raw cell, preferring integer, then float, then text.
    ///
    /// Empty cells, `NA` and `nan` spellings become [`Variable::Missing`].
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_missing_token(trimmed) {
            return Variable::Missing;
        }
        if let Ok(v) = trimmed.parse::<i64>() {
            return Variable::Integer(v);
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Variable::Number(v),
            _ => Variable::Text(trimmed.to_string()),
        }
    }

    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Try to get as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Variable::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view: numbers and integers both qualify.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Variable::Number(v) => Some(*v),
            Variable::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get as an integer code.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Variable::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Canonical string used for grouping and equality across types.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Text(s) => write!(f, "{}", s),
            Variable::Number(v) => write!(f, "{}", v),
            Variable::Integer(v) => write!(f, "{}", v),
            Variable::Missing => Ok(()),
        }
    }
}

impl From<&str> for Variable {
    fn from(value: &str) -> Self {
        Variable::Text(value.to_string())
    }
}

impl From<f64> for Variable {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            Variable::Missing
        } else {
            Variable::Number(value)
        }
    }
}

impl From<i64> for Variable {
    fn from(value: i64) -> Self {
        Variable::Integer(value)
    }
}

/// Spellings treated as a missing cell in both metadata and feature columns.
pub(crate) fn is_missing_token(raw: &str) -> bool {
    matches!(raw, "" | "NA" | "na" | "NaN" | "nan" | "None")
}
