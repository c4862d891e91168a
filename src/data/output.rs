//! Writing profile tables: numeric formatting, gzip and atomic replacement.

use crate::data::ProfileTable;
use crate::error::{ProfileError, Result};
use flate2::{Compression, GzBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// How profile tables are serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Field delimiter (default: comma).
    pub delimiter: char,
    /// Significant digits for feature values (default: 5).
    pub significant_digits: usize,
    /// Force gzip on or off; `None` decides by a `.gz` extension.
    pub compress: Option<bool>,
    /// Modification time stored in the gzip header, fixed so output is reproducible.
    pub gzip_mtime: u32,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            significant_digits: 5,
            compress: None,
            gzip_mtime: 1,
        }
    }
}

/// Format a value with `digits` significant digits using `%g` rules.
///
/// Fixed notation is used when the decimal exponent lies in
/// `[-4, digits)`, scientific notation otherwise. Trailing zeros are
/// dropped. NaN becomes an empty string.
pub fn format_significant(value: f64, digits: usize) -> String {
    if value.is_nan() {
        return String::new();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let digits = digits.max(1);

    // Round first in scientific form so the exponent reflects the rounded value.
    let sci = format!("{:.*e}", digits - 1, value);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exponent < -4 || exponent >= digits as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value))
    }
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// Write a table to `path`.
///
/// Output goes to a temporary file in the destination directory and is
/// renamed over `path` only after everything has been written and flushed,
/// so a failure never leaves a truncated file behind.
pub fn write_table(table: &ProfileTable, path: &Path, options: &OutputOptions) -> Result<()> {
    if !options.delimiter.is_ascii() {
        return Err(ProfileError::InvalidParameter(format!(
            "Delimiter '{}' must be ASCII",
            options.delimiter
        )));
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let compress = options
        .compress
        .unwrap_or_else(|| path.extension().map_or(false, |ext| ext == "gz"));

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let buffered = BufWriter::new(tmp.as_file_mut());
        if compress {
            let encoder = GzBuilder::new()
                .mtime(options.gzip_mtime)
                .write(buffered, Compression::default());
            let encoder = write_records(table, encoder, options)?;
            encoder.finish()?.flush()?;
        } else {
            write_records(table, buffered, options)?.flush()?;
        }
    }
    tmp.persist(path).map_err(|e| ProfileError::Io(e.error))?;
    tracing::debug!(path = %path.display(), rows = table.n_rows(), "wrote profile table");
    Ok(())
}

/// Serialize header and rows, returning the underlying writer for finishing.
fn write_records<W: Write>(table: &ProfileTable, writer: W, options: &OutputOptions) -> Result<W> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(options.delimiter as u8)
        .from_writer(writer);

    let header: Vec<&str> = table
        .metadata_names()
        .iter()
        .chain(table.feature_names().iter())
        .map(String::as_str)
        .collect();
    wtr.write_record(&header)?;

    let n_meta = table.metadata_names().len();
    let mut record: Vec<String> = Vec::with_capacity(header.len());
    for row in 0..table.n_rows() {
        record.clear();
        record.extend((0..n_meta).map(|c| table.metadata_at(row, c).to_string()));
        record.extend(
            (0..table.n_features())
                .map(|f| format_significant(table.get(row, f), options.significant_digits)),
        );
        wtr.write_record(&record)?;
    }

    wtr.into_inner()
        .map_err(|e| ProfileError::Io(e.into_error()))
}
