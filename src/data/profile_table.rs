//! Profile table: per-well metadata plus a dense feature matrix.

use crate::data::output::{write_table, OutputOptions};
use crate::data::schema::{Schema, METADATA_PREFIX};
use crate::data::variable::{is_missing_token, Variable};
use crate::error::{ProfileError, Result};
use flate2::read::MultiGzDecoder;
use nalgebra::DMatrix;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// A table of profiles with one row per sample (well or consensus group).
///
/// Metadata is stored column-major, one vector of [`Variable`] per metadata
/// column. Features are stored as a dense `rows × features` matrix so that
/// numeric transforms never see metadata.
#[derive(Debug, Clone)]
pub struct ProfileTable {
    schema: Schema,
    /// One vector per metadata column, each of length `n_rows`.
    metadata: Vec<Vec<Variable>>,
    /// Feature values (rows × features).
    features: DMatrix<f64>,
}

impl ProfileTable {
    /// Create a table, checking that every column has one value per row.
    pub fn new(
        schema: Schema,
        metadata: Vec<Vec<Variable>>,
        features: DMatrix<f64>,
    ) -> Result<Self> {
        if metadata.len() != schema.n_metadata() {
            return Err(ProfileError::DimensionMismatch {
                expected: schema.n_metadata(),
                actual: metadata.len(),
            });
        }
        if features.ncols() != schema.n_features() {
            return Err(ProfileError::DimensionMismatch {
                expected: schema.n_features(),
                actual: features.ncols(),
            });
        }
        let n_rows = features.nrows();
        for column in &metadata {
            if column.len() != n_rows {
                return Err(ProfileError::DimensionMismatch {
                    expected: n_rows,
                    actual: column.len(),
                });
            }
        }
        Ok(Self {
            schema,
            metadata,
            features,
        })
    }

    /// Load a delimited profile file, inferring metadata columns by the
    /// `Metadata_` prefix. Files ending in `.gz` are decompressed.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_csv_with_prefix(path, METADATA_PREFIX)
    }

    /// Load a delimited profile file with a custom metadata prefix.
    pub fn from_csv_with_prefix<P: AsRef<Path>>(path: P, prefix: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path)?);
        let is_gz = path.extension().map_or(false, |ext| ext == "gz");
        let delimiter = if is_tsv(path) { b'\t' } else { b',' };
        if is_gz {
            Self::from_reader(MultiGzDecoder::new(file), delimiter, prefix)
        } else {
            Self::from_reader(file, delimiter, prefix)
        }
    }

    /// Parse profiles from any reader.
    ///
    /// Empty and `NA`/`nan` feature cells become NaN; any other unparsable
    /// feature cell is an error.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8, prefix: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        if headers.is_empty() {
            return Err(ProfileError::EmptyData("Profile file has no header".to_string()));
        }
        let schema = Schema::infer(&headers, prefix)?;

        let positions: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();
        let meta_pos: Vec<usize> = schema.metadata().iter().map(|m| positions[m.as_str()]).collect();
        let feat_pos: Vec<usize> = schema.features().iter().map(|f| positions[f.as_str()]).collect();

        let mut metadata: Vec<Vec<Variable>> = vec![Vec::new(); meta_pos.len()];
        let mut values: Vec<f64> = Vec::new();
        let mut n_rows = 0;

        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            if record.len() != headers.len() {
                return Err(ProfileError::DimensionMismatch {
                    expected: headers.len(),
                    actual: record.len(),
                });
            }
            for (col, &pos) in meta_pos.iter().enumerate() {
                metadata[col].push(Variable::parse(&record[pos]));
            }
            for (col, &pos) in feat_pos.iter().enumerate() {
                let raw = record[pos].trim();
                let value = if is_missing_token(raw) {
                    f64::NAN
                } else {
                    raw.parse::<f64>().map_err(|_| ProfileError::InvalidValue {
                        value: raw.to_string(),
                        row,
                        column: schema.features()[col].clone(),
                    })?
                };
                values.push(value);
            }
            n_rows += 1;
        }

        let features = DMatrix::from_row_slice(n_rows, feat_pos.len(), &values);
        Self::new(schema, metadata, features)
    }

    /// Write the table atomically; see [`OutputOptions`] for formatting.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P, options: &OutputOptions) -> Result<()> {
        write_table(self, path.as_ref(), options)
    }

    /// Number of rows (samples).
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    /// Number of feature columns.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// The column partition.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Feature column names.
    #[inline]
    pub fn feature_names(&self) -> &[String] {
        self.schema.features()
    }

    /// Metadata column names.
    #[inline]
    pub fn metadata_names(&self) -> &[String] {
        self.schema.metadata()
    }

    /// Feature matrix (rows × features).
    #[inline]
    pub fn features(&self) -> &DMatrix<f64> {
        &self.features
    }

    /// Feature value at (row, feature).
    #[inline]
    pub fn get(&self, row: usize, feature: usize) -> f64 {
        self.features[(row, feature)]
    }

    /// All values of one metadata column.
    pub fn metadata_column(&self, name: &str) -> Result<&[Variable]> {
        let idx = self
            .schema
            .metadata_index(name)
            .ok_or_else(|| ProfileError::MissingColumn(name.to_string()))?;
        Ok(&self.metadata[idx])
    }

    /// Metadata value at (row, metadata column index).
    #[inline]
    pub fn metadata_at(&self, row: usize, column: usize) -> &Variable {
        &self.metadata[column][row]
    }

    /// Feature vector of one row.
    pub fn row_features(&self, row: usize) -> Vec<f64> {
        self.features.row(row).iter().copied().collect()
    }

    /// Feature values of one column.
    pub fn feature_column(&self, feature: usize) -> Vec<f64> {
        self.features.column(feature).iter().copied().collect()
    }

    /// Replace the feature matrix, keeping metadata and column names.
    pub fn with_features(&self, features: DMatrix<f64>) -> Result<Self> {
        if features.nrows() != self.n_rows() {
            return Err(ProfileError::DimensionMismatch {
                expected: self.n_rows(),
                actual: features.nrows(),
            });
        }
        Self::new(self.schema.clone(), self.metadata.clone(), features)
    }

    /// Keep the given rows, in the given order.
    pub fn subset_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_rows()) {
            return Err(ProfileError::InvalidParameter(format!(
                "Row index {} out of bounds",
                bad
            )));
        }
        let metadata = self
            .metadata
            .iter()
            .map(|col| indices.iter().map(|&i| col[i].clone()).collect())
            .collect();
        let features = self.features.select_rows(indices.iter());
        Self::new(self.schema.clone(), metadata, features)
    }

    /// Keep the given feature columns (by index), in the given order.
    pub fn subset_features(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_features()) {
            return Err(ProfileError::InvalidParameter(format!(
                "Feature index {} out of bounds",
                bad
            )));
        }
        let names = indices
            .iter()
            .map(|&i| self.schema.features()[i].clone())
            .collect();
        let features = self.features.select_columns(indices.iter());
        Self::new(self.schema.with_features(names), self.metadata.clone(), features)
    }

    /// Keep the named feature columns, in the given order.
    pub fn select_features(&self, names: &[String]) -> Result<Self> {
        let indices: Vec<usize> = names
            .iter()
            .map(|n| {
                self.schema
                    .feature_index(n)
                    .ok_or_else(|| ProfileError::MissingColumn(n.clone()))
            })
            .collect::<Result<_>>()?;
        self.subset_features(&indices)
    }

    /// Reorder features to match `schema`, which must hold the same feature set.
    pub fn align_features(&self, schema: &Schema) -> Result<Self> {
        self.schema.check_features(schema)?;
        self.select_features(schema.features())
    }

    /// Keep only the named metadata columns, in the given order.
    pub fn select_metadata(&self, names: &[String]) -> Result<Self> {
        let indices = self.schema.require_metadata(names)?;
        let metadata = indices.iter().map(|&i| self.metadata[i].clone()).collect();
        Self::new(
            self.schema.with_metadata(names.to_vec()),
            metadata,
            self.features.clone(),
        )
    }

    /// Add a metadata column, or replace it if it already exists.
    pub fn with_metadata_column(&self, name: &str, values: Vec<Variable>) -> Result<Self> {
        if values.len() != self.n_rows() {
            return Err(ProfileError::DimensionMismatch {
                expected: self.n_rows(),
                actual: values.len(),
            });
        }
        if self.schema.feature_index(name).is_some() {
            return Err(ProfileError::InvalidParameter(format!(
                "'{}' is a feature column",
                name
            )));
        }
        let mut names = self.schema.metadata().to_vec();
        let mut metadata = self.metadata.clone();
        match self.schema.metadata_index(name) {
            Some(idx) => metadata[idx] = values,
            None => {
                names.push(name.to_string());
                metadata.push(values);
            }
        }
        Self::new(self.schema.with_metadata(names), metadata, self.features.clone())
    }

    /// Set every row of a metadata column to one value.
    pub fn with_constant_metadata(&self, name: &str, value: Variable) -> Result<Self> {
        self.with_metadata_column(name, vec![value; self.n_rows()])
    }

    /// Replace missing cells of a metadata column with `value`.
    pub fn fill_missing(&self, name: &str, value: &Variable) -> Result<Self> {
        let filled = self
            .metadata_column(name)?
            .iter()
            .map(|v| if v.is_missing() { value.clone() } else { v.clone() })
            .collect();
        self.with_metadata_column(name, filled)
    }

    /// Canonical key of a row over the given metadata column indices.
    pub fn row_key(&self, row: usize, columns: &[usize]) -> Vec<String> {
        columns.iter().map(|&c| self.metadata[c][row].key()).collect()
    }

    /// Partition rows by the values of the named metadata columns.
    ///
    /// Groups are returned in order of first appearance; row indices within a
    /// group keep table order.
    pub fn partition(&self, columns: &[String]) -> Result<Vec<(Vec<String>, Vec<usize>)>> {
        let idx = self.schema.require_metadata(columns)?;
        let mut lookup: HashMap<Vec<String>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<String>, Vec<usize>)> = Vec::new();

        for row in 0..self.n_rows() {
            let key = self.row_key(row, &idx);
            match lookup.get(&key) {
                Some(&g) => groups[g].1.push(row),
                None => {
                    lookup.insert(key.clone(), groups.len());
                    groups.push((key, vec![row]));
                }
            }
        }
        Ok(groups)
    }

    /// Stack tables row-wise.
    ///
    /// All tables must carry the same feature set; features follow the first
    /// table's order. Metadata columns are the union in order of first
    /// appearance, with absent cells filled as missing.
    pub fn concat(tables: &[ProfileTable]) -> Result<Self> {
        let first = tables
            .first()
            .ok_or_else(|| ProfileError::EmptyData("No tables to concatenate".to_string()))?;

        let mut meta_names: Vec<String> = Vec::new();
        for t in tables {
            first.schema.check_features(&t.schema)?;
            for name in t.schema.metadata() {
                if !meta_names.contains(name) {
                    meta_names.push(name.clone());
                }
            }
        }

        let n_rows: usize = tables.iter().map(|t| t.n_rows()).sum();
        let n_features = first.n_features();
        let mut metadata: Vec<Vec<Variable>> = vec![Vec::with_capacity(n_rows); meta_names.len()];
        let mut features = DMatrix::zeros(n_rows, n_features);

        let mut offset = 0;
        for t in tables {
            let aligned = t.select_features(first.schema.features())?;
            for (col, name) in meta_names.iter().enumerate() {
                match t.schema.metadata_index(name) {
                    Some(src) => metadata[col].extend(t.metadata[src].iter().cloned()),
                    None => metadata[col].extend(std::iter::repeat(Variable::Missing).take(t.n_rows())),
                }
            }
            features
                .view_mut((offset, 0), (t.n_rows(), n_features))
                .copy_from(&aligned.features);
            offset += t.n_rows();
        }

        let schema = Schema::new(meta_names, first.schema.features().to_vec())?;
        Self::new(schema, metadata, features)
    }
}

/// Human-readable label for a partition key, e.g. `A549/48H`.
pub fn group_label(key: &[String]) -> String {
    if key.is_empty() {
        "all".to_string()
    } else {
        key.join("/")
    }
}

fn is_tsv(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy().to_lowercase());
    name.map_or(false, |n| n.ends_with(".tsv") || n.ends_with(".tsv.gz") || n.ends_with(".txt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_table() -> ProfileTable {
        let schema = Schema::new(
            vec!["Metadata_Plate".to_string(), "Metadata_broad_sample".to_string()],
            vec!["f1".to_string(), "f2".to_string(), "f3".to_string()],
        )
        .unwrap();
        let metadata = vec![
            vec!["P1".into(), "P1".into(), "P2".into(), "P2".into()],
            vec!["DMSO".into(), "BRD-1".into(), "DMSO".into(), "BRD-1".into()],
        ];
        let features = DMatrix::from_row_slice(
            4,
            3,
            &[
                1.0, 2.0, 3.0, //
                4.0, 5.0, 6.0, //
                7.0, 8.0, 9.0, //
                10.0, 11.0, 12.0,
            ],
        );
        ProfileTable::new(schema, metadata, features).unwrap()
    }

    #[test]
    fn test_dimensions() {
        let table = create_test_table();
        assert_eq!(table.n_rows(), 4);
        assert_eq!(table.n_features(), 3);
        assert_eq!(table.get(2, 1), 8.0);
    }

    #[test]
    fn test_new_rejects_ragged_metadata() {
        let schema = Schema::new(vec!["Metadata_A".to_string()], vec!["f".to_string()]).unwrap();
        let result = ProfileTable::new(schema, vec![vec![Variable::Missing]], DMatrix::zeros(2, 1));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_reader_parses_metadata_and_features() {
        let csv = "Metadata_Plate,Cells_A,Metadata_Well,Nuclei_B\nP1,1.5,A01,\nP1,2.5,A02,NA\n";
        let table = ProfileTable::from_reader(csv.as_bytes(), b',', METADATA_PREFIX).unwrap();
        assert_eq!(table.metadata_names(), &["Metadata_Plate", "Metadata_Well"]);
        assert_eq!(table.feature_names(), &["Cells_A", "Nuclei_B"]);
        assert_eq!(table.get(1, 0), 2.5);
        assert!(table.get(0, 1).is_nan());
        assert!(table.get(1, 1).is_nan());
    }

    #[test]
    fn test_from_reader_rejects_text_feature() {
        let csv = "Metadata_Plate,Cells_A\nP1,abc\n";
        let result = ProfileTable::from_reader(csv.as_bytes(), b',', METADATA_PREFIX);
        assert!(matches!(result, Err(ProfileError::InvalidValue { .. })));
    }

    #[test]
    fn test_from_csv_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Metadata_Plate,f1").unwrap();
        writeln!(file, "P1,0.5").unwrap();
        file.flush().unwrap();
        let table = ProfileTable::from_csv(file.path()).unwrap();
        assert_eq!(table.n_rows(), 1);
        assert_eq!(table.get(0, 0), 0.5);
    }

    #[test]
    fn test_subset_rows_and_features() {
        let table = create_test_table();
        let rows = table.subset_rows(&[3, 0]).unwrap();
        assert_eq!(rows.row_features(0), vec![10.0, 11.0, 12.0]);
        assert_eq!(rows.metadata_column("Metadata_Plate").unwrap()[1].key(), "P1");

        let feats = table.select_features(&["f3".to_string(), "f1".to_string()]).unwrap();
        assert_eq!(feats.feature_names(), &["f3", "f1"]);
        assert_eq!(feats.row_features(1), vec![6.0, 4.0]);
    }

    #[test]
    fn test_partition_first_appearance_order() {
        let table = create_test_table();
        let groups = table
            .partition(&["Metadata_broad_sample".to_string()])
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, vec!["DMSO"]);
        assert_eq!(groups[0].1, vec![0, 2]);
        assert_eq!(groups[1].1, vec![1, 3]);
    }

    #[test]
    fn test_partition_missing_column() {
        let table = create_test_table();
        assert!(matches!(
            table.partition(&["Metadata_cell_line".to_string()]),
            Err(ProfileError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_with_metadata_column_and_fill() {
        let table = create_test_table();
        let table = table
            .with_metadata_column(
                "Metadata_moa",
                vec![Variable::Missing, "kinase".into(), Variable::Missing, "kinase".into()],
            )
            .unwrap();
        let filled = table.fill_missing("Metadata_moa", &"unknown".into()).unwrap();
        let moa = filled.metadata_column("Metadata_moa").unwrap();
        assert_eq!(moa[0].key(), "unknown");
        assert_eq!(moa[1].key(), "kinase");
        assert_eq!(filled.metadata_names().len(), 3);
    }

    #[test]
    fn test_concat_aligns_features_and_unions_metadata() {
        let table = create_test_table();
        let other = table
            .select_features(&["f2".to_string(), "f3".to_string(), "f1".to_string()])
            .unwrap()
            .with_constant_metadata("Metadata_time_point", "48H".into())
            .unwrap();
        let stacked = ProfileTable::concat(&[table.clone(), other]).unwrap();

        assert_eq!(stacked.n_rows(), 8);
        assert_eq!(stacked.feature_names(), table.feature_names());
        assert_eq!(stacked.row_features(4), table.row_features(0));
        let tp = stacked.metadata_column("Metadata_time_point").unwrap();
        assert!(tp[0].is_missing());
        assert_eq!(tp[7].key(), "48H");
    }

    #[test]
    fn test_concat_rejects_feature_mismatch() {
        let table = create_test_table();
        let other = table.select_features(&["f1".to_string()]).unwrap();
        assert!(matches!(
            ProfileTable::concat(&[table, other]),
            Err(ProfileError::SchemaMismatch { .. })
        ));
    }
}
