//! Excluding known-problematic measurements by name.

use crate::data::ProfileTable;
use crate::error::Result;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Read a blocklist file: one feature name per line.
///
/// Blank lines are skipped, as is a leading `blocklist` header line.
pub fn load_blocklist<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_blocklist(&text))
}

fn parse_blocklist(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .filter(|(i, l)| !(*i == 0 && *l == "blocklist"))
        .map(|(_, l)| l.to_string())
        .collect()
}

/// Candidate features whose names are blocklisted.
pub fn blocklist_exclusions(table: &ProfileTable, candidates: &[usize], blocklist: &[String]) -> Vec<usize> {
    let blocked: HashSet<&str> = blocklist.iter().map(String::as_str).collect();
    candidates
        .iter()
        .copied()
        .filter(|&f| blocked.contains(table.feature_names()[f].as_str()))
        .collect()
}

/// Drop every blocklisted feature column.
pub fn drop_blocklisted(table: &ProfileTable, blocklist: &[String]) -> Result<ProfileTable> {
    let all: Vec<usize> = (0..table.n_features()).collect();
    let excluded = blocklist_exclusions(table, &all, blocklist);
    let keep: Vec<usize> = all.into_iter().filter(|f| !excluded.contains(f)).collect();
    table.subset_features(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Schema;
    use nalgebra::DMatrix;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_skips_header_and_blanks() {
        let parsed = parse_blocklist("blocklist\nCells_A\n\n  Nuclei_B  \n");
        assert_eq!(parsed, vec!["Cells_A", "Nuclei_B"]);
    }

    #[test]
    fn test_load_and_drop() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "blocklist").unwrap();
        writeln!(file, "Cells_Bad").unwrap();
        file.flush().unwrap();
        let blocklist = load_blocklist(file.path()).unwrap();

        let schema = Schema::new(
            vec![],
            vec!["Cells_Good".to_string(), "Cells_Bad".to_string()],
        )
        .unwrap();
        let table = ProfileTable::new(schema, vec![], DMatrix::zeros(2, 2)).unwrap();
        let out = drop_blocklisted(&table, &blocklist).unwrap();
        assert_eq!(out.feature_names(), &["Cells_Good"]);
    }
}
