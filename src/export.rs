//! CSV boundary: candidate tables in and out.

use crate::error::PipelineError;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    path::Path,
};
use tracing::{debug, info};

/// Column names plus rows of equal width, in output order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CandidateTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// First column whose name satisfies `pred`.
    pub fn find_column(&self, pred: impl Fn(&str) -> bool) -> Option<usize> {
        self.columns.iter().position(|c| pred(c))
    }

    /// Append `name` unless already present; existing rows get an empty cell.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.resize(self.columns.len(), String::new());
        }
        self.columns.len() - 1
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row count per distinct value of `column`, empty values under `""`.
    pub fn count_by(&self, column: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        if let Some(idx) = self.column(column) {
            for row in &self.rows {
                let key = row.get(idx).map(|v| v.trim().to_uppercase()).unwrap_or_default();
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Write `table` as UTF-8, comma-delimited CSV with a header row.
/// Parent directories are created.
pub fn write_table(path: &Path, table: &CandidateTable) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut wtr = WriterBuilder::new().from_writer(file);

    wtr.write_record(&table.columns)
        .with_context(|| format!("writing header to {}", path.display()))?;
    for (idx, row) in table.rows.iter().enumerate() {
        wtr.write_record(row)
            .with_context(|| format!("writing record {idx} to {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("flushing {}", path.display()))?;

    info!(path = %path.display(), rows = table.rows.len(), "csv written");
    Ok(())
}

/// Read a CSV written by [`write_table`] (or any header-first CSV).
/// Short rows are padded and long rows truncated to the header width.
pub fn read_table(path: &Path) -> Result<CandidateTable, PipelineError> {
    let file = File::open(path).map_err(|source| PipelineError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let columns: Vec<String> = rdr
        .headers()
        .map_err(|e| PipelineError::invalid_format(path, format!("unreadable header: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if columns.iter().all(String::is_empty) {
        return Err(PipelineError::invalid_format(path, "empty CSV"));
    }

    let mut table = CandidateTable::new(columns);
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| {
            PipelineError::invalid_format(path, format!("CSV parse error at record {idx}: {e}"))
        })?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(table.columns.len(), String::new());
        table.rows.push(row);
    }

    debug!(path = %path.display(), rows = table.rows.len(), "csv read");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> CandidateTable {
        CandidateTable {
            columns: vec!["categorie".into(), "nom".into(), "decision".into()],
            rows: vec![
                vec!["TAXI".into(), "Dupont, Jean".into(), "ADMISSIBLE".into()],
                vec!["vtc".into(), "Müller \"Eli\"".into(), "ADMISSIBLE".into()],
                vec!["TAXI".into(), "Martin".into(), "ADMISSIBLE".into()],
            ],
        }
    }

    #[test]
    fn write_then_read_keeps_quoting_and_order() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested/out/admissibles.csv");
        write_table(&path, &sample())?;

        let raw = fs::read_to_string(&path)?;
        assert!(raw.starts_with("categorie,nom,decision\n"));
        assert!(raw.contains("\"Dupont, Jean\""));

        assert_eq!(read_table(&path)?, sample());
        Ok(())
    }

    #[test]
    fn header_only_table_is_written() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.csv");
        write_table(&path, &CandidateTable::new(vec!["a".into(), "b".into()]))?;
        assert_eq!(fs::read_to_string(&path)?, "a,b\n");
        assert!(read_table(&path)?.is_empty());
        Ok(())
    }

    #[test]
    fn ragged_rows_are_squared() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("ragged.csv");
        fs::write(&path, "a,b,c\n1\n1,2,3,4\n")?;
        let table = read_table(&path)?;
        assert_eq!(table.rows, vec![vec!["1", "", ""], vec!["1", "2", "3"]]);
        Ok(())
    }

    #[test]
    fn missing_and_empty_inputs() -> Result<()> {
        let dir = tempdir()?;
        let err = read_table(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));

        let empty = dir.path().join("empty.csv");
        fs::write(&empty, "")?;
        let err = read_table(&empty).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidFormat { .. }));
        Ok(())
    }

    #[test]
    fn counts_and_columns() {
        let mut table = sample();
        let counts = table.count_by("categorie");
        assert_eq!(counts.get("TAXI"), Some(&2));
        assert_eq!(counts.get("VTC"), Some(&1));
        assert!(table.count_by("absent").is_empty());

        assert_eq!(table.ensure_column("nom"), 1);
        assert_eq!(table.ensure_column("email"), 3);
        assert!(table.rows.iter().all(|r| r.len() == 4));
        assert_eq!(table.find_column(|c| c.starts_with("dec")), Some(2));
    }
}
