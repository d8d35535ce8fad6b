//! Canonical field names and uniform records for one raw table.

use crate::extract::RawTable;
use std::{collections::HashSet, sync::Arc};
use tracing::debug;

/// One data row keyed by its table's canonical header names.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    keys: Arc<[String]>,
    values: Vec<String>,
}

impl NormalizedRecord {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| self.values[i].as_str())
    }

    /// `(key, value)` pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

/// The records of one table together with the key list they share.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub page: u32,
    pub table: usize,
    /// Rows seen in the raw table, blank ones included.
    pub data_rows: usize,
    pub blank_rows: usize,
    keys: Arc<[String]>,
    records: Vec<NormalizedRecord>,
}

impl RecordSet {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<NormalizedRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Trim whitespace and strip outer quotes if present.
pub fn clean_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lower-case, fold accents, and collapse every run of non-alphanumerics
/// into one underscore: `"  N° Candidat "` → `"n_candidat"`.
pub fn canonical_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim().chars().flat_map(char::to_lowercase) {
        let folded = fold_accent(ch);
        if folded.is_empty() {
            pending_sep = true;
            continue;
        }
        for c in folded.chars() {
            if c.is_alphanumeric() {
                if pending_sep && !out.is_empty() {
                    out.push('_');
                }
                pending_sep = false;
                out.push(c);
            } else {
                pending_sep = true;
            }
        }
    }
    out
}

fn fold_accent(ch: char) -> String {
    let s = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'œ' => "oe",
        'æ' => "ae",
        'ß' => "ss",
        'º' | 'ª' => "",
        other => return other.to_string(),
    };
    s.to_string()
}

/// Canonical names for a header row, unique within the row.
///
/// Empty names become `col_<index>`; repeats get `_2`, `_3`, … so that
/// distinct header cells never share a key.
pub fn canonical_headers(headers: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut out = Vec::with_capacity(headers.len());
    for (idx, raw) in headers.iter().enumerate() {
        let mut base = canonical_name(raw);
        if base.is_empty() {
            base = format!("col_{idx}");
        }
        let mut name = base.clone();
        let mut n = 2;
        while seen.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        seen.insert(name.clone());
        out.push(name);
    }
    out
}

/// Turn a raw table into records sharing the table's canonical keys.
///
/// All-empty rows are skipped; short rows are padded with empty values and
/// cells past the header width are dropped.
pub fn normalize_table(table: &RawTable) -> RecordSet {
    let keys: Arc<[String]> = canonical_headers(&table.headers).into();
    let width = keys.len();

    let mut records = Vec::with_capacity(table.rows.len());
    let mut blank_rows = 0;
    for row in &table.rows {
        let mut values: Vec<String> = row.iter().map(|c| clean_value(c)).collect();
        if values.iter().all(String::is_empty) {
            blank_rows += 1;
            continue;
        }
        values.resize(width, String::new());
        records.push(NormalizedRecord {
            keys: Arc::clone(&keys),
            values,
        });
    }

    debug!(
        page = table.page,
        table = table.index,
        keys = ?keys,
        records = records.len(),
        blank_rows,
        "table normalized"
    );

    RecordSet {
        page: table.page,
        table: table.index,
        data_rows: table.rows.len(),
        blank_rows,
        keys,
        records,
    }
}
