// src/pipeline.rs
//! Extraction → normalization → filtering over a whole document, plus the
//! session metadata every admissible candidate carries.

use crate::{
    config::ExtractionConfig,
    error::PipelineError,
    export::{self, CandidateTable},
    extract::{PageSource, TableExtractor},
    filter::{AdmissibleFilter, FilterOutcome},
    normalize::{normalize_table, NormalizedRecord},
};
use std::{collections::HashSet, fmt, path::Path, sync::Arc};
use tracing::{info, instrument, warn};

pub const DEPARTEMENT: &str = "departement";
pub const SESSION_DATE: &str = "session_date";

/// Department and session date of one exam session, shared by every candidate of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMeta {
    departement: String,
    session_date: String,
}

impl SessionMeta {
    /// Values are kept as given; only blank ones are rejected.
    pub fn new(departement: &str, session_date: &str) -> Result<Self, PipelineError> {
        if departement.trim().is_empty() {
            return Err(PipelineError::MissingMetadata(DEPARTEMENT));
        }
        if session_date.trim().is_empty() {
            return Err(PipelineError::MissingMetadata(SESSION_DATE));
        }
        Ok(Self {
            departement: departement.to_string(),
            session_date: session_date.to_string(),
        })
    }

    pub fn departement(&self) -> &str {
        &self.departement
    }

    pub fn session_date(&self) -> &str {
        &self.session_date
    }
}

/// A record that passed the admissible filter, with its session metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub page: u32,
    pub table: usize,
    record: NormalizedRecord,
    meta: Arc<SessionMeta>,
}

impl Candidate {
    pub fn record(&self) -> &NormalizedRecord {
        &self.record
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    /// Field value; the injected metadata shadows same-named table columns.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            DEPARTEMENT => Some(self.meta.departement()),
            SESSION_DATE => Some(self.meta.session_date()),
            _ => self.record.get(key),
        }
    }
}

/// Admissible candidates in (page, table, row) order with their export columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    columns: Vec<String>,
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn to_table(&self) -> CandidateTable {
        CandidateTable {
            columns: self.columns.clone(),
            rows: self
                .candidates
                .iter()
                .map(|c| {
                    self.columns
                        .iter()
                        .map(|col| c.get(col).unwrap_or_default().to_string())
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    PageSkipped { page: u32, reason: String },
    NoDecisionColumn { page: u32, table: usize },
    NoTables,
    NoAdmissible,
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageSkipped { page, reason } => write!(f, "page {page} skipped: {reason}"),
            Self::NoDecisionColumn { page, table } => {
                write!(f, "page {page} table {table} has no decision column")
            }
            Self::NoTables => f.write_str("no table found in the document"),
            Self::NoAdmissible => f.write_str("no admissible candidate found"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReport {
    pub pages: usize,
    pub tables: usize,
    pub data_rows: usize,
    pub blank_rows: usize,
    pub admissible: usize,
    pub warnings: Vec<PipelineWarning>,
}

impl ExtractionReport {
    pub fn pages_skipped(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, PipelineWarning::PageSkipped { .. }))
            .count()
    }
}

pub struct Pipeline {
    config: ExtractionConfig,
    filter: AdmissibleFilter,
}

impl Pipeline {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            filter: AdmissibleFilter,
        }
    }

    /// Run over the PDF at `path`. Fails only when the document cannot be opened.
    #[instrument(level = "info", skip(self, path, meta), fields(path = %path.display()))]
    pub fn run(
        &self,
        path: &Path,
        meta: &SessionMeta,
    ) -> Result<(CandidateSet, ExtractionReport), PipelineError> {
        let extractor = TableExtractor::open(path, &self.config)?;
        Ok(self.run_extractor(&extractor, meta))
    }

    pub fn run_extractor<S: PageSource>(
        &self,
        extractor: &TableExtractor<S>,
        meta: &SessionMeta,
    ) -> (CandidateSet, ExtractionReport) {
        let meta = Arc::new(meta.clone());
        let mut report = ExtractionReport::default();
        let mut set = CandidateSet::default();
        let mut seen: HashSet<String> = HashSet::new();

        for outcome in extractor.pages() {
            report.pages += 1;
            let tables = match outcome.result {
                Ok(tables) => tables,
                Err(e) => {
                    report.warnings.push(PipelineWarning::PageSkipped {
                        page: outcome.page,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for raw in &tables {
                report.tables += 1;
                let records = normalize_table(raw);
                report.data_rows += records.data_rows;
                report.blank_rows += records.blank_rows;

                let keys: Vec<String> = records.keys().to_vec();
                let kept = match self.filter.apply(records) {
                    FilterOutcome::Kept { records, .. } => records,
                    FilterOutcome::NoDecisionColumn => {
                        report.warnings.push(PipelineWarning::NoDecisionColumn {
                            page: raw.page,
                            table: raw.index,
                        });
                        continue;
                    }
                };

                for key in keys {
                    if key != DEPARTEMENT && key != SESSION_DATE && seen.insert(key.clone()) {
                        set.columns.push(key);
                    }
                }
                set.candidates.extend(kept.into_iter().map(|record| Candidate {
                    page: raw.page,
                    table: raw.index,
                    record,
                    meta: Arc::clone(&meta),
                }));
            }
        }

        set.columns.push(DEPARTEMENT.to_string());
        set.columns.push(SESSION_DATE.to_string());
        report.admissible = set.len();

        if report.tables == 0 {
            warn!(pages = report.pages, "no table found in the document");
            report.warnings.push(PipelineWarning::NoTables);
        } else if set.is_empty() {
            warn!(tables = report.tables, "no admissible candidate found");
            report.warnings.push(PipelineWarning::NoAdmissible);
        }

        info!(
            pages = report.pages,
            skipped = report.pages_skipped(),
            tables = report.tables,
            data_rows = report.data_rows,
            blank_rows = report.blank_rows,
            admissible = report.admissible,
            "extraction finished"
        );
        (set, report)
    }
}

/// Extract admissible candidates from `pdf` and write them to `csv_out`.
///
/// A document without any table is rejected and nothing is written; a
/// document whose tables hold no admissible row yields a header-only CSV.
pub fn extract_admissibles(
    pdf: &Path,
    csv_out: &Path,
    meta: &SessionMeta,
    config: &ExtractionConfig,
) -> Result<(CandidateSet, ExtractionReport), PipelineError> {
    let (set, report) = Pipeline::new(config.clone()).run(pdf, meta)?;
    if report.tables == 0 {
        return Err(PipelineError::invalid_format(
            pdf,
            "no relevant data: no table found on any page",
        ));
    }
    export::write_table(csv_out, &set.to_table())?;
    Ok((set, report))
}
