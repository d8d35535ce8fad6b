use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, time::Duration};
use tracing::debug;

const HUNTER_KEY_VAR: &str = "HUNTER_API_KEY";

/// Top-level settings, optionally read from a YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub extraction: ExtractionConfig,
    pub enrichment: EnrichmentConfig,
}

/// Geometry thresholds used to rebuild tables from positioned text. Units are PDF points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Max baseline difference for two fragments to share a line.
    pub row_tolerance: f64,
    /// Fragments closer than this on one line are one cell.
    pub merge_gap: f64,
    /// How far left of a header anchor a cell may start and still belong to it.
    pub column_slack: f64,
    /// Lines with fewer cells end a table run.
    pub min_columns: usize,
    /// A vertical gap above this multiple of the run's first pitch ends a table run.
    pub table_gap_factor: f64,
    /// Parse `CATEGORY NUMBER NAME DECISION` lines on pages without a geometric table.
    pub text_line_fallback: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            row_tolerance: 2.0,
            merge_gap: 1.5,
            column_slack: 4.0,
            min_columns: 2,
            table_gap_factor: 2.5,
            text_line_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Pause between two candidates, to stay under provider rate limits.
    pub request_delay_ms: u64,
    pub max_rows: usize,
    pub user_agent: String,
    pub registry_url: String,
    pub directory_url: String,
    pub hunter_url: String,
    pub hunter_api_key: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            max_retries: 2,
            initial_backoff_ms: 500,
            request_delay_ms: 250,
            max_rows: 50,
            user_agent: concat!("admiscraper/", env!("CARGO_PKG_VERSION")).to_string(),
            registry_url: "https://recherche-entreprises.api.gouv.fr/search".to_string(),
            directory_url: "https://www.pagesjaunes.fr/pagesblanches/recherche".to_string(),
            hunter_url: "https://api.hunter.io/v2/email-finder".to_string(),
            hunter_api_key: None,
        }
    }
}

impl EnrichmentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl AppConfig {
    /// Defaults, then the YAML file if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let raw = fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::from_yaml(&raw).with_context(|| format!("parsing config {}", p.display()))?
            }
            None => Self::default(),
        };
        cfg.apply_env();
        debug!(extraction = ?cfg.extraction, "configuration loaded");
        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = env::var(HUNTER_KEY_VAR) {
            if !key.trim().is_empty() {
                self.enrichment.hunter_api_key = Some(key.trim().to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_yaml_keeps_defaults() -> Result<()> {
        let cfg = AppConfig::from_yaml(
            r#"
extraction:
  row_tolerance: 3.5
enrichment:
  max_rows: 10
"#,
        )?;
        assert_eq!(cfg.extraction.row_tolerance, 3.5);
        assert_eq!(cfg.extraction.min_columns, 2);
        assert!(cfg.extraction.text_line_fallback);
        assert_eq!(cfg.enrichment.max_rows, 10);
        assert_eq!(cfg.enrichment.timeout_secs, 5);
        assert_eq!(cfg.enrichment.max_retries, 2);
        Ok(())
    }

    #[test]
    fn empty_file_is_default() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        writeln!(tmp, "   ")?;
        let cfg = AppConfig::from_yaml(&fs::read_to_string(tmp.path())?)?;
        assert_eq!(cfg, AppConfig::default());
        Ok(())
    }

    #[test]
    fn unknown_shape_is_rejected() {
        assert!(AppConfig::from_yaml("extraction: [1, 2]").is_err());
    }
}
