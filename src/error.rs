use std::path::PathBuf;
use thiserror::Error;

/// Document-level failures. Any of these aborts a run before output is written.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file not found or unreadable: {}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a usable document: {reason}", path.display())]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("session metadata `{0}` must not be empty")]
    MissingMetadata(&'static str),

    #[error("unexpected processing error: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn invalid_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A single page could not be laid out. Recovered by skipping the page.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("cannot read page content: {0}")]
    Content(#[from] lopdf::Error),

    #[error("operator `{operator}` expects {expected}")]
    Operand {
        operator: String,
        expected: &'static str,
    },

    #[error("malformed page: {0}")]
    Malformed(String),
}

impl PageError {
    pub(crate) fn operand(operator: &str, expected: &'static str) -> Self {
        Self::Operand {
            operator: operator.to_string(),
            expected,
        }
    }
}
