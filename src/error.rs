use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a report run. Aggregation itself never fails; only
/// input, database and output I/O end up here.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("CSV file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Column '{column}' not found in CSV. Available columns: {available}")]
    MissingColumn { column: String, available: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{context} query failed: {source}")]
    Query {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReportError {
    pub fn query(context: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| ReportError::Query { context, source }
    }

    /// Bad or missing input; reported to the user as-is.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ReportError::InputNotFound(_) | ReportError::MissingColumn { .. } | ReportError::Csv(_)
        )
    }
}

pub type ReportResult<T> = Result<T, ReportError>;
