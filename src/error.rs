use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported file format `{extension}`; upload a .csv or spreadsheet file")]
    UnsupportedFormat { extension: String },

    #[error("required columns not found: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    #[error("malformed file ({reason}); please check file contents")]
    MalformedFile { reason: String },

    #[error("store operation on `{key}` failed: {reason}")]
    Persistence { key: String, reason: String },

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read delimited text: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("failed to (de)serialize: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used when converting an error into a [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedFormat,
    MissingColumns,
    MalformedFile,
    PersistenceFailure,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            PipelineError::MissingColumns { .. } => ErrorKind::MissingColumns,
            PipelineError::MalformedFile { .. }
            | PipelineError::Csv(_)
            | PipelineError::Spreadsheet(_) => ErrorKind::MalformedFile,
            PipelineError::Persistence { .. } | PipelineError::Io(_) | PipelineError::Json(_) => {
                ErrorKind::PersistenceFailure
            }
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        PipelineError::MalformedFile {
            reason: reason.into(),
        }
    }

    pub fn persistence(key: &str, reason: impl ToString) -> Self {
        PipelineError::Persistence {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Outcome attached to every boundary result. Failures detected while parsing
/// or chunking are reported here instead of being propagated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    Ok,
    NoData { message: String },
    MissingColumns { columns: Vec<String>, message: String },
    UnsupportedFormat { message: String },
    MalformedFile { message: String },
    PersistenceFailure { message: String },
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn no_data() -> Self {
        Status::NoData {
            message: "no rows with valid numeric values".to_string(),
        }
    }

    pub fn missing_columns(columns: Vec<String>) -> Self {
        let message = format!("required columns not found: {}", columns.join(", "));
        Status::MissingColumns { columns, message }
    }
}

impl From<&PipelineError> for Status {
    fn from(err: &PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::MissingColumns { columns } => Status::MissingColumns {
                columns: columns.clone(),
                message,
            },
            _ => match err.kind() {
                ErrorKind::UnsupportedFormat => Status::UnsupportedFormat { message },
                ErrorKind::MalformedFile => Status::MalformedFile { message },
                ErrorKind::PersistenceFailure => Status::PersistenceFailure { message },
                ErrorKind::MissingColumns => Status::missing_columns(Vec::new()),
            },
        }
    }
}
