use crate::schema::ErrorSignal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CsvIoError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("{0}")]
    InvalidValue(Box<ErrorSignal>),

    #[error("Row callback failed: {0}")]
    CallbackFailed(String),

    #[error("Row callback dropped its continuation on row {row}")]
    CallbackAbandoned { row: usize },

    #[error("Input conflict: {0}")]
    InputConflict(String),

    #[error("Pipeline channel closed, the row worker has halted")]
    ChannelClosed,

    #[error("Row worker failed: {0}")]
    WorkerFailed(String),

    #[error("Streaming source failed: {0}")]
    SourceFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl CsvIoError {
    /// The validation fault that halted an import pipeline, if this is one.
    pub fn signal(&self) -> Option<&ErrorSignal> {
        match self {
            CsvIoError::InvalidValue(signal) => Some(signal),
            _ => None,
        }
    }
}

impl From<ErrorSignal> for CsvIoError {
    fn from(signal: ErrorSignal) -> Self {
        CsvIoError::InvalidValue(Box::new(signal))
    }
}

pub type Result<T> = std::result::Result<T, CsvIoError>;

/// Faults raised while resolving a schema into a column table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("no columns defined")]
    NoColumns,

    #[error("column at position {index} has no name")]
    MissingName { index: usize },

    #[error("column {column} has no type nor formatter")]
    MissingTypeAndFormatter { column: String },

    #[error("no formatter for column {column} of type {column_type}")]
    NoFormatter { column: String, column_type: String },

    #[error("invalid {kind} delimiter {value:?}: {reason}")]
    InvalidDelimiter {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },
}
