pub mod config;
pub mod errors;

pub use config::{AppConfig, ColumnDef, LoggingConfig, PipelineConfig, SchemaFile};
pub use errors::{CsvIoError, Result, SchemaError};

/// Number of UTF-16 code units in `text`, the unit the size estimate counts in.
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}
