pub mod csv_processor;
pub mod format;
pub mod pipeline;
pub mod schema;
pub mod utils;

pub use csv_processor::{describe_input, InputDescription, InputSource, TextStreamWriter};
pub use pipeline::{Completion, Continuation, ExportPipeline, ImportPipeline, RowSubscriber};
pub use schema::{
    ColumnType, ErrorSignal, ExportColumn, ExportSchema, ImportColumn, ImportSchema, Record,
    Value, ERR_CSV_IO_INVALID_VALUE,
};
pub use utils::{AppConfig, CsvIoError, PipelineConfig, Result, SchemaError, SchemaFile};
