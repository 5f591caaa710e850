pub mod column;
pub mod signal;
pub mod table;
pub mod value;

pub use column::{
    BuiltinType, ColumnInfo, ColumnSpec, ColumnType, ExportColumn, ExportFormatFn, FormatFault,
    ImportColumn, ImportFormatFn, TypeCheckFn,
};
pub use signal::{ErrorSignal, ERR_CSV_IO_INVALID_VALUE};
pub use table::{
    Check, ColumnTable, ExportSchema, ImportSchema, Resolved, ResolvedColumn, Schema,
};
pub use value::{Record, Value};
