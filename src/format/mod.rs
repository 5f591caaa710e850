pub mod export;
pub mod header;
pub mod import;

pub use export::{format_builtin, ExportFieldPipeline, FormattedLine};
pub use header::HeaderInjector;
pub use import::{check_builtin, coerce_builtin, ImportFieldPipeline};
