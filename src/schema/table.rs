use crate::schema::column::{
    BuiltinType, ColumnInfo, ColumnSpec, ExportFormatFn, FormatFault, ImportFormatFn, TypeCheckFn,
};
use crate::schema::value::Value;
use crate::utils::{PipelineConfig, SchemaError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Caller-supplied schema: columns, text format, and formatter / type check
/// overrides keyed by type tag.
#[derive(Clone)]
pub struct Schema<F> {
    pub(crate) columns: Vec<ColumnSpec<F>>,
    pub(crate) config: PipelineConfig,
    pub(crate) formatters: HashMap<String, F>,
    pub(crate) type_checks: HashMap<String, TypeCheckFn>,
}

pub type ExportSchema = Schema<ExportFormatFn>;
pub type ImportSchema = Schema<ImportFormatFn>;

impl<F> Schema<F> {
    pub fn new(columns: Vec<ColumnSpec<F>>) -> Self {
        Self {
            columns,
            config: PipelineConfig::default(),
            formatters: HashMap::new(),
            type_checks: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn column_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.config.column_delimiter = delimiter.into();
        self
    }

    pub fn row_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.config.row_delimiter = delimiter.into();
        self
    }

    pub fn show_headers(mut self, show: bool) -> Self {
        self.config.show_headers = show;
        self
    }

    pub fn empty_value_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.config.empty_value_placeholder = placeholder.into();
        self
    }

    pub fn null_literal(mut self, literal: impl Into<String>) -> Self {
        self.config.null_literal = literal.into();
        self
    }

    pub fn skip_first_line(mut self, skip: bool) -> Self {
        self.config.skip_first_line = skip;
        self
    }

    pub fn source_row_offset(mut self, offset: usize) -> Self {
        self.config.source_row_offset = offset;
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.encoding = encoding.into();
        self
    }

    pub fn type_check<C>(mut self, tag: impl Into<String>, check: C) -> Self
    where
        C: Fn(&ColumnInfo, Option<Value>) -> Result<Option<Value>, FormatFault>
            + Send
            + Sync
            + 'static,
    {
        self.type_checks.insert(tag.into(), Arc::new(check));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn columns(&self) -> &[ColumnSpec<F>] {
        &self.columns
    }
}

impl Schema<ExportFormatFn> {
    /// Overrides the formatter of every column whose type tag is `tag`.
    pub fn formatter<G>(mut self, tag: impl Into<String>, formatter: G) -> Self
    where
        G: Fn(&ColumnInfo, Option<&Value>) -> Result<String, FormatFault> + Send + Sync + 'static,
    {
        self.formatters.insert(tag.into(), Arc::new(formatter));
        self
    }
}

impl Schema<ImportFormatFn> {
    /// Overrides the formatter of every column whose type tag is `tag`.
    pub fn formatter<G>(mut self, tag: impl Into<String>, formatter: G) -> Self
    where
        G: Fn(&ColumnInfo, Option<&str>) -> Result<Option<Value>, FormatFault>
            + Send
            + Sync
            + 'static,
    {
        self.formatters.insert(tag.into(), Arc::new(formatter));
        self
    }
}

impl<F: Clone> Schema<F> {
    /// Validates the columns and resolves every formatter and type check once.
    pub fn resolve(&self) -> Result<ColumnTable<F>, SchemaError> {
        if self.columns.is_empty() {
            return Err(SchemaError::NoColumns);
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(self.columns.len());

        for (index, column) in self.columns.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(SchemaError::MissingName { index });
            }
            if column.column_type.is_none() && column.formatter.is_none() {
                return Err(SchemaError::MissingTypeAndFormatter {
                    column: column.name.clone(),
                });
            }
            if !seen.insert(column.name.as_str()) {
                tracing::warn!(column = %column.name, "column name appears more than once");
            }

            let info = column.info();
            let tag = column.column_type.as_ref().map(|t| t.tag().to_string());

            let formatter = match &column.formatter {
                Some(custom) => Resolved::Custom(custom.clone()),
                None => self.formatter_for_type(column)?,
            };

            let type_check = match &column.type_check {
                Some(check) => Some(Check::Custom(check.clone())),
                None => tag
                    .as_ref()
                    .and_then(|tag| self.type_checks.get(tag))
                    .map(|check| Check::Custom(check.clone()))
                    .or_else(|| {
                        column
                            .column_type
                            .as_ref()
                            .and_then(|t| t.builtin())
                            .map(Check::Builtin)
                    }),
            };

            columns.push(ResolvedColumn {
                info,
                formatter,
                type_check,
            });
        }

        Ok(ColumnTable {
            columns,
            config: self.config.clone(),
        })
    }

    fn formatter_for_type(&self, column: &ColumnSpec<F>) -> Result<Resolved<F>, SchemaError> {
        let column_type = column.column_type.as_ref();
        let tag = column_type.map(|t| t.tag()).unwrap_or_default();

        if let Some(custom) = self.formatters.get(tag) {
            return Ok(Resolved::Custom(custom.clone()));
        }
        column_type
            .and_then(|t| t.builtin())
            .map(Resolved::Builtin)
            .ok_or_else(|| SchemaError::NoFormatter {
                column: column.name.clone(),
                column_type: tag.to_string(),
            })
    }
}

/// A formatter after resolution: one of the built-in semantic types, or the
/// caller's function.
#[derive(Clone)]
pub enum Resolved<F> {
    Builtin(BuiltinType),
    Custom(F),
}

#[derive(Clone)]
pub enum Check {
    Builtin(BuiltinType),
    Custom(TypeCheckFn),
}

#[derive(Clone)]
pub struct ResolvedColumn<F> {
    pub info: ColumnInfo,
    pub formatter: Resolved<F>,
    pub type_check: Option<Check>,
}

/// Immutable per-pipeline column table, in canonical column order.
#[derive(Clone)]
pub struct ColumnTable<F> {
    columns: Vec<ResolvedColumn<F>>,
    config: PipelineConfig,
}

impl<F> ColumnTable<F> {
    pub fn columns(&self) -> &[ResolvedColumn<F>] {
        &self.columns
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.info.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
