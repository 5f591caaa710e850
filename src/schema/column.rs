use crate::schema::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a formatter or a type check for one field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct FormatFault(pub String);

impl FormatFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Export formatter: column and record value to the text fragment of the field.
pub type ExportFormatFn =
    Arc<dyn Fn(&ColumnInfo, Option<&Value>) -> Result<String, FormatFault> + Send + Sync>;

/// Import formatter: column and raw token to the coerced value. `Ok(None)`
/// leaves the field out of the record.
pub type ImportFormatFn =
    Arc<dyn Fn(&ColumnInfo, Option<&str>) -> Result<Option<Value>, FormatFault> + Send + Sync>;

/// Import validator run on the coerced value. Returns the value unchanged when
/// it is acceptable.
pub type TypeCheckFn =
    Arc<dyn Fn(&ColumnInfo, Option<Value>) -> Result<Option<Value>, FormatFault> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnType {
    String,
    Date,
    Number,
    Boolean,
    /// Caller-defined type; resolved through the schema's formatter map.
    Custom(String),
}

/// The semantic types that carry a built-in formatter and type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    String,
    Date,
    Number,
    Boolean,
}

impl ColumnType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "string" => ColumnType::String,
            "date" => ColumnType::Date,
            "number" => ColumnType::Number,
            "boolean" => ColumnType::Boolean,
            other => ColumnType::Custom(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            ColumnType::String => "string",
            ColumnType::Date => "date",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Custom(tag) => tag,
        }
    }

    pub fn builtin(&self) -> Option<BuiltinType> {
        match self {
            ColumnType::String => Some(BuiltinType::String),
            ColumnType::Date => Some(BuiltinType::Date),
            ColumnType::Number => Some(BuiltinType::Number),
            ColumnType::Boolean => Some(BuiltinType::Boolean),
            ColumnType::Custom(_) => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl From<String> for ColumnType {
    fn from(tag: String) -> Self {
        ColumnType::from_tag(&tag)
    }
}

impl From<ColumnType> for String {
    fn from(column_type: ColumnType) -> Self {
        column_type.tag().to_string()
    }
}

/// The descriptive part of a column, handed to every formatter and check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub header: String,
    pub column_type: Option<ColumnType>,
    pub nullable: bool,
}

impl ColumnInfo {
    pub fn type_tag(&self) -> &str {
        self.column_type.as_ref().map(ColumnType::tag).unwrap_or("custom")
    }
}

/// One column descriptor as supplied by the caller. `F` is the formatter
/// shape of the direction the schema is used for.
#[derive(Clone)]
pub struct ColumnSpec<F> {
    pub(crate) name: String,
    pub(crate) header: Option<String>,
    pub(crate) column_type: Option<ColumnType>,
    pub(crate) nullable: bool,
    pub(crate) formatter: Option<F>,
    pub(crate) type_check: Option<TypeCheckFn>,
}

pub type ExportColumn = ColumnSpec<ExportFormatFn>;
pub type ImportColumn = ColumnSpec<ImportFormatFn>;

impl<F> ColumnSpec<F> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header: None,
            column_type: None,
            nullable: false,
            formatter: None,
            type_check: None,
        }
    }

    pub fn typed(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self::new(name).column_type(column_type)
    }

    pub fn header(mut self, label: impl Into<String>) -> Self {
        self.header = Some(label.into());
        self
    }

    pub fn column_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = Some(column_type);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Validator applied to the coerced value on import.
    pub fn type_check<C>(mut self, check: C) -> Self
    where
        C: Fn(&ColumnInfo, Option<Value>) -> Result<Option<Value>, FormatFault>
            + Send
            + Sync
            + 'static,
    {
        self.type_check = Some(Arc::new(check));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_formatter(&self) -> bool {
        self.formatter.is_some()
    }

    pub(crate) fn info(&self) -> ColumnInfo {
        ColumnInfo {
            name: self.name.clone(),
            header: self.header.clone().unwrap_or_else(|| self.name.clone()),
            column_type: self.column_type.clone(),
            nullable: self.nullable,
        }
    }
}

impl ColumnSpec<ExportFormatFn> {
    pub fn formatter<G>(mut self, formatter: G) -> Self
    where
        G: Fn(&ColumnInfo, Option<&Value>) -> Result<String, FormatFault> + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }
}

impl ColumnSpec<ImportFormatFn> {
    pub fn formatter<G>(mut self, formatter: G) -> Self
    where
        G: Fn(&ColumnInfo, Option<&str>) -> Result<Option<Value>, FormatFault>
            + Send
            + Sync
            + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }
}

impl<F> fmt::Debug for ColumnSpec<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSpec")
            .field("name", &self.name)
            .field("header", &self.header)
            .field("column_type", &self.column_type)
            .field("nullable", &self.nullable)
            .field("formatter", &self.formatter.is_some())
            .field("type_check", &self.type_check.is_some())
            .finish()
    }
}
