use crate::schema::{ColumnSpec, ColumnType, Schema};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Text format and runtime settings of one pipeline. Immutable once the
/// pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub column_delimiter: String,
    pub row_delimiter: String,
    pub show_headers: bool,
    pub empty_value_placeholder: String,
    pub null_literal: String,
    pub skip_first_line: bool,
    /// 1-based index of the first tokenized record that is kept on import.
    pub source_row_offset: usize,
    pub encoding: String,
    pub relay_capacity: usize,
    pub subscriber_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            column_delimiter: ";".to_string(),
            row_delimiter: "\n\r".to_string(),
            show_headers: false,
            empty_value_placeholder: String::new(),
            null_literal: "null".to_string(),
            skip_first_line: false,
            source_row_offset: 1,
            encoding: "utf-8".to_string(),
            relay_capacity: 16,
            subscriber_capacity: 64,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &str) -> crate::utils::errors::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::utils::errors::CsvIoError::ConfigError(e.to_string()))?;
        toml::from_str(&content)
            .map_err(|e| crate::utils::errors::CsvIoError::ConfigError(e.to_string()))
    }

    pub fn load_or_default(path: Option<&str>) -> Self {
        if let Some(p) = path {
            Self::load_from_file(p).unwrap_or_default()
        } else {
            Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnDef {
    #[serde(default)]
    pub name: String,
    pub header: Option<String>,
    #[serde(rename = "type")]
    pub column_type: Option<String>,
    #[serde(default)]
    pub nullable: bool,
}

/// Declarative schema as stored on disk, e.g.
///
/// ```toml
/// [pipeline]
/// show_headers = true
///
/// [[columns]]
/// name = "id"
/// type = "number"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaFile {
    pub pipeline: Option<PipelineConfig>,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

impl SchemaFile {
    pub fn load_from_file(path: &str) -> crate::utils::errors::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::utils::errors::CsvIoError::ConfigError(e.to_string()))?;
        toml::from_str(&content)
            .map_err(|e| crate::utils::errors::CsvIoError::ConfigError(e.to_string()))
    }

    /// Builds a schema for either direction; `defaults` applies when the file
    /// carries no `[pipeline]` table.
    pub fn to_schema<F>(&self, defaults: &PipelineConfig) -> Schema<F> {
        let columns = self
            .columns
            .iter()
            .map(|def| {
                let mut column = ColumnSpec::new(def.name.clone()).nullable(def.nullable);
                if let Some(header) = &def.header {
                    column = column.header(header.clone());
                }
                if let Some(tag) = &def.column_type {
                    column = column.column_type(ColumnType::from_tag(tag));
                }
                column
            })
            .collect();

        Schema::new(columns).with_config(self.pipeline.clone().unwrap_or_else(|| defaults.clone()))
    }
}
