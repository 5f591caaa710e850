use crate::schema::{
    BuiltinType, ColumnInfo, ColumnTable, ExportFormatFn, FormatFault, Record, Resolved, Value,
};
use crate::utils::PipelineConfig;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedLine {
    /// `None` when the joined fields were empty.
    pub line: Option<String>,
    pub faults: usize,
}

/// Export side of the field pipeline: one record in, one delimited line out.
#[derive(Clone)]
pub struct ExportFieldPipeline {
    table: Arc<ColumnTable<ExportFormatFn>>,
}

impl ExportFieldPipeline {
    pub fn new(table: Arc<ColumnTable<ExportFormatFn>>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ColumnTable<ExportFormatFn> {
        &self.table
    }

    pub fn format(&self, record: &Record) -> FormattedLine {
        let config = self.table.config();
        let mut fields = Vec::with_capacity(self.table.len());
        let mut faults = 0;

        for column in self.table.columns() {
            let value = record.get(&column.info.name);
            let formatted = match &column.formatter {
                Resolved::Builtin(builtin) => format_builtin(*builtin, &column.info, value, config),
                Resolved::Custom(formatter) => formatter(&column.info, value),
            };

            match formatted {
                Ok(text) => fields.push(text),
                Err(fault) => {
                    tracing::warn!(
                        column = %column.info.name,
                        error = %fault,
                        "Formatting error, emitting unformatted value"
                    );
                    faults += 1;
                    fields.push(pass_through(value));
                }
            }
        }

        FormattedLine {
            line: self.join(fields),
            faults,
        }
    }

    /// The synthetic header row. Labels are taken by column position and
    /// skip every formatter.
    pub fn format_header(&self, labels: &[String]) -> FormattedLine {
        FormattedLine {
            line: self.join(labels.to_vec()),
            faults: 0,
        }
    }

    fn join(&self, fields: Vec<String>) -> Option<String> {
        let config = self.table.config();
        let mut line = fields.join(&config.column_delimiter);
        if line.is_empty() {
            return None;
        }
        line.push_str(&config.row_delimiter);
        Some(line)
    }
}

fn pass_through(value: Option<&Value>) -> String {
    value.map(Value::to_text).unwrap_or_default()
}

/// Default export rendering of the built-in semantic types.
pub fn format_builtin(
    builtin: BuiltinType,
    column: &ColumnInfo,
    value: Option<&Value>,
    config: &PipelineConfig,
) -> Result<String, FormatFault> {
    let value = match value {
        Some(Value::Null) if column.nullable => return Ok(config.null_literal.clone()),
        None | Some(Value::Null) => return Ok(config.empty_value_placeholder.clone()),
        Some(Value::String(s)) if s.is_empty() => {
            return Ok(config.empty_value_placeholder.clone())
        }
        Some(value) => value,
    };

    match builtin {
        BuiltinType::String => match value {
            Value::String(s) => Ok(format!("\"{}\"", s.replace('"', "\"\""))),
            other => Err(FormatFault::new(format!(
                "expected a string, got a {} value",
                other.kind()
            ))),
        },
        BuiltinType::Date | BuiltinType::Number => Ok(value.to_text()),
        BuiltinType::Boolean => Ok(if value.is_truthy() { "1" } else { "0" }.to_string()),
    }
}
