use serde::Serialize;
use thiserror::Error;

pub const ERR_CSV_IO_INVALID_VALUE: &str = "ERR_CSV_IO_INVALID_VALUE";

/// Validation fault raised by the import field pipeline. It carries the raw
/// token that could not be coerced and where it was found.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{} on row {row_number} is not a valid value for column {column_name} of type {column_type}", .value.as_deref().unwrap_or("undefined"))]
pub struct ErrorSignal {
    pub code: &'static str,
    pub value: Option<String>,
    pub column_name: String,
    pub column_type: String,
    /// 1-based, counted over delivered data rows.
    pub row_number: usize,
    pub reason: String,
}

impl ErrorSignal {
    pub fn invalid_value(
        value: Option<&str>,
        column_name: &str,
        column_type: &str,
        row_number: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            code: ERR_CSV_IO_INVALID_VALUE,
            value: value.map(str::to_string),
            column_name: column_name.to_string(),
            column_type: column_type.to_string(),
            row_number,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_names_row_and_column() {
        let signal = ErrorSignal::invalid_value(Some("bad data"), "id", "number", 3, "NaN");
        assert_eq!(signal.code, ERR_CSV_IO_INVALID_VALUE);
        assert_eq!(
            signal.to_string(),
            "bad data on row 3 is not a valid value for column id of type number"
        );
    }

    #[test]
    fn test_serializes_metadata() {
        let signal = ErrorSignal::invalid_value(None, "when", "date", 1, "missing");
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["code"], "ERR_CSV_IO_INVALID_VALUE");
        assert_eq!(json["value"], serde_json::Value::Null);
        assert_eq!(json["row_number"], 1);
    }
}
