use crate::csv_processor::RawRow;
use crate::schema::{
    BuiltinType, Check, ColumnInfo, ColumnTable, ErrorSignal, FormatFault, ImportFormatFn,
    Record, Resolved, Value,
};
use crate::utils::PipelineConfig;
use std::sync::Arc;

/// Import side of the field pipeline: coerces and validates one raw row,
/// stopping at the first column that fails.
#[derive(Clone)]
pub struct ImportFieldPipeline {
    table: Arc<ColumnTable<ImportFormatFn>>,
}

impl ImportFieldPipeline {
    pub fn new(table: Arc<ColumnTable<ImportFormatFn>>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ColumnTable<ImportFormatFn> {
        &self.table
    }

    pub fn assemble(&self, raw: &RawRow, row_number: usize) -> Result<Record, ErrorSignal> {
        let config = self.table.config();
        let mut record = Record::with_capacity(self.table.len());

        for (index, column) in self.table.columns().iter().enumerate() {
            let token = raw.get(index);

            let coerced = match &column.formatter {
                Resolved::Builtin(builtin) => coerce_builtin(*builtin, &column.info, token, config),
                Resolved::Custom(formatter) => formatter(&column.info, token),
            };

            let checked = coerced.and_then(|value| match &column.type_check {
                Some(Check::Builtin(builtin)) => check_builtin(*builtin, value),
                Some(Check::Custom(check)) => check(&column.info, value),
                None => Ok(value),
            });

            match checked {
                Ok(Some(value)) => record.insert(column.info.name.clone(), value),
                Ok(None) => {}
                Err(fault) => {
                    return Err(ErrorSignal::invalid_value(
                        token,
                        &column.info.name,
                        column.info.type_tag(),
                        row_number,
                        fault.0,
                    ))
                }
            }
        }

        Ok(record)
    }
}

/// Default import coercion of the built-in semantic types.
pub fn coerce_builtin(
    builtin: BuiltinType,
    column: &ColumnInfo,
    token: Option<&str>,
    config: &PipelineConfig,
) -> Result<Option<Value>, FormatFault> {
    let token = match token {
        Some(t) if t == config.null_literal && column.nullable => return Ok(Some(Value::Null)),
        None => return Ok(None),
        Some(t) if t.is_empty() || t == config.null_literal => return Ok(None),
        Some(t) => t,
    };

    let value = match builtin {
        BuiltinType::String => Value::String(token.to_string()),
        BuiltinType::Number => Value::Number(parse_number_prefix(&token.trim().replace(',', "."))),
        BuiltinType::Boolean => Value::Boolean(token_is_truthy(token)),
        BuiltinType::Date => Value::Date(
            Value::parse_date(token)
                .ok_or_else(|| FormatFault::new(format!("{:?} is not a recognizable date", token)))?,
        ),
    };
    Ok(Some(value))
}

/// Default import validation: the coerced value must be of the column's kind.
pub fn check_builtin(
    builtin: BuiltinType,
    value: Option<Value>,
) -> Result<Option<Value>, FormatFault> {
    let verdict = match (&value, builtin) {
        (None, _) | (Some(Value::Null), _) => Ok(()),
        (Some(Value::String(_)), BuiltinType::String)
        | (Some(Value::Date(_)), BuiltinType::Date)
        | (Some(Value::Boolean(_)), BuiltinType::Boolean) => Ok(()),
        (Some(Value::Number(n)), BuiltinType::Number) if n.is_finite() => Ok(()),
        (Some(Value::Number(_)), BuiltinType::Number) => {
            Err(FormatFault::new("not a finite number"))
        }
        (Some(other), _) => Err(FormatFault::new(format!(
            "a {} value does not fit this column",
            other.kind()
        ))),
    };
    verdict.map(|()| value)
}

/// Parses the longest leading decimal float of `text`, so `"12 kg"` reads
/// as 12 and `"1.5.2"` as 1.5. NaN when there is no leading number.
fn parse_number_prefix(text: &str) -> f64 {
    let bytes = text.as_bytes();
    let digits_from = |mut at: usize| {
        while bytes.get(at).map_or(false, u8::is_ascii_digit) {
            at += 1;
        }
        at
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let integral_end = digits_from(end);
    let mut mantissa_digits = integral_end - end;
    end = integral_end;

    if bytes.get(end) == Some(&b'.') {
        let fraction_end = digits_from(end + 1);
        mantissa_digits += fraction_end - end - 1;
        if mantissa_digits > 0 {
            end = fraction_end;
        }
    }
    if mantissa_digits == 0 {
        return f64::NAN;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exponent_end = digits_from(end + 1 + sign);
        if exponent_end > end + 1 + sign {
            end = exponent_end;
        }
    }

    text[..end].parse::<f64>().unwrap_or(f64::NAN)
}

fn token_is_truthy(token: &str) -> bool {
    !(token == "0" || token.eq_ignore_ascii_case("false"))
}
