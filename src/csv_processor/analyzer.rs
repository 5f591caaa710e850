use crate::csv_processor::decoder::decode_all;
use crate::csv_processor::tokenizer::{RowNormalizer, TokenizerSettings};
use crate::utils::{utf16_len, PipelineConfig, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDescription {
    pub entry_count: usize,
    /// Conservative estimate, not an accounting of actual memory.
    pub approx_byte_size: usize,
}

/// Counts the rows of a raw sample and estimates their in-memory size, using
/// the same decoding and tokenizing rules as the import pipeline.
pub fn describe_input(
    sample: &[u8],
    column_names: &[String],
    config: &PipelineConfig,
) -> Result<InputDescription> {
    let settings = TokenizerSettings::from_config(config)?;
    let text = decode_all(sample, &config.encoding);

    let mut reader = settings.csv_reader_builder().from_reader(text.as_bytes());
    let mut normalizer = RowNormalizer::new(column_names.len(), config.source_row_offset);

    let mut description = InputDescription::default();
    for result in reader.records() {
        let record = result?;
        let fields = record.iter().map(|s| s.to_string()).collect();
        if let Some(row) = normalizer.accept(fields) {
            description.entry_count += 1;
            description.approx_byte_size += row.tokens().map(approx_str_size).sum::<usize>();
        }
    }

    Ok(description)
}

/// Two bytes per UTF-16 code unit, as the tokens are held as text.
fn approx_str_size(text: &str) -> usize {
    utf16_len(text) * 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_counts_rows_and_sizes_strings() {
        let sample = b"ab;c\n\nd;\"e\"\"f\"\n";
        let info = describe_input(sample, &names(&["x", "y"]), &PipelineConfig::default()).unwrap();
        assert_eq!(info.entry_count, 2);
        // "ab" + "c" + "d" + "e\"f" = 2 + 1 + 1 + 3 code units
        assert_eq!(info.approx_byte_size, 14);
    }

    #[test]
    fn test_extra_fields_are_not_counted() {
        let sample = b"a;b;c\n";
        let info = describe_input(sample, &names(&["x"]), &PipelineConfig::default()).unwrap();
        assert_eq!(info.entry_count, 1);
        assert_eq!(info.approx_byte_size, 2);
    }

    #[test]
    fn test_source_offset_applies() {
        let config = PipelineConfig {
            source_row_offset: 2,
            ..PipelineConfig::default()
        };
        let info = describe_input(b"a\nb\nc\n", &names(&["x"]), &config).unwrap();
        assert_eq!(info.entry_count, 2);
    }

    #[test]
    fn test_sizes_count_utf16_units() {
        let sample = "héllo;😀\n".as_bytes();
        let info = describe_input(sample, &names(&["x", "y"]), &PipelineConfig::default()).unwrap();
        // 5 code units plus a surrogate pair
        assert_eq!(info.approx_byte_size, 14);
    }
}
