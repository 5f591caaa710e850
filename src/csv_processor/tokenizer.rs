use crate::utils::{PipelineConfig, SchemaError};
use csv_core::{ReadRecordResult, Reader, ReaderBuilder};

/// Escaped line breaks dropped from field edges, one of each, in this order.
const ESCAPED_EDGES: &[&str] = &["\\r\\n", "\\r", "\\n"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTerminator {
    /// Any run of `\r` and `\n`.
    CrLf,
    Byte(u8),
}

impl RowTerminator {
    fn to_core(self) -> csv_core::Terminator {
        match self {
            RowTerminator::CrLf => csv_core::Terminator::CRLF,
            RowTerminator::Byte(b) => csv_core::Terminator::Any(b),
        }
    }

    fn to_csv(self) -> csv::Terminator {
        match self {
            RowTerminator::CrLf => csv::Terminator::CRLF,
            RowTerminator::Byte(b) => csv::Terminator::Any(b),
        }
    }
}

/// Delimiter bytes the push tokenizer runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenizerSettings {
    pub delimiter: u8,
    pub terminator: RowTerminator,
}

impl TokenizerSettings {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, SchemaError> {
        let delimiter = match config.column_delimiter.as_bytes() {
            [byte] => *byte,
            _ => {
                return Err(SchemaError::InvalidDelimiter {
                    kind: "column",
                    value: config.column_delimiter.clone(),
                    reason: "must be a single byte on import",
                })
            }
        };

        let row = config.row_delimiter.as_bytes();
        let terminator = if !row.is_empty() && row.iter().all(|b| *b == b'\r' || *b == b'\n') {
            RowTerminator::CrLf
        } else if let [byte] = row {
            RowTerminator::Byte(*byte)
        } else {
            return Err(SchemaError::InvalidDelimiter {
                kind: "row",
                value: config.row_delimiter.clone(),
                reason: "must be a single byte or a run of CR/LF on import",
            });
        };

        Ok(Self {
            delimiter,
            terminator,
        })
    }

    pub fn csv_reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .terminator(self.terminator.to_csv());
        builder
    }
}

/// Push-based record tokenizer. Accepts text in arbitrary pieces and emits
/// complete records as ordered field lists.
pub struct RecordTokenizer {
    reader: Reader,
    output: Vec<u8>,
    ends: Vec<usize>,
    out_len: usize,
    ends_len: usize,
}

impl RecordTokenizer {
    pub fn new(settings: TokenizerSettings) -> Self {
        let reader = ReaderBuilder::new()
            .delimiter(settings.delimiter)
            .terminator(settings.terminator.to_core())
            .quote(b'"')
            .double_quote(true)
            .build();

        Self {
            reader,
            output: vec![0; 1024],
            ends: vec![0; 32],
            out_len: 0,
            ends_len: 0,
        }
    }

    pub fn feed(&mut self, input: &[u8], records: &mut Vec<Vec<String>>) {
        self.run(input, false, records);
    }

    /// Flushes a trailing record that has no terminator.
    pub fn finish(&mut self, records: &mut Vec<Vec<String>>) {
        self.run(&[], true, records);
    }

    fn run(&mut self, mut input: &[u8], eof: bool, records: &mut Vec<Vec<String>>) {
        loop {
            // An empty slice means end of input to the reader.
            if input.is_empty() && !eof {
                break;
            }
            let (result, nin, nout, nend) = self.reader.read_record(
                input,
                &mut self.output[self.out_len..],
                &mut self.ends[self.ends_len..],
            );
            input = &input[nin..];
            self.out_len += nout;
            self.ends_len += nend;

            match result {
                ReadRecordResult::InputEmpty => break,
                ReadRecordResult::OutputFull => {
                    let len = self.output.len();
                    self.output.resize(len * 2, 0);
                }
                ReadRecordResult::OutputEndsFull => {
                    let len = self.ends.len();
                    self.ends.resize(len * 2, 0);
                }
                ReadRecordResult::Record => records.push(self.take_record()),
                ReadRecordResult::End => break,
            }
        }
    }

    fn take_record(&mut self) -> Vec<String> {
        let mut fields = Vec::with_capacity(self.ends_len);
        let mut start = 0;
        for &end in &self.ends[..self.ends_len] {
            fields.push(String::from_utf8_lossy(&self.output[start..end]).into_owned());
            start = end;
        }
        self.out_len = 0;
        self.ends_len = 0;
        fields
    }
}

/// Ordered raw tokens of one row, aligned to the column table by position.
/// `None` marks a column the input row did not reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    tokens: Vec<Option<String>>,
}

impl RawRow {
    pub fn new(tokens: Vec<Option<String>>) -> Self {
        Self { tokens }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).and_then(|t| t.as_deref())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| t.as_deref())
    }
}

/// Cleans tokenized records and maps them onto the columns: strips escaped
/// line breaks at field edges, drops blank rows and rows before the source
/// offset, pads or truncates to the column count.
#[derive(Debug, Clone)]
pub struct RowNormalizer {
    column_count: usize,
    first_kept: usize,
    seen: usize,
}

impl RowNormalizer {
    pub fn new(column_count: usize, source_row_offset: usize) -> Self {
        Self {
            column_count,
            first_kept: source_row_offset.max(1),
            seen: 0,
        }
    }

    pub fn accept(&mut self, fields: Vec<String>) -> Option<RawRow> {
        let fields: Vec<String> = fields.into_iter().map(strip_escaped_edges).collect();
        if fields.iter().all(|f| f.is_empty()) {
            return None;
        }

        self.seen += 1;
        if self.seen < self.first_kept {
            return None;
        }

        let mut tokens: Vec<Option<String>> =
            fields.into_iter().take(self.column_count).map(Some).collect();
        tokens.resize(self.column_count, None);
        Some(RawRow::new(tokens))
    }
}

fn strip_escaped_edges(field: String) -> String {
    if !field.contains('\\') {
        return field;
    }
    let unescaped = field.replace("\"\\r", "\"").replace("\\r\"", "\"");

    let mut text = unescaped.as_str();
    for edge in ESCAPED_EDGES {
        if let Some(rest) = text.strip_prefix(edge) {
            text = rest;
        }
        if let Some(rest) = text.strip_suffix(edge) {
            text = rest;
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TokenizerSettings {
        TokenizerSettings::from_config(&PipelineConfig::default()).unwrap()
    }

    fn tokenize_pieces(pieces: &[&str]) -> Vec<Vec<String>> {
        let mut tokenizer = RecordTokenizer::new(settings());
        let mut records = Vec::new();
        for piece in pieces {
            tokenizer.feed(piece.as_bytes(), &mut records);
        }
        tokenizer.finish(&mut records);
        records
    }

    #[test]
    fn test_settings_from_default_config() {
        let s = settings();
        assert_eq!(s.delimiter, b';');
        assert_eq!(s.terminator, RowTerminator::CrLf);
    }

    #[test]
    fn test_settings_reject_multibyte_delimiter() {
        let config = PipelineConfig {
            column_delimiter: "::".to_string(),
            ..PipelineConfig::default()
        };
        assert!(TokenizerSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_settings_single_byte_row_delimiter() {
        let config = PipelineConfig {
            row_delimiter: "|".to_string(),
            ..PipelineConfig::default()
        };
        assert_eq!(
            TokenizerSettings::from_config(&config).unwrap().terminator,
            RowTerminator::Byte(b'|')
        );
    }

    #[test]
    fn test_quoted_fields() {
        let records = tokenize_pieces(&["1;\"a\"\"b\";1\n"]);
        assert_eq!(records, vec![vec!["1", "a\"b", "1"]]);
    }

    #[test]
    fn test_records_split_across_pieces() {
        let records = tokenize_pieces(&["1;\"ab", "c\";2\n\r3;", "\"x;y\";4"]);
        assert_eq!(
            records,
            vec![vec!["1", "abc", "2"], vec!["3", "x;y", "4"]]
        );
    }

    #[test]
    fn test_large_field_grows_buffers() {
        let long = "x".repeat(5000);
        let fields: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        let text = format!("{};{}\n", long, fields.join(";"));
        let records = tokenize_pieces(&[&text]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0][0], long);
        assert_eq!(records[0].len(), 101);
    }

    #[test]
    fn test_normalizer_pads_and_truncates() {
        let mut normalizer = RowNormalizer::new(3, 1);
        let short = normalizer.accept(vec!["a".to_string()]).unwrap();
        assert_eq!(short.get(0), Some("a"));
        assert_eq!(short.get(1), None);
        assert_eq!(short.len(), 3);

        let long = normalizer
            .accept(vec!["1".into(), "2".into(), "3".into(), "4".into()])
            .unwrap();
        assert_eq!(long.tokens().collect::<Vec<_>>(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_normalizer_drops_blank_rows_and_offset() {
        let mut normalizer = RowNormalizer::new(2, 2);
        assert!(normalizer.accept(vec![String::new(), String::new()]).is_none());
        assert!(normalizer.accept(vec!["first".into()]).is_none());
        assert!(normalizer.accept(vec!["second".into()]).is_some());
    }

    #[test]
    fn test_escaped_edges_strip_in_sequence() {
        assert_eq!(strip_escaped_edges("\\r\\n\\nvalue".to_string()), "value");
        assert_eq!(strip_escaped_edges("value\\r\\r\\n".to_string()), "value");
        assert_eq!(strip_escaped_edges("\\n\\rvalue".to_string()), "\\rvalue");
        assert_eq!(strip_escaped_edges("a\\nb".to_string()), "a\\nb");
    }

    #[test]
    fn test_escaped_carriage_return_next_to_quote_is_dropped() {
        assert_eq!(
            strip_escaped_edges("say \"\\rhi\\r\" now".to_string()),
            "say \"hi\" now"
        );
    }

    #[test]
    fn test_normalizer_strips_escaped_line_breaks() {
        let mut normalizer = RowNormalizer::new(2, 1);
        let row = normalizer
            .accept(vec!["\\r\\nvalue\\r".to_string(), "\\n".to_string()])
            .unwrap();
        assert_eq!(row.get(0), Some("value"));
        assert_eq!(row.get(1), Some(""));
    }
}
