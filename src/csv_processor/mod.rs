pub mod analyzer;
pub mod decoder;
pub mod reader;
pub mod tokenizer;
pub mod writer;

pub use analyzer::{describe_input, InputDescription};
pub use decoder::{decode_all, resolve_encoding, TextDecoder};
pub use reader::{file_exists, get_file_size, InputSource};
pub use tokenizer::{RawRow, RecordTokenizer, RowNormalizer, RowTerminator, TokenizerSettings};
pub use writer::{drain_lines, drain_records, TextStreamWriter};
