use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};

/// Resolves an encoding label. `ascii` is read as UTF-8, which is a superset;
/// unknown labels fall back to UTF-8.
pub fn resolve_encoding(label: &str) -> &'static Encoding {
    let label = label.trim();
    if label.eq_ignore_ascii_case("ascii") {
        return UTF_8;
    }
    match Encoding::for_label(label.as_bytes()) {
        Some(encoding) => encoding,
        None => {
            tracing::warn!(encoding = %label, "Unknown encoding, decoding as UTF-8");
            UTF_8
        }
    }
}

/// Incremental decoder to UTF-8. Byte sequences split across chunks are held
/// back until the rest arrives.
pub struct TextDecoder {
    decoder: Decoder,
    encoding: &'static Encoding,
}

impl TextDecoder {
    pub fn new(label: &str) -> Self {
        let encoding = resolve_encoding(label);
        Self {
            decoder: encoding.new_decoder(),
            encoding,
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn decode(&mut self, mut bytes: &[u8], last: bool) -> String {
        let mut out = String::new();
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(bytes.len())
                .unwrap_or(bytes.len() * 3 + 16);
            out.reserve(needed);

            let (result, read, had_errors) = self.decoder.decode_to_string(bytes, &mut out, last);
            if had_errors {
                tracing::debug!(encoding = self.encoding.name(), "Malformed input replaced");
            }
            bytes = &bytes[read..];

            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
        out
    }

    pub fn finish(&mut self) -> String {
        self.decode(&[], true)
    }
}

/// Decodes a complete buffer in one go.
pub fn decode_all(bytes: &[u8], label: &str) -> String {
    let mut decoder = TextDecoder::new(label);
    decoder.decode(bytes, true)
}
