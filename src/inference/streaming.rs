//! Token streaming
//!
//! Turns raw token bytes into displayable text pieces.

use encoding_rs::{Decoder, UTF_8};

/// A streamed generation event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamToken {
    Token(String),
    Done,
    Error(String),
}

/// Decodes token bytes into displayable UTF-8 text.
///
/// A single token may end in the middle of a multi-byte character; the decoder holds
/// incomplete trailing sequences until the next push. Use one per generation.
pub struct Utf8Pieces {
    decoder: Decoder,
}

impl Default for Utf8Pieces {
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8Pieces {
    pub fn new() -> Self {
        Self {
            decoder: UTF_8.new_decoder(),
        }
    }

    /// Decode a token's bytes, returning any text that is now complete
    pub fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.decode(bytes, false)
    }

    /// Flush whatever is left, replacing an incomplete tail with U+FFFD
    pub fn finish(mut self) -> Option<String> {
        self.decode(&[], true)
    }

    fn decode(&mut self, bytes: &[u8], last: bool) -> Option<String> {
        let mut out = String::with_capacity(
            self.decoder
                .max_utf8_buffer_length(bytes.len())
                .unwrap_or(bytes.len() + 8),
        );
        let (_result, _read, _replaced) = self.decoder.decode_to_string(bytes, &mut out, last);
        (!out.is_empty()).then_some(out)
    }
}
