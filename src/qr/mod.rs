//! QR symbol decoding and fixture encoding
//!
//! Decoding turns camera frames into [`DecodedSymbol`]s via `rqrr`. The
//! encoder half exists for producing fixture images (tests, dry runs).

mod decoder;
mod encoder;

pub use decoder::QrDecoder;
pub use encoder::QrEncoder;

use serde::{Deserialize, Serialize};

/// Payload carried by one decoded QR symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedSymbol {
    data: Vec<u8>,
}

impl DecodedSymbol {
    /// Wrap raw decoded bytes
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Wrap a decoded string
    pub fn from_string(text: String) -> Self {
        Self {
            data: text.into_bytes(),
        }
    }

    /// View the payload as text, when it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// The raw payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_symbol_exposes_both_views() {
        let symbol = DecodedSymbol::from_string("hello world".to_string());
        assert_eq!(symbol.as_str(), Some("hello world"));
        assert_eq!(symbol.as_bytes(), b"hello world");
    }

    #[test]
    fn non_utf8_symbol_has_no_text_view() {
        let symbol = DecodedSymbol::from_bytes(vec![0xFF, 0xFE]);
        assert!(symbol.as_str().is_none());
        assert_eq!(symbol.as_bytes(), &[0xFF, 0xFE]);
    }
}
