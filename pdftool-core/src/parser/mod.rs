//! PDF Parser Module
//!
//! Byte-level syntax: tokens, direct objects, cross-reference sections, object
//! streams, stream filters and content streams. [`PdfReader`] ties them together
//! into a lazily materialized [`Document`](crate::document::Document).

pub mod content;
pub mod filters;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod reader;
pub mod xref;
pub mod xref_stream;

pub use self::content::{ContentOperation, ContentParser, TextElement};
pub use self::reader::PdfReader;

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Invalid object reference: {0} {1} R")]
    InvalidReference(u32, u16),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid xref table")]
    InvalidXRef,

    #[error("Invalid trailer")]
    InvalidTrailer,

    #[error("Circular reference detected")]
    CircularReference,

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Nesting deeper than {0} levels")]
    TooDeep(usize),
}

/// Parsing behaviour knobs.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Tolerate a missing header, wrong stream lengths and broken xref offsets.
    pub lenient: bool,
    /// Rebuild the cross-reference table by scanning the file when it is unusable.
    pub recover_xref: bool,
    /// Maximum array/dictionary nesting depth.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            lenient: false,
            recover_xref: false,
            max_depth: 64,
        }
    }

    pub fn lenient() -> Self {
        Self {
            lenient: true,
            recover_xref: true,
            max_depth: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let error = ParseError::SyntaxError {
            position: 42,
            message: "bad token".to_string(),
        };
        assert_eq!(error.to_string(), "Syntax error at position 42: bad token");
        assert_eq!(
            ParseError::InvalidReference(3, 0).to_string(),
            "Invalid object reference: 3 0 R"
        );
    }

    #[test]
    fn test_options_presets() {
        assert!(ParseOptions::default().lenient);
        assert!(ParseOptions::default().recover_xref);
        let strict = ParseOptions::strict();
        assert!(!strict.lenient);
        assert!(!strict.recover_xref);
    }
}
