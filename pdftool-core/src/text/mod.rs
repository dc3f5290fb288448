//! Text extraction: font decoding, content interpretation and Markdown export.

pub mod cmap;
pub mod encoding;
pub mod extraction;
pub mod font;
pub mod glyph_list;
pub mod markdown;
pub mod metrics;

pub use cmap::CMap;
pub use encoding::{decode_text_string, encode_text_string, TextEncoding};
pub use extraction::{
    extract_text, ExtractionOptions, PageText, TextExtraction, TextExtractor, TextRun,
};
pub use font::{FontDecoder, FontFlags, FontKind, Glyph};
pub use markdown::to_markdown;
