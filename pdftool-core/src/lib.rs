//! # pdftool
//!
//! PDF page extraction, text extraction, recompression and rasterization in
//! pure Rust.
//!
//! ## Features
//!
//! - **Page Extraction**: Copy an ordered page selection into a new, self-contained PDF
//! - **Text Extraction**: Read the text of every page as plain text or Markdown
//! - **Compression**: Recompress images and streams under named quality profiles
//! - **Rasterization**: Render pages to PNG or JPEG at a chosen resolution
//! - **Lenient Parsing**: Damaged cross-reference tables are rebuilt by scanning the file
//! - **Decryption**: Documents without a user password are opened transparently
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdftool::{extract_pages, Document, PageRange, PdfWriter, Result};
//!
//! # fn main() -> Result<()> {
//! let source = Document::load(std::fs::read("report.pdf")?)?;
//! let range: PageRange = "3,1-2".parse()?;
//! let extracted = extract_pages(&source, &range)?;
//! std::fs::write("selection.pdf", PdfWriter::serialize(&extracted)?)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Rendering
//!
//! ```rust,no_run
//! use pdftool::{Document, ImageFormat, Renderer, Result};
//!
//! # fn main() -> Result<()> {
//! let doc = Document::load(std::fs::read("report.pdf")?)?;
//! let renderer = Renderer::new();
//! let page = renderer.render(&doc, doc.page(1)?, 150.0)?;
//! std::fs::write("page-1.png", page.image.encode(ImageFormat::Png)?)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`objects`] - PDF object model
//! - [`parser`] - File structure, objects, filters and content streams
//! - [`recovery`] - Cross-reference reconstruction for damaged files
//! - [`encryption`] - Standard security handler (RC4, AES-128, AES-256)
//! - [`document`] - Loaded documents and the flattened page list
//! - [`writer`] - Serialization of documents
//! - [`text`] - Font decoding and text extraction
//! - [`graphics`] - Matrices, paths, colour spaces and images
//! - [`render`] - Page rasterization
//! - [`operations`] - Page ranges and the user-facing requests

pub mod compression;
pub mod document;
pub mod encryption;
pub mod error;
pub mod graphics;
pub mod objects;
pub mod operations;
pub mod parallel;
pub mod parser;
pub mod recovery;
pub mod render;
pub mod text;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use document::{Document, Page, Rect};
pub use error::{PdfError, Result};
pub use objects::{Dictionary, Object, ObjectId, Stream};
pub use operations::{
    compress_request, convert_request, extract_markdown_request, extract_pages_request,
    extract_text_request, extract_pages, CompressRequest, CompressionProfile, ConvertRequest,
    ExtractPagesRequest, ExtractTextRequest, Outcome, PageRange, StreamCompressor,
};
pub use render::{ImageFormat, RenderOptions, Renderer};
pub use text::{extract_text, to_markdown, TextExtraction, TextExtractor};
pub use writer::{PdfWriter, WriterConfig};

/// Current version of pdftool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
