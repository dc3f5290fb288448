use std::path::PathBuf;

use thiserror::Error;

use crate::parser::ParseError;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Invalid page range syntax: '{token}'")]
    InvalidPageRangeSyntax { token: String },

    /// `spans` are the requested pages past the end, as sorted, disjoint
    /// inclusive runs.
    #[error("{}", page_out_of_range_message(.spans, *.page_count))]
    PageOutOfRange { spans: Vec<(u32, u32)>, page_count: u32 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Structural corruption: {0}")]
    StructuralCorruption(String),

    #[error("Document catalog is missing or invalid")]
    MissingCatalog,

    #[error("Malformed page tree: {0}")]
    MalformedPageTree(String),

    #[error("Cannot decrypt document: {0}")]
    EncryptedDocument(String),

    #[error("Unsupported color space: {0}")]
    UnsupportedColorSpace(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Failed to write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn page_out_of_range_message(spans: &[(u32, u32)], page_count: u32) -> String {
    let list = spans
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let noun = match spans {
        [(start, end)] if start == end => "Page",
        _ => "Pages",
    };
    format!("{noun} {list} out of range (document has {page_count} pages)")
}

pub type Result<T> = std::result::Result<T, PdfError>;
