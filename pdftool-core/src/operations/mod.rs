//! PDF operations module
//!
//! The request layer: each request loads one document, runs one component
//! over it and writes its output files atomically. Requests return an
//! [`Outcome`] describing what was written, or a [`PdfError`].

pub mod compress;
pub mod convert;
pub mod output;
pub mod page_extraction;
pub mod page_range;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use compress::{CompressionReport, CompressionSettings, StreamCompressor};
pub use convert::{convert_document, validate_dpi, ConversionReport, DEFAULT_DPI, MAX_DPI, MIN_DPI};
pub use page_extraction::{extract_pages, PageExtractionOptions, PageExtractor};
pub use page_range::PageRange;

use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::render::{ImageFormat, RenderOptions, Renderer};
use crate::text::{to_markdown, TextExtraction, TextExtractor};
use crate::writer::{PdfWriter, WriterConfig};
use output::{default_base, ensure_dir, input_dir, output_path, write_atomic};

/// Named compression presets, from smallest output to highest fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionProfile {
    Screen,
    #[default]
    Ebook,
    Printer,
    Prepress,
}

impl CompressionProfile {
    pub const ALL: [CompressionProfile; 4] = [
        CompressionProfile::Screen,
        CompressionProfile::Ebook,
        CompressionProfile::Printer,
        CompressionProfile::Prepress,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CompressionProfile::Screen => "screen",
            CompressionProfile::Ebook => "ebook",
            CompressionProfile::Printer => "printer",
            CompressionProfile::Prepress => "prepress",
        }
    }

    pub fn settings(&self) -> CompressionSettings {
        let (target_dpi, jpeg_quality, lossy_for_lossless) = match self {
            CompressionProfile::Screen => (72.0, 40, true),
            CompressionProfile::Ebook => (150.0, 60, true),
            CompressionProfile::Printer => (300.0, 80, false),
            CompressionProfile::Prepress => (300.0, 90, false),
        };
        CompressionSettings {
            target_dpi,
            jpeg_quality,
            downsample_threshold: 1.5,
            deflate_streams: true,
            lossy_for_lossless,
        }
    }
}

impl FromStr for CompressionProfile {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "screen" | "low" => Ok(CompressionProfile::Screen),
            "ebook" | "medium" => Ok(CompressionProfile::Ebook),
            "printer" | "high" => Ok(CompressionProfile::Printer),
            "prepress" | "maximum" => Ok(CompressionProfile::Prepress),
            other => Err(PdfError::InvalidParameter(format!(
                "invalid quality '{other}', must be one of: screen, ebook, printer, prepress"
            ))),
        }
    }
}

impl fmt::Display for CompressionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a request.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    /// Confirmation shown to the user.
    pub message: String,
    pub outputs: Vec<PathBuf>,
    /// Fidelity losses and skipped content.
    pub warnings: Vec<String>,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for warning in &self.warnings {
            write!(f, "\nWarning: {warning}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ExtractPagesRequest {
    pub input: PathBuf,
    /// Page selection such as `"1,3-5"`.
    pub pages: String,
    /// Defaults to the input's directory.
    pub output_dir: Option<PathBuf>,
    /// Defaults to `<stem>_extracted`.
    pub base_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractTextRequest {
    pub input: PathBuf,
    pub output_dir: Option<PathBuf>,
    /// Defaults to the input's stem.
    pub base_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompressRequest {
    pub input: PathBuf,
    pub profile: CompressionProfile,
    pub output_dir: Option<PathBuf>,
    /// Defaults to `<stem>_compressed`.
    pub base_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub input: PathBuf,
    pub format: ImageFormat,
    pub dpi: f64,
    /// Defaults to the current directory.
    pub output_dir: Option<PathBuf>,
    /// Defaults to the input's stem; pages are written as `<base>-<page>`.
    pub base_name: Option<String>,
    pub render: RenderOptions,
}

impl ConvertRequest {
    /// PNG at the default resolution into the current directory.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            format: ImageFormat::Png,
            dpi: DEFAULT_DPI,
            output_dir: None,
            base_name: None,
            render: RenderOptions::from_env(),
        }
    }
}

/// Reads and parses the input file.
pub fn load_document(input: &Path) -> Result<Document> {
    Ok(load_bytes(input)?.1)
}

fn load_bytes(input: &Path) -> Result<(Vec<u8>, Document)> {
    if !input.is_file() {
        return Err(PdfError::InputNotFound(input.to_path_buf()));
    }
    let bytes = std::fs::read(input)?;
    let doc = Document::load(bytes.clone())?;
    tracing::debug!(
        "Loaded {} ({} bytes, {} pages)",
        input.display(),
        bytes.len(),
        doc.page_count()
    );
    Ok((bytes, doc))
}

fn target_file(
    input: &Path,
    output_dir: Option<&Path>,
    base_name: Option<&str>,
    suffix: &str,
    extension: &str,
) -> Result<PathBuf> {
    let dir = output_dir.map_or_else(|| input_dir(input), Path::to_path_buf);
    ensure_dir(&dir)?;
    let base = base_name.map_or_else(|| default_base(input, suffix), str::to_string);
    Ok(output_path(&dir, &base, extension))
}

/// Writes the selected pages, in request order, to `<base>.pdf`.
pub fn extract_pages_request(request: &ExtractPagesRequest) -> Result<Outcome> {
    if !request.input.is_file() {
        return Err(PdfError::InputNotFound(request.input.clone()));
    }
    let range = PageRange::parse(&request.pages)?;
    let source = load_document(&request.input)?;
    let extracted = extract_pages(&source, &range)?;
    let bytes = PdfWriter::serialize(&extracted)?;

    let path = target_file(
        &request.input,
        request.output_dir.as_deref(),
        request.base_name.as_deref(),
        "_extracted",
        "pdf",
    )?;
    write_atomic(&path, &bytes)?;
    tracing::info!("Extracted pages {range} to {}", path.display());

    let mut warnings = source.warnings();
    warnings.extend(extracted.warnings());
    Ok(Outcome {
        message: format!("Extracted pages to {}", path.display()),
        outputs: vec![path],
        warnings,
    })
}

fn text_outcome(extraction: &TextExtraction, source: &Document) -> Vec<String> {
    let mut warnings = source.warnings();
    warnings.extend(extraction.warnings());
    let unmapped = extraction.unmapped();
    if unmapped > 0 {
        warnings.push(format!(
            "{unmapped} character codes had no Unicode mapping and were replaced with U+FFFD"
        ));
    }
    warnings
}

/// Writes the text of every page to `<base>.txt`.
pub fn extract_text_request(request: &ExtractTextRequest) -> Result<Outcome> {
    let doc = load_document(&request.input)?;
    let extraction = TextExtractor::new().extract_document(&doc)?;
    let path = target_file(
        &request.input,
        request.output_dir.as_deref(),
        request.base_name.as_deref(),
        "",
        "txt",
    )?;
    write_atomic(&path, extraction.text().as_bytes())?;
    tracing::info!("Text of {} pages written to {}", extraction.pages.len(), path.display());

    Ok(Outcome {
        message: format!("Text extracted to {}", path.display()),
        outputs: vec![path],
        warnings: text_outcome(&extraction, &doc),
    })
}

/// Writes the text of every page as Markdown to `<base>.md`.
pub fn extract_markdown_request(request: &ExtractTextRequest) -> Result<Outcome> {
    let doc = load_document(&request.input)?;
    let extraction = TextExtractor::new().extract_document(&doc)?;
    let path = target_file(
        &request.input,
        request.output_dir.as_deref(),
        request.base_name.as_deref(),
        "",
        "md",
    )?;
    write_atomic(&path, to_markdown(&extraction).as_bytes())?;
    tracing::info!("Markdown written to {}", path.display());

    Ok(Outcome {
        message: format!("Markdown written to {}", path.display()),
        outputs: vec![path],
        warnings: text_outcome(&extraction, &doc),
    })
}

/// Recompresses the document into `<base>.pdf`. The output is never larger
/// than the input: when recompression does not help, the input is copied.
pub fn compress_request(request: &CompressRequest) -> Result<Outcome> {
    let (original, mut doc) = load_bytes(&request.input)?;
    let report = StreamCompressor::new(request.profile).compress(&mut doc)?;
    let writer = PdfWriter::with_config(WriterConfig {
        xref_stream: true,
        compress_new_streams: true,
    });
    let compressed = writer.write_document(&doc)?;

    let mut warnings = doc.warnings();
    warnings.extend(report.warnings.iter().cloned());
    let bytes = if compressed.len() < original.len() {
        compressed
    } else {
        warnings.push(format!(
            "Recompression at profile {} did not reduce the size; the original was kept",
            request.profile
        ));
        original.clone()
    };

    let path = target_file(
        &request.input,
        request.output_dir.as_deref(),
        request.base_name.as_deref(),
        "_compressed",
        "pdf",
    )?;
    write_atomic(&path, &bytes)?;
    tracing::info!(
        "Compressed {} -> {} bytes into {}",
        original.len(),
        bytes.len(),
        path.display()
    );

    Ok(Outcome {
        message: format!(
            "Compressed PDF saved to {} ({} -> {} bytes)",
            path.display(),
            original.len(),
            bytes.len()
        ),
        outputs: vec![path],
        warnings,
    })
}

/// Renders every page to `<base>-<page>.<ext>`.
pub fn convert_request(request: &ConvertRequest) -> Result<Outcome> {
    validate_dpi(request.dpi)?;
    let doc = load_document(&request.input)?;

    let dir = request
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    ensure_dir(&dir)?;
    let base = request
        .base_name
        .clone()
        .unwrap_or_else(|| default_base(&request.input, ""));
    let format = match request.format {
        ImageFormat::Jpeg { .. } => ImageFormat::Jpeg {
            quality: request.render.jpeg_quality,
        },
        png => png,
    };

    let renderer = Renderer::with_options(request.render.clone());
    let report = convert_document(&doc, &renderer, format, request.dpi, &dir, &base)?;
    let mut warnings = doc.warnings();
    warnings.extend(report.warnings);

    Ok(Outcome {
        message: format!(
            "Converted PDF to {} images in {}",
            format.extension(),
            dir.display()
        ),
        outputs: report.outputs,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::numbered_pages;

    fn write_fixture(dir: &Path, name: &str, pages: usize) -> PathBuf {
        let path = dir.join(name);
        let bytes = PdfWriter::serialize(&numbered_pages(pages)).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_profile_names_and_aliases() {
        for profile in CompressionProfile::ALL {
            assert_eq!(profile.name().parse::<CompressionProfile>().unwrap(), profile);
        }
        assert_eq!("LOW".parse::<CompressionProfile>().unwrap(), CompressionProfile::Screen);
        assert_eq!("maximum".parse::<CompressionProfile>().unwrap(), CompressionProfile::Prepress);
        let error = "best".parse::<CompressionProfile>().unwrap_err();
        assert!(error.to_string().contains("screen, ebook, printer, prepress"));
    }

    #[test]
    fn test_outcome_display_lists_warnings() {
        let outcome = Outcome {
            message: "Done".to_string(),
            outputs: Vec::new(),
            warnings: vec!["one".to_string(), "two".to_string()],
        };
        assert_eq!(outcome.to_string(), "Done\nWarning: one\nWarning: two");
    }

    #[test]
    fn test_missing_input() {
        let request = ExtractTextRequest {
            input: PathBuf::from("/nonexistent/input.pdf"),
            output_dir: None,
            base_name: None,
        };
        assert!(matches!(
            extract_text_request(&request),
            Err(PdfError::InputNotFound(_))
        ));
    }

    #[test]
    fn test_extract_request_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(dir.path(), "book.pdf", 3);
        let outcome = extract_pages_request(&ExtractPagesRequest {
            input,
            pages: "2-3".to_string(),
            output_dir: None,
            base_name: None,
        })
        .unwrap();
        let expected = dir.path().join("book_extracted.pdf");
        assert_eq!(outcome.outputs, vec![expected.clone()]);
        assert!(outcome.message.starts_with("Extracted pages to"));
        let written = load_document(&expected).unwrap();
        assert_eq!(written.page_count(), 2);
    }

    #[test]
    fn test_bad_range_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(dir.path(), "book.pdf", 3);
        let out = dir.path().join("out");
        let error = extract_pages_request(&ExtractPagesRequest {
            input,
            pages: "3-1".to_string(),
            output_dir: Some(out.clone()),
            base_name: None,
        })
        .unwrap_err();
        assert!(matches!(error, PdfError::InvalidPageRangeSyntax { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn test_text_request_writes_txt() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(dir.path(), "notes.pdf", 2);
        let outcome = extract_text_request(&ExtractTextRequest {
            input,
            output_dir: None,
            base_name: Some("plain".to_string()),
        })
        .unwrap();
        let text = std::fs::read_to_string(dir.path().join("plain.txt")).unwrap();
        assert_eq!(text, "Page 1\n\u{0C}\nPage 2\n");
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_compress_request_never_grows() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(dir.path(), "small.pdf", 1);
        let before = std::fs::metadata(&input).unwrap().len();
        let outcome = compress_request(&CompressRequest {
            input,
            profile: CompressionProfile::Screen,
            output_dir: None,
            base_name: None,
        })
        .unwrap();
        let after = std::fs::metadata(&outcome.outputs[0]).unwrap().len();
        assert!(after <= before);
        assert!(outcome.outputs[0].ends_with("small_compressed.pdf"));
    }

    #[test]
    fn test_convert_request_rejects_dpi() {
        let mut request = ConvertRequest::new("whatever.pdf");
        request.dpi = 5000.0;
        assert!(matches!(
            convert_request(&request),
            Err(PdfError::InvalidParameter(_))
        ));
    }
}
