//! Page-to-image conversion
//!
//! Every page is rendered, encoded and written on a worker thread. A page
//! that cannot be rendered is skipped with a warning; the conversion fails
//! only when no page could be converted or a file cannot be written.

use std::path::{Path, PathBuf};

use super::output::{output_path, write_atomic};
use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::parallel::map_ordered;
use crate::render::{ImageFormat, Renderer};

/// Resolution used when the caller does not choose one.
pub const DEFAULT_DPI: f64 = 300.0;
/// Accepted resolution range.
pub const MIN_DPI: f64 = 1.0;
pub const MAX_DPI: f64 = 2400.0;

/// Files written by a conversion.
#[derive(Debug, Clone, Default)]
pub struct ConversionReport {
    /// One image per converted page, in page order.
    pub outputs: Vec<PathBuf>,
    /// Pages that could not be rendered.
    pub failed: Vec<u32>,
    pub warnings: Vec<String>,
}

pub fn validate_dpi(dpi: f64) -> Result<()> {
    if !(MIN_DPI..=MAX_DPI).contains(&dpi) {
        return Err(PdfError::InvalidParameter(format!(
            "DPI must be between {MIN_DPI} and {MAX_DPI}, got {dpi}"
        )));
    }
    Ok(())
}

/// Writes `<dir>/<base>-<page>.<ext>` for every page of `doc`.
pub fn convert_document(
    doc: &Document,
    renderer: &Renderer,
    format: ImageFormat,
    dpi: f64,
    dir: &Path,
    base: &str,
) -> Result<ConversionReport> {
    validate_dpi(dpi)?;
    let numbers: Vec<u32> = (1..=doc.page_count()).collect();
    if numbers.is_empty() {
        let message = "Document has no pages; no images were written".to_string();
        tracing::warn!("{message}");
        return Ok(ConversionReport {
            warnings: vec![message],
            ..ConversionReport::default()
        });
    }

    let results = map_ordered(
        &numbers,
        renderer.options().threads,
        |&number| -> Result<(PathBuf, Vec<String>)> {
            let page = doc.page(number)?;
            let rendered = renderer.render(doc, page, dpi)?;
            let bytes = rendered.image.encode(format)?;
            let path = output_path(dir, &format!("{base}-{number}"), format.extension());
            write_atomic(&path, &bytes)?;
            Ok((path, rendered.warnings))
        },
    );

    let mut report = ConversionReport::default();
    let mut first_error = None;
    for (number, result) in numbers.iter().zip(results) {
        match result {
            Ok((path, warnings)) => {
                report.outputs.push(path);
                report.warnings.extend(warnings);
            }
            Err(error @ PdfError::Output { .. }) => return Err(error),
            Err(error) => {
                let message = format!("Page {number} skipped: {error}");
                tracing::warn!("{message}");
                report.warnings.push(message);
                report.failed.push(*number);
                first_error.get_or_insert(error);
            }
        }
    }

    if report.outputs.is_empty() {
        if let Some(error) = first_error {
            return Err(error);
        }
    }
    tracing::info!(
        "Converted {} of {} pages at {dpi} DPI",
        report.outputs.len(),
        numbers.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Dictionary, Object};
    use crate::render::RenderOptions;
    use crate::test_support::{dict, DocumentBuilder};

    fn renderer() -> Renderer {
        Renderer::with_options(RenderOptions {
            font_dirs: Vec::new(),
            threads: Some(2),
            ..RenderOptions::default()
        })
    }

    fn device_n_resources() -> Dictionary {
        let space = Object::Array(vec![
            Object::name("DeviceN"),
            Object::Array(vec![Object::name("Spot")]),
            Object::name("DeviceGray"),
            Object::Dictionary(Dictionary::new()),
        ]);
        dict([(
            "ColorSpace",
            Object::Dictionary(dict([("CS0", space)])),
        )])
    }

    #[test]
    fn test_dpi_bounds() {
        assert!(validate_dpi(1.0).is_ok());
        assert!(validate_dpi(2400.0).is_ok());
        assert!(matches!(validate_dpi(0.0), Err(PdfError::InvalidParameter(_))));
        assert!(validate_dpi(2401.0).is_err());
    }

    #[test]
    fn test_one_file_per_page() {
        let mut builder = DocumentBuilder::new();
        builder.page(b"0 0 100 100 re f", Dictionary::new());
        builder.page(b"", Dictionary::new());
        let doc = builder.build();
        let dir = tempfile::tempdir().unwrap();

        let report =
            convert_document(&doc, &renderer(), ImageFormat::Png, 18.0, dir.path(), "doc").unwrap();
        assert_eq!(
            report.outputs,
            vec![dir.path().join("doc-1.png"), dir.path().join("doc-2.png")]
        );
        for path in &report.outputs {
            let image = image::open(path).unwrap();
            assert_eq!((image.width(), image.height()), (153, 198));
        }
    }

    #[test]
    fn test_failing_page_skipped() {
        let mut builder = DocumentBuilder::new();
        builder.page(b"", Dictionary::new());
        builder.page(b"/CS0 cs 1 scn 0 0 10 10 re f", device_n_resources());
        let doc = builder.build();
        let dir = tempfile::tempdir().unwrap();

        let report = convert_document(
            &doc,
            &renderer(),
            ImageFormat::Jpeg { quality: 80 },
            9.0,
            dir.path(),
            "mixed",
        )
        .unwrap();
        assert_eq!(report.outputs, vec![dir.path().join("mixed-1.jpeg")]);
        assert_eq!(report.failed, vec![2]);
        assert!(report.warnings.iter().any(|w| w.starts_with("Page 2 skipped")));
    }

    #[test]
    fn test_empty_document_warns() {
        let doc = DocumentBuilder::new().build();
        assert_eq!(doc.page_count(), 0);
        let dir = tempfile::tempdir().unwrap();

        let report =
            convert_document(&doc, &renderer(), ImageFormat::Png, 72.0, dir.path(), "empty").unwrap();
        assert!(report.outputs.is_empty());
        assert_eq!(
            report.warnings,
            vec!["Document has no pages; no images were written".to_string()]
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_all_pages_failing_is_an_error() {
        let mut builder = DocumentBuilder::new();
        builder.page(b"/CS0 cs 1 scn 0 0 10 10 re f", device_n_resources());
        let doc = builder.build();
        let dir = tempfile::tempdir().unwrap();
        let error = convert_document(&doc, &renderer(), ImageFormat::Png, 9.0, dir.path(), "x")
            .unwrap_err();
        assert!(matches!(error, PdfError::UnsupportedColorSpace(_)));
    }
}
