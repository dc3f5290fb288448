//! Page rasterization
//!
//! Pages are drawn at a chosen resolution onto an RGB canvas with a white
//! background. Vector paths, clipping, images, form XObjects and text are
//! supported; shadings and soft masks in graphics states are skipped with a
//! warning. A page that needs a `DeviceN` colour space fails with
//! [`PdfError::UnsupportedColorSpace`].

pub mod canvas;
pub mod fonts;
mod interpreter;

use std::path::PathBuf;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::document::{Document, Page};
use crate::error::{PdfError, Result};
use crate::graphics::matrix::Matrix;
use crate::parallel::map_ordered;

pub use fonts::{default_font_dirs, FontLibrary};
use interpreter::PageRenderer;

/// Environment variable holding a path list of font directories.
pub const FONT_DIRS_ENV: &str = "PDFTOOL_FONT_DIRS";

/// Largest canvas, in pixels, a single page may allocate.
const MAX_PIXELS: usize = 1 << 28;

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg { quality: u8 },
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg { .. } => "jpeg",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg { quality: 90 }),
            other => Err(PdfError::InvalidParameter(format!(
                "unknown image format '{other}' (expected png, jpeg or jpg)"
            ))),
        }
    }
}

/// Rasterizer options
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Directories searched for substitute fonts.
    pub font_dirs: Vec<PathBuf>,
    pub jpeg_quality: u8,
    pub anti_alias: bool,
    /// Worker threads for multi-page rendering; `None` picks from the CPU count.
    pub threads: Option<usize>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            font_dirs: default_font_dirs(),
            jpeg_quality: 90,
            anti_alias: true,
            threads: None,
        }
    }
}

impl RenderOptions {
    /// Defaults, with font directories replaced by `PDFTOOL_FONT_DIRS` when set.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(value) = std::env::var_os(FONT_DIRS_ENV) {
            let dirs: Vec<PathBuf> = std::env::split_paths(&value)
                .filter(|dir| !dir.as_os_str().is_empty())
                .collect();
            if !dirs.is_empty() {
                tracing::debug!("Font directories from {FONT_DIRS_ENV}: {dirs:?}");
                options.font_dirs = dirs;
            }
        }
        options
    }
}

/// An RGB raster of one page.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB, 3 bytes per pixel.
    pub pixels: Vec<u8>,
    pub page: u32,
    pub dpi: f64,
}

impl RasterImage {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Some([
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        ])
    }

    pub fn encode(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let result = match format {
            ImageFormat::Png => PngEncoder::new(&mut out).write_image(
                &self.pixels,
                self.width,
                self.height,
                ExtendedColorType::Rgb8,
            ),
            ImageFormat::Jpeg { quality } => {
                JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).write_image(
                    &self.pixels,
                    self.width,
                    self.height,
                    ExtendedColorType::Rgb8,
                )
            }
        };
        result.map_err(|e| PdfError::Image(format!("page {}: {e}", self.page)))?;
        Ok(out)
    }
}

/// A rendered page and the fidelity warnings it produced.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: RasterImage,
    pub warnings: Vec<String>,
}

/// Page rasterizer
#[derive(Debug)]
pub struct Renderer {
    options: RenderOptions,
    library: FontLibrary,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self::with_options(RenderOptions::default())
    }

    pub fn with_options(options: RenderOptions) -> Self {
        let library = FontLibrary::new(options.font_dirs.clone());
        Self { options, library }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Renders one page. The raster measures the media box scaled by
    /// `dpi / 72`, with axes swapped for pages rotated by 90 or 270 degrees.
    pub fn render(&self, doc: &Document, page: &Page, dpi: f64) -> Result<RenderedPage> {
        if !dpi.is_finite() || dpi <= 0.0 {
            return Err(PdfError::InvalidParameter(format!(
                "DPI must be positive, got {dpi}"
            )));
        }

        let scale = dpi / 72.0;
        let media_box = page.media_box;
        let width = ((media_box.width() * scale).round() as usize).max(1);
        let height = ((media_box.height() * scale).round() as usize).max(1);
        let quarter_turn = matches!(page.rotate, 90 | 270);
        let (width, height) = if quarter_turn {
            (height, width)
        } else {
            (width, height)
        };
        if width.saturating_mul(height) > MAX_PIXELS {
            return Err(PdfError::InvalidParameter(format!(
                "page {} at {dpi} DPI needs a {width}x{height} raster, which is too large",
                page.number
            )));
        }

        let mut renderer = PageRenderer::new(
            doc,
            &self.library,
            self.options.anti_alias,
            page.number,
            width,
            height,
        );
        match doc.content_stream(page) {
            Ok(content) => {
                renderer.render(&content, doc.resources(page), device_matrix(page, scale))?
            }
            Err(e) => {
                let message = format!(
                    "Page {}: content stream could not be decoded, page left blank: {e}",
                    page.number
                );
                tracing::warn!("{message}");
                renderer.warnings.push(message);
            }
        }

        tracing::debug!(
            "Page {}: rendered {}x{} at {dpi} DPI, {} warnings",
            page.number,
            width,
            height,
            renderer.warnings.len()
        );
        Ok(RenderedPage {
            image: RasterImage {
                width: width as u32,
                height: height as u32,
                pixels: renderer.canvas.pixels,
                page: page.number,
                dpi,
            },
            warnings: renderer.warnings,
        })
    }

    /// Renders the given pages on worker threads, results in input order.
    pub fn render_pages(&self, doc: &Document, pages: &[u32], dpi: f64) -> Vec<Result<RenderedPage>> {
        map_ordered(pages, self.options.threads, |&number| {
            doc.page(number).and_then(|page| self.render(doc, page, dpi))
        })
    }
}

/// Maps default user space to pixel coordinates: y grows downwards and the
/// page's `/Rotate` turns the media box clockwise.
fn device_matrix(page: &Page, scale: f64) -> Matrix {
    let mb = page.media_box;
    let s = scale;
    match page.rotate {
        90 => Matrix::new(0.0, s, s, 0.0, -mb.y0 * s, -mb.x0 * s),
        180 => Matrix::new(-s, 0.0, 0.0, s, mb.x1 * s, -mb.y0 * s),
        270 => Matrix::new(0.0, -s, -s, 0.0, mb.y1 * s, mb.x1 * s),
        _ => Matrix::new(s, 0.0, 0.0, -s, -mb.x0 * s, mb.y1 * s),
    }
}
