//! Decoding of image XObjects and inline images to 8-bit samples.
//!
//! Samples are unpacked from 1/2/4/8/16 bits per component, the `/Decode`
//! array is applied and the result is normalized to the colour space's
//! default range, so `0` and `255` always mean the range ends (for indexed
//! spaces the samples are palette indices). Soft masks, stencil masks and
//! colour-key masks become an alpha plane.

use image::DynamicImage;

use super::color::ColorSpace;
use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, Stream};
use crate::parser::filters::{decode_with, Filter};

/// Refuse images larger than this many samples.
const MAX_SAMPLES: u64 = 1 << 28;

/// An image with its samples decoded.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpace,
    /// `color_space.components()` bytes per pixel, row-major, no padding.
    /// Empty for stencil masks.
    pub samples: Vec<u8>,
    pub bits_per_component: u8,
    /// Coverage per pixel from `/SMask`, `/Mask` or a stencil.
    pub alpha: Option<Vec<u8>>,
    /// `/ImageMask true`: paint the current fill colour through `alpha`.
    pub is_stencil: bool,
    /// The payload was JPEG-encoded in the file.
    pub was_jpeg: bool,
    /// The payload was shorter than its dimensions require and was padded.
    pub truncated: bool,
}

impl DecodedImage {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn components(&self) -> usize {
        self.color_space.components()
    }

    /// Interleaved RGB, three bytes per pixel.
    pub fn to_rgb(&self) -> Vec<u8> {
        let pixels = self.pixel_count();
        if self.is_stencil {
            return vec![0; pixels * 3];
        }
        let n = self.components();
        let mut out = Vec::with_capacity(pixels * 3);

        match &self.color_space {
            ColorSpace::DeviceGray | ColorSpace::CalGray | ColorSpace::ICCBased { components: 1 } => {
                for &v in &self.samples {
                    out.extend_from_slice(&[v, v, v]);
                }
            }
            ColorSpace::DeviceRGB | ColorSpace::CalRGB | ColorSpace::ICCBased { components: 3 } => {
                out.extend_from_slice(&self.samples);
            }
            ColorSpace::DeviceCMYK | ColorSpace::ICCBased { components: 4 } => {
                for px in self.samples.chunks_exact(4) {
                    let k = 255 - u16::from(px[3]);
                    let channel = |c: u8| ((255 - u16::from(c)) * k / 255) as u8;
                    out.extend_from_slice(&[channel(px[0]), channel(px[1]), channel(px[2])]);
                }
            }
            indexed @ ColorSpace::Indexed { .. } => {
                let palette = indexed.palette().unwrap_or_default();
                for &index in &self.samples {
                    out.extend_from_slice(
                        palette.get(usize::from(index)).unwrap_or(&[0, 0, 0]),
                    );
                }
            }
            space => {
                let ranges = space.default_decode(8);
                let mut comps = vec![0.0; n];
                for px in self.samples.chunks_exact(n) {
                    for (k, (&s, &(lo, hi))) in px.iter().zip(&ranges).enumerate() {
                        comps[k] = lo + f64::from(s) / 255.0 * (hi - lo);
                    }
                    out.extend_from_slice(&space.to_color(&comps).to_rgb8());
                }
            }
        }
        out.resize(pixels * 3, 0);
        out
    }
}

/// Decodes an image XObject.
pub fn decode_image(
    doc: &Document,
    stream: &Stream,
    resources: Option<&Dictionary>,
) -> Result<DecodedImage> {
    decode(doc, &stream.dict, &stream.data, resources, true)
}

/// Decodes an inline image (`BI ... ID ... EI`), expanding abbreviated keys.
pub fn decode_inline_image(
    doc: &Document,
    dict: &Dictionary,
    data: &[u8],
    resources: Option<&Dictionary>,
) -> Result<DecodedImage> {
    decode(doc, &expand_inline_dict(dict), data, resources, false)
}

/// Replaces inline-image abbreviations with the full key and value names.
pub fn expand_inline_dict(dict: &Dictionary) -> Dictionary {
    dict.iter()
        .map(|(key, value)| {
            let key = match key.as_str() {
                "BPC" => "BitsPerComponent",
                "CS" => "ColorSpace",
                "D" => "Decode",
                "DP" => "DecodeParms",
                "F" => "Filter",
                "H" => "Height",
                "W" => "Width",
                "IM" => "ImageMask",
                "I" => "Interpolate",
                "L" => "Length",
                other => other,
            };
            let value = match key {
                "ColorSpace" => expand_value(value, color_space_name),
                "Filter" => expand_value(value, filter_name),
                _ => value.clone(),
            };
            (key.to_string(), value)
        })
        .collect()
}

fn expand_value(value: &Object, expand: fn(&str) -> Option<&'static str>) -> Object {
    match value {
        Object::Name(name) => Object::name(expand(name).unwrap_or(name)),
        Object::Array(items) => Object::Array(
            items
                .iter()
                .map(|item| match item {
                    Object::Name(name) => Object::name(expand(name).unwrap_or(name)),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn color_space_name(name: &str) -> Option<&'static str> {
    match name {
        "G" => Some("DeviceGray"),
        "RGB" => Some("DeviceRGB"),
        "CMYK" => Some("DeviceCMYK"),
        "I" => Some("Indexed"),
        _ => None,
    }
}

fn filter_name(name: &str) -> Option<&'static str> {
    Filter::from_name(name).map(|f| f.name())
}

fn decode(
    doc: &Document,
    dict: &Dictionary,
    data: &[u8],
    resources: Option<&Dictionary>,
    follow_masks: bool,
) -> Result<DecodedImage> {
    let int = |key: &str| doc.dict_get(dict, key).and_then(Object::as_integer);
    let width = int("Width").filter(|w| *w > 0).ok_or_else(|| {
        PdfError::Image("image has no valid /Width".to_string())
    })?;
    let height = int("Height").filter(|h| *h > 0).ok_or_else(|| {
        PdfError::Image("image has no valid /Height".to_string())
    })?;
    let (width, height) = (
        u32::try_from(width).map_err(|_| PdfError::Image("image too wide".to_string()))?,
        u32::try_from(height).map_err(|_| PdfError::Image("image too tall".to_string()))?,
    );
    let is_stencil = doc
        .dict_get(dict, "ImageMask")
        .and_then(Object::as_bool)
        .unwrap_or(false);

    let color_space = if is_stencil {
        ColorSpace::DeviceGray
    } else {
        match doc.dict_get(dict, "ColorSpace") {
            Some(space) => ColorSpace::from_object(doc, space, resources)?,
            None => ColorSpace::DeviceGray,
        }
    };
    let components = color_space.components();
    if u64::from(width) * u64::from(height) * components as u64 > MAX_SAMPLES {
        return Err(PdfError::Image(format!(
            "{width}x{height} image exceeds the sample limit"
        )));
    }

    let stream = Stream::new(dict.clone(), Vec::new());
    let decoded = decode_with(data, &stream.filters(), &stream.decode_params())?;

    let mut image = match decoded.image_codec {
        Some((Filter::DCTDecode, _)) => {
            decode_jpeg(&decoded.data, width, height, color_space, is_stencil)?
        }
        Some((filter, _)) => {
            return Err(PdfError::Image(format!(
                "{} images are not supported",
                filter.name()
            )))
        }
        None => {
            let bpc = if is_stencil {
                1
            } else {
                int("BitsPerComponent").unwrap_or(8)
            };
            let bpc = match bpc {
                1 | 2 | 4 | 8 | 16 => bpc as u8,
                other => {
                    return Err(PdfError::Image(format!(
                        "unsupported bit depth {other}"
                    )))
                }
            };
            let decode_array = doc
                .dict_get(dict, "Decode")
                .and_then(Object::as_number_array);
            decode_raw(
                &decoded.data,
                width,
                height,
                bpc,
                color_space,
                decode_array.as_deref(),
                is_stencil,
                color_key(doc, dict),
            )
        }
    };

    if follow_masks && !is_stencil {
        apply_masks(doc, dict, &mut image, resources);
    }
    Ok(image)
}

fn decode_jpeg(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: ColorSpace,
    is_stencil: bool,
) -> Result<DecodedImage> {
    let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| PdfError::Image(format!("JPEG decode failed: {e}")))?;
    let decoded = if decoded.width() != width || decoded.height() != height {
        decoded.resize_exact(width, height, image::imageops::FilterType::Nearest)
    } else {
        decoded
    };

    let (color_space, samples) = match (decoded.color().channel_count(), &color_space) {
        (1, space) if space.components() == 1 => (color_space.clone(), decoded.to_luma8().into_raw()),
        (1, _) => (ColorSpace::DeviceGray, decoded.to_luma8().into_raw()),
        (_, space) if space.components() == 3 && !space.is_indexed() => {
            (color_space.clone(), decoded.to_rgb8().into_raw())
        }
        // CMYK JPEGs come back converted to RGB.
        _ => (ColorSpace::DeviceRGB, DynamicImage::to_rgb8(&decoded).into_raw()),
    };

    Ok(DecodedImage {
        width,
        height,
        color_space,
        samples,
        bits_per_component: 8,
        alpha: None,
        is_stencil,
        was_jpeg: true,
        truncated: false,
    })
}

/// Colour-key mask from a `/Mask` array, in raw sample values.
fn color_key(doc: &Document, dict: &Dictionary) -> Option<Vec<(u32, u32)>> {
    let ranges = doc.dict_get(dict, "Mask")?.as_array()?;
    let values: Vec<u32> = ranges
        .iter()
        .filter_map(|v| doc.resolve(v).as_integer())
        .map(|v| v.max(0) as u32)
        .collect();
    Some(values.chunks_exact(2).map(|c| (c[0], c[1])).collect())
}

#[allow(clippy::too_many_arguments)]
fn decode_raw(
    data: &[u8],
    width: u32,
    height: u32,
    bpc: u8,
    color_space: ColorSpace,
    decode_array: Option<&[f64]>,
    is_stencil: bool,
    color_key: Option<Vec<(u32, u32)>>,
) -> DecodedImage {
    let n = color_space.components();
    let (w, h) = (width as usize, height as usize);
    let row_bytes = (w * n * usize::from(bpc)).div_ceil(8);
    let needed = row_bytes * h;
    let truncated = data.len() < needed;

    let max_raw = (1u32 << bpc) - 1;
    let luts = sample_tables(&color_space, bpc, decode_array, is_stencil);

    let pixels = w * h;
    let mut samples = Vec::with_capacity(if is_stencil { 0 } else { pixels * n });
    let mut alpha = (is_stencil || color_key.is_some()).then(|| Vec::with_capacity(pixels));

    for row in 0..h {
        let start = row * row_bytes;
        let line = data.get(start..(start + row_bytes).min(data.len())).unwrap_or(&[]);
        let mut reader = BitReader::new(line, bpc);
        for _ in 0..w {
            let mut keyed = color_key.is_some();
            for k in 0..n {
                let raw = reader.next().min(max_raw);
                if let Some(ranges) = &color_key {
                    keyed &= ranges.get(k).is_some_and(|(lo, hi)| (*lo..=*hi).contains(&raw));
                }
                let value = luts[k.min(luts.len() - 1)].map(raw);
                if is_stencil {
                    if let Some(alpha) = alpha.as_mut() {
                        alpha.push(value);
                    }
                } else {
                    samples.push(value);
                }
            }
            if !is_stencil {
                if let Some(alpha) = alpha.as_mut() {
                    alpha.push(if keyed { 0 } else { 255 });
                }
            }
        }
    }

    DecodedImage {
        width,
        height,
        color_space,
        samples,
        bits_per_component: bpc,
        alpha,
        is_stencil,
        was_jpeg: false,
        truncated,
    }
}

/// Maps raw component values to output bytes.
enum SampleTable {
    Table(Vec<u8>),
    /// 16-bit samples are mapped through their high byte.
    Wide(Vec<u8>),
}

impl SampleTable {
    fn map(&self, raw: u32) -> u8 {
        match self {
            SampleTable::Table(table) => table.get(raw as usize).copied().unwrap_or(0),
            SampleTable::Wide(table) => table.get((raw >> 8) as usize).copied().unwrap_or(0),
        }
    }
}

fn sample_tables(
    color_space: &ColorSpace,
    bpc: u8,
    decode_array: Option<&[f64]>,
    is_stencil: bool,
) -> Vec<SampleTable> {
    let (levels, wide) = if bpc == 16 { (256u32, true) } else { (1u32 << bpc, false) };
    let max = f64::from(levels - 1);

    // Stencils: 0 paints unless the decode array is inverted.
    if is_stencil {
        let inverted = decode_array.is_some_and(|d| d.first().copied() == Some(1.0));
        let table = (0..levels)
            .map(|raw| if (raw == 0) != inverted { 255 } else { 0 })
            .collect();
        return vec![SampleTable::Table(table)];
    }

    let defaults = color_space.default_decode(bpc.min(8));
    defaults
        .iter()
        .enumerate()
        .map(|(k, &(def_lo, def_hi))| {
            let (lo, hi) = match decode_array {
                Some(d) if d.len() >= 2 * (k + 1) => (d[2 * k], d[2 * k + 1]),
                _ => (def_lo, def_hi),
            };
            let table = (0..levels)
                .map(|raw| {
                    let value = lo + f64::from(raw) * (hi - lo) / max;
                    if color_space.is_indexed() {
                        value.round().clamp(0.0, 255.0) as u8
                    } else {
                        let span = def_hi - def_lo;
                        let unit = if span.abs() < f64::EPSILON {
                            0.0
                        } else {
                            (value - def_lo) / span
                        };
                        (unit.clamp(0.0, 1.0) * 255.0).round() as u8
                    }
                })
                .collect();
            if wide {
                SampleTable::Wide(table)
            } else {
                SampleTable::Table(table)
            }
        })
        .collect()
}

struct BitReader<'a> {
    data: &'a [u8],
    bpc: u8,
    bit: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8], bpc: u8) -> Self {
        Self { data, bpc, bit: 0 }
    }

    /// Next sample, zero past the end of the row.
    fn next(&mut self) -> u32 {
        let byte = self.bit / 8;
        let value = match self.bpc {
            8 => self.data.get(byte).map_or(0, |&b| u32::from(b)),
            16 => {
                let hi = self.data.get(byte).map_or(0, |&b| u32::from(b));
                let lo = self.data.get(byte + 1).map_or(0, |&b| u32::from(b));
                (hi << 8) | lo
            }
            bits => {
                let shift = 8 - (self.bit % 8) as u8 - bits;
                let mask = (1u8 << bits) - 1;
                self.data
                    .get(byte)
                    .map_or(0, |&b| u32::from((b >> shift) & mask))
            }
        };
        self.bit += usize::from(self.bpc);
        value
    }
}

/// Attaches `/SMask` or a stencil `/Mask` as alpha, scaled to the image size.
fn apply_masks(doc: &Document, dict: &Dictionary, image: &mut DecodedImage, resources: Option<&Dictionary>) {
    let mask = ["SMask", "Mask"].iter().find_map(|key| {
        let stream = doc.dict_get(dict, key)?.as_stream()?;
        match decode(doc, &stream.dict, &stream.data, resources, false) {
            Ok(mask) => Some(mask),
            Err(err) => {
                doc.warn(format!("Ignoring unreadable /{key}: {err}"));
                None
            }
        }
    });
    let Some(mask) = mask else {
        return;
    };

    let coverage = if mask.is_stencil {
        mask.alpha.clone().unwrap_or_default()
    } else {
        // Soft masks are gray levels; other spaces use their first channel.
        let n = mask.components().max(1);
        mask.samples.iter().step_by(n).copied().collect()
    };
    let scaled = resample_plane(&coverage, mask.width, mask.height, image.width, image.height);
    image.alpha = Some(match image.alpha.take() {
        Some(existing) => existing
            .iter()
            .zip(&scaled)
            .map(|(a, b)| ((u16::from(*a) * u16::from(*b)) / 255) as u8)
            .collect(),
        None => scaled,
    });
}

/// Nearest-neighbour resampling of a single-channel plane.
pub fn resample_plane(plane: &[u8], width: u32, height: u32, to_width: u32, to_height: u32) -> Vec<u8> {
    if width == to_width && height == to_height {
        let mut plane = plane.to_vec();
        plane.resize(to_width as usize * to_height as usize, 255);
        return plane;
    }
    let mut out = Vec::with_capacity(to_width as usize * to_height as usize);
    for y in 0..to_height as u64 {
        let sy = (y * u64::from(height) / u64::from(to_height.max(1))) as usize;
        for x in 0..to_width as u64 {
            let sx = (x * u64::from(width) / u64::from(to_width.max(1))) as usize;
            out.push(plane.get(sy * width as usize + sx).copied().unwrap_or(255));
        }
    }
    out
}
