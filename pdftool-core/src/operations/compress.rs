//! Stream recompression
//!
//! Images are decoded, downsampled to the profile's target resolution when
//! they are displayed larger than needed, and re-encoded. Other streams that
//! carry no real compression are deflated. A stream is only replaced when
//! the new encoding is strictly smaller than the current one.

use std::collections::{HashMap, HashSet};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{resize, FilterType};
use image::{ExtendedColorType, GrayImage, ImageEncoder};

use super::CompressionProfile;
use crate::compression::{compress, compress_with_png_predictor};
use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::graphics::color::ColorSpace;
use crate::graphics::image::{decode_image, DecodedImage};
use crate::graphics::matrix::Matrix;
use crate::objects::{Dictionary, Object, ObjectId, Stream};
use crate::parser::content::{ContentOperation, ContentParser};
use crate::parser::filters::{decode_stream, Filter};

/// Nesting limit for form XObjects while measuring placements.
const MAX_FORM_DEPTH: usize = 16;

/// Numeric policy behind a [`CompressionProfile`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionSettings {
    /// Resolution images are downsampled to.
    pub target_dpi: f64,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Downsample only above `target_dpi * downsample_threshold`.
    pub downsample_threshold: f64,
    /// Flate-encode streams without real compression.
    pub deflate_streams: bool,
    /// Allow JPEG for images that were stored losslessly.
    pub lossy_for_lossless: bool,
}

/// Outcome of a compression pass.
#[derive(Debug, Clone, Default)]
pub struct CompressionReport {
    pub images_seen: usize,
    pub images_recompressed: usize,
    pub images_downsampled: usize,
    pub streams_deflated: usize,
    /// Total stream payload before and after, in bytes.
    pub bytes_before: usize,
    pub bytes_after: usize,
    pub warnings: Vec<String>,
}

impl CompressionReport {
    pub fn bytes_saved(&self) -> usize {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Recompresses the streams of a document in place.
#[derive(Debug, Clone)]
pub struct StreamCompressor {
    settings: CompressionSettings,
}

impl StreamCompressor {
    pub fn new(profile: CompressionProfile) -> Self {
        Self::with_settings(profile.settings())
    }

    pub fn with_settings(settings: CompressionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    pub fn compress(&self, doc: &mut Document) -> Result<CompressionReport> {
        let placements = measure_placements(doc);
        let mut report = CompressionReport::default();

        let ids: Vec<ObjectId> = doc.object_ids().collect();
        let mut soft_masks = HashSet::new();
        for id in &ids {
            if let Some(stream) = doc.get_stream(*id) {
                if let Some(mask) = stream.dict.get_reference("SMask") {
                    soft_masks.insert(mask);
                }
            }
        }

        for id in ids {
            let Some(stream) = doc.get_stream(id) else {
                continue;
            };
            let before = stream.data.len();
            report.bytes_before += before;

            let replacement = if stream.dict.get_name("Subtype") == Some("Image") {
                self.image(doc, id, stream, &placements, soft_masks.contains(&id), &mut report)
            } else {
                self.deflate(stream, &mut report)
            };

            match replacement {
                Some(stream) => {
                    report.bytes_after += stream.data.len();
                    doc.set_object(id, Object::Stream(stream));
                }
                None => report.bytes_after += before,
            }
        }

        for warning in &report.warnings {
            tracing::warn!("{warning}");
        }
        tracing::info!(
            "Recompressed {} of {} images ({} downsampled), deflated {} streams, {} -> {} bytes",
            report.images_recompressed,
            report.images_seen,
            report.images_downsampled,
            report.streams_deflated,
            report.bytes_before,
            report.bytes_after
        );
        Ok(report)
    }

    /// Flate for streams stored raw or with non-compressing filters only.
    fn deflate(&self, stream: &Stream, report: &mut CompressionReport) -> Option<Stream> {
        if !self.settings.deflate_streams
            || matches!(stream.dict.get_name("Type"), Some("XRef" | "ObjStm" | "Metadata"))
        {
            return None;
        }
        let filters = stream.filters();
        let recompressible = filters.iter().all(|name| {
            matches!(
                Filter::from_name(name),
                Some(
                    Filter::ASCIIHexDecode
                        | Filter::ASCII85Decode
                        | Filter::RunLengthDecode
                        | Filter::LZWDecode
                )
            )
        });
        if !recompressible {
            return None;
        }

        let decoded = match decode_stream(stream) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!("Stream left as is, it does not decode: {e}");
                return None;
            }
        };
        let encoded = compress(&decoded).ok()?;
        if encoded.len() >= stream.data.len() {
            return None;
        }
        let mut replacement = stream.clone();
        replacement.set_encoded(encoded, Some("FlateDecode"));
        report.streams_deflated += 1;
        Some(replacement)
    }

    fn image(
        &self,
        doc: &Document,
        id: ObjectId,
        stream: &Stream,
        placements: &HashMap<ObjectId, (f64, f64)>,
        is_soft_mask: bool,
        report: &mut CompressionReport,
    ) -> Option<Stream> {
        report.images_seen += 1;
        if stream.dict.get("ImageMask").and_then(Object::as_bool) == Some(true) {
            return None;
        }
        if doc
            .dict_get(&stream.dict, "Mask")
            .is_some_and(|mask| mask.as_array().is_some())
        {
            tracing::debug!("Image {id} has a colour-key mask, left as is");
            return None;
        }

        let image = match decode_image(doc, stream, None) {
            Ok(image) => image,
            Err(e) => {
                report
                    .warnings
                    .push(format!("Image {id} left unchanged: {e}"));
                return None;
            }
        };
        if image.truncated {
            report.warnings.push(format!(
                "Image {id} left unchanged: data is shorter than its dimensions"
            ));
            return None;
        }

        let indexed = image.color_space.is_indexed();
        let (mut width, mut height) = (image.width, image.height);
        let mut samples = image.samples.clone();
        if !indexed && !is_soft_mask {
            if let Some((w, h)) = placements
                .get(&id)
                .and_then(|&(w, h)| self.downsampled_size(&image, w, h))
            {
                samples = resample(&samples, image.components(), width, height, w, h);
                width = w;
                height = h;
            }
        }
        let downsampled = (width, height) != (image.width, image.height);

        let components = image.components();
        let jpeg_space = matches!(
            image.color_space,
            ColorSpace::DeviceGray
                | ColorSpace::DeviceRGB
                | ColorSpace::ICCBased { components: 1 | 3 }
        );
        let use_jpeg = jpeg_space
            && !indexed
            && !is_soft_mask
            && (image.was_jpeg || self.settings.lossy_for_lossless);

        let (data, filter, params) = if use_jpeg {
            match encode_jpeg(&samples, width, height, components, self.settings.jpeg_quality) {
                Ok(data) => (data, "DCTDecode", None),
                Err(e) => {
                    report.warnings.push(format!("Image {id} left unchanged: {e}"));
                    return None;
                }
            }
        } else {
            let data = match compress_with_png_predictor(&samples, components, width as usize) {
                Ok(data) => data,
                Err(e) => {
                    report.warnings.push(format!("Image {id} left unchanged: {e}"));
                    return None;
                }
            };
            let mut params = Dictionary::new();
            params.set("Predictor", 15);
            params.set("Colors", components);
            params.set("Columns", width);
            params.set("BitsPerComponent", 8);
            (data, "FlateDecode", Some(params))
        };

        if data.len() >= stream.data.len() {
            return None;
        }

        let mut replacement = stream.clone();
        replacement.set_encoded(data, Some(filter));
        if let Some(params) = params {
            replacement.dict.set("DecodeParms", params);
        }
        replacement.dict.set("Width", width);
        replacement.dict.set("Height", height);
        replacement.dict.set("BitsPerComponent", 8);
        // Samples are already mapped through /Decode.
        replacement.dict.remove("Decode");
        if let Some(space) = replaced_color_space(doc, stream, &image) {
            replacement.dict.set("ColorSpace", space);
        }

        report.images_recompressed += 1;
        if downsampled {
            report.images_downsampled += 1;
        }
        tracing::debug!(
            "Image {id}: {}x{} -> {}x{} {filter}, {} -> {} bytes",
            image.width,
            image.height,
            width,
            height,
            stream.data.len(),
            replacement.data.len()
        );
        Some(replacement)
    }

    /// New dimensions when the image is shown at more than the threshold
    /// resolution. `shown` sizes are in points.
    fn downsampled_size(&self, image: &DecodedImage, shown_w: f64, shown_h: f64) -> Option<(u32, u32)> {
        if shown_w <= 0.0 || shown_h <= 0.0 {
            return None;
        }
        let dpi_x = f64::from(image.width) * 72.0 / shown_w;
        let dpi_y = f64::from(image.height) * 72.0 / shown_h;
        let effective = dpi_x.min(dpi_y);
        if effective <= self.settings.target_dpi * self.settings.downsample_threshold {
            return None;
        }
        let factor = self.settings.target_dpi / effective;
        let width = ((f64::from(image.width) * factor).round() as u32).max(1);
        let height = ((f64::from(image.height) * factor).round() as u32).max(1);
        (width < image.width && height < image.height).then_some((width, height))
    }
}

/// A new `/ColorSpace` when decoding changed the sample layout, as for CMYK
/// JPEG data that decodes to RGB.
fn replaced_color_space(doc: &Document, stream: &Stream, image: &DecodedImage) -> Option<Object> {
    let declared = doc
        .dict_get(&stream.dict, "ColorSpace")
        .and_then(|space| ColorSpace::from_object(doc, space, None).ok())?;
    if declared.components() == image.components() {
        return None;
    }
    match image.color_space {
        ColorSpace::DeviceGray => Some(Object::name("DeviceGray")),
        ColorSpace::DeviceRGB => Some(Object::name("DeviceRGB")),
        ColorSpace::DeviceCMYK => Some(Object::name("DeviceCMYK")),
        _ => None,
    }
}

fn encode_jpeg(samples: &[u8], width: u32, height: u32, components: usize, quality: u8) -> Result<Vec<u8>> {
    let color = match components {
        1 => ExtendedColorType::L8,
        3 => ExtendedColorType::Rgb8,
        n => {
            return Err(PdfError::Image(format!(
                "{n}-component images cannot be JPEG encoded"
            )))
        }
    };
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .write_image(samples, width, height, color)
        .map_err(|e| PdfError::Image(e.to_string()))?;
    Ok(out)
}

/// Resizes interleaved 8-bit samples one channel at a time.
fn resample(samples: &[u8], components: usize, width: u32, height: u32, to_w: u32, to_h: u32) -> Vec<u8> {
    let pixels = width as usize * height as usize;
    let mut out = vec![0u8; to_w as usize * to_h as usize * components];
    for channel in 0..components {
        let plane: Vec<u8> = (0..pixels)
            .map(|i| samples.get(i * components + channel).copied().unwrap_or(0))
            .collect();
        let Some(plane) = GrayImage::from_raw(width, height, plane) else {
            continue;
        };
        let resized = resize(&plane, to_w, to_h, FilterType::Triangle);
        for (i, value) in resized.into_raw().into_iter().enumerate() {
            out[i * components + channel] = value;
        }
    }
    out
}

/// Largest displayed size, in points, of every image XObject drawn by the
/// pages, directly or through form XObjects.
fn measure_placements(doc: &Document) -> HashMap<ObjectId, (f64, f64)> {
    let mut placements = HashMap::new();
    for page in doc.pages() {
        match doc.content_stream(page) {
            Ok(content) => {
                let mut forms = Vec::new();
                walk_placements(
                    doc,
                    &content,
                    doc.resources(page),
                    Matrix::IDENTITY,
                    &mut forms,
                    &mut placements,
                );
            }
            Err(e) => tracing::debug!("Page {}: placements not measured: {e}", page.number),
        }
    }
    placements
}

fn walk_placements(
    doc: &Document,
    content: &[u8],
    resources: &Dictionary,
    base: Matrix,
    forms: &mut Vec<ObjectId>,
    placements: &mut HashMap<ObjectId, (f64, f64)>,
) {
    let (operations, _) = ContentParser::parse_partial(content);
    let mut ctm = base;
    let mut saved = Vec::new();

    for operation in operations {
        match operation {
            ContentOperation::SaveGraphicsState => saved.push(ctm),
            ContentOperation::RestoreGraphicsState => ctm = saved.pop().unwrap_or(base),
            ContentOperation::Transform(m) => ctm = Matrix::from_array(m).then(&ctm),
            ContentOperation::PaintXObject(name) => {
                let Some(id) = doc
                    .dict_get(resources, "XObject")
                    .and_then(|x| doc.resolve_dict(x))
                    .and_then(|x| x.get(&name))
                    .and_then(Object::as_reference)
                else {
                    continue;
                };
                let Some(stream) = doc.get_stream(id) else {
                    continue;
                };
                match stream.dict.get_name("Subtype") {
                    Some("Image") => {
                        let (a, b) = ctm.apply_vector(1.0, 0.0);
                        let (c, d) = ctm.apply_vector(0.0, 1.0);
                        let shown = (a.hypot(b), c.hypot(d));
                        let entry = placements.entry(id).or_insert((0.0, 0.0));
                        if shown.0 * shown.1 > entry.0 * entry.1 {
                            *entry = shown;
                        }
                    }
                    Some("Form") if forms.len() < MAX_FORM_DEPTH && !forms.contains(&id) => {
                        let Ok(form_content) = decode_stream(stream) else {
                            continue;
                        };
                        let matrix = doc
                            .dict_get(&stream.dict, "Matrix")
                            .and_then(Object::as_number_array)
                            .and_then(|m| Matrix::from_slice(&m))
                            .unwrap_or_default();
                        let form_resources = doc
                            .dict_get(&stream.dict, "Resources")
                            .and_then(|r| doc.resolve_dict(r))
                            .unwrap_or(resources);
                        forms.push(id);
                        walk_placements(
                            doc,
                            &form_content,
                            form_resources,
                            matrix.then(&ctm),
                            forms,
                            placements,
                        );
                        forms.pop();
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dict, DocumentBuilder};

    /// A page showing a `size` x `size` RGB gradient at `shown` points.
    fn image_document(size: u32, shown: f64) -> (Document, ObjectId) {
        let mut samples = Vec::with_capacity((size * size * 3) as usize);
        for y in 0..size {
            for x in 0..size {
                samples.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
            }
        }
        let mut builder = DocumentBuilder::new();
        let image = builder.add(Stream::new(
            dict([
                ("Type", Object::name("XObject")),
                ("Subtype", Object::name("Image")),
                ("Width", size.into()),
                ("Height", size.into()),
                ("ColorSpace", Object::name("DeviceRGB")),
                ("BitsPerComponent", 8.into()),
            ]),
            samples,
        ));
        let resources = dict([(
            "XObject",
            Object::Dictionary(dict([("Im0", Object::Reference(image))])),
        )]);
        let content = format!("q {shown} 0 0 {shown} 0 0 cm /Im0 Do Q");
        builder.page(content.as_bytes(), resources);
        (builder.build(), image)
    }

    #[test]
    fn test_profiles_are_monotonic() {
        let profiles = [
            CompressionProfile::Screen,
            CompressionProfile::Ebook,
            CompressionProfile::Printer,
            CompressionProfile::Prepress,
        ];
        for pair in profiles.windows(2) {
            let (low, high) = (pair[0].settings(), pair[1].settings());
            assert!(low.target_dpi <= high.target_dpi);
            assert!(low.jpeg_quality < high.jpeg_quality);
        }
    }

    #[test]
    fn test_placement_measured_through_ctm() {
        let (doc, image) = image_document(8, 144.0);
        let placements = measure_placements(&doc);
        let (w, h) = placements[&image];
        assert!((w - 144.0).abs() < 1e-9 && (h - 144.0).abs() < 1e-9);
    }

    #[test]
    fn test_large_image_downsampled_and_jpeg_encoded() {
        // 600 px shown on 72 pt is 600 DPI, well above the screen target.
        let (mut doc, image) = image_document(600, 72.0);
        let before = doc.get_stream(image).unwrap().data.len();
        let report = StreamCompressor::new(CompressionProfile::Screen)
            .compress(&mut doc)
            .unwrap();

        assert_eq!(report.images_seen, 1);
        assert_eq!(report.images_recompressed, 1);
        assert_eq!(report.images_downsampled, 1);
        let stream = doc.get_stream(image).unwrap();
        assert_eq!(stream.dict.get_integer("Width"), Some(72));
        assert_eq!(stream.dict.get_name("Filter"), Some("DCTDecode"));
        assert_eq!(stream.dict.get_name("ColorSpace"), Some("DeviceRGB"));
        assert!(stream.data.len() < before);
        assert!(report.bytes_after < report.bytes_before);
    }

    #[test]
    fn test_printer_profile_keeps_lossless_images_lossless() {
        let (mut doc, image) = image_document(64, 64.0);
        StreamCompressor::new(CompressionProfile::Printer)
            .compress(&mut doc)
            .unwrap();
        let stream = doc.get_stream(image).unwrap();
        assert_eq!(stream.dict.get_name("Filter"), Some("FlateDecode"));
        assert_eq!(stream.dict.get_integer("Width"), Some(64));
    }

    #[test]
    fn test_never_replaces_with_larger_encoding() {
        let mut builder = DocumentBuilder::new();
        // Already compact Flate data: nothing should touch it.
        let payload = compress(&[7u8; 4096]).unwrap();
        let id = builder.add(Stream::new(
            dict([("Filter", Object::name("FlateDecode"))]),
            payload.clone(),
        ));
        builder.page(b"", Dictionary::new());
        let mut doc = builder.build();
        StreamCompressor::new(CompressionProfile::Screen)
            .compress(&mut doc)
            .unwrap();
        assert_eq!(doc.get_stream(id).unwrap().data, payload);
    }

    #[test]
    fn test_raw_content_streams_deflated() {
        let content = b"0 0 m 100 100 l S ".repeat(200);
        let mut builder = DocumentBuilder::new();
        let page = builder.page(&content, Dictionary::new());
        let mut doc = builder.build();
        let report = StreamCompressor::new(CompressionProfile::Ebook)
            .compress(&mut doc)
            .unwrap();
        assert!(report.streams_deflated >= 1);

        let contents = doc.get_dict(page).unwrap().get_reference("Contents").unwrap();
        let stream = doc.get_stream(contents).unwrap();
        assert_eq!(stream.dict.get_name("Filter"), Some("FlateDecode"));
        assert_eq!(decode_stream(stream).unwrap(), content);
    }

    #[test]
    fn test_undecodable_image_is_a_warning() {
        let mut builder = DocumentBuilder::new();
        let id = builder.add(Stream::new(
            dict([
                ("Subtype", Object::name("Image")),
                ("Width", 10.into()),
                ("Height", 10.into()),
                ("ColorSpace", Object::name("DeviceGray")),
                ("BitsPerComponent", 8.into()),
                ("Filter", Object::name("JBIG2Decode")),
            ]),
            vec![1, 2, 3],
        ));
        builder.page(b"", Dictionary::new());
        let mut doc = builder.build();
        let report = StreamCompressor::new(CompressionProfile::Screen)
            .compress(&mut doc)
            .unwrap();
        assert_eq!(report.images_recompressed, 0);
        assert!(report.warnings.iter().any(|w| w.contains(&id.to_string())));
        assert_eq!(doc.get_stream(id).unwrap().data, vec![1, 2, 3]);
    }

    #[test]
    fn test_decode_array_dropped_after_reencoding() {
        let mut builder = DocumentBuilder::new();
        let id = builder.add(Stream::new(
            dict([
                ("Subtype", Object::name("Image")),
                ("Width", 64.into()),
                ("Height", 64.into()),
                ("ColorSpace", Object::name("DeviceGray")),
                ("BitsPerComponent", 8.into()),
                (
                    "Decode",
                    Object::Array(vec![1.into(), 0.into()]),
                ),
            ]),
            vec![0; 64 * 64],
        ));
        builder.page(b"", Dictionary::new());
        let mut doc = builder.build();
        StreamCompressor::new(CompressionProfile::Prepress)
            .compress(&mut doc)
            .unwrap();
        let stream = doc.get_stream(id).unwrap();
        assert!(!stream.dict.contains_key("Decode"));
        // Inverted by /Decode, so the stored samples are now white.
        let image = decode_image(&doc, stream, None).unwrap();
        assert!(image.samples.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_resample_per_channel() {
        let samples = [10, 20, 30].repeat(16);
        let out = resample(&samples, 3, 4, 4, 2, 2);
        assert_eq!(out, [10, 20, 30].repeat(4));
    }
}
