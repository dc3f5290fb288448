//! Integration tests for stream recompression

mod common;

use common::{dict, gradient_image, Fixture};
use pdftool::writer::WriterConfig;
use pdftool::{CompressionProfile, Document, Object, PdfWriter, StreamCompressor};

fn image_document(pixels: u32) -> Vec<u8> {
    let mut fixture = Fixture::new();
    let image = fixture.add(gradient_image(pixels, pixels));
    let resources = dict([(
        "XObject",
        Object::Dictionary(dict([("Im0", Object::Reference(image))])),
    )]);
    fixture.page(b"q 144 0 0 144 72 72 cm /Im0 Do Q", resources);
    fixture.to_bytes()
}

fn compress_bytes(bytes: &[u8], profile: CompressionProfile) -> Vec<u8> {
    let mut doc = Document::load(bytes.to_vec()).unwrap();
    StreamCompressor::new(profile).compress(&mut doc).unwrap();
    PdfWriter::with_config(WriterConfig {
        xref_stream: true,
        compress_new_streams: true,
    })
    .write_document(&doc)
    .unwrap()
}

#[test]
fn test_screen_profile_shrinks_large_image() {
    let original = image_document(600);
    let compressed = compress_bytes(&original, CompressionProfile::Screen);
    assert!(compressed.len() < original.len());

    let doc = Document::load(compressed).unwrap();
    let image = doc
        .object_ids()
        .filter_map(|id| doc.get_stream(id))
        .find(|s| s.dict.get_name("Subtype") == Some("Image"))
        .unwrap();
    // 2 inches at 72 DPI.
    assert_eq!(image.dict.get_integer("Width"), Some(144));
    assert_eq!(image.filters(), vec!["DCTDecode".to_string()]);
}

#[test]
fn test_profiles_order_output_size() {
    let original = image_document(400);
    let screen = compress_bytes(&original, CompressionProfile::Screen).len();
    let prepress = compress_bytes(&original, CompressionProfile::Prepress).len();
    assert!(screen <= prepress);
}

#[test]
fn test_second_pass_is_stable() {
    let original = image_document(300);
    let once = compress_bytes(&original, CompressionProfile::Ebook);
    let twice = compress_bytes(&once, CompressionProfile::Ebook);
    // Only trailer dates and identifiers may differ.
    let tolerance = once.len() / 100 + 64;
    assert!(twice.len() <= once.len() + tolerance);
}

#[test]
fn test_pages_and_text_survive() {
    let mut fixture = common::numbered(2);
    let image = fixture.add(gradient_image(64, 64));
    let resources = dict([(
        "XObject",
        Object::Dictionary(dict([("Im0", Object::Reference(image))])),
    )]);
    fixture.page(b"q 300 0 0 300 0 0 cm /Im0 Do Q", resources);
    let compressed = compress_bytes(&fixture.to_bytes(), CompressionProfile::Screen);

    let doc = Document::load(compressed).unwrap();
    assert_eq!(doc.page_count(), 3);
    let text = pdftool::extract_text(&doc).unwrap();
    assert_eq!(text.pages[1].runs[0].text, "Page 2");
}
