//! Integration tests for page extraction

mod common;

use common::{dict, gradient_image, numbered, Fixture};
use pdftool::{
    extract_pages, extract_text, Document, Object, PageRange, PdfError, PdfWriter, RenderOptions,
    Renderer,
};

fn page_texts(doc: &Document) -> Vec<String> {
    extract_text(doc)
        .unwrap()
        .pages
        .iter()
        .map(|page| page.text().trim_end().to_string())
        .collect()
}

fn reparse(doc: &Document) -> Document {
    Document::load(PdfWriter::serialize(doc).unwrap()).unwrap()
}

#[test]
fn test_extract_all_pages_round_trip() {
    let source = Document::load(numbered(4).to_bytes()).unwrap();
    let range = PageRange::parse("1-4").unwrap();
    let extracted = reparse(&extract_pages(&source, &range).unwrap());

    assert_eq!(extracted.page_count(), 4);
    assert_eq!(page_texts(&extracted), page_texts(&source));
    for (copy, original) in extracted.pages().iter().zip(source.pages()) {
        assert_eq!(copy.media_box, original.media_box);
    }
}

#[test]
fn test_extracted_pages_render_identically() {
    let mut fixture = Fixture::new();
    let image = fixture.add(gradient_image(16, 16));
    let mut resources = fixture.helvetica();
    resources.set(
        "XObject",
        Object::Dictionary(dict([("Im0", Object::Reference(image))])),
    );
    fixture.page(
        b"0 0 1 rg 72 72 200 100 re f \
          1 0 0 RG 4 w 300 300 m 500 500 l S \
          q 150 0 0 150 350 72 cm /Im0 Do Q \
          BT /F1 24 Tf 72 700 Td (Vector and image) Tj ET",
        resources.clone(),
    );
    fixture.page(
        b"0.5 g 0 0 612 396 re f q 200 0 0 200 206 500 cm /Im0 Do Q",
        resources,
    );
    let source = Document::load(fixture.to_bytes()).unwrap();
    let extracted = reparse(&extract_pages(&source, &PageRange::parse("1-2").unwrap()).unwrap());
    assert_eq!(extracted.page_count(), 2);

    let renderer = Renderer::with_options(RenderOptions {
        font_dirs: Vec::new(),
        ..RenderOptions::default()
    });
    for number in 1..=2 {
        let original = renderer.render(&source, source.page(number).unwrap(), 72.0).unwrap().image;
        let copy = renderer.render(&extracted, extracted.page(number).unwrap(), 72.0).unwrap().image;
        assert_eq!((copy.width, copy.height), (original.width, original.height));
        assert!(
            copy.pixels == original.pixels,
            "page {number} renders differently after extraction"
        );
        assert!(original.pixels.iter().any(|&b| b != 255), "page {number} is blank");
    }
}

#[test]
fn test_extract_in_requested_order() {
    let source = Document::load(numbered(3).to_bytes()).unwrap();
    let range = PageRange::parse("3,1,2").unwrap();
    let extracted = reparse(&extract_pages(&source, &range).unwrap());

    assert_eq!(page_texts(&extracted), vec!["Page 3", "Page 1", "Page 2"]);
}

#[test]
fn test_shared_image_written_once() {
    let mut fixture = Fixture::new();
    let image = fixture.add(gradient_image(8, 8));
    for _ in 0..3 {
        let resources = dict([(
            "XObject",
            Object::Dictionary(dict([("Im0", Object::Reference(image))])),
        )]);
        fixture.page(b"q 100 0 0 100 0 0 cm /Im0 Do Q", resources);
    }
    let source = Document::load(fixture.to_bytes()).unwrap();
    let extracted = reparse(&extract_pages(&source, &PageRange::parse("1-3").unwrap()).unwrap());

    let images = extracted
        .object_ids()
        .filter_map(|id| extracted.get_stream(id))
        .filter(|stream| stream.dict.get_name("Subtype") == Some("Image"))
        .count();
    assert_eq!(images, 1);
}

#[test]
fn test_reversed_and_zero_ranges_rejected() {
    for spec in ["5-3", "0-2", "1,,2", "a"] {
        let error = PageRange::parse(spec).unwrap_err();
        assert!(
            matches!(error, PdfError::InvalidPageRangeSyntax { .. }),
            "{spec} should be a syntax error"
        );
    }
}

#[test]
fn test_page_past_end_rejected() {
    let source = Document::load(numbered(3).to_bytes()).unwrap();
    let range = PageRange::parse("2,4").unwrap();
    match extract_pages(&source, &range) {
        Err(PdfError::PageOutOfRange { spans, page_count }) => {
            assert_eq!(spans, vec![(4, 4)]);
            assert_eq!(page_count, 3);
        }
        other => panic!("expected PageOutOfRange, got {other:?}"),
    }
}

#[test]
fn test_duplicate_pages_are_distinct_page_objects() {
    let source = Document::load(numbered(2).to_bytes()).unwrap();
    let extracted = reparse(&extract_pages(&source, &PageRange::parse("1,1").unwrap()).unwrap());

    assert_eq!(extracted.page_count(), 2);
    assert_ne!(extracted.pages()[0].id, extracted.pages()[1].id);
    assert_eq!(page_texts(&extracted), vec!["Page 1", "Page 1"]);
}
