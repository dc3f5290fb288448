//! Integration tests for damaged file structure
//!
//! Each test writes a valid document, breaks its bytes the way real-world
//! producers and transfers do, then loads it again.

mod common;

use common::{dict, numbered};
use pdftool::{extract_text, Document, Object, ObjectId, PdfError, PdfWriter};

fn page_texts(doc: &Document) -> Vec<String> {
    extract_text(doc)
        .unwrap()
        .pages
        .iter()
        .map(|page| page.text().trim().to_string())
        .collect()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Replaces the offset after the last `startxref`.
fn with_startxref(bytes: &[u8], offset: usize) -> Vec<u8> {
    let at = rfind(bytes, b"startxref").unwrap() + b"startxref".len();
    let mut out = bytes[..at].to_vec();
    out.extend_from_slice(format!("\n{offset}\n%%EOF\n").as_bytes());
    out
}

fn startxref_of(bytes: &[u8]) -> usize {
    let at = rfind(bytes, b"startxref").unwrap() + b"startxref".len();
    String::from_utf8_lossy(&bytes[at..])
        .split_whitespace()
        .next()
        .unwrap()
        .parse()
        .unwrap()
}

#[test]
fn test_wrong_startxref_is_rebuilt() {
    let bytes = numbered(3).to_bytes();
    // Offset 9 lands on the binary marker comment, not on a table.
    let broken = with_startxref(&bytes, 9);

    let doc = Document::load(broken).unwrap();
    assert_eq!(doc.page_count(), 3);
    assert_eq!(page_texts(&doc), vec!["Page 1", "Page 2", "Page 3"]);
    assert!(
        doc.warnings()
            .iter()
            .any(|w| w.starts_with("Cross-reference table rebuilt by scanning")),
        "warnings: {:?}",
        doc.warnings()
    );
}

#[test]
fn test_shifted_offsets_are_relocated() {
    let bytes = numbered(3).to_bytes();
    let first_object = find(&bytes, b"1 0 obj").unwrap();
    let junk = b"junk inserted by a broken transfer\n";

    // Every object moves, the table still points at the old offsets.
    let mut shifted = bytes[..first_object].to_vec();
    shifted.extend_from_slice(junk);
    shifted.extend_from_slice(&bytes[first_object..]);
    let shifted = with_startxref(&shifted, startxref_of(&bytes) + junk.len());

    let doc = Document::load(shifted).unwrap();
    assert_eq!(doc.page_count(), 3);
    assert_eq!(page_texts(&doc), vec!["Page 1", "Page 2", "Page 3"]);
    let warnings = doc.warnings();
    assert!(
        warnings.iter().any(|w| w.contains("relocated from offset")),
        "warnings: {warnings:?}"
    );
}

#[test]
fn test_shifted_offsets_without_startxref_fix() {
    let bytes = numbered(2).to_bytes();
    let first_object = find(&bytes, b"1 0 obj").unwrap();

    let mut shifted = bytes[..first_object].to_vec();
    shifted.extend_from_slice(b"0123456789abcdefghij\n");
    shifted.extend_from_slice(&bytes[first_object..]);

    let doc = Document::load(shifted).unwrap();
    assert_eq!(page_texts(&doc), vec!["Page 1", "Page 2"]);
    assert!(!doc.warnings().is_empty());
}

#[test]
fn test_kid_pointing_at_ancestor() {
    // root -> [page, middle], middle -> [page, root]
    let mut doc = Document::new();
    let root = doc.add_object(Object::Null);
    let middle = doc.add_object(Object::Null);
    let page = |parent: ObjectId| {
        dict([
            ("Type", Object::name("Page")),
            ("Parent", Object::Reference(parent)),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            ),
        ])
    };
    let first = doc.add_object(page(root));
    let second = doc.add_object(page(middle));
    doc.set_object(
        root,
        Object::Dictionary(dict([
            ("Type", Object::name("Pages")),
            (
                "Kids",
                Object::Array(vec![Object::Reference(first), Object::Reference(middle)]),
            ),
            ("Count", 2.into()),
        ])),
    );
    doc.set_object(
        middle,
        Object::Dictionary(dict([
            ("Type", Object::name("Pages")),
            ("Parent", Object::Reference(root)),
            (
                "Kids",
                Object::Array(vec![Object::Reference(second), Object::Reference(root)]),
            ),
            ("Count", 1.into()),
        ])),
    );
    let catalog = doc.add_object(dict([
        ("Type", Object::name("Catalog")),
        ("Pages", Object::Reference(root)),
    ]));
    doc.trailer_mut().set("Root", Object::Reference(catalog));

    let bytes = PdfWriter::serialize(&doc).unwrap();
    match Document::load(bytes) {
        Err(PdfError::MalformedPageTree(message)) => {
            assert!(message.contains("ancestor"), "{message}")
        }
        other => panic!("expected MalformedPageTree, got {other:?}"),
    }
}
