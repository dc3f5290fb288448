//! Integration tests for the pdftool CLI
//!
//! Runs the built binary against small documents written to a temporary
//! directory and checks exit codes, messages and output files.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use pdftool::{Dictionary, Document, Object, PdfWriter, Stream};
use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};

fn dict<const N: usize>(entries: [(&str, Object); N]) -> Dictionary {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Writes a document whose pages show "Page 1" .. "Page <count>".
fn write_numbered_pdf(dir: &Path, count: usize) -> PathBuf {
    let mut doc = Document::new();
    let pages_id = doc.add_object(Object::Null);
    let font = doc.add_object(dict([
        ("Type", Object::name("Font")),
        ("Subtype", Object::name("Type1")),
        ("BaseFont", Object::name("Helvetica")),
    ]));
    let mut kids = Vec::new();
    for number in 1..=count {
        let content = format!("BT /F1 18 Tf 72 700 Td (Page {number}) Tj ET");
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page = doc.add_object(dict([
            ("Type", Object::name("Page")),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            ),
            ("Contents", Object::Reference(content_id)),
            (
                "Resources",
                Object::Dictionary(dict([(
                    "Font",
                    Object::Dictionary(dict([("F1", Object::Reference(font))])),
                )])),
            ),
        ]));
        kids.push(Object::Reference(page));
    }
    doc.set_object(
        pages_id,
        Object::Dictionary(dict([
            ("Type", Object::name("Pages")),
            ("Count", count.into()),
            ("Kids", Object::Array(kids)),
        ])),
    );
    let catalog = doc.add_object(dict([
        ("Type", Object::name("Catalog")),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer_mut().set("Root", Object::Reference(catalog));

    let path = dir.join("input.pdf");
    std::fs::write(&path, PdfWriter::serialize(&doc).unwrap()).unwrap();
    path
}

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pdftool"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run pdftool")
}

fn setup() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let input = write_numbered_pdf(dir.path(), 3);
    (dir, input)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_extract_command() {
    let (dir, input) = setup();
    let output = run_cli(&["extract", input.to_str().unwrap(), "--pages", "3,1"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let expected = dir.path().join("input_extracted.pdf");
    assert_eq!(
        stdout(&output).trim(),
        format!("Extracted pages to {}", expected.display())
    );
    let bytes = std::fs::read(&expected).unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
    assert_eq!(Document::load(bytes).unwrap().page_count(), 2);
}

#[test]
fn test_extract_bad_range_fails() {
    let (dir, input) = setup();
    let output = run_cli(&["extract", input.to_str().unwrap(), "-p", "5-3"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error: Invalid page range syntax: '5-3'"));
    assert!(!dir.path().join("input_extracted.pdf").exists());
}

#[test]
fn test_text_command_with_name_and_dir() {
    let (dir, input) = setup();
    let out_dir = dir.path().join("text");
    let output = run_cli(&[
        "text",
        input.to_str().unwrap(),
        "--output-dir",
        out_dir.to_str().unwrap(),
        "--name",
        "contents",
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = std::fs::read_to_string(out_dir.join("contents.txt")).unwrap();
    assert!(text.contains("Page 1"));
    assert!(text.contains("Page 3"));
}

#[test]
fn test_markdown_command() {
    let (dir, input) = setup();
    let output = run_cli(&["markdown", input.to_str().unwrap()]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(dir.path().join("input.md").exists());
}

#[test]
fn test_compress_command() {
    let (dir, input) = setup();
    let output = run_cli(&["compress", input.to_str().unwrap(), "--quality", "screen"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).starts_with("Compressed PDF saved to"));
    let compressed = dir.path().join("input_compressed.pdf");
    assert!(std::fs::metadata(&compressed).unwrap().len() <= std::fs::metadata(&input).unwrap().len());
}

#[test]
fn test_compress_rejects_unknown_quality() {
    let (_dir, input) = setup();
    let output = run_cli(&["compress", input.to_str().unwrap(), "--quality", "best"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("screen, ebook, printer, prepress"));
}

#[test]
fn test_convert_command() {
    let (dir, input) = setup();
    let images = dir.path().join("images");
    let output = run_cli(&[
        "convert",
        input.to_str().unwrap(),
        "--format",
        "jpg",
        "--dpi",
        "20",
        "--output-dir",
        images.to_str().unwrap(),
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output).trim(),
        format!("Converted PDF to jpeg images in {}", images.display())
    );
    for page in 1..=3 {
        assert!(images.join(format!("input-{page}.jpeg")).exists());
    }
}

#[test]
fn test_convert_rejects_dpi_out_of_range() {
    let (_dir, input) = setup();
    let output = run_cli(&["convert", input.to_str().unwrap(), "--dpi", "0"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("Error: Invalid parameter: DPI"));
}

#[test]
fn test_missing_input_file() {
    let output = run_cli(&["text", "/definitely/not/here.pdf"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Input file not found"));
}
