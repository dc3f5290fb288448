//! Shared fixtures: small documents built through the public object API.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use pdftool::{Dictionary, Document, Object, ObjectId, PdfWriter, Stream};

pub fn dict<const N: usize>(entries: [(&str, Object); N]) -> Dictionary {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Flat page tree of US Letter pages.
pub struct Fixture {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    font: Option<ObjectId>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut doc = Document::new();
        let pages_id = doc.add_object(Object::Null);
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            font: None,
        }
    }

    pub fn add(&mut self, object: impl Into<Object>) -> ObjectId {
        self.doc.add_object(object)
    }

    /// Shared Helvetica resource named `/F1`.
    pub fn helvetica(&mut self) -> Dictionary {
        let font = match self.font {
            Some(font) => font,
            None => {
                let font = self.doc.add_object(dict([
                    ("Type", Object::name("Font")),
                    ("Subtype", Object::name("Type1")),
                    ("BaseFont", Object::name("Helvetica")),
                    ("Encoding", Object::name("WinAnsiEncoding")),
                ]));
                self.font = Some(font);
                font
            }
        };
        dict([(
            "Font",
            Object::Dictionary(dict([("F1", Object::Reference(font))])),
        )])
    }

    pub fn page(&mut self, content: &[u8], resources: Dictionary) -> ObjectId {
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content.to_vec()));
        let page = dict([
            ("Type", Object::name("Page")),
            ("Parent", Object::Reference(self.pages_id)),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            ),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
        ]);
        let id = self.doc.add_object(page);
        self.kids.push(id);
        id
    }

    /// A page showing `text` at the top left.
    pub fn text_page(&mut self, text: &str) -> ObjectId {
        let resources = self.helvetica();
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        self.page(content.as_bytes(), resources)
    }

    pub fn build(mut self) -> Document {
        let kids: Vec<Object> = self.kids.iter().map(|id| Object::Reference(*id)).collect();
        let count = kids.len();
        self.doc.set_object(
            self.pages_id,
            Object::Dictionary(dict([
                ("Type", Object::name("Pages")),
                ("Kids", Object::Array(kids)),
                ("Count", count.into()),
            ])),
        );
        let catalog = self.doc.add_object(dict([
            ("Type", Object::name("Catalog")),
            ("Pages", Object::Reference(self.pages_id)),
        ]));
        let info = self
            .doc
            .add_object(dict([("Title", Object::string("Integration fixture"))]));
        self.doc.trailer_mut().set("Root", Object::Reference(catalog));
        self.doc.trailer_mut().set("Info", Object::Reference(info));
        self.doc.refresh_pages().unwrap();
        self.doc
    }

    pub fn to_bytes(self) -> Vec<u8> {
        PdfWriter::serialize(&self.build()).unwrap()
    }
}

/// Pages showing "Page 1" through "Page <count>".
pub fn numbered(count: usize) -> Fixture {
    let mut fixture = Fixture::new();
    for number in 1..=count {
        fixture.text_page(&format!("Page {number}"));
    }
    fixture
}

/// Raw RGB image XObject with a smooth gradient.
pub fn gradient_image(width: u32, height: u32) -> Stream {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 255 / width.max(1)) as u8);
            data.push((y * 255 / height.max(1)) as u8);
            data.push(128);
        }
    }
    Stream::new(
        dict([
            ("Type", Object::name("XObject")),
            ("Subtype", Object::name("Image")),
            ("Width", width.into()),
            ("Height", height.into()),
            ("ColorSpace", Object::name("DeviceRGB")),
            ("BitsPerComponent", 8.into()),
        ]),
        data,
    )
}

pub fn write_pdf(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
