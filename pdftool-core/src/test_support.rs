//! In-memory documents for unit tests.

use crate::document::Document;
use crate::objects::{Dictionary, Object, ObjectId, Stream};
use crate::writer::{write_object, PdfWriter};

pub(crate) fn dict<const N: usize>(entries: [(&str, Object); N]) -> Dictionary {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Builds a document with a flat page tree of US Letter pages.
pub(crate) struct DocumentBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl DocumentBuilder {
    pub(crate) fn new() -> Self {
        let mut doc = Document::new();
        let pages_id = doc.add_object(Object::Null);
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, object: impl Into<Object>) -> ObjectId {
        self.doc.add_object(object)
    }

    /// Adds a page with `content` (stored unfiltered) and `resources`.
    pub(crate) fn page(&mut self, content: &[u8], resources: Dictionary) -> ObjectId {
        self.page_with(content, resources, Dictionary::new())
    }

    /// Adds a page whose dictionary also carries `extra` entries.
    pub(crate) fn page_with(&mut self, content: &[u8], resources: Dictionary, extra: Dictionary) -> ObjectId {
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content.to_vec()));
        let mut page = dict([
            ("Type", Object::name("Page")),
            ("Parent", Object::Reference(self.pages_id)),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            ),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
        ]);
        for (key, value) in extra.iter() {
            page.set(key.clone(), value.clone());
        }
        let id = self.doc.add_object(page);
        self.kids.push(id);
        id
    }

    pub(crate) fn build(mut self) -> Document {
        let kids = self.kids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>();
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
        let info = self.doc.add_object(dict([
            ("Title", Object::string("Fixture")),
            ("Author", Object::string("Tests")),
        ]));
        self.doc.trailer_mut().set("Root", Object::Reference(catalog));
        self.doc.trailer_mut().set("Info", Object::Reference(info));
        self.doc.refresh_pages().expect("fixture page tree");
        self.doc
    }

    /// Builds and round-trips through the writer and the parser.
    pub(crate) fn build_parsed(self) -> Document {
        let bytes = PdfWriter::serialize(&self.build()).expect("serialize fixture");
        Document::load(bytes).expect("parse fixture")
    }
}

/// `count` pages whose content shows their own page number.
pub(crate) fn numbered_pages(count: usize) -> Document {
    let mut builder = DocumentBuilder::new();
    let font = builder.add(dict([
        ("Type", Object::name("Font")),
        ("Subtype", Object::name("Type1")),
        ("BaseFont", Object::name("Helvetica")),
        ("Encoding", Object::name("WinAnsiEncoding")),
    ]));
    for number in 1..=count {
        let content = format!("BT /F1 12 Tf 72 720 Td (Page {number}) Tj ET");
        let resources = dict([(
            "Font",
            Object::Dictionary(dict([("F1", Object::Reference(font))])),
        )]);
        builder.page(content.as_bytes(), resources);
    }
    builder.build()
}

/// Serializes numbered objects behind a classic xref table, keeping the
/// trailer as given. Used for files the writer never produces.
pub(crate) fn assemble(objects: &[(u32, Object)], trailer: &Dictionary) -> Vec<u8> {
    let mut out = b"%PDF-1.6\n".to_vec();
    let mut offsets = Vec::new();
    for (number, object) in objects {
        offsets.push((*number, out.len()));
        out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
        let object = match object {
            Object::Stream(stream) => {
                let mut stream = stream.clone();
                stream.dict.set("Length", stream.data.len());
                Object::Stream(stream)
            }
            other => other.clone(),
        };
        write_object(&mut out, &object);
        out.extend_from_slice(b"\nendobj\n");
    }

    let size = offsets.iter().map(|(number, _)| number + 1).max().unwrap_or(1);
    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
    for number in 0..size {
        match offsets.iter().find(|(n, _)| *n == number) {
            Some((_, offset)) => out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes()),
            None => out.extend_from_slice(b"0000000000 65535 f \n"),
        }
    }
    let mut trailer = trailer.clone();
    trailer.set("Size", size);
    out.extend_from_slice(b"trailer\n");
    write_object(&mut out, &Object::Dictionary(trailer));
    out.extend_from_slice(format!("\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes());
    out
}
