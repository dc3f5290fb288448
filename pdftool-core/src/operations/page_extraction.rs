//! Page extraction
//!
//! Builds a new document from a selection of source pages. Everything a
//! page reaches (content streams, resources, fonts, images, annotations) is
//! deep-copied; objects shared by several selected pages are copied once.
//! The new page tree is flat and every page carries its inherited
//! attributes directly.

use std::collections::{HashMap, HashSet, VecDeque};

use super::PageRange;
use crate::document::{Document, Page};
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, Stream};
use crate::writer::pdf_date_now;

/// Document info entries carried into the extracted document.
const INFO_KEYS: [&str; 6] = ["Title", "Author", "Subject", "Keywords", "Creator", "CreationDate"];

/// Page keys rebuilt for the new tree instead of copied.
const REBUILT_PAGE_KEYS: [&str; 8] = [
    "Parent",
    "Annots",
    "B",
    "Resources",
    "MediaBox",
    "CropBox",
    "Rotate",
    "Type",
];

/// Options for page extraction
#[derive(Debug, Clone)]
pub struct PageExtractionOptions {
    /// Carry title, author and similar document info over.
    pub preserve_metadata: bool,
    /// Copy page annotations, dropping links to pages left out.
    pub preserve_annotations: bool,
}

impl Default for PageExtractionOptions {
    fn default() -> Self {
        Self {
            preserve_metadata: true,
            preserve_annotations: true,
        }
    }
}

/// Extracts `range` from `source` with default options.
pub fn extract_pages(source: &Document, range: &PageRange) -> Result<Document> {
    PageExtractor::new(source).extract(range)
}

/// Page extractor for building sub-documents
#[derive(Debug)]
pub struct PageExtractor<'a> {
    source: &'a Document,
    options: PageExtractionOptions,
}

impl<'a> PageExtractor<'a> {
    pub fn new(source: &'a Document) -> Self {
        Self::with_options(source, PageExtractionOptions::default())
    }

    pub fn with_options(source: &'a Document, options: PageExtractionOptions) -> Self {
        Self { source, options }
    }

    /// Builds a document holding the pages of `range` in request order.
    /// Duplicated pages get their own page dictionary sharing content and
    /// resources with the first copy.
    pub fn extract(&self, range: &PageRange) -> Result<Document> {
        if range.is_empty() {
            return Err(PdfError::InvalidParameter("no pages selected".to_string()));
        }
        range.validate(self.source.page_count())?;

        let mut copier = Copier::new(self.source);
        let pages_id = copier.target.add_object(Object::Null);

        // Output ids for first occurrences are fixed up front so that
        // references between selected pages can be rewritten.
        let numbers = range.pages();
        for &number in &numbers {
            let page = self.source.page(number)?;
            if !copier.pages.contains_key(&page.id) {
                let id = copier.target.add_object(Object::Null);
                copier.pages.insert(page.id, id);
            }
        }

        let mut first_copies: HashMap<ObjectId, Dictionary> = HashMap::new();
        let mut kids = Vec::with_capacity(numbers.len());
        for &number in &numbers {
            let page = self.source.page(number)?;
            let id = if first_copies.contains_key(&page.id) {
                copier.target.add_object(Object::Null)
            } else {
                copier.pages[&page.id]
            };
            let mut dict = match first_copies.get(&page.id) {
                Some(dict) => dict.clone(),
                None => {
                    let dict = copier.page_dictionary(page, pages_id)?;
                    first_copies.insert(page.id, dict.clone());
                    dict
                }
            };
            if self.options.preserve_annotations {
                let annotations = copier.annotations(page, id);
                if !annotations.is_empty() {
                    dict.set("Annots", Object::Array(annotations));
                }
            }
            copier.target.set_object(id, Object::Dictionary(dict));
            kids.push(Object::Reference(id));
            copier.drain();
        }

        let count = kids.len();
        let mut pages = Dictionary::new();
        pages.set("Type", Object::name("Pages"));
        pages.set("Kids", Object::Array(kids));
        pages.set("Count", count);
        copier.target.set_object(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::name("Catalog"));
        catalog.set("Pages", Object::Reference(pages_id));
        if let Some(lang) = self
            .source
            .catalog()
            .ok()
            .and_then(|c| self.source.dict_get(c, "Lang"))
            .filter(|lang| lang.as_string().is_some())
        {
            catalog.set("Lang", lang.clone());
        }
        let catalog_id = copier.target.add_object(catalog);
        let info_id = copier.target.add_object(self.info());

        let copied = copier.copied.len();
        let mut target = copier.target;
        target.set_version(self.source.version());
        target.trailer_mut().set("Root", Object::Reference(catalog_id));
        target.trailer_mut().set("Info", Object::Reference(info_id));
        target.refresh_pages()?;

        tracing::info!(
            "Extracted {} pages ({} distinct) with {} shared objects",
            count,
            range.unique_sorted().len(),
            copied
        );
        Ok(target)
    }

    fn info(&self) -> Dictionary {
        let mut info = Dictionary::new();
        if self.options.preserve_metadata {
            if let Some(source_info) = self.source.info() {
                for key in INFO_KEYS {
                    if let Some(value) = self
                        .source
                        .dict_get(source_info, key)
                        .filter(|value| value.as_string().is_some())
                    {
                        info.set(key, value.clone());
                    }
                }
            }
        }
        info.set(
            "Producer",
            Object::string(format!("pdftool {}", env!("CARGO_PKG_VERSION"))),
        );
        info.set("ModDate", Object::string(pdf_date_now()));
        info
    }
}

/// Copies objects from `source` into a fresh document, memoized by id.
struct Copier<'a> {
    source: &'a Document,
    target: Document,
    copied: HashMap<ObjectId, ObjectId>,
    pending: VecDeque<(ObjectId, ObjectId)>,
    /// Selected source page → its first output page.
    pages: HashMap<ObjectId, ObjectId>,
    /// Every page of the source, selected or not.
    source_pages: HashSet<ObjectId>,
}

impl<'a> Copier<'a> {
    fn new(source: &'a Document) -> Self {
        Self {
            source,
            target: Document::new(),
            copied: HashMap::new(),
            pending: VecDeque::new(),
            pages: HashMap::new(),
            source_pages: source.pages().iter().map(|page| page.id).collect(),
        }
    }

    fn page_dictionary(&mut self, page: &Page, parent: ObjectId) -> Result<Dictionary> {
        let source = self.source;
        let original = source.get_dict(page.id).ok_or_else(|| {
            PdfError::MalformedPageTree(format!("page {} is not a dictionary", page.number))
        })?;

        let mut dict = Dictionary::new();
        dict.set("Type", Object::name("Page"));
        dict.set("Parent", Object::Reference(parent));
        for (key, value) in original.iter() {
            if REBUILT_PAGE_KEYS.contains(&key.as_str()) {
                continue;
            }
            let value = self.value(value);
            dict.set(key.clone(), value);
        }

        dict.set("MediaBox", page.media_box.to_object());
        if let Some(crop_box) = page.crop_box {
            dict.set("CropBox", crop_box.to_object());
        }
        if page.rotate != 0 {
            dict.set("Rotate", page.rotate);
        }
        let resources = self.dictionary(&page.resources);
        let resources_id = self.target.add_object(resources);
        dict.set("Resources", Object::Reference(resources_id));
        Ok(dict)
    }

    /// Fresh copies of the page's annotations, owned by `page_id`.
    fn annotations(&mut self, page: &Page, page_id: ObjectId) -> Vec<Object> {
        let source = self.source;
        let Some(annots) = source
            .get_dict(page.id)
            .and_then(|dict| source.dict_get(dict, "Annots"))
            .and_then(Object::as_array)
        else {
            return Vec::new();
        };

        let mut copies = Vec::new();
        for annot in annots {
            let Some(original) = source.resolve_dict(annot) else {
                continue;
            };
            let mut annotation = original.clone();
            annotation.remove("P");
            if annotation
                .get("Dest")
                .is_some_and(|dest| !self.destination_kept(dest))
            {
                annotation.remove("Dest");
            }
            if annotation
                .get("A")
                .and_then(|action| source.resolve_dict(action))
                .is_some_and(|action| {
                    action.get_name("S") == Some("GoTo")
                        && action.get("D").is_some_and(|d| !self.destination_kept(d))
                })
            {
                annotation.remove("A");
            }
            let is_link = annotation.get_name("Subtype") == Some("Link");
            if is_link && !annotation.contains_key("Dest") && !annotation.contains_key("A") {
                tracing::debug!("Page {}: dropped link to a page left out", page.number);
                continue;
            }

            let mut copy = self.dictionary(&annotation);
            copy.set("P", Object::Reference(page_id));
            let id = self.target.add_object(copy);
            if let Some(source_id) = annot.as_reference() {
                self.copied.entry(source_id).or_insert(id);
            }
            copies.push(Object::Reference(id));
        }
        copies
    }

    /// False for an explicit destination on a page that is not copied.
    fn destination_kept(&self, dest: &Object) -> bool {
        let target = match self.source.resolve(dest) {
            Object::Array(items) => items.first(),
            Object::Dictionary(dict) => dict
                .get("D")
                .and_then(|d| self.source.resolve(d).as_array())
                .and_then(|items| items.first()),
            _ => None,
        };
        match target.and_then(Object::as_reference) {
            Some(page) => self.pages.contains_key(&page),
            None => true,
        }
    }

    fn reference(&mut self, id: ObjectId) -> Object {
        if let Some(&page) = self.pages.get(&id) {
            return Object::Reference(page);
        }
        if self.source_pages.contains(&id) {
            return Object::Null;
        }
        if let Some(&copy) = self.copied.get(&id) {
            return Object::Reference(copy);
        }
        if self
            .source
            .get_dict(id)
            .is_some_and(|dict| dict.is_type("Pages"))
        {
            return Object::Null;
        }
        let copy = self.target.add_object(Object::Null);
        self.copied.insert(id, copy);
        self.pending.push_back((id, copy));
        Object::Reference(copy)
    }

    fn value(&mut self, object: &Object) -> Object {
        match object {
            Object::Reference(id) => self.reference(*id),
            Object::Array(items) => Object::Array(items.iter().map(|item| self.value(item)).collect()),
            Object::Dictionary(dict) => Object::Dictionary(self.dictionary(dict)),
            Object::Stream(stream) => {
                Object::Stream(Stream::new(self.dictionary(&stream.dict), stream.data.clone()))
            }
            other => other.clone(),
        }
    }

    fn dictionary(&mut self, dict: &Dictionary) -> Dictionary {
        dict.iter()
            .map(|(key, value)| (key.clone(), self.value(value)))
            .collect()
    }

    /// Copies every object queued by [`Copier::reference`].
    fn drain(&mut self) {
        let source = self.source;
        while let Some((from, to)) = self.pending.pop_front() {
            let object = match source.get_object(from) {
                Ok(object) => self.value(object),
                Err(e) => {
                    source.warn(format!("Object {from} could not be read, copied as null: {e}"));
                    Object::Null
                }
            };
            self.target.set_object(to, object);
        }
    }
}
