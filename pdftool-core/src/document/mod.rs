//! The document model: an arena of lazily materialized objects plus the page
//! sequence derived from the page tree.
//!
//! Objects are parsed on first access and memoized. All caches sit behind
//! `OnceLock`/`Mutex`, so a shared `&Document` can be handed to worker threads.

pub mod page_tree;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};

use crate::encryption::SecurityHandler;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, Stream};
use crate::parser::filters::decode_stream;
use crate::parser::object_stream::ObjectStream;
use crate::parser::objects::parse_indirect_object;
use crate::parser::xref::{XRefEntry, XRefTable};
use crate::parser::ParseOptions;
use crate::recovery::{scan, ScanIndex};

pub use page_tree::{merge_resources, Page, Rect};

static NULL: Object = Object::Null;

/// Maximum length of a reference chain (`1 0 R` → `2 0 R` → ...).
const MAX_REFERENCE_CHAIN: usize = 32;

#[derive(Debug, Clone, Copy)]
enum Location {
    Offset(usize),
    InStream { stream: u32, index: u32 },
    Memory,
}

#[derive(Debug)]
struct Slot {
    location: Location,
    value: OnceLock<std::result::Result<Object, String>>,
}

impl Slot {
    fn memory(object: Object) -> Self {
        let value = OnceLock::new();
        let _ = value.set(Ok(object));
        Self {
            location: Location::Memory,
            value,
        }
    }
}

/// A parsed (or newly built) PDF document.
#[derive(Debug)]
pub struct Document {
    data: Vec<u8>,
    version: String,
    options: ParseOptions,
    slots: BTreeMap<ObjectId, Slot>,
    trailer: Dictionary,
    pages: Vec<Page>,
    next_number: u32,
    warnings: Mutex<Vec<String>>,
    warned: Mutex<HashSet<ObjectId>>,
    object_streams: Mutex<HashMap<u32, Arc<ObjectStream>>>,
    scan_index: OnceLock<ScanIndex>,
    security: Option<SecurityHandler>,
    encrypt_id: Option<ObjectId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty in-memory document without catalog or pages.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            version: "1.7".to_string(),
            options: ParseOptions::default(),
            slots: BTreeMap::new(),
            trailer: Dictionary::new(),
            pages: Vec::new(),
            next_number: 1,
            warnings: Mutex::new(Vec::new()),
            warned: Mutex::new(HashSet::new()),
            object_streams: Mutex::new(HashMap::new()),
            scan_index: OnceLock::new(),
            security: None,
            encrypt_id: None,
        }
    }

    /// Parses a document from bytes with default (lenient) options.
    pub fn load(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        crate::parser::PdfReader::parse(bytes)
    }

    pub(crate) fn from_xref(
        data: Vec<u8>,
        version: String,
        options: ParseOptions,
        table: &XRefTable,
        trailer: Dictionary,
    ) -> Self {
        let mut slots = BTreeMap::new();
        let mut max_number = 0;
        for (&number, entry) in table.iter() {
            let (id, location) = match *entry {
                XRefEntry::InUse { offset, generation } => {
                    (ObjectId::new(number, generation), Location::Offset(offset))
                }
                XRefEntry::Compressed { stream, index } => {
                    (ObjectId::new(number, 0), Location::InStream { stream, index })
                }
                XRefEntry::Free => continue,
            };
            max_number = max_number.max(number);
            slots.insert(
                id,
                Slot {
                    location,
                    value: OnceLock::new(),
                },
            );
        }
        Self {
            data,
            version,
            options,
            slots,
            trailer,
            next_number: max_number + 1,
            ..Self::new()
        }
    }

    pub(crate) fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// PDF version from the header, e.g. `"1.7"`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.trailer
    }

    pub fn is_encrypted(&self) -> bool {
        self.trailer.contains_key("Encrypt")
    }

    /// Opens the security handler named by the trailer `/Encrypt` entry with
    /// the empty user password. Objects loaded afterwards are decrypted.
    pub(crate) fn unlock(&mut self) -> Result<()> {
        let Some(entry) = self.trailer.get("Encrypt").cloned() else {
            return Ok(());
        };
        let encrypt = match entry {
            Object::Reference(id) => {
                self.encrypt_id = Some(id);
                self.get_object(id)?.as_dict().cloned()
            }
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
        .ok_or_else(|| PdfError::EncryptedDocument("/Encrypt is not a dictionary".to_string()))?;
        let file_id = self
            .trailer
            .get("ID")
            .and_then(Object::as_array)
            .and_then(|ids| ids.first())
            .and_then(Object::as_string)
            .unwrap_or_default()
            .to_vec();
        self.security = Some(SecurityHandler::open(&encrypt, &file_id)?);
        Ok(())
    }

    /// The `/Root` dictionary.
    pub fn catalog(&self) -> Result<&Dictionary> {
        let root = self.trailer.get_reference("Root").ok_or(PdfError::MissingCatalog)?;
        match self.get_object(root) {
            Ok(object) => object.as_dict().ok_or(PdfError::MissingCatalog),
            Err(_) => Err(PdfError::MissingCatalog),
        }
    }

    /// The `/Info` dictionary, if any.
    pub fn info(&self) -> Option<&Dictionary> {
        self.trailer.get("Info").and_then(|i| self.resolve(i).as_dict())
    }

    /// Ids of every object known to the document, in ascending order.
    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.slots.keys().copied()
    }

    pub fn object_count(&self) -> usize {
        self.slots.len()
    }

    /// Materializes an object, parsing it on first access.
    pub fn get_object(&self, id: ObjectId) -> Result<&Object> {
        let slot = match self.slots.get(&id) {
            Some(slot) => slot,
            None => self
                .slots
                .range(ObjectId::new(id.number(), 0)..=ObjectId::new(id.number(), u16::MAX))
                .next()
                .map(|(_, slot)| slot)
                .ok_or_else(|| PdfError::StructuralCorruption(format!("object {id} does not exist")))?,
        };
        let value = slot.value.get_or_init(|| self.load_slot(id, slot.location));
        value
            .as_ref()
            .map_err(|message| PdfError::StructuralCorruption(format!("object {id}: {message}")))
    }

    /// Follows references. Dangling or unreadable references resolve to null
    /// and are reported once as a warning.
    pub fn resolve<'a>(&'a self, object: &'a Object) -> &'a Object {
        let mut current = object;
        for _ in 0..MAX_REFERENCE_CHAIN {
            let Object::Reference(id) = current else {
                return current;
            };
            match self.get_object(*id) {
                Ok(next) => current = next,
                Err(e) => {
                    self.warn_once(*id, format!("Unresolvable reference {id}: {e}"));
                    return &NULL;
                }
            }
        }
        &NULL
    }

    pub fn resolve_dict<'a>(&'a self, object: &'a Object) -> Option<&'a Dictionary> {
        self.resolve(object).as_dict()
    }

    pub fn get_dict(&self, id: ObjectId) -> Option<&Dictionary> {
        self.get_object(id).ok().and_then(Object::as_dict)
    }

    pub fn get_stream(&self, id: ObjectId) -> Option<&Stream> {
        self.get_object(id).ok().and_then(Object::as_stream)
    }

    /// Resolves `dict[key]`.
    pub fn dict_get<'a>(&'a self, dict: &'a Dictionary, key: &str) -> Option<&'a Object> {
        dict.get(key).map(|v| self.resolve(v)).filter(|v| !v.is_null())
    }

    /// Replaces (or inserts) an object. Invalidates nothing else: callers that
    /// restructure the page tree must call [`Document::refresh_pages`].
    pub fn set_object(&mut self, id: ObjectId, object: Object) {
        self.next_number = self.next_number.max(id.number() + 1);
        if let Ok(cache) = self.object_streams.get_mut() {
            cache.remove(&id.number());
        }
        self.slots.insert(id, Slot::memory(object));
    }

    /// Stores a new object under a fresh id.
    pub fn add_object(&mut self, object: impl Into<Object>) -> ObjectId {
        let id = ObjectId::new(self.next_number, 0);
        self.set_object(id, object.into());
        id
    }

    /// Re-reads the page sequence from the page tree.
    pub fn refresh_pages(&mut self) -> Result<()> {
        self.pages = page_tree::collect_pages(self)?;
        Ok(())
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Page by 1-based number.
    pub fn page(&self, number: u32) -> Result<&Page> {
        number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .ok_or_else(|| PdfError::PageOutOfRange {
                spans: vec![(number, number)],
                page_count: self.page_count(),
            })
    }

    /// The page's effective resource dictionary.
    pub fn resources<'a>(&self, page: &'a Page) -> &'a Dictionary {
        &page.resources
    }

    /// Concatenated, decoded content streams of a page.
    pub fn content_stream(&self, page: &Page) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        for &id in &page.contents {
            let Some(stream) = self.get_stream(id) else {
                self.warn(format!("Page {}: content {id} is not a stream", page.number));
                continue;
            };
            let decoded = decode_stream(stream)?;
            if !content.is_empty() {
                content.push(b'\n');
            }
            content.extend_from_slice(&decoded);
        }
        Ok(content)
    }

    /// Records a non-fatal problem.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(message);
        }
    }

    fn warn_once(&self, id: ObjectId, message: String) {
        let first = self.warned.lock().map(|mut w| w.insert(id)).unwrap_or(false);
        if first {
            self.warn(message);
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn load_slot(&self, id: ObjectId, location: Location) -> std::result::Result<Object, String> {
        match location {
            Location::Memory => Ok(Object::Null),
            Location::Offset(offset) => self.load_at(id, offset).or_else(|e| {
                if !self.options.lenient {
                    return Err(e);
                }
                let relocated = self
                    .scan_index()
                    .get(id.number())
                    .map(|found| found.offset)
                    .filter(|&o| o != offset)
                    .ok_or(e)?;
                self.warn(format!("Object {id} relocated from offset {offset} to {relocated}"));
                self.load_at(id, relocated)
            }),
            Location::InStream { stream, index } => {
                let objstm = self.object_stream(stream)?;
                objstm
                    .get(index as usize, Some(id.number()), self.options.max_depth)
                    .map_err(|e| e.to_string())
            }
        }
    }

    fn load_at(&self, id: ObjectId, offset: usize) -> std::result::Result<Object, String> {
        let resolve_length = |length_id: ObjectId| {
            if length_id == id {
                return None;
            }
            self.peek_integer(length_id)
        };
        let (found, object) = parse_indirect_object(&self.data, offset, &self.options, &resolve_length)
            .map_err(|e| e.to_string())?;
        if found.number() != id.number() {
            return Err(format!("offset {offset} holds object {found}"));
        }
        match &self.security {
            Some(security) if self.encrypt_id != Some(found) => security
                .decrypt_object(found, object)
                .map_err(|e| e.to_string()),
            _ => Ok(object),
        }
    }

    /// Reads an integer object without memoizing, for stream lengths.
    fn peek_integer(&self, id: ObjectId) -> Option<i64> {
        let slot = self.slots.get(&id)?;
        if let Some(value) = slot.value.get() {
            return value.as_ref().ok().and_then(Object::as_integer);
        }
        match slot.location {
            Location::Offset(offset) => {
                parse_indirect_object(&self.data, offset, &self.options, &|_| None)
                    .ok()
                    .and_then(|(_, object)| object.as_integer())
            }
            Location::InStream { stream, index } => self
                .object_stream(stream)
                .ok()?
                .get(index as usize, Some(id.number()), self.options.max_depth)
                .ok()?
                .as_integer(),
            Location::Memory => None,
        }
    }

    fn object_stream(&self, number: u32) -> std::result::Result<Arc<ObjectStream>, String> {
        if let Some(cached) = self
            .object_streams
            .lock()
            .ok()
            .and_then(|cache| cache.get(&number).cloned())
        {
            return Ok(cached);
        }

        let id = self
            .slots
            .range(ObjectId::new(number, 0)..=ObjectId::new(number, u16::MAX))
            .next()
            .map(|(id, _)| *id)
            .ok_or_else(|| format!("object stream {number} does not exist"))?;
        let stream = self
            .get_object(id)
            .map_err(|e| e.to_string())?
            .as_stream()
            .ok_or_else(|| format!("object {number} is not an object stream"))?;
        let parsed = Arc::new(ObjectStream::parse(stream).map_err(|e| e.to_string())?);
        tracing::debug!("Loaded object stream {number} with {} objects", parsed.len());

        if let Ok(mut cache) = self.object_streams.lock() {
            cache.insert(number, Arc::clone(&parsed));
        }
        Ok(parsed)
    }

    fn scan_index(&self) -> &ScanIndex {
        self.scan_index.get_or_init(|| scan(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Document {
        let mut doc = Document::new();
        let content = doc.add_object(Stream::new(Dictionary::new(), b"BT ET".to_vec()));

        let mut page = Dictionary::new();
        page.set("Type", Object::name("Page"));
        page.set("Contents", content);
        let page_id = doc.add_object(page);

        let mut pages = Dictionary::new();
        pages.set("Type", Object::name("Pages"));
        pages.set("Kids", vec![Object::Reference(page_id)]);
        pages.set("Count", 1);
        pages.set("MediaBox", Rect::new(0.0, 0.0, 200.0, 100.0).to_object());
        let pages_id = doc.add_object(pages);

        if let Ok(Object::Dictionary(page)) = doc.get_object(page_id).cloned() {
            let mut page = page;
            page.set("Parent", pages_id);
            doc.set_object(page_id, page.into());
        }

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::name("Catalog"));
        catalog.set("Pages", pages_id);
        let catalog_id = doc.add_object(catalog);
        doc.trailer_mut().set("Root", catalog_id);
        doc.refresh_pages().unwrap();
        doc
    }

    #[test]
    fn test_in_memory_document_pages() {
        let doc = sample_document();
        assert_eq!(doc.page_count(), 1);
        let page = doc.page(1).unwrap();
        assert_eq!(page.media_box, Rect::new(0.0, 0.0, 200.0, 100.0));
        assert_eq!(doc.content_stream(page).unwrap(), b"BT ET");
    }

    #[test]
    fn test_page_out_of_range() {
        let doc = sample_document();
        assert!(matches!(
            doc.page(2),
            Err(PdfError::PageOutOfRange { page_count: 1, .. })
        ));
        assert!(doc.page(0).is_err());
    }

    #[test]
    fn test_dangling_reference_resolves_to_null() {
        let doc = sample_document();
        let dangling = Object::Reference(ObjectId::new(999, 0));
        assert!(doc.resolve(&dangling).is_null());
        doc.resolve(&dangling);
        assert_eq!(
            doc.warnings()
                .iter()
                .filter(|w| w.contains("999 0 R"))
                .count(),
            1
        );
    }

    #[test]
    fn test_add_object_assigns_fresh_numbers() {
        let mut doc = Document::new();
        let a = doc.add_object(Object::Integer(1));
        let b = doc.add_object(Object::Integer(2));
        assert_eq!(a, ObjectId::new(1, 0));
        assert_eq!(b, ObjectId::new(2, 0));
        doc.set_object(ObjectId::new(10, 0), Object::Null);
        assert_eq!(doc.add_object(Object::Null), ObjectId::new(11, 0));
    }

    #[test]
    fn test_missing_catalog() {
        let doc = Document::new();
        assert!(matches!(doc.catalog(), Err(PdfError::MissingCatalog)));
    }

    #[test]
    fn test_document_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Document>();
    }
}
