//! Text extraction from PDF content streams
//!
//! Interprets the text operators of a page with a minimal graphics/text state
//! machine. Each text-showing operator yields one [`TextRun`]; runs keep the
//! order in which the content stream emits them.

use std::collections::HashMap;
use std::rc::Rc;

use unicode_normalization::UnicodeNormalization;

use super::font::FontDecoder;
use crate::document::{Document, Page};
use crate::error::Result;
use crate::graphics::matrix::Matrix;
use crate::objects::{Dictionary, Object, ObjectId};
use crate::parallel::map_ordered;
use crate::parser::content::{ContentOperation, ContentParser, TextElement};
use crate::parser::filters::decode_stream;

/// Nesting limit for form XObjects.
const MAX_FORM_DEPTH: usize = 16;

/// Text extraction options
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Apply NFKC normalization, which expands ligatures such as "ﬁ".
    pub normalize_unicode: bool,
    /// Minimum `TJ` gap, as a fraction of the font size, treated as a word break.
    pub space_threshold: f64,
    /// Worker threads for whole-document extraction; `None` picks from the CPU count.
    pub threads: Option<usize>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            normalize_unicode: true,
            space_threshold: 0.2,
            threads: None,
        }
    }
}

/// Text shown by one text-showing operator.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    /// 1-based page number.
    pub page: u32,
    /// Baseline origin in default user space.
    pub x: f64,
    pub y: f64,
    /// Font size after the text and transformation matrices are applied.
    pub font_size: f64,
    /// Advance of the whole run in default user space.
    pub width: f64,
}

/// Everything extracted from one page.
#[derive(Debug, Clone, Default)]
pub struct PageText {
    pub page: u32,
    pub runs: Vec<TextRun>,
    /// Character codes with no Unicode mapping, emitted as U+FFFD.
    pub unmapped: usize,
    pub warnings: Vec<String>,
}

impl PageText {
    /// True when some glyphs could not be mapped or content was skipped.
    pub fn is_lossy(&self) -> bool {
        self.unmapped > 0 || !self.warnings.is_empty()
    }

    /// One run per line.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for run in &self.runs {
            out.push_str(&run.text);
            out.push('\n');
        }
        out
    }
}

/// Text of a whole document, pages in document order.
#[derive(Debug, Clone, Default)]
pub struct TextExtraction {
    pub pages: Vec<PageText>,
}

impl TextExtraction {
    /// Pages joined with a form feed line, one run per line.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (index, page) in self.pages.iter().enumerate() {
            if index > 0 {
                out.push('\u{0C}');
                out.push('\n');
            }
            out.push_str(&page.text());
        }
        out
    }

    pub fn is_lossy(&self) -> bool {
        self.pages.iter().any(PageText::is_lossy)
    }

    pub fn unmapped(&self) -> usize {
        self.pages.iter().map(|p| p.unmapped).sum()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.pages.iter().flat_map(|p| p.warnings.iter().cloned()).collect()
    }
}

/// Extracts the text of every page with default options.
pub fn extract_text(doc: &Document) -> Result<TextExtraction> {
    TextExtractor::new().extract_document(doc)
}

/// Text extractor for PDF pages
#[derive(Debug, Clone, Default)]
pub struct TextExtractor {
    options: ExtractionOptions,
}

impl TextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ExtractionOptions) -> Self {
        Self { options }
    }

    /// Extracts every page in parallel. A page that fails contributes an
    /// empty run list and a warning; the other pages are unaffected.
    pub fn extract_document(&self, doc: &Document) -> Result<TextExtraction> {
        let pages = map_ordered(doc.pages(), self.options.threads, |page| {
            self.extract_runs(doc, page).unwrap_or_else(|e| {
                let message = format!("Page {}: text extraction failed: {e}", page.number);
                tracing::warn!("{message}");
                PageText {
                    page: page.number,
                    warnings: vec![message],
                    ..PageText::default()
                }
            })
        });

        let extraction = TextExtraction { pages };
        let unmapped = extraction.unmapped();
        if unmapped > 0 {
            tracing::warn!("{unmapped} character codes had no Unicode mapping");
        }
        Ok(extraction)
    }

    /// Runs of one page. Content that cannot be decoded or parsed degrades to
    /// the runs read so far plus a warning.
    pub fn extract_runs(&self, doc: &Document, page: &Page) -> Result<PageText> {
        let mut interpreter = Interpreter {
            doc,
            options: &self.options,
            result: PageText {
                page: page.number,
                ..PageText::default()
            },
            fonts: HashMap::new(),
            forms: Vec::new(),
        };

        match doc.content_stream(page) {
            Ok(content) => {
                let mut state = GraphicsState::default();
                interpreter.run(&content, doc.resources(page), &mut state, 0);
            }
            Err(e) => interpreter.warn(format!(
                "Page {}: content stream could not be decoded: {e}",
                page.number
            )),
        }

        let result = interpreter.result;
        tracing::debug!(
            "Page {}: {} text runs, {} unmapped codes",
            result.page,
            result.runs.len(),
            result.unmapped
        );
        Ok(result)
    }
}

#[derive(Debug, Clone)]
struct TextState {
    matrix: Matrix,
    line_matrix: Matrix,
    char_spacing: f64,
    word_spacing: f64,
    /// `Tz / 100`.
    horizontal_scaling: f64,
    leading: f64,
    rise: f64,
    font_size: f64,
    font: Option<Rc<FontDecoder>>,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
            font_size: 0.0,
            font: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

struct Interpreter<'a> {
    doc: &'a Document,
    options: &'a ExtractionOptions,
    result: PageText,
    fonts: HashMap<ObjectId, Rc<FontDecoder>>,
    /// Form XObjects currently being interpreted.
    forms: Vec<ObjectId>,
}

impl Interpreter<'_> {
    fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.result.warnings.push(message);
    }

    fn run(&mut self, content: &[u8], resources: &Dictionary, state: &mut GraphicsState, depth: usize) {
        let (operations, error) = ContentParser::parse_partial(content);
        let mut saved: Vec<GraphicsState> = Vec::new();
        for operation in operations {
            self.apply(operation, resources, state, &mut saved, depth);
        }
        if let Some(e) = error {
            self.warn(format!(
                "Page {}: malformed content stream, remaining text skipped: {e}",
                self.result.page
            ));
        }
    }

    fn apply(
        &mut self,
        operation: ContentOperation,
        resources: &Dictionary,
        state: &mut GraphicsState,
        saved: &mut Vec<GraphicsState>,
        depth: usize,
    ) {
        use ContentOperation as Op;

        let text = &mut state.text;
        match operation {
            Op::SaveGraphicsState => saved.push(state.clone()),
            Op::RestoreGraphicsState => {
                if let Some(previous) = saved.pop() {
                    *state = previous;
                }
            }
            Op::Transform(m) => state.ctm = Matrix::from_array(m).then(&state.ctm),
            Op::BeginText => {
                text.matrix = Matrix::IDENTITY;
                text.line_matrix = Matrix::IDENTITY;
            }
            Op::SetCharSpacing(value) => text.char_spacing = value,
            Op::SetWordSpacing(value) => text.word_spacing = value,
            Op::SetHorizontalScaling(value) => text.horizontal_scaling = value / 100.0,
            Op::SetLeading(value) => text.leading = value,
            Op::SetTextRise(value) => text.rise = value,
            Op::SetFont(name, size) => {
                text.font_size = size;
                let font = self.font(resources, &name);
                state.text.font = Some(font);
            }
            Op::MoveText(tx, ty) => move_line(text, tx, ty),
            Op::MoveTextSetLeading(tx, ty) => {
                text.leading = -ty;
                move_line(text, tx, ty);
            }
            Op::SetTextMatrix(m) => {
                text.matrix = Matrix::from_array(m);
                text.line_matrix = text.matrix;
            }
            Op::NextLine => {
                let leading = text.leading;
                move_line(text, 0.0, -leading);
            }
            Op::ShowText(bytes) => self.show(state, &[TextElement::Text(bytes)]),
            Op::ShowTextArray(elements) => self.show(state, &elements),
            Op::NextLineShowText(bytes) => {
                let leading = text.leading;
                move_line(text, 0.0, -leading);
                self.show(state, &[TextElement::Text(bytes)]);
            }
            Op::SetSpacingNextLineShowText(word, character, bytes) => {
                text.word_spacing = word;
                text.char_spacing = character;
                let leading = text.leading;
                move_line(text, 0.0, -leading);
                self.show(state, &[TextElement::Text(bytes)]);
            }
            Op::PaintXObject(name) => self.paint_form(resources, &name, state, depth),
            _ => {}
        }
    }

    fn font(&mut self, resources: &Dictionary, name: &str) -> Rc<FontDecoder> {
        let doc = self.doc;
        let entry = doc
            .dict_get(resources, "Font")
            .and_then(Object::as_dict)
            .and_then(|fonts| fonts.get(name));

        if let Some(Object::Reference(id)) = entry {
            if let Some(cached) = self.fonts.get(id) {
                return Rc::clone(cached);
            }
        }
        match entry.and_then(|e| doc.resolve_dict(e)) {
            Some(dict) => {
                let decoder = Rc::new(FontDecoder::load(doc, dict));
                if let Some(Object::Reference(id)) = entry {
                    self.fonts.insert(*id, Rc::clone(&decoder));
                }
                decoder
            }
            None => {
                self.warn(format!(
                    "Page {}: font /{name} not found, using Helvetica metrics",
                    self.result.page
                ));
                Rc::new(FontDecoder::fallback())
            }
        }
    }

    fn show(&mut self, state: &mut GraphicsState, elements: &[TextElement]) {
        let font = match state.text.font.clone() {
            Some(font) => font,
            None => {
                self.warn(format!(
                    "Page {}: text shown without a font, using Helvetica metrics",
                    self.result.page
                ));
                let fallback = Rc::new(FontDecoder::fallback());
                state.text.font = Some(Rc::clone(&fallback));
                fallback
            }
        };
        let text_state = &mut state.text;
        let size = text_state.font_size;
        let scaling = text_state.horizontal_scaling;

        let origin = Matrix::translate(0.0, text_state.rise)
            .then(&text_state.matrix)
            .then(&state.ctm);
        let (x, y) = origin.apply(0.0, 0.0);
        let font_size = size * text_state.matrix.then(&state.ctm).vertical_scale();

        let mut shown = String::new();
        for element in elements {
            match element {
                TextElement::Text(bytes) => {
                    for glyph in font.decode(bytes) {
                        match glyph.text {
                            Some(ref t) => shown.push_str(t),
                            None => {
                                shown.push('\u{FFFD}');
                                self.result.unmapped += 1;
                            }
                        }
                        let spacing = text_state.char_spacing
                            + if glyph.is_space {
                                text_state.word_spacing
                            } else {
                                0.0
                            };
                        if font.is_vertical() {
                            advance(text_state, 0.0, -size + spacing);
                        } else {
                            advance(text_state, (glyph.width * size + spacing) * scaling, 0.0);
                        }
                    }
                }
                TextElement::Spacing(adjustment) => {
                    let gap = -adjustment / 1000.0;
                    if gap > self.options.space_threshold
                        && !shown.is_empty()
                        && !shown.ends_with(char::is_whitespace)
                    {
                        shown.push(' ');
                    }
                    if font.is_vertical() {
                        advance(text_state, 0.0, -gap * size);
                    } else {
                        advance(text_state, gap * size * scaling, 0.0);
                    }
                }
            }
        }

        if shown.is_empty() {
            return;
        }
        let text = if self.options.normalize_unicode {
            shown.nfkc().collect()
        } else {
            shown
        };
        let (end_x, end_y) = Matrix::translate(0.0, text_state.rise)
            .then(&text_state.matrix)
            .then(&state.ctm)
            .apply(0.0, 0.0);
        self.result.runs.push(TextRun {
            text,
            page: self.result.page,
            x,
            y,
            font_size,
            width: (end_x - x).hypot(end_y - y),
        });
    }

    fn paint_form(&mut self, resources: &Dictionary, name: &str, state: &GraphicsState, depth: usize) {
        let doc = self.doc;
        let Some(entry) = doc
            .dict_get(resources, "XObject")
            .and_then(Object::as_dict)
            .and_then(|xobjects| xobjects.get(name))
        else {
            self.warn(format!("Page {}: XObject /{name} not found", self.result.page));
            return;
        };
        let Some(stream) = doc.resolve(entry).as_stream() else {
            return;
        };
        if stream.dict.get_name("Subtype") != Some("Form") {
            return;
        }

        let id = entry.as_reference();
        if depth >= MAX_FORM_DEPTH || id.is_some_and(|id| self.forms.contains(&id)) {
            self.warn(format!(
                "Page {}: form XObject /{name} nested too deeply or recursive, skipped",
                self.result.page
            ));
            return;
        }

        let content = match decode_stream(stream) {
            Ok(content) => content,
            Err(e) => {
                self.warn(format!(
                    "Page {}: form XObject /{name} could not be decoded: {e}",
                    self.result.page
                ));
                return;
            }
        };
        let form_resources = doc
            .dict_get(&stream.dict, "Resources")
            .and_then(Object::as_dict)
            .unwrap_or(resources)
            .clone();
        let matrix = doc
            .dict_get(&stream.dict, "Matrix")
            .and_then(Object::as_number_array)
            .and_then(|m| Matrix::from_slice(&m))
            .unwrap_or_default();

        let mut form_state = state.clone();
        form_state.ctm = matrix.then(&state.ctm);
        if let Some(id) = id {
            self.forms.push(id);
        }
        self.run(&content, &form_resources, &mut form_state, depth + 1);
        if id.is_some() {
            self.forms.pop();
        }
    }
}

fn move_line(text: &mut TextState, tx: f64, ty: f64) {
    text.line_matrix = Matrix::translate(tx, ty).then(&text.line_matrix);
    text.matrix = text.line_matrix;
}

fn advance(text: &mut TextState, tx: f64, ty: f64) {
    text.matrix = Matrix::translate(tx, ty).then(&text.matrix);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Rect;
    use crate::objects::Stream;

    /// One-page document whose page shows `content` with Helvetica as /F1.
    fn document_with_content(content: &[u8]) -> Document {
        let mut doc = Document::new();
        let mut font = Dictionary::new();
        font.set("Type", Object::name("Font"));
        font.set("Subtype", Object::name("Type1"));
        font.set("BaseFont", Object::name("Helvetica"));
        font.set("Encoding", Object::name("WinAnsiEncoding"));
        let font_id = doc.add_object(font);

        let mut form = Stream::new(Dictionary::new(), b"BT /F1 10 Tf (form) Tj ET".to_vec());
        form.dict.set("Subtype", Object::name("Form"));
        form.dict.set(
            "Matrix",
            vec![1.into(), 0.into(), 0.into(), 1.into(), 100.into(), 50.into()],
        );
        let form_id = doc.add_object(form);

        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.to_vec()));
        let mut fonts = Dictionary::new();
        fonts.set("F1", font_id);
        let mut xobjects = Dictionary::new();
        xobjects.set("Fm1", form_id);
        let mut resources = Dictionary::new();
        resources.set("Font", fonts);
        resources.set("XObject", xobjects);

        let mut page = Dictionary::new();
        page.set("Type", Object::name("Page"));
        page.set("Contents", content_id);
        page.set("Resources", resources);
        page.set("MediaBox", Rect::LETTER.to_object());
        let page_id = doc.add_object(page);

        let mut pages = Dictionary::new();
        pages.set("Type", Object::name("Pages"));
        pages.set("Kids", vec![Object::Reference(page_id)]);
        pages.set("Count", 1);
        let pages_id = doc.add_object(pages);

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::name("Catalog"));
        catalog.set("Pages", pages_id);
        let catalog_id = doc.add_object(catalog);
        doc.trailer_mut().set("Root", catalog_id);
        doc.refresh_pages().unwrap();
        doc
    }

    fn runs_of(content: &[u8]) -> PageText {
        let doc = document_with_content(content);
        let page = doc.page(1).unwrap();
        TextExtractor::new().extract_runs(&doc, page).unwrap()
    }

    #[test]
    fn test_single_run_position_and_size() {
        let result = runs_of(b"BT /F1 12 Tf 72 700 Td (Hello) Tj ET");
        assert_eq!(result.runs.len(), 1);
        let run = &result.runs[0];
        assert_eq!(run.text, "Hello");
        assert_eq!(run.page, 1);
        assert_eq!((run.x, run.y), (72.0, 700.0));
        assert_eq!(run.font_size, 12.0);
        assert!(!result.is_lossy());
    }

    #[test]
    fn test_text_matrix_advances_by_glyph_widths() {
        let result = runs_of(b"BT /F1 10 Tf 100 100 Td (AB) Tj (C) Tj ET");
        assert_eq!(result.runs.len(), 2);
        // A and B are 667 units wide in Helvetica.
        assert!((result.runs[1].x - (100.0 + 13.34)).abs() < 1e-6);
    }

    #[test]
    fn test_tj_array_inserts_word_break() {
        let result = runs_of(b"BT /F1 12 Tf [(Hel) -20 (lo) -500 (world)] TJ ET");
        assert_eq!(result.runs[0].text, "Hello world");
    }

    #[test]
    fn test_empty_page_has_no_runs() {
        let result = runs_of(b"0 0 m 100 100 l S");
        assert!(result.runs.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_malformed_content_keeps_earlier_runs() {
        let result = runs_of(b"BT /F1 12 Tf (kept) Tj 12 Tf (lost) Tj ET");
        assert_eq!(result.runs.len(), 1);
        assert_eq!(result.runs[0].text, "kept");
        assert_eq!(result.warnings.len(), 1);
        assert!(result.is_lossy());
    }

    #[test]
    fn test_unmapped_codes_are_counted() {
        let result = runs_of(b"BT /F1 12 Tf <41 81 42> Tj ET");
        assert_eq!(result.runs[0].text, "A\u{FFFD}B");
        assert_eq!(result.unmapped, 1);
        assert!(result.is_lossy());
    }

    #[test]
    fn test_form_xobject_text_uses_form_matrix() {
        let result = runs_of(b"q 1 0 0 1 10 0 cm /Fm1 Do Q");
        assert_eq!(result.runs.len(), 1);
        assert_eq!(result.runs[0].text, "form");
        assert_eq!((result.runs[0].x, result.runs[0].y), (110.0, 50.0));
    }

    #[test]
    fn test_missing_font_warns_and_continues() {
        let result = runs_of(b"BT /F9 12 Tf (x) Tj ET");
        assert_eq!(result.runs[0].text, "x");
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_ligature_normalization() {
        let mut doc = document_with_content(b"BT /F2 12 Tf <0102> Tj ET");
        let mut encoding = Dictionary::new();
        encoding.set(
            "Differences",
            vec![Object::Integer(1), Object::name("fi"), Object::name("l")],
        );
        let mut font = Dictionary::new();
        font.set("Subtype", Object::name("Type1"));
        font.set("BaseFont", Object::name("Times-Roman"));
        font.set("Encoding", encoding);
        let font_id = doc.add_object(font);

        let page_id = doc.page(1).unwrap().id;
        let mut page = doc.get_dict(page_id).unwrap().clone();
        let mut resources = page.get("Resources").and_then(Object::as_dict).unwrap().clone();
        let mut fonts = resources.get("Font").and_then(Object::as_dict).unwrap().clone();
        fonts.set("F2", font_id);
        resources.set("Font", fonts);
        page.set("Resources", resources);
        doc.set_object(page_id, page.into());
        doc.refresh_pages().unwrap();
        let page = doc.page(1).unwrap();

        let normalized = TextExtractor::new().extract_runs(&doc, page).unwrap();
        assert_eq!(normalized.runs[0].text, "fil");

        let raw = TextExtractor::with_options(ExtractionOptions {
            normalize_unicode: false,
            ..ExtractionOptions::default()
        })
        .extract_runs(&doc, page)
        .unwrap();
        assert_eq!(raw.runs[0].text, "\u{FB01}l");
    }

    #[test]
    fn test_document_text_joins_pages() {
        let doc = document_with_content(b"BT /F1 12 Tf (one) Tj (two) Tj ET");
        let extraction = extract_text(&doc).unwrap();
        assert_eq!(extraction.text(), "one\ntwo\n");
        assert!(!extraction.is_lossy());
    }
}
