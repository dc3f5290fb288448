//! Font dictionaries as seen by text extraction: code splitting, Unicode
//! mapping and glyph advances.

use std::collections::HashMap;

use bitflags::bitflags;

use super::cmap::CMap;
use super::encoding::TextEncoding;
use super::glyph_list::glyph_name_to_unicode;
use super::metrics::StandardMetrics;
use crate::document::Document;
use crate::objects::{Dictionary, Object};
use crate::parser::filters::decode_stream;

bitflags! {
    /// `/Flags` of a font descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FontFlags: u32 {
        const FIXED_PITCH = 1 << 0;
        const SERIF = 1 << 1;
        const SYMBOLIC = 1 << 2;
        const SCRIPT = 1 << 3;
        const NONSYMBOLIC = 1 << 5;
        const ITALIC = 1 << 6;
        const ALL_CAP = 1 << 16;
        const SMALL_CAP = 1 << 17;
        const FORCE_BOLD = 1 << 18;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    Type1,
    TrueType,
    Type3,
    Type0,
}

/// One character code read from a string.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub code: u32,
    /// Code length in bytes.
    pub bytes: usize,
    /// Unicode text, `None` when the code cannot be mapped.
    pub text: Option<String>,
    /// Horizontal advance in text space units (before font size scaling).
    pub width: f64,
    /// Single-byte code 32, which receives word spacing.
    pub is_space: bool,
}

#[derive(Debug, Clone)]
enum Encoding {
    Simple {
        base: Option<TextEncoding>,
        differences: HashMap<u8, String>,
    },
    Composite {
        cmap: CMap,
        /// Codes are UTF-16 values (`Uni*-UCS2-*`, `*-UTF16-*` CMaps).
        ucs2: bool,
    },
}

#[derive(Debug, Clone)]
enum Widths {
    Simple {
        first_char: u32,
        widths: Vec<f64>,
        missing: f64,
    },
    Cid {
        widths: HashMap<u32, f64>,
        default: f64,
    },
    /// No `/Widths`: standard metrics when the base font is known.
    Standard(Option<StandardMetrics>),
}

/// Decoder for one font resource.
#[derive(Debug, Clone)]
pub struct FontDecoder {
    pub base_font: String,
    pub kind: FontKind,
    pub flags: FontFlags,
    /// Glyph space to text space. Only Type 3 fonts carry their own.
    pub font_matrix: [f64; 6],
    /// The font dictionary itself.
    pub dict: Dictionary,
    /// First descendant of a Type 0 font.
    pub descendant: Option<Dictionary>,
    pub descriptor: Option<Dictionary>,
    to_unicode: Option<CMap>,
    encoding: Encoding,
    widths: Widths,
}

const DEFAULT_FONT_MATRIX: [f64; 6] = [0.001, 0.0, 0.0, 0.001, 0.0, 0.0];

impl FontDecoder {
    /// Builds a decoder from a font dictionary. Problems are reported as
    /// document warnings and degrade to defaults.
    pub fn load(doc: &Document, font: &Dictionary) -> Self {
        let kind = match font.get_name("Subtype") {
            Some("Type0") => FontKind::Type0,
            Some("TrueType") => FontKind::TrueType,
            Some("Type3") => FontKind::Type3,
            _ => FontKind::Type1,
        };
        let base_font = font.get_name("BaseFont").unwrap_or("Unnamed").to_string();

        let descendant = (kind == FontKind::Type0)
            .then(|| {
                doc.dict_get(font, "DescendantFonts")
                    .and_then(Object::as_array)
                    .and_then(|kids| kids.first())
                    .and_then(|kid| doc.resolve_dict(kid))
                    .cloned()
            })
            .flatten();
        let descriptor = descendant
            .as_ref()
            .unwrap_or(font)
            .get("FontDescriptor")
            .and_then(|d| doc.resolve_dict(d))
            .cloned();
        let flags = descriptor
            .as_ref()
            .and_then(|d| d.get_integer("Flags"))
            .map(|f| FontFlags::from_bits_truncate(f as u32))
            .unwrap_or_default();

        let font_matrix = match doc.dict_get(font, "FontMatrix").and_then(Object::as_number_array) {
            Some(m) if kind == FontKind::Type3 && m.len() == 6 => [m[0], m[1], m[2], m[3], m[4], m[5]],
            _ => DEFAULT_FONT_MATRIX,
        };

        let to_unicode = doc
            .dict_get(font, "ToUnicode")
            .and_then(Object::as_stream)
            .and_then(|stream| match decode_stream(stream) {
                Ok(data) => match CMap::parse(&data) {
                    Ok(cmap) => Some(cmap),
                    Err(e) => {
                        doc.warn(format!("Font {base_font}: unreadable ToUnicode CMap: {e}"));
                        None
                    }
                },
                Err(e) => {
                    doc.warn(format!("Font {base_font}: cannot decode ToUnicode stream: {e}"));
                    None
                }
            });

        let encoding = if kind == FontKind::Type0 {
            composite_encoding(doc, font, &base_font)
        } else {
            simple_encoding(doc, font, kind, flags)
        };

        let widths = match &descendant {
            Some(cid_font) => cid_widths(doc, cid_font),
            None => simple_widths(doc, font, descriptor.as_ref(), &base_font),
        };

        Self {
            base_font,
            kind,
            flags,
            font_matrix,
            dict: font.clone(),
            descendant,
            descriptor,
            to_unicode,
            encoding,
            widths,
        }
    }

    /// Stand-in for a missing font resource: Helvetica metrics, WinAnsi codes.
    pub fn fallback() -> Self {
        Self {
            base_font: "Helvetica".to_string(),
            kind: FontKind::Type1,
            flags: FontFlags::NONSYMBOLIC,
            font_matrix: DEFAULT_FONT_MATRIX,
            dict: Dictionary::new(),
            descendant: None,
            descriptor: None,
            to_unicode: None,
            encoding: Encoding::Simple {
                base: Some(TextEncoding::WinAnsiEncoding),
                differences: HashMap::new(),
            },
            widths: Widths::Standard(Some(StandardMetrics::Helvetica)),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.encoding, Encoding::Composite { .. })
    }

    pub fn is_vertical(&self) -> bool {
        matches!(&self.encoding, Encoding::Composite { cmap, .. } if cmap.wmode == 1)
    }

    pub fn has_to_unicode(&self) -> bool {
        self.to_unicode.is_some()
    }

    /// Splits a shown string into glyphs.
    pub fn decode(&self, data: &[u8]) -> Vec<Glyph> {
        match &self.encoding {
            Encoding::Composite { cmap, .. } => cmap
                .codes(data)
                .into_iter()
                .map(|(code, bytes)| self.glyph(code, bytes))
                .collect(),
            Encoding::Simple { .. } => data.iter().map(|&b| self.glyph(b as u32, 1)).collect(),
        }
    }

    fn glyph(&self, code: u32, bytes: usize) -> Glyph {
        let text = self.unicode(code, bytes);
        let width = self.width(code, bytes, text.as_deref());
        Glyph {
            code,
            bytes,
            text,
            width,
            is_space: bytes == 1 && code == 32,
        }
    }

    /// Unicode for a code: `/ToUnicode` first, then the font encoding.
    pub fn unicode(&self, code: u32, bytes: usize) -> Option<String> {
        if let Some(text) = self.to_unicode.as_ref().and_then(|c| c.lookup(code, bytes)) {
            return Some(text);
        }
        match &self.encoding {
            Encoding::Simple { base, differences } => {
                let byte = code as u8;
                if let Some(name) = differences.get(&byte) {
                    return glyph_name_to_unicode(name);
                }
                match base {
                    Some(encoding) => encoding.decode_byte(byte).map(String::from),
                    None => (0x20..=0x7E)
                        .contains(&byte)
                        .then(|| char::from(byte).to_string()),
                }
            }
            Encoding::Composite { ucs2: true, .. } => char::from_u32(code).map(String::from),
            Encoding::Composite { .. } => None,
        }
    }

    /// Glyph name assigned by `/Differences`.
    pub fn glyph_name(&self, code: u32) -> Option<&str> {
        match &self.encoding {
            Encoding::Simple { differences, .. } => {
                differences.get(&(code as u8)).map(String::as_str)
            }
            Encoding::Composite { .. } => None,
        }
    }

    /// CID selected by a code of a composite font; simple fonts return the code.
    pub fn cid(&self, code: u32, bytes: usize) -> u32 {
        match &self.encoding {
            Encoding::Composite { cmap, ucs2: false } => cmap.cid(code, bytes).unwrap_or(code),
            _ => code,
        }
    }

    /// Advance of a code in text space units.
    pub fn width(&self, code: u32, bytes: usize, text: Option<&str>) -> f64 {
        let glyph_units = match &self.widths {
            Widths::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .unwrap_or(*missing),
            Widths::Cid { widths, default } => {
                let cid = self.cid(code, bytes);
                widths.get(&cid).copied().unwrap_or(*default)
            }
            Widths::Standard(metrics) => {
                let ch = text.and_then(|t| t.chars().next()).unwrap_or(' ');
                metrics.map(|m| m.width(ch)).unwrap_or(500.0)
            }
        };
        glyph_units * self.font_matrix[0]
    }
}

fn simple_encoding(doc: &Document, font: &Dictionary, kind: FontKind, flags: FontFlags) -> Encoding {
    let symbolic = flags.contains(FontFlags::SYMBOLIC) && !flags.contains(FontFlags::NONSYMBOLIC);
    let default_base = match kind {
        _ if symbolic => None,
        FontKind::TrueType => Some(TextEncoding::WinAnsiEncoding),
        FontKind::Type3 => None,
        _ => Some(TextEncoding::StandardEncoding),
    };

    match doc.dict_get(font, "Encoding") {
        Some(Object::Name(name)) => Encoding::Simple {
            base: TextEncoding::from_name(name).or(default_base),
            differences: HashMap::new(),
        },
        Some(Object::Dictionary(dict)) => {
            let base = dict
                .get_name("BaseEncoding")
                .and_then(TextEncoding::from_name)
                .or(default_base);
            let differences = doc
                .dict_get(dict, "Differences")
                .and_then(Object::as_array)
                .map(|items| parse_differences(items.as_slice()))
                .unwrap_or_default();
            Encoding::Simple { base, differences }
        }
        _ => Encoding::Simple {
            base: default_base,
            differences: HashMap::new(),
        },
    }
}

/// `[code /name /name code /name ...]`
fn parse_differences(items: &[Object]) -> HashMap<u8, String> {
    let mut differences = HashMap::new();
    let mut code: i64 = 0;
    for item in items {
        match item {
            Object::Integer(start) => code = *start,
            Object::Name(name) => {
                if (0..=255).contains(&code) {
                    differences.insert(code as u8, name.clone());
                }
                code += 1;
            }
            _ => {}
        }
    }
    differences
}

fn composite_encoding(doc: &Document, font: &Dictionary, base_font: &str) -> Encoding {
    match doc.dict_get(font, "Encoding") {
        Some(Object::Name(name)) => {
            if let Some(cmap) = CMap::predefined(name) {
                return Encoding::Composite { cmap, ucs2: false };
            }
            if name.contains("UCS2") || name.contains("UTF16") {
                let mut cmap = CMap::identity_h();
                cmap.name = Some(name.clone());
                return Encoding::Composite { cmap, ucs2: true };
            }
            doc.warn(format!(
                "Font {base_font}: predefined CMap {name} is not available, assuming Identity-H"
            ));
            Encoding::Composite {
                cmap: CMap::identity_h(),
                ucs2: false,
            }
        }
        Some(Object::Stream(stream)) => {
            let parsed = decode_stream(stream)
                .map_err(|e| e.to_string())
                .and_then(|data| CMap::parse(&data).map_err(|e| e.to_string()));
            match parsed {
                Ok(mut cmap) => {
                    if !cmap.has_codespace() {
                        let parent = cmap.parent.clone().and_then(|p| CMap::predefined(&p));
                        cmap = parent.unwrap_or_else(CMap::identity_h);
                    }
                    Encoding::Composite { cmap, ucs2: false }
                }
                Err(e) => {
                    doc.warn(format!("Font {base_font}: unreadable encoding CMap: {e}"));
                    Encoding::Composite {
                        cmap: CMap::identity_h(),
                        ucs2: false,
                    }
                }
            }
        }
        _ => Encoding::Composite {
            cmap: CMap::identity_h(),
            ucs2: false,
        },
    }
}

fn simple_widths(
    doc: &Document,
    font: &Dictionary,
    descriptor: Option<&Dictionary>,
    base_font: &str,
) -> Widths {
    let missing = descriptor
        .and_then(|d| d.get_number("MissingWidth"))
        .unwrap_or(0.0);
    match doc.dict_get(font, "Widths").and_then(Object::as_array) {
        Some(items) => Widths::Simple {
            first_char: doc
                .dict_get(font, "FirstChar")
                .and_then(Object::as_integer)
                .unwrap_or(0)
                .max(0) as u32,
            widths: items
                .iter()
                .map(|w| doc.resolve(w).as_number().unwrap_or(missing))
                .collect(),
            missing,
        },
        None => Widths::Standard(StandardMetrics::for_base_font(base_font)),
    }
}

/// `/W` entries: `c [w1 w2 ...]` or `c_first c_last w`.
fn cid_widths(doc: &Document, cid_font: &Dictionary) -> Widths {
    let default = doc
        .dict_get(cid_font, "DW")
        .and_then(Object::as_number)
        .unwrap_or(1000.0);
    let mut widths = HashMap::new();
    let items = doc
        .dict_get(cid_font, "W")
        .and_then(Object::as_array)
        .cloned()
        .unwrap_or_default();

    let mut i = 0;
    while i < items.len() {
        let Some(first) = doc.resolve(&items[i]).as_integer() else {
            i += 1;
            continue;
        };
        match items.get(i + 1).map(|o| doc.resolve(o)) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    if let Some(w) = doc.resolve(w).as_number() {
                        widths.insert(first as u32 + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let last = last.as_integer().unwrap_or(first);
                let w = items
                    .get(i + 2)
                    .and_then(|o| doc.resolve(o).as_number())
                    .unwrap_or(default);
                // Guard against absurd ranges in broken files.
                for cid in first..=last.min(first + 0xFFFF) {
                    widths.insert(cid as u32, w);
                }
                i += 3;
            }
            None => break,
        }
    }
    Widths::Cid { widths, default }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Stream;

    fn font_dict(entries: &[(&str, Object)]) -> Dictionary {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_simple_font_with_widths_and_differences() {
        let doc = Document::new();
        let mut encoding = Dictionary::new();
        encoding.set("BaseEncoding", Object::name("WinAnsiEncoding"));
        encoding.set(
            "Differences",
            vec![Object::Integer(65), Object::name("bullet"), Object::name("fi")],
        );
        let font = font_dict(&[
            ("Subtype", Object::name("TrueType")),
            ("BaseFont", Object::name("Arial")),
            ("FirstChar", Object::Integer(65)),
            ("Widths", vec![Object::Integer(350), Object::Integer(556)].into()),
            ("Encoding", encoding.into()),
        ]);
        let decoder = FontDecoder::load(&doc, &font);

        let glyphs = decoder.decode(b"ABC");
        assert_eq!(glyphs[0].text.as_deref(), Some("\u{2022}"));
        assert_eq!(glyphs[1].text.as_deref(), Some("\u{FB01}"));
        assert_eq!(glyphs[2].text.as_deref(), Some("C"));
        assert!((glyphs[0].width - 0.35).abs() < 1e-9);
        assert_eq!(glyphs[2].width, 0.0);
        assert_eq!(decoder.glyph_name(65), Some("bullet"));
    }

    #[test]
    fn test_standard_font_without_widths() {
        let doc = Document::new();
        let font = font_dict(&[
            ("Subtype", Object::name("Type1")),
            ("BaseFont", Object::name("Helvetica")),
            ("Encoding", Object::name("WinAnsiEncoding")),
        ]);
        let decoder = FontDecoder::load(&doc, &font);
        let glyphs = decoder.decode(b"A ");
        assert!((glyphs[0].width - 0.667).abs() < 1e-9);
        assert!(glyphs[1].is_space);
    }

    #[test]
    fn test_type0_identity_with_to_unicode() {
        let mut doc = Document::new();
        let cmap = b"1 begincodespacerange <0000> <FFFF> endcodespacerange
1 beginbfchar <0005> <0048> endbfchar";
        let to_unicode = doc.add_object(Stream::new(Dictionary::new(), cmap.to_vec()));
        let descendant = font_dict(&[
            ("Subtype", Object::name("CIDFontType2")),
            ("DW", Object::Integer(1000)),
            (
                "W",
                vec![
                    Object::Integer(5),
                    vec![Object::Integer(722)].into(),
                    Object::Integer(10),
                    Object::Integer(12),
                    Object::Integer(250),
                ]
                .into(),
            ),
        ]);
        let descendant_id = doc.add_object(descendant);
        let font = font_dict(&[
            ("Subtype", Object::name("Type0")),
            ("BaseFont", Object::name("ABCDEF+Noto")),
            ("Encoding", Object::name("Identity-H")),
            ("DescendantFonts", vec![Object::Reference(descendant_id)].into()),
            ("ToUnicode", Object::Reference(to_unicode)),
        ]);
        let decoder = FontDecoder::load(&doc, &font);

        let glyphs = decoder.decode(&[0x00, 0x05, 0x00, 0x0B, 0x00, 0x30]);
        assert_eq!(glyphs.len(), 3);
        assert_eq!(glyphs[0].text.as_deref(), Some("H"));
        assert!((glyphs[0].width - 0.722).abs() < 1e-9);
        assert!((glyphs[1].width - 0.25).abs() < 1e-9);
        assert_eq!(glyphs[2].text, None);
        assert!((glyphs[2].width - 1.0).abs() < 1e-9);
        assert!(!glyphs[0].is_space);
        assert_eq!(decoder.cid(0x0030, 2), 0x30);
    }

    #[test]
    fn test_ucs2_cmap_maps_codes_directly() {
        let doc = Document::new();
        let font = font_dict(&[
            ("Subtype", Object::name("Type0")),
            ("Encoding", Object::name("UniGB-UCS2-H")),
        ]);
        let decoder = FontDecoder::load(&doc, &font);
        let glyphs = decoder.decode(&[0x4E, 0x2D]);
        assert_eq!(glyphs[0].text.as_deref(), Some("\u{4E2D}"));
    }

    #[test]
    fn test_type3_font_matrix_scales_widths() {
        let doc = Document::new();
        let font = font_dict(&[
            ("Subtype", Object::name("Type3")),
            (
                "FontMatrix",
                vec![
                    Object::Real(0.01),
                    0.into(),
                    0.into(),
                    Object::Real(0.01),
                    0.into(),
                    0.into(),
                ]
                .into(),
            ),
            ("FirstChar", Object::Integer(97)),
            ("Widths", vec![Object::Integer(50)].into()),
        ]);
        let decoder = FontDecoder::load(&doc, &font);
        let glyph = &decoder.decode(b"a")[0];
        assert!((glyph.width - 0.5).abs() < 1e-9);
        assert_eq!(glyph.text.as_deref(), Some("a"));
    }
}
