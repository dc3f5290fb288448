//! Font programs for rendering: embedded TrueType/OpenType data read with
//! ttf-parser, and system substitutes when a document does not embed a
//! usable program.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use ttf_parser::{Face, GlyphId, OutlineBuilder, PlatformId};

use crate::document::Document;
use crate::graphics::matrix::Matrix;
use crate::graphics::path::Path;
use crate::objects::{Dictionary, Object};
use crate::parser::filters::decode_stream;
use crate::text::font::{FontDecoder, FontFlags, FontKind, Glyph};

/// How deep to look below each font directory.
const MAX_SCAN_DEPTH: usize = 6;

/// Raw font file contents plus the face index inside a collection.
#[derive(Debug)]
pub struct FontProgram {
    data: Vec<u8>,
    index: u32,
    /// File path or `embedded`, for messages.
    pub source: String,
}

impl FontProgram {
    /// Accepts data only when ttf-parser can read a face from it.
    pub fn new(data: Vec<u8>, source: impl Into<String>) -> Option<Self> {
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        let index = (0..count.max(1)).find(|&i| Face::parse(&data, i).is_ok())?;
        Some(Self {
            data,
            index,
            source: source.into(),
        })
    }

    pub fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, self.index).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Family {
    Sans,
    Serif,
    Mono,
}

/// Finds and caches substitute fonts in a set of directories.
#[derive(Debug)]
pub struct FontLibrary {
    dirs: Vec<PathBuf>,
    files: OnceLock<Vec<PathBuf>>,
    loaded: Mutex<HashMap<(Family, bool, bool), Option<Arc<FontProgram>>>>,
}

impl FontLibrary {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            files: OnceLock::new(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    fn files(&self) -> &[PathBuf] {
        self.files.get_or_init(|| {
            let mut files = Vec::new();
            for dir in &self.dirs {
                collect_font_files(dir, 0, &mut files);
            }
            files.sort();
            tracing::debug!("Indexed {} system font files", files.len());
            files
        })
    }

    /// A substitute for `base_font`, chosen by family and style.
    pub fn substitute(&self, base_font: &str, flags: FontFlags) -> Option<Arc<FontProgram>> {
        let name = normalize_name(base_font);
        let family = if name.contains("courier") || name.contains("mono") || flags.contains(FontFlags::FIXED_PITCH) {
            Family::Mono
        } else if name.contains("times")
            || name.contains("roman")
            || name.contains("georgia")
            || name.contains("garamond")
            || name.contains("minion")
            || (name.contains("serif") && !name.contains("sans"))
            || flags.contains(FontFlags::SERIF)
        {
            Family::Serif
        } else {
            Family::Sans
        };
        let bold = name.contains("bold")
            || name.contains("black")
            || name.contains("heavy")
            || flags.contains(FontFlags::FORCE_BOLD);
        let italic = name.contains("italic") || name.contains("oblique") || flags.contains(FontFlags::ITALIC);
        let key = (family, bold, italic);

        if let Ok(loaded) = self.loaded.lock() {
            if let Some(found) = loaded.get(&key) {
                return found.clone();
            }
        }

        let program = self.pick(family, bold, italic);
        if let Ok(mut loaded) = self.loaded.lock() {
            loaded.insert(key, program.clone());
        }
        program
    }

    fn pick(&self, family: Family, bold: bool, italic: bool) -> Option<Arc<FontProgram>> {
        let preferred: &[&str] = match family {
            Family::Sans => &[
                "arial", "helvetica", "liberationsans", "dejavusans", "nimbussans", "freesans",
                "notosans", "opensans", "roboto",
            ],
            Family::Serif => &[
                "timesnewroman", "times", "liberationserif", "dejavuserif", "nimbusroman",
                "freeserif", "notoserif",
            ],
            Family::Mono => &[
                "couriernew", "courier", "liberationmono", "dejavusansmono", "nimbusmono",
                "freemono", "notosansmono",
            ],
        };

        let mut ranked: Vec<(usize, &PathBuf)> = self
            .files()
            .iter()
            .filter_map(|path| {
                let stem = normalize_name(&path.file_stem()?.to_string_lossy());
                if family != Family::Mono && stem.contains("mono") {
                    return None;
                }
                let rank = preferred.iter().position(|p| stem.starts_with(p))?;
                let style_miss = usize::from(is_bold(&stem) != bold) + usize::from(is_italic(&stem) != italic);
                Some((rank * 4 + style_miss, path))
            })
            .collect();
        ranked.sort_by_key(|(score, path)| (*score, path.as_os_str().len()));

        let fallback = self.files().iter().map(|path| (usize::MAX, path));
        for (_, path) in ranked.into_iter().chain(fallback) {
            let Ok(data) = std::fs::read(path) else {
                continue;
            };
            if let Some(program) = FontProgram::new(data, path.display().to_string()) {
                tracing::debug!("Using {} as substitute font", program.source);
                return Some(Arc::new(program));
            }
        }
        None
    }
}

// Short Windows file names mark styles with suffixes (`arialbd`, `timesbi`).
fn is_bold(stem: &str) -> bool {
    stem.contains("bold")
        || stem.contains("black")
        || (stem.len() <= 8 && (stem.ends_with("bd") || stem.ends_with("bi")))
}

fn is_italic(stem: &str) -> bool {
    stem.contains("italic") || stem.contains("oblique") || (stem.len() <= 8 && stem.ends_with('i'))
}

fn collect_font_files(dir: &FsPath, depth: usize, out: &mut Vec<PathBuf>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_font_files(&path, depth + 1, out);
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc"))
        {
            out.push(path);
        }
    }
}

/// Lower-case alphanumerics of a font name without its subset tag.
fn normalize_name(name: &str) -> String {
    let name = match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.chars().all(|c| c.is_ascii_uppercase()) => rest,
        _ => name,
    };
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Directories searched for substitute fonts when none are configured.
pub fn default_font_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = [
        "/usr/share/fonts",
        "/usr/local/share/fonts",
        "/Library/Fonts",
        "/System/Library/Fonts",
        "C:\\Windows\\Fonts",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        dirs.push(home.join(".fonts"));
        dirs.push(home.join(".local/share/fonts"));
        dirs.push(home.join("Library/Fonts"));
    }
    dirs
}

#[derive(Debug)]
enum CidToGid {
    Identity,
    Map(Vec<u16>),
}

/// A font resource prepared for drawing.
#[derive(Debug)]
pub struct RenderFont {
    pub decoder: FontDecoder,
    program: Option<Arc<FontProgram>>,
    /// The program is a system substitute, not the document's own.
    pub substituted: bool,
    cid_to_gid: CidToGid,
    outlines: RefCell<HashMap<u16, Option<Path>>>,
}

impl RenderFont {
    /// Loads the embedded program or a substitute. The second value explains
    /// a substitution or a missing program.
    pub fn load(doc: &Document, decoder: FontDecoder, library: &FontLibrary) -> (Self, Option<String>) {
        let mut warning = None;
        let mut program = None;
        let mut substituted = false;

        if decoder.kind != FontKind::Type3 {
            program = embedded_program(doc, &decoder);
            if program.is_none() {
                program = library.substitute(&decoder.base_font, decoder.flags);
                substituted = program.is_some();
                warning = Some(match &program {
                    Some(p) => format!(
                        "Font {} is not embedded in a usable form, substituted with {}",
                        decoder.base_font, p.source
                    ),
                    None => format!(
                        "Font {} is not embedded and no substitute font was found; its text is not drawn",
                        decoder.base_font
                    ),
                });
            }
        }

        let cid_to_gid = decoder
            .descendant
            .as_ref()
            .and_then(|cid_font| doc.dict_get(cid_font, "CIDToGIDMap"))
            .and_then(Object::as_stream)
            .and_then(|stream| decode_stream(stream).ok())
            .map(|data| {
                CidToGid::Map(
                    data.chunks_exact(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                        .collect(),
                )
            })
            .unwrap_or(CidToGid::Identity);

        (
            Self {
                decoder,
                program,
                substituted,
                cid_to_gid,
                outlines: RefCell::new(HashMap::new()),
            },
            warning,
        )
    }

    pub fn is_type3(&self) -> bool {
        self.decoder.kind == FontKind::Type3
    }

    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    /// Outline of a glyph in text space (one unit per em), and a horizontal
    /// scale fitting a substitute's advance to the document's width.
    pub fn outline(&self, glyph: &Glyph) -> Option<(Path, f64)> {
        let program = self.program.as_ref()?;
        let face = program.face()?;
        let gid = self.glyph_id(&face, glyph)?;

        let cached = self.outlines.borrow().get(&gid.0).cloned();
        let path = match cached {
            Some(path) => path?,
            None => {
                let path = build_outline(&face, gid);
                self.outlines.borrow_mut().insert(gid.0, path.clone());
                path?
            }
        };

        let mut stretch = 1.0;
        if self.substituted {
            let units = f64::from(face.units_per_em().max(1));
            if let Some(advance) = face.glyph_hor_advance(gid).filter(|a| *a > 0) {
                let natural = f64::from(advance) / units;
                if glyph.width > 0.0 {
                    stretch = (glyph.width / natural).clamp(0.5, 2.0);
                }
            }
        }
        Some((path, stretch))
    }

    fn glyph_id(&self, face: &Face<'_>, glyph: &Glyph) -> Option<GlyphId> {
        let ch = glyph.text.as_deref().and_then(|t| {
            let mut chars = t.chars();
            let first = chars.next()?;
            chars.next().is_none().then_some(first)
        });
        if self.substituted {
            return ch.and_then(|c| face.glyph_index(c));
        }

        if self.decoder.is_composite() {
            let cid = self.decoder.cid(glyph.code, glyph.bytes);
            let gid = match &self.cid_to_gid {
                CidToGid::Identity => u16::try_from(cid).ok()?,
                CidToGid::Map(map) => *map.get(cid as usize)?,
            };
            return Some(GlyphId(gid));
        }

        let code = glyph.code;
        let symbolic = self.decoder.flags.contains(FontFlags::SYMBOLIC);
        if !symbolic {
            if let Some(gid) = self
                .decoder
                .glyph_name(code)
                .and_then(|name| face.glyph_index_by_name(name))
            {
                return Some(gid);
            }
            if let Some(gid) = ch.and_then(|c| face.glyph_index(c)) {
                return Some(gid);
            }
        }
        let windows = [0xF000 + code, code, 0xF100 + code, 0xF200 + code];
        cmap_lookup(face, PlatformId::Windows, 0, &windows)
            .or_else(|| cmap_lookup(face, PlatformId::Macintosh, 0, &[code]))
            .or_else(|| ch.and_then(|c| face.glyph_index(c)))
            .or_else(|| {
                // Subset fonts without a cmap index glyphs by code.
                face.tables()
                    .cmap
                    .is_none()
                    .then(|| u16::try_from(code).ok().map(GlyphId))
                    .flatten()
            })
    }
}

fn cmap_lookup(face: &Face<'_>, platform: PlatformId, encoding: u16, codes: &[u32]) -> Option<GlyphId> {
    let cmap = face.tables().cmap?;
    cmap.subtables
        .into_iter()
        .filter(|s| s.platform_id == platform && s.encoding_id == encoding)
        .find_map(|subtable| {
            codes
                .iter()
                .find_map(|&code| subtable.glyph_index(code).filter(|g| g.0 != 0))
        })
}

fn embedded_program(doc: &Document, decoder: &FontDecoder) -> Option<Arc<FontProgram>> {
    let descriptor = decoder.descriptor.as_ref()?;
    let stream = ["FontFile2", "FontFile3"]
        .iter()
        .find_map(|key| doc.dict_get(descriptor, key).and_then(Object::as_stream))?;
    let data = match decode_stream(stream) {
        Ok(data) => data,
        Err(e) => {
            doc.warn(format!("Font {}: cannot decode font program: {e}", decoder.base_font));
            return None;
        }
    };
    FontProgram::new(data, "embedded").map(Arc::new)
}

/// Outline in em units, y up.
fn build_outline(face: &Face<'_>, gid: GlyphId) -> Option<Path> {
    let scale = 1.0 / f64::from(face.units_per_em().max(1));
    let mut builder = PathOutline {
        path: Path::new(),
        scale,
    };
    face.outline_glyph(gid, &mut builder)?;
    Some(builder.path)
}

struct PathOutline {
    path: Path,
    scale: f64,
}

impl OutlineBuilder for PathOutline {
    fn move_to(&mut self, x: f32, y: f32) {
        self.path.move_to(f64::from(x) * self.scale, f64::from(y) * self.scale);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.path.line_to(f64::from(x) * self.scale, f64::from(y) * self.scale);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let Some(p0) = self.path.current_point() else {
            return;
        };
        let q = (f64::from(x1) * self.scale, f64::from(y1) * self.scale);
        let p = (f64::from(x) * self.scale, f64::from(y) * self.scale);
        let c1 = (p0.0 + 2.0 / 3.0 * (q.0 - p0.0), p0.1 + 2.0 / 3.0 * (q.1 - p0.1));
        let c2 = (p.0 + 2.0 / 3.0 * (q.0 - p.0), p.1 + 2.0 / 3.0 * (q.1 - p.1));
        self.path.curve_to(c1, c2, p);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let s = self.scale;
        self.path.curve_to(
            (f64::from(x1) * s, f64::from(y1) * s),
            (f64::from(x2) * s, f64::from(y2) * s),
            (f64::from(x) * s, f64::from(y) * s),
        );
    }

    fn close(&mut self) {
        self.path.close();
    }
}

/// Content of a Type 3 glyph procedure and the font matrix it is drawn with.
pub fn type3_glyph(doc: &Document, font: &RenderFont, glyph: &Glyph) -> Option<(Vec<u8>, Matrix)> {
    let name = font.decoder.glyph_name(glyph.code)?;
    let procs = doc
        .dict_get(&font.decoder.dict, "CharProcs")
        .and_then(|p| doc.resolve_dict(p))?;
    let stream = doc.dict_get(procs, name)?.as_stream()?;
    let content = decode_stream(stream).ok()?;
    Some((content, Matrix::from_array(font.decoder.font_matrix)))
}

/// Resources of a Type 3 font, if it carries its own.
pub fn type3_resources<'a>(doc: &'a Document, font: &'a RenderFont) -> Option<&'a Dictionary> {
    doc.dict_get(&font.decoder.dict, "Resources")
        .and_then(|r| doc.resolve_dict(r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name_strips_subset_tag() {
        assert_eq!(normalize_name("ABCDEF+Times-Bold"), "timesbold");
        assert_eq!(normalize_name("Arial,BoldItalic"), "arialbolditalic");
        assert_eq!(normalize_name("abcdef+Name"), "abcdefname");
    }

    #[test]
    fn test_style_detection() {
        assert!(is_bold("liberationsansbold"));
        assert!(is_bold("arialbd"));
        assert!(is_italic("dejavusansoblique"));
        assert!(is_italic("ariali"));
        assert!(!is_italic("liberationsansregular"));
    }

    #[test]
    fn test_library_without_fonts_has_no_substitute() {
        let dir = tempfile::tempdir().unwrap();
        let library = FontLibrary::new(vec![dir.path().to_path_buf()]);
        assert!(library.substitute("Helvetica", FontFlags::NONSYMBOLIC).is_none());
        // Unreadable files are skipped.
        std::fs::write(dir.path().join("Broken.ttf"), b"not a font").unwrap();
        let library = FontLibrary::new(vec![dir.path().to_path_buf()]);
        assert!(library.substitute("Helvetica", FontFlags::NONSYMBOLIC).is_none());
    }

    #[test]
    fn test_font_program_rejects_garbage() {
        assert!(FontProgram::new(vec![0; 64], "test").is_none());
    }

    #[test]
    fn test_missing_program_warns() {
        let dir = tempfile::tempdir().unwrap();
        let library = FontLibrary::new(vec![dir.path().to_path_buf()]);
        let doc = Document::new();
        let (font, warning) = RenderFont::load(&doc, FontDecoder::fallback(), &library);
        assert!(!font.has_program());
        assert!(warning.unwrap().contains("no substitute"));
    }
}
