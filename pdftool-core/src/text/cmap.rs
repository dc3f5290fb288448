//! CMap and ToUnicode support for text extraction
//!
//! A CMap splits a string into character codes (codespace ranges) and maps
//! each code either to Unicode (`bfchar`/`bfrange`, as in `/ToUnicode`) or to a
//! CID (`cidchar`/`cidrange`, as in embedded `/Encoding` CMaps).

use std::collections::HashMap;

use crate::parser::lexer::{Lexer, Token};
use crate::parser::ParseResult;

/// Codes of one byte length between two bounds (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRange {
    pub low: u32,
    pub high: u32,
    pub bytes: usize,
}

impl CodeRange {
    pub fn contains(&self, code: u32, bytes: usize) -> bool {
        bytes == self.bytes && code >= self.low && code <= self.high
    }
}

#[derive(Debug, Clone)]
enum RangeTarget {
    /// UTF-16BE start value, incremented per code.
    Incrementing(Vec<u16>),
    /// One explicit string per code.
    Explicit(Vec<String>),
}

#[derive(Debug, Clone)]
struct BfRange {
    low: u32,
    high: u32,
    bytes: usize,
    target: RangeTarget,
}

#[derive(Debug, Clone, Copy)]
struct CidRange {
    low: u32,
    high: u32,
    bytes: usize,
    first_cid: u32,
}

/// A parsed CMap.
#[derive(Debug, Clone, Default)]
pub struct CMap {
    pub name: Option<String>,
    /// Writing mode: 0 horizontal, 1 vertical.
    pub wmode: u8,
    /// Name given to `usecmap`, if any.
    pub parent: Option<String>,
    codespace: Vec<CodeRange>,
    unicode_singles: HashMap<(usize, u32), String>,
    unicode_ranges: Vec<BfRange>,
    cid_singles: HashMap<(usize, u32), u32>,
    cid_ranges: Vec<CidRange>,
}

impl CMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The predefined `Identity-H` CMap: two-byte codes, CID equals code.
    pub fn identity_h() -> Self {
        let mut cmap = Self::new();
        cmap.name = Some("Identity-H".to_string());
        cmap.codespace.push(CodeRange {
            low: 0,
            high: 0xFFFF,
            bytes: 2,
        });
        cmap.cid_ranges.push(CidRange {
            low: 0,
            high: 0xFFFF,
            bytes: 2,
            first_cid: 0,
        });
        cmap
    }

    pub fn identity_v() -> Self {
        let mut cmap = Self::identity_h();
        cmap.name = Some("Identity-V".to_string());
        cmap.wmode = 1;
        cmap
    }

    /// Predefined CMaps known by name. Only the identity maps carry a code
    /// layout that can be honoured without external CMap files.
    pub fn predefined(name: &str) -> Option<Self> {
        match name {
            "Identity-H" => Some(Self::identity_h()),
            "Identity-V" => Some(Self::identity_v()),
            _ => None,
        }
    }

    /// Parses a CMap program. Syntax errors stop the parse; everything read up
    /// to that point is kept.
    pub fn parse(data: &[u8]) -> ParseResult<Self> {
        let mut cmap = CMap::new();
        let mut lexer = Lexer::new(data);
        let mut previous: Vec<Token> = Vec::new();

        loop {
            let token = match lexer.next_token() {
                Ok(Token::Eof) => break,
                Ok(token) => token,
                Err(e) if cmap.has_mappings() => {
                    tracing::debug!("CMap parse stopped early: {e}");
                    break;
                }
                Err(e) => return Err(e),
            };

            match &token {
                Token::Keyword(k) if k == "begincodespacerange" => {
                    for pair in read_operands(&mut lexer, "endcodespacerange", 2)? {
                        if let [Token::String(low), Token::String(high)] = pair.as_slice() {
                            cmap.codespace.push(CodeRange {
                                low: code_value(low),
                                high: code_value(high),
                                bytes: low.len().max(1),
                            });
                        }
                    }
                }
                Token::Keyword(k) if k == "beginbfchar" => {
                    for pair in read_operands(&mut lexer, "endbfchar", 2)? {
                        match pair.as_slice() {
                            [Token::String(src), Token::String(dst)] => {
                                cmap.unicode_singles
                                    .insert((src.len(), code_value(src)), utf16_be(dst));
                            }
                            [Token::String(src), Token::Name(glyph)] => {
                                if let Some(text) = super::glyph_list::glyph_name_to_unicode(glyph) {
                                    cmap.unicode_singles.insert((src.len(), code_value(src)), text);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                Token::Keyword(k) if k == "beginbfrange" => {
                    cmap.read_bf_ranges(&mut lexer)?;
                }
                Token::Keyword(k) if k == "begincidchar" => {
                    for pair in read_operands(&mut lexer, "endcidchar", 2)? {
                        if let [Token::String(src), Token::Integer(cid)] = pair.as_slice() {
                            cmap.cid_singles
                                .insert((src.len(), code_value(src)), (*cid).max(0) as u32);
                        }
                    }
                }
                Token::Keyword(k) if k == "begincidrange" => {
                    for triple in read_operands(&mut lexer, "endcidrange", 3)? {
                        if let [Token::String(low), Token::String(high), Token::Integer(cid)] =
                            triple.as_slice()
                        {
                            cmap.cid_ranges.push(CidRange {
                                low: code_value(low),
                                high: code_value(high),
                                bytes: low.len().max(1),
                                first_cid: (*cid).max(0) as u32,
                            });
                        }
                    }
                }
                Token::Keyword(k) if k == "usecmap" => {
                    if let Some(Token::Name(parent)) = previous.last() {
                        cmap.parent = Some(parent.clone());
                    }
                }
                Token::Keyword(k) if k == "def" => {
                    if let [.., Token::Name(key), value] = previous.as_slice() {
                        match (key.as_str(), value) {
                            ("CMapName", Token::Name(name)) => cmap.name = Some(name.clone()),
                            ("WMode", Token::Integer(mode)) => cmap.wmode = (*mode == 1) as u8,
                            _ => {}
                        }
                    }
                }
                _ => {}
            }

            previous.push(token);
            if previous.len() > 2 {
                previous.remove(0);
            }
        }

        Ok(cmap)
    }

    fn read_bf_ranges(&mut self, lexer: &mut Lexer<'_>) -> ParseResult<()> {
        loop {
            let low = match lexer.next_token()? {
                Token::Keyword(k) if k == "endbfrange" => return Ok(()),
                Token::Eof => return Ok(()),
                Token::String(low) => low,
                _ => continue,
            };
            let Token::String(high) = lexer.next_token()? else {
                continue;
            };
            let target = match lexer.next_token()? {
                Token::String(dst) => RangeTarget::Incrementing(utf16_units(&dst)),
                Token::ArrayStart => {
                    let mut items = Vec::new();
                    loop {
                        match lexer.next_token()? {
                            Token::ArrayEnd | Token::Eof => break,
                            Token::String(dst) => items.push(utf16_be(&dst)),
                            _ => items.push('\u{FFFD}'.to_string()),
                        }
                    }
                    RangeTarget::Explicit(items)
                }
                _ => continue,
            };
            self.unicode_ranges.push(BfRange {
                low: code_value(&low),
                high: code_value(&high),
                bytes: low.len().max(1),
                target,
            });
        }
    }

    fn has_mappings(&self) -> bool {
        !self.unicode_singles.is_empty()
            || !self.unicode_ranges.is_empty()
            || !self.cid_singles.is_empty()
            || !self.cid_ranges.is_empty()
    }

    pub fn has_codespace(&self) -> bool {
        !self.codespace.is_empty()
    }

    /// Reads the next character code from `data`: returns the code and the
    /// number of bytes consumed (at least one when `data` is non-empty).
    pub fn next_code(&self, data: &[u8]) -> (u32, usize) {
        if self.codespace.is_empty() {
            return (data.first().copied().unwrap_or(0) as u32, 1.min(data.len()));
        }
        for bytes in 1..=4.min(data.len()) {
            let code = code_value(&data[..bytes]);
            if self.codespace.iter().any(|r| r.contains(code, bytes)) {
                return (code, bytes);
            }
        }
        // No range matches: consume the shortest codespace length.
        let bytes = self
            .codespace
            .iter()
            .map(|r| r.bytes)
            .min()
            .unwrap_or(1)
            .clamp(1, data.len().max(1))
            .min(data.len());
        (code_value(&data[..bytes]), bytes)
    }

    /// Splits a string into codes.
    pub fn codes(&self, data: &[u8]) -> Vec<(u32, usize)> {
        let mut codes = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let (code, bytes) = self.next_code(rest);
            if bytes == 0 {
                break;
            }
            codes.push((code, bytes));
            rest = &rest[bytes..];
        }
        codes
    }

    /// Unicode text mapped to a code.
    pub fn lookup(&self, code: u32, bytes: usize) -> Option<String> {
        if let Some(text) = self.unicode_singles.get(&(bytes, code)) {
            return Some(text.clone());
        }
        // Later ranges override earlier ones.
        let range = self
            .unicode_ranges
            .iter()
            .rev()
            .find(|r| r.bytes == bytes && code >= r.low && code <= r.high)
            .or_else(|| {
                self.unicode_ranges
                    .iter()
                    .rev()
                    .find(|r| code >= r.low && code <= r.high)
            })?;
        let offset = (code - range.low) as usize;
        match &range.target {
            RangeTarget::Incrementing(units) => {
                let mut units = units.clone();
                let last = units.last_mut()?;
                *last = last.wrapping_add(offset as u16);
                Some(String::from_utf16_lossy(&units))
            }
            RangeTarget::Explicit(items) => items.get(offset).cloned(),
        }
    }

    /// CID selected by a code.
    pub fn cid(&self, code: u32, bytes: usize) -> Option<u32> {
        if let Some(&cid) = self.cid_singles.get(&(bytes, code)) {
            return Some(cid);
        }
        self.cid_ranges
            .iter()
            .rev()
            .find(|r| r.bytes == bytes && code >= r.low && code <= r.high)
            .map(|r| r.first_cid + (code - r.low))
    }
}

/// Collects groups of `arity` operands up to the closing keyword.
fn read_operands(lexer: &mut Lexer<'_>, end: &str, arity: usize) -> ParseResult<Vec<Vec<Token>>> {
    let mut groups = Vec::new();
    let mut current = Vec::with_capacity(arity);
    loop {
        let token = lexer.next_token()?;
        match token {
            Token::Eof => break,
            Token::Keyword(ref k) if k == end => break,
            token => {
                current.push(token);
                if current.len() == arity {
                    groups.push(std::mem::take(&mut current));
                }
            }
        }
    }
    Ok(groups)
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    if bytes.len() == 1 {
        return vec![bytes[0] as u16];
    }
    bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => *single as u16,
            _ => 0,
        })
        .collect()
}

fn utf16_be(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}
