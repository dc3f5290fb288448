//! Cross-reference tables and the `/Prev` chain.

use std::collections::{BTreeMap, HashSet};

use super::lexer::{Lexer, Token};
use super::objects::{parse_indirect_object, parse_object};
use super::xref_stream::parse_xref_stream;
use super::{ParseError, ParseOptions, ParseResult};
use crate::objects::{Dictionary, Object, ObjectId};

/// Where an object lives in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    Free,
    InUse { offset: usize, generation: u16 },
    Compressed { stream: u32, index: u32 },
}

/// Object number → entry map.
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: BTreeMap<u32, XRefEntry>,
}

impl XRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, number: u32, entry: XRefEntry) {
        self.entries.insert(number, entry);
    }

    pub fn get(&self, number: u32) -> Option<&XRefEntry> {
        self.entries.get(&number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XRefEntry)> {
        self.entries.iter()
    }

    /// Adds entries from an older section; entries already present win.
    pub fn merge_older(&mut self, older: XRefTable) {
        for (number, entry) in older.entries {
            self.entries.entry(number).or_insert(entry);
        }
    }

    /// Ids of every in-use or compressed object.
    pub fn live_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.iter().filter_map(|(&number, entry)| match entry {
            XRefEntry::InUse { generation, .. } => Some(ObjectId::new(number, *generation)),
            XRefEntry::Compressed { .. } => Some(ObjectId::new(number, 0)),
            XRefEntry::Free => None,
        })
    }
}

/// One cross-reference section together with its trailer.
#[derive(Debug, Clone)]
pub struct XRefSection {
    pub table: XRefTable,
    pub trailer: Dictionary,
}

/// Locates the offset recorded after the last `startxref`.
pub fn find_startxref(data: &[u8]) -> ParseResult<usize> {
    let window_start = data.len().saturating_sub(2048);
    let tail = &data[window_start..];
    let keyword = b"startxref";
    let at = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or(ParseError::InvalidXRef)?;
    let mut lexer = Lexer::at(data, window_start + at + keyword.len());
    match lexer.next_token()? {
        Token::Integer(offset) if offset >= 0 && (offset as usize) < data.len() => Ok(offset as usize),
        _ => Err(ParseError::InvalidXRef),
    }
}

/// Follows the `/Prev` chain from `start`, newest section first, and returns the
/// merged table and trailer.
pub fn load_xref_chain(
    data: &[u8],
    start: usize,
    options: &ParseOptions,
) -> ParseResult<(XRefTable, Dictionary)> {
    let mut table = XRefTable::new();
    let mut trailer: Option<Dictionary> = None;
    let mut visited = HashSet::new();
    let mut next = Some(start);

    while let Some(offset) = next.take() {
        if !visited.insert(offset) {
            return Err(ParseError::CircularReference);
        }
        let section = parse_xref_section(data, offset, options)?;
        tracing::debug!(
            "xref section at {offset}: {} entries",
            section.table.len()
        );
        table.merge_older(section.table);

        next = section
            .trailer
            .get_integer("Prev")
            .and_then(|p| usize::try_from(p).ok())
            .filter(|&p| p < data.len());

        match trailer.as_mut() {
            None => trailer = Some(section.trailer),
            Some(newest) => {
                for (key, value) in section.trailer {
                    if !newest.contains_key(&key) {
                        newest.set(key, value);
                    }
                }
            }
        }
    }

    let mut trailer = trailer.ok_or(ParseError::InvalidTrailer)?;
    trailer.remove("Prev");
    trailer.remove("XRefStm");
    Ok((table, trailer))
}

/// Parses the classic table or the cross-reference stream at `offset`.
pub fn parse_xref_section(
    data: &[u8],
    offset: usize,
    options: &ParseOptions,
) -> ParseResult<XRefSection> {
    let mut lexer = Lexer::at(data, offset);
    if lexer.peek_token()?.is_keyword("xref") {
        lexer.next_token()?;
        let mut section = parse_classic_table(&mut lexer, options)?;

        // Hybrid files list compressed objects in an auxiliary stream.
        if let Some(stm) = section
            .trailer
            .get_integer("XRefStm")
            .and_then(|o| usize::try_from(o).ok())
        {
            match parse_stream_section(data, stm, options) {
                Ok(extra) => {
                    for (&number, &entry) in extra.table.iter() {
                        match section.table.get(number) {
                            None | Some(XRefEntry::Free) => section.table.insert(number, entry),
                            Some(_) => {}
                        }
                    }
                }
                Err(e) => tracing::warn!("Ignoring unreadable XRefStm at {stm}: {e}"),
            }
        }
        Ok(section)
    } else {
        parse_stream_section(data, offset, options)
    }
}

fn parse_stream_section(
    data: &[u8],
    offset: usize,
    options: &ParseOptions,
) -> ParseResult<XRefSection> {
    let (_, object) = parse_indirect_object(data, offset, options, &|_| None)?;
    let Object::Stream(stream) = object else {
        return Err(ParseError::InvalidXRef);
    };
    if !stream.dict.is_type("XRef") {
        return Err(ParseError::InvalidXRef);
    }
    let table = parse_xref_stream(&stream)?;
    Ok(XRefSection {
        table,
        trailer: stream.dict,
    })
}

fn parse_classic_table(lexer: &mut Lexer<'_>, options: &ParseOptions) -> ParseResult<XRefSection> {
    let mut table = XRefTable::new();
    loop {
        match lexer.next_token()? {
            Token::Integer(first) => {
                let Token::Integer(count) = lexer.next_token()? else {
                    return Err(ParseError::InvalidXRef);
                };
                if first < 0 || count < 0 {
                    return Err(ParseError::InvalidXRef);
                }
                for i in 0..count {
                    let number = u32::try_from(first + i).map_err(|_| ParseError::InvalidXRef)?;
                    let entry = parse_table_entry(lexer)?;
                    table.entries.entry(number).or_insert(entry);
                }
            }
            Token::Keyword(k) if k == "trailer" => break,
            _ => return Err(ParseError::InvalidXRef),
        }
    }

    let trailer = match parse_object(lexer, options.max_depth)? {
        Object::Dictionary(dict) => dict,
        _ => return Err(ParseError::InvalidTrailer),
    };
    Ok(XRefSection { table, trailer })
}

fn parse_table_entry(lexer: &mut Lexer<'_>) -> ParseResult<XRefEntry> {
    let offset = lexer.next_token()?;
    let generation = lexer.next_token()?;
    let kind = lexer.next_token()?;
    match (offset, generation, kind) {
        (Token::Integer(offset), Token::Integer(generation), Token::Keyword(kind)) => {
            let generation = u16::try_from(generation).unwrap_or(u16::MAX);
            match kind.as_str() {
                "n" if offset > 0 => Ok(XRefEntry::InUse {
                    offset: offset as usize,
                    generation,
                }),
                "n" | "f" => Ok(XRefEntry::Free),
                _ => Err(ParseError::InvalidXRef),
            }
        }
        _ => Err(ParseError::InvalidXRef),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[u8] = b"xref\n0 3\n0000000000 65535 f \n0000000017 00000 n \n0000000081 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n0\n%%EOF\n";

    #[test]
    fn test_find_startxref() {
        let data = b"%PDF-1.4\n...\nstartxref\n1234\n%%EOF\n";
        // Offset beyond the end of this tiny buffer is rejected.
        assert!(find_startxref(data).is_err());

        let mut data = vec![b' '; 2000];
        data.extend_from_slice(b"startxref\n1500\n%%EOF");
        assert_eq!(find_startxref(&data).unwrap(), 1500);
    }

    #[test]
    fn test_parse_classic_table() {
        let section = parse_xref_section(TABLE, 0, &ParseOptions::default()).unwrap();
        assert_eq!(section.table.get(0), Some(&XRefEntry::Free));
        assert_eq!(
            section.table.get(1),
            Some(&XRefEntry::InUse {
                offset: 17,
                generation: 0
            })
        );
        assert_eq!(section.trailer.get_reference("Root"), Some(ObjectId::new(1, 0)));
    }

    #[test]
    fn test_newest_section_wins() {
        let mut newest = XRefTable::new();
        newest.insert(1, XRefEntry::InUse { offset: 500, generation: 0 });
        let mut older = XRefTable::new();
        older.insert(1, XRefEntry::InUse { offset: 10, generation: 0 });
        older.insert(2, XRefEntry::InUse { offset: 20, generation: 0 });
        newest.merge_older(older);
        assert_eq!(
            newest.get(1),
            Some(&XRefEntry::InUse { offset: 500, generation: 0 })
        );
        assert_eq!(newest.len(), 2);
    }

    #[test]
    fn test_prev_chain_loop_detected() {
        let data = b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev 0 >>\n";
        assert!(matches!(
            load_xref_chain(data, 0, &ParseOptions::default()),
            Err(ParseError::CircularReference)
        ));
    }

    #[test]
    fn test_garbage_is_invalid_xref() {
        assert!(parse_xref_section(b"hello world", 0, &ParseOptions::default()).is_err());
    }
}
