//! Cross-reference stream support for PDF 1.5+ (ISO 32000-1 §7.5.8).

use super::filters::decode_stream;
use super::xref::{XRefEntry, XRefTable};
use super::{ParseError, ParseResult};
use crate::objects::Stream;

/// Decodes the entries of a `/Type /XRef` stream.
pub fn parse_xref_stream(stream: &Stream) -> ParseResult<XRefTable> {
    let widths: Vec<usize> = stream
        .dict
        .get("W")
        .and_then(|w| w.as_array())
        .ok_or_else(|| ParseError::MissingKey("W".to_string()))?
        .iter()
        .map(|w| {
            w.as_integer()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|&n| n <= 8)
                .ok_or(ParseError::InvalidXRef)
        })
        .collect::<ParseResult<_>>()?;
    if widths.len() != 3 {
        return Err(ParseError::SyntaxError {
            position: 0,
            message: format!("W array must have 3 elements, found {}", widths.len()),
        });
    }

    let size = stream.dict.get_integer("Size").unwrap_or(0).max(0) as u32;
    let index: Vec<(u32, u32)> = match stream.dict.get("Index").and_then(|i| i.as_array()) {
        Some(items) => items
            .chunks(2)
            .filter_map(|pair| match pair {
                [first, count] => Some((
                    first.as_integer()?.max(0) as u32,
                    count.as_integer()?.max(0) as u32,
                )),
                _ => None,
            })
            .collect(),
        None => vec![(0, size)],
    };

    let data = decode_stream(stream)?;
    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(ParseError::InvalidXRef);
    }

    let mut table = XRefTable::new();
    let mut rows = data.chunks_exact(row_len);
    for (first, count) in index {
        for number in first..first.saturating_add(count) {
            let Some(row) = rows.next() else {
                return Ok(table);
            };
            let (type_field, rest) = row.split_at(widths[0]);
            let (field2, field3) = rest.split_at(widths[1]);
            // A zero-width type field defaults to type 1.
            let kind = if widths[0] == 0 { 1 } else { read_field(type_field) };
            let entry = match kind {
                0 => XRefEntry::Free,
                1 => XRefEntry::InUse {
                    offset: read_field(field2) as usize,
                    generation: read_field(field3) as u16,
                },
                2 => XRefEntry::Compressed {
                    stream: read_field(field2) as u32,
                    index: read_field(field3) as u32,
                },
                // Unknown types are reserved and read as null references.
                _ => XRefEntry::Free,
            };
            table.insert(number, entry);
        }
    }
    Ok(table)
}

fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Dictionary, Object};

    fn xref_stream(rows: &[[u8; 4]], index: Option<Vec<Object>>) -> Stream {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::name("XRef"));
        dict.set("W", vec![Object::from(1), 2.into(), 1.into()]);
        dict.set("Size", rows.len());
        if let Some(index) = index {
            dict.set("Index", index);
        }
        Stream::new(dict, rows.concat())
    }

    #[test]
    fn test_entry_types() {
        let stream = xref_stream(
            &[[0, 0, 0, 255], [1, 0x01, 0x00, 0], [2, 0, 5, 3]],
            None,
        );
        let table = parse_xref_stream(&stream).unwrap();
        assert_eq!(table.get(0), Some(&XRefEntry::Free));
        assert_eq!(
            table.get(1),
            Some(&XRefEntry::InUse {
                offset: 256,
                generation: 0
            })
        );
        assert_eq!(table.get(2), Some(&XRefEntry::Compressed { stream: 5, index: 3 }));
    }

    #[test]
    fn test_index_subsections() {
        let stream = xref_stream(
            &[[1, 0, 10, 0], [1, 0, 20, 0]],
            Some(vec![Object::from(4), 1.into(), 9.into(), 1.into()]),
        );
        let table = parse_xref_stream(&stream).unwrap();
        assert!(matches!(table.get(4), Some(XRefEntry::InUse { offset: 10, .. })));
        assert!(matches!(table.get(9), Some(XRefEntry::InUse { offset: 20, .. })));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_missing_widths() {
        let stream = Stream::new(Dictionary::new(), Vec::new());
        assert!(matches!(
            parse_xref_stream(&stream),
            Err(ParseError::MissingKey(_))
        ));
    }
}
