//! Direct and indirect object parsing.

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseOptions, ParseResult};
use crate::objects::{Dictionary, Object, ObjectId, Stream};

/// Parses the next direct object. References (`N G R`) are recognised by
/// lookahead after an integer.
pub fn parse_object(lexer: &mut Lexer<'_>, max_depth: usize) -> ParseResult<Object> {
    let token = lexer.next_token()?;
    parse_from_token(lexer, token, max_depth, 0)
}

pub(crate) fn parse_from_token(
    lexer: &mut Lexer<'_>,
    token: Token,
    max_depth: usize,
    depth: usize,
) -> ParseResult<Object> {
    if depth > max_depth {
        return Err(ParseError::TooDeep(max_depth));
    }
    match token {
        Token::Boolean(b) => Ok(Object::Boolean(b)),
        Token::Null => Ok(Object::Null),
        Token::Real(r) => Ok(Object::Real(r)),
        Token::String(s) => Ok(Object::String(s)),
        Token::Name(n) => Ok(Object::Name(n)),
        Token::Integer(number) => Ok(try_reference(lexer, number).unwrap_or(Object::Integer(number))),
        Token::ArrayStart => {
            let mut items = Vec::new();
            loop {
                let next = lexer.next_token()?;
                match next {
                    Token::ArrayEnd => break,
                    Token::Eof => {
                        return Err(ParseError::SyntaxError {
                            position: lexer.position(),
                            message: "Unterminated array".to_string(),
                        })
                    }
                    other => items.push(parse_from_token(lexer, other, max_depth, depth + 1)?),
                }
            }
            Ok(Object::Array(items))
        }
        Token::DictStart => parse_dictionary_body(lexer, max_depth, depth).map(Object::Dictionary),
        other => Err(ParseError::UnexpectedToken {
            expected: "object".to_string(),
            found: other.describe(),
        }),
    }
}

fn try_reference(lexer: &mut Lexer<'_>, number: i64) -> Option<Object> {
    let saved = lexer.position();
    let result = (|| {
        let Ok(Token::Integer(generation)) = lexer.next_token() else {
            return None;
        };
        let Ok(Token::Keyword(k)) = lexer.next_token() else {
            return None;
        };
        if k != "R" || number < 0 || generation < 0 {
            return None;
        }
        Some(Object::Reference(ObjectId::new(
            u32::try_from(number).ok()?,
            u16::try_from(generation).ok()?,
        )))
    })();
    if result.is_none() {
        lexer.set_position(saved);
    }
    result
}

/// Parses dictionary entries up to and including `>>`.
fn parse_dictionary_body(
    lexer: &mut Lexer<'_>,
    max_depth: usize,
    depth: usize,
) -> ParseResult<Dictionary> {
    let mut dict = Dictionary::new();
    loop {
        match lexer.next_token()? {
            Token::DictEnd => return Ok(dict),
            Token::Name(key) => {
                let value_token = lexer.next_token()?;
                // A key directly followed by `>>` has no value; treat as null.
                if value_token == Token::DictEnd {
                    return Ok(dict);
                }
                let value = parse_from_token(lexer, value_token, max_depth, depth + 1)?;
                if !value.is_null() {
                    dict.set(key, value);
                }
            }
            Token::Eof => {
                return Err(ParseError::SyntaxError {
                    position: lexer.position(),
                    message: "Unterminated dictionary".to_string(),
                })
            }
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "name or '>>'".to_string(),
                    found: other.describe(),
                })
            }
        }
    }
}

/// Parses `N G obj <object> endobj` starting at `offset`.
///
/// `resolve_length` is consulted when a stream's `/Length` is an indirect
/// reference. When the declared length does not land on `endstream` the payload
/// is delimited by scanning for the keyword (lenient mode only).
pub fn parse_indirect_object(
    data: &[u8],
    offset: usize,
    options: &ParseOptions,
    resolve_length: &dyn Fn(ObjectId) -> Option<i64>,
) -> ParseResult<(ObjectId, Object)> {
    let mut lexer = Lexer::at(data, offset);
    let id = parse_object_header(&mut lexer)?;

    let token = lexer.next_token()?;
    let object = parse_from_token(&mut lexer, token, options.max_depth, 0)?;

    let after_object = lexer.position();
    match lexer.next_token()? {
        Token::Keyword(k) if k == "stream" => {
            let Object::Dictionary(dict) = object else {
                return Err(ParseError::SyntaxError {
                    position: after_object,
                    message: "stream keyword after non-dictionary".to_string(),
                });
            };
            lexer.skip_stream_eol();
            let start = lexer.position();
            let data = read_stream_data(data, start, &dict, options, resolve_length)?;
            Ok((id, Object::Stream(Stream::new(dict, data))))
        }
        // Missing endobj is common; the object itself is complete.
        _ => Ok((id, object)),
    }
}

/// Reads `N G obj` and returns the id.
pub fn parse_object_header(lexer: &mut Lexer<'_>) -> ParseResult<ObjectId> {
    let position = lexer.position();
    let number = lexer.next_token()?;
    let generation = lexer.next_token()?;
    let keyword = lexer.next_token()?;
    match (number, generation, keyword) {
        (Token::Integer(n), Token::Integer(g), Token::Keyword(k)) if k == "obj" => {
            let number = u32::try_from(n).map_err(|_| ParseError::SyntaxError {
                position,
                message: format!("Invalid object number {n}"),
            })?;
            let generation = u16::try_from(g).map_err(|_| ParseError::SyntaxError {
                position,
                message: format!("Invalid generation {g}"),
            })?;
            Ok(ObjectId::new(number, generation))
        }
        (n, _, _) => Err(ParseError::SyntaxError {
            position,
            message: format!("Expected object header, found {}", n.describe()),
        }),
    }
}

fn read_stream_data(
    data: &[u8],
    start: usize,
    dict: &Dictionary,
    options: &ParseOptions,
    resolve_length: &dyn Fn(ObjectId) -> Option<i64>,
) -> ParseResult<Vec<u8>> {
    let declared = match dict.get("Length") {
        Some(Object::Integer(n)) => Some(*n),
        Some(Object::Reference(id)) => resolve_length(*id),
        _ => None,
    };

    if let Some(length) = declared.and_then(|n| usize::try_from(n).ok()) {
        let end = start.saturating_add(length);
        if end <= data.len() && endstream_follows(data, end) {
            return Ok(data[start..end].to_vec());
        }
    }

    if !options.lenient {
        return Err(ParseError::SyntaxError {
            position: start,
            message: "Stream length does not match endstream".to_string(),
        });
    }

    let end = find_keyword(data, start, b"endstream").ok_or_else(|| ParseError::SyntaxError {
        position: start,
        message: "Missing endstream".to_string(),
    })?;
    let mut stop = end;
    if stop > start && data[stop - 1] == b'\n' {
        stop -= 1;
    }
    if stop > start && data[stop - 1] == b'\r' {
        stop -= 1;
    }
    tracing::debug!("Repaired stream length at offset {start}: {} bytes", stop - start);
    Ok(data[start..stop].to_vec())
}

fn endstream_follows(data: &[u8], mut position: usize) -> bool {
    while position < data.len() && super::lexer::is_whitespace(data[position]) {
        position += 1;
    }
    data[position..].starts_with(b"endstream")
}

/// First occurrence of `keyword` at or after `from`.
pub fn find_keyword(data: &[u8], from: usize, keyword: &[u8]) -> Option<usize> {
    if from >= data.len() || keyword.is_empty() {
        return None;
    }
    data[from..]
        .windows(keyword.len())
        .position(|window| window == keyword)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_length(_: ObjectId) -> Option<i64> {
        None
    }

    #[test]
    fn test_parse_nested_structures() {
        let mut lexer = Lexer::new(b"<< /Kids [3 0 R 4 0 R] /Count 2 /Sub << /A (x) >> >>");
        let object = parse_object(&mut lexer, 16).unwrap();
        let dict = object.as_dict().unwrap();
        let kids = dict.get("Kids").unwrap().as_array().unwrap();
        assert_eq!(kids[1], Object::Reference(ObjectId::new(4, 0)));
        assert_eq!(dict.get_integer("Count"), Some(2));
        assert_eq!(
            dict.get("Sub").and_then(|s| s.as_dict()).and_then(|d| d.get("A")),
            Some(&Object::String(b"x".to_vec()))
        );
    }

    #[test]
    fn test_integers_not_mistaken_for_reference() {
        let mut lexer = Lexer::new(b"[0 0 612 792]");
        let object = parse_object(&mut lexer, 16).unwrap();
        assert_eq!(object.as_number_array(), Some(vec![0.0, 0.0, 612.0, 792.0]));
    }

    #[test]
    fn test_depth_limit() {
        let input = "[".repeat(20) + &"]".repeat(20);
        let mut lexer = Lexer::new(input.as_bytes());
        assert!(matches!(
            parse_object(&mut lexer, 8),
            Err(ParseError::TooDeep(8))
        ));
    }

    #[test]
    fn test_indirect_stream_with_exact_length() {
        let data = b"5 0 obj\n<< /Length 5 >>\nstream\nHello\nendstream\nendobj\n";
        let (id, object) =
            parse_indirect_object(data, 0, &ParseOptions::default(), &no_length).unwrap();
        assert_eq!(id, ObjectId::new(5, 0));
        assert_eq!(object.as_stream().unwrap().data, b"Hello");
    }

    #[test]
    fn test_indirect_length_resolved() {
        let data = b"5 0 obj\n<< /Length 9 0 R >>\nstream\nabc\nendstream\nendobj\n";
        let resolver = |id: ObjectId| (id == ObjectId::new(9, 0)).then_some(3);
        let (_, object) =
            parse_indirect_object(data, 0, &ParseOptions::default(), &resolver).unwrap();
        assert_eq!(object.as_stream().unwrap().data, b"abc");
    }

    #[test]
    fn test_wrong_length_repaired_in_lenient_mode() {
        let data = b"1 0 obj\n<< /Length 99 >>\nstream\r\nabcdef\r\nendstream\nendobj";
        let (_, object) =
            parse_indirect_object(data, 0, &ParseOptions::lenient(), &no_length).unwrap();
        assert_eq!(object.as_stream().unwrap().data, b"abcdef");

        assert!(parse_indirect_object(data, 0, &ParseOptions::strict(), &no_length).is_err());
    }

    #[test]
    fn test_bad_header() {
        let data = b"xref\n0 1\n";
        assert!(parse_indirect_object(data, 0, &ParseOptions::default(), &no_length).is_err());
    }

    #[test]
    fn test_null_entries_dropped() {
        let mut lexer = Lexer::new(b"<< /A null /B 1 >>");
        let object = parse_object(&mut lexer, 16).unwrap();
        let dict = object.as_dict().unwrap();
        assert!(!dict.contains_key("A"));
        assert_eq!(dict.len(), 1);
    }
}
