//! Object streams (`/Type /ObjStm`, PDF 1.5+).

use super::filters::decode_stream;
use super::lexer::{Lexer, Token};
use super::objects::parse_object;
use super::{ParseError, ParseResult};
use crate::objects::{Object, Stream};

/// A decoded object stream: the offsets table plus the decoded body.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// `(object number, offset relative to /First)` in stream order.
    entries: Vec<(u32, usize)>,
    first: usize,
    data: Vec<u8>,
}

impl ObjectStream {
    pub fn parse(stream: &Stream) -> ParseResult<Self> {
        let count = stream
            .dict
            .get_integer("N")
            .ok_or_else(|| ParseError::MissingKey("N".to_string()))?;
        let first = stream
            .dict
            .get_integer("First")
            .and_then(|f| usize::try_from(f).ok())
            .ok_or_else(|| ParseError::MissingKey("First".to_string()))?;
        let data = decode_stream(stream)?;

        let mut lexer = Lexer::new(&data);
        let mut entries = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count.max(0) {
            match (lexer.next_token()?, lexer.next_token()?) {
                (Token::Integer(number), Token::Integer(offset)) if number >= 0 && offset >= 0 => {
                    entries.push((number as u32, offset as usize));
                }
                _ => {
                    return Err(ParseError::SyntaxError {
                        position: lexer.position(),
                        message: "Malformed object stream header".to_string(),
                    })
                }
            }
        }

        Ok(Self {
            entries,
            first,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(number, _)| *number)
    }

    /// Object at `index`. When `expected` is given and the index does not hold
    /// that object, the entry is looked up by number instead.
    pub fn get(&self, index: usize, expected: Option<u32>, max_depth: usize) -> ParseResult<Object> {
        let entry = match (self.entries.get(index), expected) {
            (Some(entry), Some(number)) if entry.0 != number => {
                self.entries.iter().find(|(n, _)| *n == number)
            }
            (Some(entry), _) => Some(entry),
            (None, Some(number)) => self.entries.iter().find(|(n, _)| *n == number),
            (None, None) => None,
        };
        let &(number, offset) = entry.ok_or_else(|| ParseError::InvalidReference(expected.unwrap_or(0), 0))?;
        let mut lexer = Lexer::at(&self.data, self.first.saturating_add(offset));
        parse_object(&mut lexer, max_depth).map_err(|e| ParseError::SyntaxError {
            position: lexer.position(),
            message: format!("object {number} in object stream: {e}"),
        })
    }
}
