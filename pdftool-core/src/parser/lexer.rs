//! PDF Lexer
//!
//! Tokenizes PDF syntax (ISO 32000-1 §7.2) directly over an in-memory buffer, so
//! callers can reposition freely when following cross-reference offsets.

use super::{ParseError, ParseResult};

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Literal or hexadecimal string, already unescaped.
    String(Vec<u8>),
    /// Name without the leading slash, `#xx` escapes resolved.
    Name(String),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Null,
    /// Any other run of regular characters: `obj`, `R`, `stream`, content operators.
    Keyword(String),
    Eof,
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Keyword(k) if k == keyword)
    }

    pub fn describe(&self) -> String {
        match self {
            Token::Boolean(b) => b.to_string(),
            Token::Integer(i) => i.to_string(),
            Token::Real(r) => r.to_string(),
            Token::String(_) => "string".to_string(),
            Token::Name(n) => format!("/{n}"),
            Token::ArrayStart => "[".to_string(),
            Token::ArrayEnd => "]".to_string(),
            Token::DictStart => "<<".to_string(),
            Token::DictEnd => ">>".to_string(),
            Token::Null => "null".to_string(),
            Token::Keyword(k) => k.clone(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

pub fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

/// PDF Lexer over a byte slice
pub struct Lexer<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Lexer starting at `position` (clamped to the buffer).
    pub fn at(data: &'a [u8], position: usize) -> Self {
        Self {
            data,
            position: position.min(data.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.data.len());
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&mut self) -> ParseResult<Token> {
        let saved = self.position;
        let token = self.next_token();
        self.position = saved;
        token
    }

    /// Skips whitespace and comments.
    pub fn skip_whitespace(&mut self) {
        while let Some(&byte) = self.data.get(self.position) {
            if is_whitespace(byte) {
                self.position += 1;
            } else if byte == b'%' {
                while let Some(&c) = self.data.get(self.position) {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.position += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Skips the end-of-line marker after the `stream` keyword.
    pub fn skip_stream_eol(&mut self) {
        match self.data.get(self.position) {
            Some(b'\r') => {
                self.position += 1;
                if self.data.get(self.position) == Some(&b'\n') {
                    self.position += 1;
                }
            }
            Some(b'\n') => self.position += 1,
            _ => {}
        }
    }

    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace();

        let Some(&ch) = self.data.get(self.position) else {
            return Ok(Token::Eof);
        };

        match ch {
            b'/' => {
                self.position += 1;
                Ok(Token::Name(self.read_name()))
            }
            b'(' => {
                self.position += 1;
                self.read_literal_string().map(Token::String)
            }
            b'<' => {
                if self.data.get(self.position + 1) == Some(&b'<') {
                    self.position += 2;
                    Ok(Token::DictStart)
                } else {
                    self.position += 1;
                    self.read_hex_string().map(Token::String)
                }
            }
            b'>' => {
                if self.data.get(self.position + 1) == Some(&b'>') {
                    self.position += 2;
                    Ok(Token::DictEnd)
                } else {
                    Err(self.syntax_error("Expected '>' after '>'"))
                }
            }
            b'[' => {
                self.position += 1;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.position += 1;
                Ok(Token::ArrayEnd)
            }
            b'{' | b'}' => {
                self.position += 1;
                Ok(Token::Keyword((ch as char).to_string()))
            }
            b')' => Err(self.syntax_error("Unbalanced ')'")),
            b'+' | b'-' | b'.' | b'0'..=b'9' => Ok(self.read_number()),
            _ => {
                let word = self.read_regular();
                Ok(match word.as_str() {
                    "true" => Token::Boolean(true),
                    "false" => Token::Boolean(false),
                    "null" => Token::Null,
                    _ => Token::Keyword(word),
                })
            }
        }
    }

    fn syntax_error(&self, message: &str) -> ParseError {
        ParseError::SyntaxError {
            position: self.position,
            message: message.to_string(),
        }
    }

    fn read_regular(&mut self) -> String {
        let start = self.position;
        while let Some(&byte) = self.data.get(self.position) {
            if !is_regular(byte) {
                break;
            }
            self.position += 1;
        }
        // Keep progress on stray bytes such as a lone ')'.
        if self.position == start {
            self.position += 1;
        }
        self.data[start..self.position]
            .iter()
            .map(|&b| b as char)
            .collect()
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(&byte) = self.data.get(self.position) {
            if !is_regular(byte) {
                break;
            }
            if byte == b'#' {
                let hex = self.data.get(self.position + 1..self.position + 3);
                if let Some(value) = hex.and_then(|h| {
                    std::str::from_utf8(h)
                        .ok()
                        .and_then(|s| u8::from_str_radix(s, 16).ok())
                }) {
                    name.push(value as char);
                    self.position += 3;
                    continue;
                }
            }
            name.push(byte as char);
            self.position += 1;
        }
        name
    }

    fn read_number(&mut self) -> Token {
        let start = self.position;
        let mut seen_dot = false;
        let mut seen_digit = false;
        if matches!(self.data.get(self.position), Some(b'+' | b'-')) {
            self.position += 1;
            // Tolerate doubled signs ("--5") produced by some writers.
            while matches!(self.data.get(self.position), Some(b'+' | b'-')) {
                self.position += 1;
            }
        }
        while let Some(&byte) = self.data.get(self.position) {
            match byte {
                b'0'..=b'9' => seen_digit = true,
                b'.' if !seen_dot => seen_dot = true,
                _ => break,
            }
            self.position += 1;
        }
        let text: String = self.data[start..self.position]
            .iter()
            .map(|&b| b as char)
            .collect();
        let negative = text.matches('-').count() % 2 == 1;
        let digits = text.trim_start_matches(['+', '-']);

        if !seen_digit {
            return Token::Integer(0);
        }
        if !seen_dot {
            if let Ok(value) = digits.parse::<i64>() {
                return Token::Integer(if negative { -value } else { value });
            }
        }
        let value = digits.parse::<f64>().unwrap_or(0.0);
        Token::Real(if negative { -value } else { value })
    }

    fn read_literal_string(&mut self) -> ParseResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut depth = 1usize;
        loop {
            let Some(&byte) = self.data.get(self.position) else {
                return Err(self.syntax_error("Unterminated literal string"));
            };
            self.position += 1;
            match byte {
                b'(' => {
                    depth += 1;
                    out.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push(byte);
                }
                b'\\' => self.read_escape(&mut out),
                b'\r' => {
                    if self.data.get(self.position) == Some(&b'\n') {
                        self.position += 1;
                    }
                    out.push(b'\n');
                }
                _ => out.push(byte),
            }
        }
    }

    fn read_escape(&mut self, out: &mut Vec<u8>) {
        let Some(&byte) = self.data.get(self.position) else {
            return;
        };
        self.position += 1;
        match byte {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'0'..=b'7' => {
                let mut value = (byte - b'0') as u32;
                for _ in 0..2 {
                    match self.data.get(self.position) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            self.position += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            }
            // Line continuation.
            b'\r' => {
                if self.data.get(self.position) == Some(&b'\n') {
                    self.position += 1;
                }
            }
            b'\n' => {}
            other => out.push(other),
        }
    }

    fn read_hex_string(&mut self) -> ParseResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut high: Option<u8> = None;
        loop {
            let Some(&byte) = self.data.get(self.position) else {
                return Err(self.syntax_error("Unterminated hex string"));
            };
            self.position += 1;
            let nibble = match byte {
                b'>' => break,
                b'0'..=b'9' => byte - b'0',
                b'a'..=b'f' => byte - b'a' + 10,
                b'A'..=b'F' => byte - b'A' + 10,
                _ if is_whitespace(byte) => continue,
                _ => return Err(self.syntax_error("Invalid character in hex string")),
            };
            match high.take() {
                Some(h) => out.push(h << 4 | nibble),
                None => high = Some(nibble),
            }
        }
        if let Some(h) = high {
            out.push(h << 4);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tokens(input: &[u8]) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                break;
            }
            out.push(token);
        }
        out
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            tokens(b"<< /Type /Page /Count 3 >> [1 2.5 -3] true null"),
            vec![
                Token::DictStart,
                Token::Name("Type".into()),
                Token::Name("Page".into()),
                Token::Name("Count".into()),
                Token::Integer(3),
                Token::DictEnd,
                Token::ArrayStart,
                Token::Integer(1),
                Token::Real(2.5),
                Token::Integer(-3),
                Token::ArrayEnd,
                Token::Boolean(true),
                Token::Null,
            ]
        );
    }

    #[test]
    fn test_literal_string_escapes() {
        assert_eq!(
            tokens(br"(a\(b\)c\n\101 (nested))"),
            vec![Token::String(b"a(b)c\nA (nested)".to_vec())]
        );
        assert_eq!(
            tokens(b"(line\\\ncontinued)"),
            vec![Token::String(b"linecontinued".to_vec())]
        );
    }

    #[test]
    fn test_hex_string_odd_length() {
        assert_eq!(
            tokens(b"<48 65 6C6C 6F7>"),
            vec![Token::String(b"Hellop".to_vec())]
        );
    }

    #[test]
    fn test_name_escapes() {
        assert_eq!(
            tokens(b"/A#20B /C#2fD"),
            vec![Token::Name("A B".into()), Token::Name("C/D".into())]
        );
    }

    #[test]
    fn test_comments_and_keywords() {
        assert_eq!(
            tokens(b"% comment\n1 0 obj\nendobj"),
            vec![
                Token::Integer(1),
                Token::Integer(0),
                Token::Keyword("obj".into()),
                Token::Keyword("endobj".into()),
            ]
        );
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(tokens(b"--5 .5 -.25 +7"), vec![
            Token::Integer(5),
            Token::Real(0.5),
            Token::Real(-0.25),
            Token::Integer(7),
        ]);
    }

    #[test]
    fn test_unterminated_string_errors() {
        let mut lexer = Lexer::new(b"(abc");
        assert!(matches!(
            lexer.next_token(),
            Err(ParseError::SyntaxError { .. })
        ));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut lexer = Lexer::new(b"42 R");
        assert_eq!(lexer.peek_token().unwrap(), Token::Integer(42));
        assert_eq!(lexer.next_token().unwrap(), Token::Integer(42));
        assert!(lexer.next_token().unwrap().is_keyword("R"));
    }

    proptest! {
        #[test]
        fn prop_integers_lex_back(value in -1_000_000_000i64..1_000_000_000) {
            let text = value.to_string();
            prop_assert_eq!(tokens(text.as_bytes()), vec![Token::Integer(value)]);
        }

        #[test]
        fn prop_lexer_never_panics(input in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut lexer = Lexer::new(&input);
            for _ in 0..512 {
                match lexer.next_token() {
                    Ok(Token::Eof) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        }
    }
}
