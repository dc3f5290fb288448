//! PDF Content Stream Parser
//!
//! Turns a decoded content stream into typed operations. Operands are read with
//! the regular object lexer, so strings, arrays and inline dictionaries share one
//! implementation with the file parser.

use super::lexer::{is_whitespace, Lexer, Token};
use super::objects::parse_from_token;
use super::{ParseError, ParseResult};
use crate::objects::{Dictionary, Object};

const MAX_OPERAND_DEPTH: usize = 32;

/// Represents a single operator in a PDF content stream
#[derive(Debug, Clone, PartialEq)]
pub enum ContentOperation {
    // Text object
    BeginText, // BT
    EndText,   // ET

    // Text state
    SetCharSpacing(f64),       // Tc
    SetWordSpacing(f64),       // Tw
    SetHorizontalScaling(f64), // Tz
    SetLeading(f64),           // TL
    SetFont(String, f64),      // Tf
    SetTextRenderMode(i64),    // Tr
    SetTextRise(f64),          // Ts

    // Text positioning
    MoveText(f64, f64),            // Td
    MoveTextSetLeading(f64, f64),  // TD
    SetTextMatrix([f64; 6]),       // Tm
    NextLine,                      // T*

    // Text showing
    ShowText(Vec<u8>),                             // Tj
    ShowTextArray(Vec<TextElement>),               // TJ
    NextLineShowText(Vec<u8>),                     // '
    SetSpacingNextLineShowText(f64, f64, Vec<u8>), // "

    // Graphics state
    SaveGraphicsState,             // q
    RestoreGraphicsState,          // Q
    Transform([f64; 6]),           // cm
    SetLineWidth(f64),             // w
    SetLineCap(i64),               // J
    SetLineJoin(i64),              // j
    SetMiterLimit(f64),            // M
    SetDashPattern(Vec<f64>, f64), // d
    SetIntent(String),             // ri
    SetFlatness(f64),              // i
    SetGraphicsState(String),      // gs

    // Path construction
    MoveTo(f64, f64),               // m
    LineTo(f64, f64),               // l
    CurveTo([f64; 6]),              // c
    CurveToV([f64; 4]),             // v
    CurveToY([f64; 4]),             // y
    ClosePath,                      // h
    Rectangle(f64, f64, f64, f64),  // re

    // Path painting
    Stroke,                 // S
    CloseStroke,            // s
    Fill,                   // f, F
    FillEvenOdd,            // f*
    FillStroke,             // B
    FillStrokeEvenOdd,      // B*
    CloseFillStroke,        // b
    CloseFillStrokeEvenOdd, // b*
    EndPath,                // n

    // Clipping
    Clip,        // W
    ClipEvenOdd, // W*

    // Color
    SetStrokingColorSpace(String),                   // CS
    SetNonStrokingColorSpace(String),                // cs
    SetStrokingColor(Vec<f64>, Option<String>),      // SC, SCN
    SetNonStrokingColor(Vec<f64>, Option<String>),   // sc, scn
    SetStrokingGray(f64),                            // G
    SetNonStrokingGray(f64),                         // g
    SetStrokingRGB(f64, f64, f64),                   // RG
    SetNonStrokingRGB(f64, f64, f64),                // rg
    SetStrokingCMYK(f64, f64, f64, f64),             // K
    SetNonStrokingCMYK(f64, f64, f64, f64),          // k

    ShadingFill(String), // sh

    /// `BI <dict> ID <data> EI`
    InlineImage { dict: Dictionary, data: Vec<u8> },

    PaintXObject(String), // Do

    // Marked content
    BeginMarkedContent(String),                  // BMC
    BeginMarkedContentWithProps(String, Object), // BDC
    EndMarkedContent,                            // EMC
    MarkedContentPoint(String),                  // MP
    MarkedContentPointWithProps(String, Object), // DP

    // Compatibility
    BeginCompatibility, // BX
    EndCompatibility,   // EX

    /// Any operator without a dedicated variant (`d0`, `d1`, vendor extensions).
    Unknown { operator: String, operands: Vec<Object> },
}

/// One element of a `TJ` array.
#[derive(Debug, Clone, PartialEq)]
pub enum TextElement {
    Text(Vec<u8>),
    /// Adjustment in thousandths of text space; positive moves left.
    Spacing(f64),
}

/// Content stream parser
pub struct ContentParser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> ContentParser<'a> {
    pub fn new(content: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(content),
        }
    }

    /// Parse a whole content stream.
    pub fn parse(content: &[u8]) -> ParseResult<Vec<ContentOperation>> {
        let mut parser = ContentParser::new(content);
        let mut operations = Vec::new();
        while let Some(op) = parser.next_operation()? {
            operations.push(op);
        }
        Ok(operations)
    }

    /// Parse as far as possible: the operations read before the first syntax
    /// error are returned together with that error.
    pub fn parse_partial(content: &[u8]) -> (Vec<ContentOperation>, Option<ParseError>) {
        let mut parser = ContentParser::new(content);
        let mut operations = Vec::new();
        loop {
            match parser.next_operation() {
                Ok(Some(op)) => operations.push(op),
                Ok(None) => return (operations, None),
                Err(e) => return (operations, Some(e)),
            }
        }
    }

    /// Next operation, or `None` at the end of the stream.
    pub fn next_operation(&mut self) -> ParseResult<Option<ContentOperation>> {
        let mut operands = Vec::new();
        loop {
            let token = self.lexer.next_token()?;
            match token {
                Token::Eof => {
                    if !operands.is_empty() {
                        tracing::debug!("{} dangling operands at end of content", operands.len());
                    }
                    return Ok(None);
                }
                Token::Keyword(op) if op == "{" || op == "}" => continue,
                Token::Keyword(op) => {
                    let position = self.lexer.position();
                    return self
                        .build_operation(&op, operands)
                        .map(Some)
                        .map_err(|message| ParseError::SyntaxError { position, message });
                }
                other => {
                    let operand =
                        parse_from_token(&mut self.lexer, other, MAX_OPERAND_DEPTH, 0)?;
                    operands.push(operand);
                }
            }
        }
    }

    fn build_operation(
        &mut self,
        operator: &str,
        mut ops: Vec<Object>,
    ) -> Result<ContentOperation, String> {
        use ContentOperation as Op;

        let op = match operator {
            "BT" => Op::BeginText,
            "ET" => Op::EndText,
            "Tc" => Op::SetCharSpacing(numbers::<1>(operator, &ops)?[0]),
            "Tw" => Op::SetWordSpacing(numbers::<1>(operator, &ops)?[0]),
            "Tz" => Op::SetHorizontalScaling(numbers::<1>(operator, &ops)?[0]),
            "TL" => Op::SetLeading(numbers::<1>(operator, &ops)?[0]),
            "Tr" => Op::SetTextRenderMode(numbers::<1>(operator, &ops)?[0] as i64),
            "Ts" => Op::SetTextRise(numbers::<1>(operator, &ops)?[0]),
            "Tf" => {
                let size = numbers::<1>(operator, &ops)?[0];
                ops.pop();
                Op::SetFont(pop_name(operator, &mut ops)?, size)
            }
            "Td" => {
                let [x, y] = numbers::<2>(operator, &ops)?;
                Op::MoveText(x, y)
            }
            "TD" => {
                let [x, y] = numbers::<2>(operator, &ops)?;
                Op::MoveTextSetLeading(x, y)
            }
            "Tm" => Op::SetTextMatrix(numbers::<6>(operator, &ops)?),
            "T*" => Op::NextLine,
            "Tj" => Op::ShowText(pop_string(operator, &mut ops)?),
            "'" => Op::NextLineShowText(pop_string(operator, &mut ops)?),
            "\"" => {
                let text = pop_string(operator, &mut ops)?;
                let [aw, ac] = numbers::<2>(operator, &ops)?;
                Op::SetSpacingNextLineShowText(aw, ac, text)
            }
            "TJ" => {
                let Some(Object::Array(items)) = ops.pop() else {
                    return Err("TJ expects an array".to_string());
                };
                let elements = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Object::String(s) => Some(TextElement::Text(s)),
                        other => other.as_number().map(TextElement::Spacing),
                    })
                    .collect();
                Op::ShowTextArray(elements)
            }
            "q" => Op::SaveGraphicsState,
            "Q" => Op::RestoreGraphicsState,
            "cm" => Op::Transform(numbers::<6>(operator, &ops)?),
            "w" => Op::SetLineWidth(numbers::<1>(operator, &ops)?[0]),
            "J" => Op::SetLineCap(numbers::<1>(operator, &ops)?[0] as i64),
            "j" => Op::SetLineJoin(numbers::<1>(operator, &ops)?[0] as i64),
            "M" => Op::SetMiterLimit(numbers::<1>(operator, &ops)?[0]),
            "d" => {
                let phase = numbers::<1>(operator, &ops)?[0];
                ops.pop();
                let dashes = ops
                    .pop()
                    .and_then(|a| a.as_number_array())
                    .ok_or_else(|| "d expects a dash array".to_string())?;
                Op::SetDashPattern(dashes, phase)
            }
            "ri" => Op::SetIntent(pop_name(operator, &mut ops)?),
            "i" => Op::SetFlatness(numbers::<1>(operator, &ops)?[0]),
            "gs" => Op::SetGraphicsState(pop_name(operator, &mut ops)?),
            "m" => {
                let [x, y] = numbers::<2>(operator, &ops)?;
                Op::MoveTo(x, y)
            }
            "l" => {
                let [x, y] = numbers::<2>(operator, &ops)?;
                Op::LineTo(x, y)
            }
            "c" => Op::CurveTo(numbers::<6>(operator, &ops)?),
            "v" => Op::CurveToV(numbers::<4>(operator, &ops)?),
            "y" => Op::CurveToY(numbers::<4>(operator, &ops)?),
            "h" => Op::ClosePath,
            "re" => {
                let [x, y, w, h] = numbers::<4>(operator, &ops)?;
                Op::Rectangle(x, y, w, h)
            }
            "S" => Op::Stroke,
            "s" => Op::CloseStroke,
            "f" | "F" => Op::Fill,
            "f*" => Op::FillEvenOdd,
            "B" => Op::FillStroke,
            "B*" => Op::FillStrokeEvenOdd,
            "b" => Op::CloseFillStroke,
            "b*" => Op::CloseFillStrokeEvenOdd,
            "n" => Op::EndPath,
            "W" => Op::Clip,
            "W*" => Op::ClipEvenOdd,
            "CS" => Op::SetStrokingColorSpace(pop_name(operator, &mut ops)?),
            "cs" => Op::SetNonStrokingColorSpace(pop_name(operator, &mut ops)?),
            "SC" | "SCN" => {
                let (components, pattern) = color_operands(ops);
                Op::SetStrokingColor(components, pattern)
            }
            "sc" | "scn" => {
                let (components, pattern) = color_operands(ops);
                Op::SetNonStrokingColor(components, pattern)
            }
            "G" => Op::SetStrokingGray(numbers::<1>(operator, &ops)?[0]),
            "g" => Op::SetNonStrokingGray(numbers::<1>(operator, &ops)?[0]),
            "RG" => {
                let [r, g, b] = numbers::<3>(operator, &ops)?;
                Op::SetStrokingRGB(r, g, b)
            }
            "rg" => {
                let [r, g, b] = numbers::<3>(operator, &ops)?;
                Op::SetNonStrokingRGB(r, g, b)
            }
            "K" => {
                let [c, m, y, k] = numbers::<4>(operator, &ops)?;
                Op::SetStrokingCMYK(c, m, y, k)
            }
            "k" => {
                let [c, m, y, k] = numbers::<4>(operator, &ops)?;
                Op::SetNonStrokingCMYK(c, m, y, k)
            }
            "sh" => Op::ShadingFill(pop_name(operator, &mut ops)?),
            "Do" => Op::PaintXObject(pop_name(operator, &mut ops)?),
            "BI" => self.read_inline_image()?,
            "BMC" => Op::BeginMarkedContent(pop_name(operator, &mut ops)?),
            "BDC" => {
                let props = ops.pop().unwrap_or(Object::Null);
                Op::BeginMarkedContentWithProps(pop_name(operator, &mut ops)?, props)
            }
            "EMC" => Op::EndMarkedContent,
            "MP" => Op::MarkedContentPoint(pop_name(operator, &mut ops)?),
            "DP" => {
                let props = ops.pop().unwrap_or(Object::Null);
                Op::MarkedContentPointWithProps(pop_name(operator, &mut ops)?, props)
            }
            "BX" => Op::BeginCompatibility,
            "EX" => Op::EndCompatibility,
            _ => Op::Unknown {
                operator: operator.to_string(),
                operands: ops,
            },
        };
        Ok(op)
    }

    fn read_inline_image(&mut self) -> Result<ContentOperation, String> {
        let mut dict = Dictionary::new();
        loop {
            match self.lexer.next_token().map_err(|e| e.to_string())? {
                Token::Keyword(k) if k == "ID" => break,
                Token::Name(key) => {
                    let token = self.lexer.next_token().map_err(|e| e.to_string())?;
                    let value = parse_from_token(&mut self.lexer, token, MAX_OPERAND_DEPTH, 0)
                        .map_err(|e| e.to_string())?;
                    dict.set(key, value);
                }
                Token::Eof => return Err("Unterminated inline image dictionary".to_string()),
                other => return Err(format!("Unexpected {} in inline image", other.describe())),
            }
        }

        let data = self.lexer.data();
        // Exactly one whitespace byte separates ID from the data.
        let mut start = self.lexer.position();
        if data.get(start).is_some_and(|&b| is_whitespace(b)) {
            start += 1;
        }

        let declared = dict
            .get("L")
            .or_else(|| dict.get("Length"))
            .and_then(Object::as_integer)
            .and_then(|n| usize::try_from(n).ok());
        let end = match declared {
            Some(len) if start + len <= data.len() => start + len,
            _ => find_inline_image_end(data, start)
                .ok_or_else(|| "Missing EI after inline image data".to_string())?,
        };

        // Only the single separator before EI belongs to the syntax.
        let mut stop = end;
        if declared.is_none() && stop > start && is_whitespace(data[stop - 1]) {
            stop -= 1;
        }
        let payload = data[start..stop].to_vec();

        // Skip to just past the EI keyword.
        let mut resume = end;
        while resume < data.len() && is_whitespace(data[resume]) {
            resume += 1;
        }
        if data[resume..].starts_with(b"EI") {
            resume += 2;
        }
        self.lexer.set_position(resume);

        Ok(ContentOperation::InlineImage {
            dict,
            data: payload,
        })
    }
}

/// Position of the whitespace before `EI` terminating inline image data.
fn find_inline_image_end(data: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i + 2 <= data.len() {
        if &data[i..i + 2] == b"EI"
            && i > start
            && is_whitespace(data[i - 1])
            && data.get(i + 2).is_none_or(|&b| is_whitespace(b))
        {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn numbers<const N: usize>(operator: &str, ops: &[Object]) -> Result<[f64; N], String> {
    if ops.len() < N {
        return Err(format!(
            "Operator {operator} expects {N} operands, found {}",
            ops.len()
        ));
    }
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(&ops[ops.len() - N..]) {
        *slot = operand
            .as_number()
            .ok_or_else(|| format!("Operator {operator} expects numbers, found {}", operand.type_name()))?;
    }
    Ok(out)
}

fn pop_name(operator: &str, ops: &mut Vec<Object>) -> Result<String, String> {
    match ops.pop() {
        Some(Object::Name(name)) => Ok(name),
        Some(other) => Err(format!(
            "Operator {operator} expects a name, found {}",
            other.type_name()
        )),
        None => Err(format!("Operator {operator} expects a name")),
    }
}

fn pop_string(operator: &str, ops: &mut Vec<Object>) -> Result<Vec<u8>, String> {
    match ops.pop() {
        Some(Object::String(s)) => Ok(s),
        Some(other) => Err(format!(
            "Operator {operator} expects a string, found {}",
            other.type_name()
        )),
        None => Err(format!("Operator {operator} expects a string")),
    }
}

fn color_operands(ops: Vec<Object>) -> (Vec<f64>, Option<String>) {
    let mut pattern = None;
    let mut components = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            Object::Name(name) => pattern = Some(name),
            other => components.extend(other.as_number()),
        }
    }
    (components, pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_text_operators() {
        let ops = ContentParser::parse(b"BT /F1 12 Tf 100 700 Td (Hello) Tj [(A) -250 (B)] TJ ET")
            .unwrap();
        assert_eq!(
            ops,
            vec![
                ContentOperation::BeginText,
                ContentOperation::SetFont("F1".to_string(), 12.0),
                ContentOperation::MoveText(100.0, 700.0),
                ContentOperation::ShowText(b"Hello".to_vec()),
                ContentOperation::ShowTextArray(vec![
                    TextElement::Text(b"A".to_vec()),
                    TextElement::Spacing(-250.0),
                    TextElement::Text(b"B".to_vec()),
                ]),
                ContentOperation::EndText,
            ]
        );
    }

    #[test]
    fn test_parse_graphics_operators() {
        let ops = ContentParser::parse(b"q 2 0 0 2 10 10 cm 0 0 50 50 re f* [3 1] 0 d Q").unwrap();
        assert_eq!(
            ops,
            vec![
                ContentOperation::SaveGraphicsState,
                ContentOperation::Transform([2.0, 0.0, 0.0, 2.0, 10.0, 10.0]),
                ContentOperation::Rectangle(0.0, 0.0, 50.0, 50.0),
                ContentOperation::FillEvenOdd,
                ContentOperation::SetDashPattern(vec![3.0, 1.0], 0.0),
                ContentOperation::RestoreGraphicsState,
            ]
        );
    }

    #[test]
    fn test_parse_color_operators() {
        let ops = ContentParser::parse(b"1 0 0 rg 0.5 G /P1 scn 0.1 0.2 0.3 0.4 k").unwrap();
        assert_eq!(
            ops,
            vec![
                ContentOperation::SetNonStrokingRGB(1.0, 0.0, 0.0),
                ContentOperation::SetStrokingGray(0.5),
                ContentOperation::SetNonStrokingColor(vec![], Some("P1".to_string())),
                ContentOperation::SetNonStrokingCMYK(0.1, 0.2, 0.3, 0.4),
            ]
        );
    }

    #[test]
    fn test_inline_image() {
        let content = b"q BI /W 2 /H 1 /BPC 8 /CS /G ID \x00\xFF EI Q";
        let ops = ContentParser::parse(content).unwrap();
        assert_eq!(ops.len(), 3);
        match &ops[1] {
            ContentOperation::InlineImage { dict, data } => {
                assert_eq!(dict.get_integer("W"), Some(2));
                assert_eq!(data, &vec![0x00, 0xFF]);
            }
            other => panic!("expected inline image, got {other:?}"),
        }
        assert_eq!(ops[2], ContentOperation::RestoreGraphicsState);
    }

    #[test]
    fn test_unknown_operator_kept() {
        let ops = ContentParser::parse(b"0 0 d0").unwrap();
        assert_eq!(
            ops,
            vec![ContentOperation::Unknown {
                operator: "d0".to_string(),
                operands: vec![Object::Integer(0), Object::Integer(0)],
            }]
        );
    }

    #[test]
    fn test_missing_operand_is_syntax_error() {
        assert!(matches!(
            ContentParser::parse(b"BT Tf ET"),
            Err(ParseError::SyntaxError { .. })
        ));
    }

    #[test]
    fn test_partial_parse_keeps_prefix() {
        let (ops, error) = ContentParser::parse_partial(b"BT (ok) Tj (broken");
        assert_eq!(
            ops,
            vec![
                ContentOperation::BeginText,
                ContentOperation::ShowText(b"ok".to_vec())
            ]
        );
        assert!(error.is_some());
    }

    #[test]
    fn test_empty_content() {
        assert!(ContentParser::parse(b"  \n% only a comment\n").unwrap().is_empty());
    }
}
