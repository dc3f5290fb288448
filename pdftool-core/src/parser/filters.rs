//! PDF Stream Filters
//!
//! Decoding of stream payloads (ISO 32000-1 §7.4). Image codecs (DCT, JPX,
//! CCITT, JBIG2) are not decoded here: [`decode_stream_partial`] stops in front
//! of them and hands the still-encoded bytes to the image layer.

use std::io::Read;

use flate2::read::{DeflateDecoder, ZlibDecoder};

use super::{ParseError, ParseResult};
use crate::objects::{Dictionary, Stream};

/// Supported PDF filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    ASCIIHexDecode,
    ASCII85Decode,
    LZWDecode,
    FlateDecode,
    RunLengthDecode,
    CCITTFaxDecode,
    JBIG2Decode,
    DCTDecode,
    JPXDecode,
    Crypt,
}

impl Filter {
    /// Parse filter from its name, including the inline-image abbreviations.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            "LZWDecode" | "LZW" => Some(Filter::LZWDecode),
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            "RunLengthDecode" | "RL" => Some(Filter::RunLengthDecode),
            "CCITTFaxDecode" | "CCF" => Some(Filter::CCITTFaxDecode),
            "JBIG2Decode" => Some(Filter::JBIG2Decode),
            "DCTDecode" | "DCT" => Some(Filter::DCTDecode),
            "JPXDecode" => Some(Filter::JPXDecode),
            "Crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::LZWDecode => "LZWDecode",
            Filter::FlateDecode => "FlateDecode",
            Filter::RunLengthDecode => "RunLengthDecode",
            Filter::CCITTFaxDecode => "CCITTFaxDecode",
            Filter::JBIG2Decode => "JBIG2Decode",
            Filter::DCTDecode => "DCTDecode",
            Filter::JPXDecode => "JPXDecode",
            Filter::Crypt => "Crypt",
        }
    }

    /// Codecs that produce image samples rather than a byte stream.
    pub fn is_image_codec(&self) -> bool {
        matches!(
            self,
            Filter::CCITTFaxDecode | Filter::JBIG2Decode | Filter::DCTDecode | Filter::JPXDecode
        )
    }

    /// Filters that actually shrink data (as opposed to ASCII armour).
    pub fn is_compressing(&self) -> bool {
        !matches!(self, Filter::ASCIIHexDecode | Filter::ASCII85Decode | Filter::Crypt)
    }
}

/// Result of decoding up to the first image codec.
#[derive(Debug, Clone)]
pub struct DecodedStream {
    pub data: Vec<u8>,
    /// Image codec still applied to `data`, with its parameters.
    pub image_codec: Option<(Filter, Option<Dictionary>)>,
}

/// Fully decode a stream. Fails on image codecs.
pub fn decode_stream(stream: &Stream) -> ParseResult<Vec<u8>> {
    let decoded = decode_stream_partial(stream)?;
    match decoded.image_codec {
        None => Ok(decoded.data),
        Some((filter, _)) => Err(ParseError::StreamDecodeError(format!(
            "{} cannot be decoded to a byte stream",
            filter.name()
        ))),
    }
}

/// Decode every filter up to the first image codec.
pub fn decode_stream_partial(stream: &Stream) -> ParseResult<DecodedStream> {
    decode_with(&stream.data, &stream.filters(), &stream.decode_params())
}

/// Decode `data` through the named filters, as found in inline image
/// dictionaries as well as stream dictionaries.
pub fn decode_with(
    data: &[u8],
    filters: &[String],
    params: &[Option<Dictionary>],
) -> ParseResult<DecodedStream> {
    let mut result = data.to_vec();
    for (index, name) in filters.iter().enumerate() {
        let filter = Filter::from_name(name)
            .ok_or_else(|| ParseError::StreamDecodeError(format!("Unknown filter: {name}")))?;
        let param = params.get(index).cloned().flatten();
        if filter.is_image_codec() {
            if index + 1 != filters.len() {
                return Err(ParseError::StreamDecodeError(format!(
                    "{name} must be the last filter"
                )));
            }
            return Ok(DecodedStream {
                data: result,
                image_codec: Some((filter, param)),
            });
        }
        result = apply_filter(&result, filter, param.as_ref())?;
    }
    Ok(DecodedStream {
        data: result,
        image_codec: None,
    })
}

/// Apply a single filter to data
pub fn apply_filter(data: &[u8], filter: Filter, params: Option<&Dictionary>) -> ParseResult<Vec<u8>> {
    match filter {
        Filter::FlateDecode => apply_predictor(decode_flate(data)?, params),
        Filter::LZWDecode => {
            let early_change = params
                .and_then(|p| p.get_integer("EarlyChange"))
                .unwrap_or(1)
                != 0;
            apply_predictor(decode_lzw(data, early_change)?, params)
        }
        Filter::ASCIIHexDecode => decode_ascii_hex(data),
        Filter::ASCII85Decode => decode_ascii85(data),
        Filter::RunLengthDecode => Ok(decode_run_length(data)),
        Filter::Crypt => Ok(data.to_vec()),
        other => Err(ParseError::StreamDecodeError(format!(
            "{} is an image codec",
            other.name()
        ))),
    }
}

/// Decode FlateDecode (zlib/deflate) compressed data.
///
/// Truncated streams yield whatever could be inflated; streams without a zlib
/// header are retried as raw deflate.
fn decode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut result) {
        Ok(_) => Ok(result),
        Err(_) if !result.is_empty() => {
            tracing::debug!("Flate stream truncated, kept {} bytes", result.len());
            Ok(result)
        }
        Err(zlib_err) => {
            let mut raw = Vec::new();
            match DeflateDecoder::new(data).read_to_end(&mut raw) {
                Ok(_) if !raw.is_empty() => Ok(raw),
                _ => Err(ParseError::StreamDecodeError(format!(
                    "Flate decode error: {zlib_err}"
                ))),
            }
        }
    }
}

/// Undo PNG (10-15) and TIFF (2) predictors.
fn apply_predictor(data: Vec<u8>, params: Option<&Dictionary>) -> ParseResult<Vec<u8>> {
    let Some(params) = params else {
        return Ok(data);
    };
    let predictor = params.get_integer("Predictor").unwrap_or(1);
    if predictor <= 1 {
        return Ok(data);
    }
    let colors = params.get_integer("Colors").unwrap_or(1).max(1) as usize;
    let bpc = params.get_integer("BitsPerComponent").unwrap_or(8).max(1) as usize;
    let columns = params.get_integer("Columns").unwrap_or(1).max(1) as usize;
    let bytes_per_pixel = (colors * bpc).div_ceil(8).max(1);
    let row_len = (colors * bpc * columns).div_ceil(8);

    match predictor {
        2 => Ok(undo_tiff_predictor(data, colors, bpc, row_len)),
        10..=15 => undo_png_predictor(&data, bytes_per_pixel, row_len),
        other => Err(ParseError::StreamDecodeError(format!(
            "Unsupported predictor {other}"
        ))),
    }
}

fn undo_tiff_predictor(mut data: Vec<u8>, colors: usize, bpc: usize, row_len: usize) -> Vec<u8> {
    if bpc != 8 || row_len == 0 {
        return data;
    }
    for row in data.chunks_mut(row_len) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    data
}

fn undo_png_predictor(data: &[u8], bpp: usize, row_len: usize) -> ParseResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        let (&kind, encoded) = chunk
            .split_first()
            .ok_or_else(|| ParseError::StreamDecodeError("Empty predictor row".to_string()))?;
        let mut row = encoded.to_vec();
        row.resize(row_len, 0);
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
            row[i] = match kind {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(ParseError::StreamDecodeError(format!(
                        "Invalid PNG filter type {other}"
                    )))
                }
            };
        }
        output.extend_from_slice(&row[..encoded.len().min(row_len)]);
        previous = row;
    }
    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn decode_lzw(data: &[u8], early_change: bool) -> ParseResult<Vec<u8>> {
    const CLEAR: usize = 256;
    const EOD: usize = 257;

    let mut table: Vec<Vec<u8>> = (0..=255u8).map(|b| vec![b]).collect();
    table.push(Vec::new());
    table.push(Vec::new());

    let mut output = Vec::new();
    let mut code_len = 9;
    let mut bit_buffer: u32 = 0;
    let mut bit_count = 0;
    let mut previous: Option<usize> = None;
    let early = usize::from(early_change);

    for &byte in data {
        bit_buffer = (bit_buffer << 8) | byte as u32;
        bit_count += 8;
        while bit_count >= code_len {
            let code = ((bit_buffer >> (bit_count - code_len)) & ((1 << code_len) - 1)) as usize;
            bit_count -= code_len;

            if code == CLEAR {
                table.truncate(258);
                code_len = 9;
                previous = None;
                continue;
            }
            if code == EOD {
                return Ok(output);
            }

            let entry = match (code < table.len(), previous) {
                (true, _) => table[code].clone(),
                (false, Some(prev)) if code == table.len() => {
                    let mut entry = table[prev].clone();
                    entry.push(table[prev][0]);
                    entry
                }
                _ => {
                    return Err(ParseError::StreamDecodeError(format!(
                        "Invalid LZW code {code}"
                    )))
                }
            };
            output.extend_from_slice(&entry);

            if let Some(prev) = previous {
                let mut new_entry = table[prev].clone();
                new_entry.push(entry[0]);
                table.push(new_entry);
            }
            previous = Some(code);

            if table.len() + early >= (1 << code_len) && code_len < 12 {
                code_len += 1;
            }
        }
    }
    Ok(output)
}

/// Decode ASCIIHexDecode data
fn decode_ascii_hex(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;
    for &byte in data {
        if byte == b'>' {
            break;
        }
        if byte.is_ascii_whitespace() {
            continue;
        }
        let value = hex_digit_value(byte).ok_or_else(|| {
            ParseError::StreamDecodeError(format!("Invalid hex digit: {}", byte as char))
        })?;
        match high.take() {
            Some(h) => result.push(h << 4 | value),
            None => high = Some(value),
        }
    }
    if let Some(h) = high {
        result.push(h << 4);
    }
    Ok(result)
}

fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

/// Decode ASCII85Decode data
fn decode_ascii85(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut body = data;
    if body.starts_with(b"<~") {
        body = &body[2..];
    }
    let mut result = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut count = 0;

    for &byte in body {
        match byte {
            b'~' => break,
            b'z' if count == 0 => result.extend_from_slice(&[0; 4]),
            b'!'..=b'u' => {
                group[count] = byte - b'!';
                count += 1;
                if count == 5 {
                    let value = group.iter().fold(0u64, |acc, &d| acc * 85 + d as u64);
                    if value > u32::MAX as u64 {
                        return Err(ParseError::StreamDecodeError(
                            "ASCII85 group out of range".to_string(),
                        ));
                    }
                    result.extend_from_slice(&(value as u32).to_be_bytes());
                    count = 0;
                }
            }
            _ if byte.is_ascii_whitespace() => {}
            other => {
                return Err(ParseError::StreamDecodeError(format!(
                    "Invalid ASCII85 character: {}",
                    other as char
                )))
            }
        }
    }

    if count > 1 {
        for slot in group.iter_mut().skip(count) {
            *slot = 84;
        }
        let value = group.iter().fold(0u64, |acc, &d| acc * 85 + d as u64);
        let bytes = (value.min(u32::MAX as u64) as u32).to_be_bytes();
        result.extend_from_slice(&bytes[..count - 1]);
    }
    Ok(result)
}

fn decode_run_length(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len() * 2);
    let mut i = 0;
    while i < data.len() {
        let length = data[i] as usize;
        i += 1;
        match length {
            0..=127 => {
                let end = (i + length + 1).min(data.len());
                result.extend_from_slice(&data[i..end]);
                i = end;
            }
            128 => break,
            _ => {
                if let Some(&byte) = data.get(i) {
                    result.extend(std::iter::repeat_n(byte, 257 - length));
                }
                i += 1;
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Object;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_filter_names() {
        assert_eq!(Filter::from_name("Fl"), Some(Filter::FlateDecode));
        assert_eq!(Filter::from_name("DCTDecode"), Some(Filter::DCTDecode));
        assert_eq!(Filter::from_name("Bogus"), None);
        assert!(Filter::DCTDecode.is_image_codec());
        assert!(!Filter::ASCII85Decode.is_compressing());
    }

    #[test]
    fn test_flate_stream() {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("FlateDecode"));
        let stream = Stream::new(dict, zlib(b"BT /F1 12 Tf ET"));
        assert_eq!(decode_stream(&stream).unwrap(), b"BT /F1 12 Tf ET");
    }

    #[test]
    fn test_png_up_predictor() {
        // Two rows of three bytes, second row encoded with "Up".
        let raw = [0u8, 1, 2, 3, 2, 1, 1, 1];
        let mut params = Dictionary::new();
        params.set("Predictor", 12);
        params.set("Columns", 3);
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("FlateDecode"));
        dict.set("DecodeParms", params);
        let stream = Stream::new(dict, zlib(&raw));
        assert_eq!(decode_stream(&stream).unwrap(), vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_ascii_hex() {
        assert_eq!(decode_ascii_hex(b"48 65 6c 6C 6f>").unwrap(), b"Hello");
        assert_eq!(decode_ascii_hex(b"7>").unwrap(), vec![0x70]);
        assert!(decode_ascii_hex(b"XY>").is_err());
    }

    #[test]
    fn test_ascii85() {
        assert_eq!(decode_ascii85(b"<~87cURDZ~>").unwrap(), b"Hello");
        assert_eq!(decode_ascii85(b"z~>").unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_run_length() {
        let data = [2u8, b'a', b'b', b'c', 254, b'x', 128];
        assert_eq!(decode_run_length(&data), b"abcxxx");
    }

    #[test]
    fn test_lzw_sample() {
        // Example from the PDF reference (section 7.4.4.2).
        let encoded = [0x80u8, 0x0B, 0x60, 0x50, 0x22, 0x0C, 0x0C, 0x85, 0x01];
        assert_eq!(decode_lzw(&encoded, true).unwrap(), vec![45, 45, 45, 45, 45, 65, 45, 45, 45, 66]);
    }

    #[test]
    fn test_partial_decode_stops_at_dct() {
        let mut dict = Dictionary::new();
        dict.set(
            "Filter",
            vec![Object::name("ASCIIHexDecode"), Object::name("DCTDecode")],
        );
        let stream = Stream::new(dict, b"FFD8>".to_vec());
        let decoded = decode_stream_partial(&stream).unwrap();
        assert_eq!(decoded.data, vec![0xFF, 0xD8]);
        assert_eq!(decoded.image_codec.map(|(f, _)| f), Some(Filter::DCTDecode));
        assert!(decode_stream(&stream).is_err());
    }

    #[test]
    fn test_unknown_filter_is_error() {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("Bogus"));
        let stream = Stream::new(dict, Vec::new());
        assert!(matches!(
            decode_stream(&stream),
            Err(ParseError::StreamDecodeError(_))
        ));
    }
}
