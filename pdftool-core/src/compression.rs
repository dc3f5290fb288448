//! Flate encoding for stream payloads.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{PdfError, Result};

/// Compress data using Flate/Zlib at the given level (0-9).
pub fn compress_with_level(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data).map_err(PdfError::Io)?;
    encoder.finish().map_err(PdfError::Io)
}

/// Compress data using Flate/Zlib at the best ratio.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with_level(data, 9)
}

/// Flate-encodes 8-bit samples with the PNG "Up" predictor on every row. The
/// stream needs `/DecodeParms << /Predictor 15 /Colors colors /Columns columns >>`.
pub fn compress_with_png_predictor(data: &[u8], colors: usize, columns: usize) -> Result<Vec<u8>> {
    let row_len = colors * columns;
    if row_len == 0 {
        return compress(data);
    }
    let mut filtered = Vec::with_capacity(data.len() + data.len() / row_len + 1);
    let mut previous: &[u8] = &[];
    for row in data.chunks(row_len) {
        filtered.push(2);
        for (i, &byte) in row.iter().enumerate() {
            let up = previous.get(i).copied().unwrap_or(0);
            filtered.push(byte.wrapping_sub(up));
        }
        previous = row;
    }
    compress(&filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Dictionary, Object, Stream};
    use crate::parser::filters::decode_stream;

    #[test]
    fn test_compress_shrinks_repetitive_data() {
        let data = vec![b'a'; 10_000];
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < 100);
    }

    #[test]
    fn test_level_is_clamped() {
        assert!(compress_with_level(b"abc", 42).is_ok());
    }

    #[test]
    fn test_png_predictor_decodes_back() {
        let data: Vec<u8> = (0..48u8).collect();
        let encoded = compress_with_png_predictor(&data, 3, 4).unwrap();

        let mut params = Dictionary::new();
        params.set("Predictor", 15);
        params.set("Colors", 3);
        params.set("Columns", 4);
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("FlateDecode"));
        dict.set("DecodeParms", params);
        let decoded = decode_stream(&Stream::new(dict, encoded)).unwrap();
        assert_eq!(decoded, data);
    }
}
