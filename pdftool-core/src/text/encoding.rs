//! Single-byte base encodings and PDF text strings.

/// A named simple-font encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    StandardEncoding,
    MacRomanEncoding,
    WinAnsiEncoding,
    PdfDocEncoding,
}

impl TextEncoding {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "StandardEncoding" => Some(TextEncoding::StandardEncoding),
            "MacRomanEncoding" => Some(TextEncoding::MacRomanEncoding),
            "WinAnsiEncoding" => Some(TextEncoding::WinAnsiEncoding),
            "PDFDocEncoding" => Some(TextEncoding::PdfDocEncoding),
            _ => None,
        }
    }

    /// Unicode for one byte code, `None` when the code is undefined.
    pub fn decode_byte(&self, byte: u8) -> Option<char> {
        match self {
            TextEncoding::WinAnsiEncoding => decode_winansi(byte),
            TextEncoding::MacRomanEncoding => decode_macroman(byte),
            TextEncoding::StandardEncoding => decode_standard(byte),
            TextEncoding::PdfDocEncoding => decode_pdfdoc(byte),
        }
    }

    pub fn decode(&self, data: &[u8]) -> String {
        data.iter()
            .map(|&b| self.decode_byte(b).unwrap_or('\u{FFFD}'))
            .collect()
    }
}

fn printable_ascii(byte: u8) -> Option<char> {
    (0x20..=0x7E).contains(&byte).then_some(byte as char)
}

fn decode_winansi(byte: u8) -> Option<char> {
    let ch = match byte {
        0x80 => '\u{20AC}',
        0x82 => '\u{201A}',
        0x83 => '\u{0192}',
        0x84 => '\u{201E}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02C6}',
        0x89 => '\u{2030}',
        0x8A => '\u{0160}',
        0x8B => '\u{2039}',
        0x8C => '\u{0152}',
        0x8E => '\u{017D}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02DC}',
        0x99 => '\u{2122}',
        0x9A => '\u{0161}',
        0x9B => '\u{203A}',
        0x9C => '\u{0153}',
        0x9E => '\u{017E}',
        0x9F => '\u{0178}',
        0xA0..=0xFF => char::from(byte),
        0x09 | 0x0A | 0x0D => char::from(byte),
        _ => return printable_ascii(byte),
    };
    Some(ch)
}

const MAC_ROMAN_HIGH: [u16; 128] = [
    0x00C4, 0x00C5, 0x00C7, 0x00C9, 0x00D1, 0x00D6, 0x00DC, 0x00E1, 0x00E0, 0x00E2, 0x00E4,
    0x00E3, 0x00E5, 0x00E7, 0x00E9, 0x00E8, 0x00EA, 0x00EB, 0x00ED, 0x00EC, 0x00EE, 0x00EF,
    0x00F1, 0x00F3, 0x00F2, 0x00F4, 0x00F6, 0x00F5, 0x00FA, 0x00F9, 0x00FB, 0x00FC, 0x2020,
    0x00B0, 0x00A2, 0x00A3, 0x00A7, 0x2022, 0x00B6, 0x00DF, 0x00AE, 0x00A9, 0x2122, 0x00B4,
    0x00A8, 0x2260, 0x00C6, 0x00D8, 0x221E, 0x00B1, 0x2264, 0x2265, 0x00A5, 0x00B5, 0x2202,
    0x2211, 0x220F, 0x03C0, 0x222B, 0x00AA, 0x00BA, 0x03A9, 0x00E6, 0x00F8, 0x00BF, 0x00A1,
    0x00AC, 0x221A, 0x0192, 0x2248, 0x2206, 0x00AB, 0x00BB, 0x2026, 0x00A0, 0x00C0, 0x00C3,
    0x00D5, 0x0152, 0x0153, 0x2013, 0x2014, 0x201C, 0x201D, 0x2018, 0x2019, 0x00F7, 0x25CA,
    0x00FF, 0x0178, 0x2044, 0x00A4, 0x2039, 0x203A, 0xFB01, 0xFB02, 0x2021, 0x00B7, 0x201A,
    0x201E, 0x2030, 0x00C2, 0x00CA, 0x00C1, 0x00CB, 0x00C8, 0x00CD, 0x00CE, 0x00CF, 0x00CC,
    0x00D3, 0x00D4, 0x0000, 0x00D2, 0x00DA, 0x00DB, 0x00D9, 0x0131, 0x02C6, 0x02DC, 0x00AF,
    0x02D8, 0x02D9, 0x02DA, 0x00B8, 0x02DD, 0x02DB, 0x02C7,
];

fn decode_macroman(byte: u8) -> Option<char> {
    if byte < 0x80 {
        return printable_ascii(byte);
    }
    match MAC_ROMAN_HIGH[(byte - 0x80) as usize] {
        0 => None,
        code => char::from_u32(code as u32),
    }
}

fn decode_standard(byte: u8) -> Option<char> {
    let code: u32 = match byte {
        0x27 => 0x2019,
        0x60 => 0x2018,
        0x20..=0x7E => byte as u32,
        0xA1 => 0x00A1,
        0xA2 => 0x00A2,
        0xA3 => 0x00A3,
        0xA4 => 0x2044,
        0xA5 => 0x00A5,
        0xA6 => 0x0192,
        0xA7 => 0x00A7,
        0xA8 => 0x00A4,
        0xA9 => 0x0027,
        0xAA => 0x201C,
        0xAB => 0x00AB,
        0xAC => 0x2039,
        0xAD => 0x203A,
        0xAE => 0xFB01,
        0xAF => 0xFB02,
        0xB1 => 0x2013,
        0xB2 => 0x2020,
        0xB3 => 0x2021,
        0xB4 => 0x00B7,
        0xB6 => 0x00B6,
        0xB7 => 0x2022,
        0xB8 => 0x201A,
        0xB9 => 0x201E,
        0xBA => 0x201D,
        0xBB => 0x00BB,
        0xBC => 0x2026,
        0xBD => 0x2030,
        0xBF => 0x00BF,
        0xC1 => 0x0060,
        0xC2 => 0x00B4,
        0xC3 => 0x02C6,
        0xC4 => 0x02DC,
        0xC5 => 0x00AF,
        0xC6 => 0x02D8,
        0xC7 => 0x02D9,
        0xC8 => 0x00A8,
        0xCA => 0x02DA,
        0xCB => 0x00B8,
        0xCD => 0x02DD,
        0xCE => 0x02DB,
        0xCF => 0x02C7,
        0xD0 => 0x2014,
        0xE1 => 0x00C6,
        0xE3 => 0x00AA,
        0xE8 => 0x0141,
        0xE9 => 0x00D8,
        0xEA => 0x0152,
        0xEB => 0x00BA,
        0xF1 => 0x00E6,
        0xF5 => 0x0131,
        0xF8 => 0x0142,
        0xF9 => 0x00F8,
        0xFA => 0x0153,
        0xFB => 0x00DF,
        _ => return None,
    };
    char::from_u32(code)
}

fn decode_pdfdoc(byte: u8) -> Option<char> {
    let code: u32 = match byte {
        0x09 | 0x0A | 0x0D => byte as u32,
        0x18 => 0x02D8,
        0x19 => 0x02C7,
        0x1A => 0x02C6,
        0x1B => 0x02D9,
        0x1C => 0x02DD,
        0x1D => 0x02DB,
        0x1E => 0x02DA,
        0x1F => 0x02DC,
        0x20..=0x7E => byte as u32,
        0x80 => 0x2022,
        0x81 => 0x2020,
        0x82 => 0x2021,
        0x83 => 0x2026,
        0x84 => 0x2014,
        0x85 => 0x2013,
        0x86 => 0x0192,
        0x87 => 0x2044,
        0x88 => 0x2039,
        0x89 => 0x203A,
        0x8A => 0x2212,
        0x8B => 0x2030,
        0x8C => 0x201E,
        0x8D => 0x201C,
        0x8E => 0x201D,
        0x8F => 0x2018,
        0x90 => 0x2019,
        0x91 => 0x201A,
        0x92 => 0x2122,
        0x93 => 0xFB01,
        0x94 => 0xFB02,
        0x95 => 0x0141,
        0x96 => 0x0152,
        0x97 => 0x0160,
        0x98 => 0x0178,
        0x99 => 0x017D,
        0x9A => 0x0131,
        0x9B => 0x0142,
        0x9C => 0x0153,
        0x9D => 0x0161,
        0x9E => 0x017E,
        0xA0 => 0x20AC,
        0xA1..=0xFF => byte as u32,
        _ => return None,
    };
    char::from_u32(code)
}

/// Decodes a text string (document info, outlines): UTF-16BE or UTF-8 with a
/// byte order mark, PDFDocEncoding otherwise.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(body) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(body).into_owned();
    }
    TextEncoding::PdfDocEncoding.decode(bytes)
}

/// Encodes a text string for document info entries: PDFDocEncoding when every
/// character is ASCII, UTF-16BE with a byte order mark otherwise.
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut out = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}
