//! Document serialization.
//!
//! Only objects reachable from the trailer's `/Root` and `/Info` are written.
//! They are renumbered `1..=N` in discovery order, so stale revisions, old
//! cross-reference streams and unreferenced objects are dropped.

mod xref_stream_writer;

use std::collections::{HashMap, VecDeque};
use std::io::Write;

use crate::compression::compress;
use crate::document::Document;
use crate::error::Result;
use crate::objects::{Dictionary, Object, ObjectId, Stream};
use crate::parser::lexer::is_regular;
use crate::parser::xref::XRefEntry;

pub use xref_stream_writer::XRefStreamWriter;

const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Output options.
#[derive(Debug, Clone, Default)]
pub struct WriterConfig {
    /// Write a cross-reference stream instead of a classic table.
    pub xref_stream: bool,
    /// Flate-encode streams that carry no filter at all.
    pub compress_new_streams: bool,
}

/// Serializes a [`Document`] to bytes.
#[derive(Debug, Clone, Default)]
pub struct PdfWriter {
    config: WriterConfig,
}

impl PdfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WriterConfig) -> Self {
        Self { config }
    }

    /// Serializes with the default configuration.
    pub fn serialize(document: &Document) -> Result<Vec<u8>> {
        Self::new().write_document(document)
    }

    pub fn write_document(&self, document: &Document) -> Result<Vec<u8>> {
        let order = reachable_objects(document);
        let renumber: HashMap<ObjectId, ObjectId> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, ObjectId::new(i as u32 + 1, 0)))
            .collect();

        let mut out = Vec::new();
        let version = self.output_version(document.version());
        write!(out, "%PDF-{version}\n")?;
        out.extend_from_slice(BINARY_MARKER);

        let mut offsets = Vec::with_capacity(order.len());
        for source_id in &order {
            let object = match document.get_object(*source_id) {
                Ok(object) => renumber_references(object, &renumber),
                Err(e) => {
                    document.warn(format!("Writing null for unreadable object {source_id}: {e}"));
                    Object::Null
                }
            };
            let object = self.prepare(object)?;
            let id = renumber[source_id];
            offsets.push((id.number(), out.len()));
            write_indirect(&mut out, id, &object);
        }

        let mut trailer = Dictionary::new();
        for key in ["Root", "Info"] {
            if let Some(value) = document.trailer().get(key) {
                let value = renumber_references(value, &renumber);
                if !value.is_null() {
                    trailer.set(key, value);
                }
            }
        }
        let digest = format!("{:x}", md5::compute(&out));
        let id_bytes = hex_to_bytes(&digest);
        trailer.set(
            "ID",
            vec![Object::String(id_bytes.clone()), Object::String(id_bytes)],
        );

        if self.config.xref_stream {
            let stream_number = order.len() as u32 + 1;
            let stream_offset = out.len();
            let mut xref = XRefStreamWriter::new();
            for &(number, offset) in &offsets {
                xref.add_entry(number, XRefEntry::InUse { offset, generation: 0 });
            }
            xref.add_entry(
                stream_number,
                XRefEntry::InUse {
                    offset: stream_offset,
                    generation: 0,
                },
            );
            let stream = xref.build(&trailer)?;
            write_indirect(
                &mut out,
                ObjectId::new(stream_number, 0),
                &Object::Stream(stream),
            );
            write!(out, "startxref\n{stream_offset}\n%%EOF\n")?;
        } else {
            let xref_offset = out.len();
            write!(out, "xref\n0 {}\n", offsets.len() + 1)?;
            out.extend_from_slice(b"0000000000 65535 f \n");
            for &(_, offset) in &offsets {
                write!(out, "{offset:010} 00000 n \n")?;
            }
            trailer.set("Size", offsets.len() + 1);
            out.extend_from_slice(b"trailer\n");
            write_object(&mut out, &Object::Dictionary(trailer));
            write!(out, "\nstartxref\n{xref_offset}\n%%EOF\n")?;
        }

        tracing::debug!("Serialized {} objects, {} bytes", order.len(), out.len());
        Ok(out)
    }

    fn output_version(&self, source: &str) -> String {
        let parsed: f64 = source.parse().unwrap_or(1.4);
        if self.config.xref_stream && parsed < 1.5 {
            "1.5".to_string()
        } else {
            source.to_string()
        }
    }

    fn prepare(&self, object: Object) -> Result<Object> {
        match object {
            Object::Stream(mut stream) => {
                if self.config.compress_new_streams
                    && !stream.dict.contains_key("Filter")
                    && !stream.data.is_empty()
                {
                    let encoded = compress(&stream.data)?;
                    if encoded.len() < stream.data.len() {
                        stream.set_encoded(encoded, Some("FlateDecode"));
                    }
                }
                stream.dict.set("Length", stream.data.len());
                Ok(Object::Stream(stream))
            }
            other => Ok(other),
        }
    }
}

/// Ids reachable from `/Root` and `/Info`, breadth first.
fn reachable_objects(document: &Document) -> Vec<ObjectId> {
    let mut order = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut queue = VecDeque::new();

    for key in ["Root", "Info"] {
        if let Some(id) = document.trailer().get_reference(key) {
            if seen.insert(id) {
                queue.push_back(id);
            }
        }
    }

    while let Some(id) = queue.pop_front() {
        let Ok(object) = document.get_object(id) else {
            document.warn(format!("Dropping reference to missing object {id}"));
            continue;
        };
        order.push(id);
        let mut children = Vec::new();
        collect_references(object, &mut children);
        for child in children {
            if seen.insert(child) && document.get_object(child).is_ok() {
                queue.push_back(child);
            }
        }
    }
    order
}

pub(crate) fn collect_references(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        Object::Dictionary(dict) => dict.iter().for_each(|(_, v)| collect_references(v, out)),
        Object::Stream(stream) => stream
            .dict
            .iter()
            .for_each(|(_, v)| collect_references(v, out)),
        _ => {}
    }
}

/// Copy of `object` with references mapped; unknown targets become null.
fn renumber_references(object: &Object, map: &HashMap<ObjectId, ObjectId>) -> Object {
    match object {
        Object::Reference(id) => map.get(id).copied().map(Object::Reference).unwrap_or(Object::Null),
        Object::Array(items) => Object::Array(items.iter().map(|i| renumber_references(i, map)).collect()),
        Object::Dictionary(dict) => Object::Dictionary(renumber_dict(dict, map)),
        Object::Stream(stream) => Object::Stream(Stream::new(
            renumber_dict(&stream.dict, map),
            stream.data.clone(),
        )),
        other => other.clone(),
    }
}

fn renumber_dict(dict: &Dictionary, map: &HashMap<ObjectId, ObjectId>) -> Dictionary {
    dict.iter()
        .map(|(k, v)| (k.clone(), renumber_references(v, map)))
        .filter(|(_, v)| !v.is_null())
        .collect()
}

fn write_indirect(out: &mut Vec<u8>, id: ObjectId, object: &Object) {
    out.extend_from_slice(format!("{} {} obj\n", id.number(), id.generation()).as_bytes());
    write_object(out, object);
    out.extend_from_slice(b"\nendobj\n");
}

/// Writes a direct object in PDF syntax.
pub fn write_object(out: &mut Vec<u8>, object: &Object) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Object::Real(f) => out.extend_from_slice(format_real(*f).as_bytes()),
        Object::String(s) => write_string(out, s),
        Object::Name(n) => write_name(out, n),
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dictionary(out, dict),
        Object::Stream(stream) => {
            write_dictionary(out, &stream.dict);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.data);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference(id) => {
            out.extend_from_slice(format!("{} {} R", id.number(), id.generation()).as_bytes())
        }
    }
}

fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        out.push(b' ');
        write_name(out, key);
        out.push(b' ');
        write_object(out, value);
    }
    out.extend_from_slice(b" >>");
}

/// Decimal form without exponent, trailing zeros trimmed.
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let text = format!("{value:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "" | "-" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    let mut push_byte = |byte: u8| {
        if is_regular(byte) && (0x21..=0x7E).contains(&byte) && byte != b'#' {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{byte:02X}").as_bytes());
        }
    };
    for ch in name.chars() {
        if (ch as u32) <= 0xFF {
            push_byte(ch as u32 as u8);
        } else {
            let mut buf = [0u8; 4];
            for &byte in ch.encode_utf8(&mut buf).as_bytes() {
                push_byte(byte);
            }
        }
    }
}

fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
    let binary = bytes
        .iter()
        .filter(|&&b| !(0x20..0x7F).contains(&b) && !matches!(b, b'\n' | b'\r' | b'\t'))
        .count();
    if binary * 4 > bytes.len() {
        out.push(b'<');
        for byte in bytes {
            out.extend_from_slice(format!("{byte:02X}").as_bytes());
        }
        out.push(b'>');
        return;
    }
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\n' => out.extend_from_slice(b"\\n"),
            0x20..=0x7E | b'\t' => out.push(byte),
            other => out.extend_from_slice(format!("\\{other:03o}").as_bytes()),
        }
    }
    out.push(b')');
}

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    hex.as_bytes()
        .chunks(2)
        .filter_map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
        })
        .collect()
}

/// PDF date string `D:YYYYMMDDHHmmSS+00'00` for the current time.
pub fn pdf_date_now() -> String {
    format!("{}+00'00", chrono::Utc::now().format("D:%Y%m%d%H%M%S"))
}
