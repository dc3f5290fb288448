//! Cross-reference stream output (PDF 1.5+).

use crate::compression::compress;
use crate::error::Result;
use crate::objects::{Dictionary, Object, Stream};
use crate::parser::xref::XRefEntry;

/// Collects entries and produces the `/Type /XRef` stream object.
#[derive(Debug, Default)]
pub struct XRefStreamWriter {
    entries: Vec<(u32, XRefEntry)>,
}

impl XRefStreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, number: u32, entry: XRefEntry) {
        self.entries.push((number, entry));
    }

    /// Builds the stream. `trailer` supplies `/Root`, `/Info` and `/ID`;
    /// `/Size` must cover the stream's own object number, which the caller adds
    /// as the last entry.
    pub fn build(mut self, trailer: &Dictionary) -> Result<Stream> {
        self.entries.sort_by_key(|(number, _)| *number);
        let size = self.entries.last().map(|(n, _)| n + 1).unwrap_or(1);

        let max_field = self
            .entries
            .iter()
            .map(|(_, entry)| match *entry {
                XRefEntry::InUse { offset, .. } => offset as u64,
                XRefEntry::Compressed { stream, .. } => stream as u64,
                XRefEntry::Free => 0,
            })
            .max()
            .unwrap_or(0);
        let offset_width = bytes_needed(max_field);
        let widths = [1usize, offset_width, 2];

        let mut rows = Vec::with_capacity(size as usize * widths.iter().sum::<usize>());
        let mut next = 0u32;
        for (number, entry) in &self.entries {
            // Gaps are free entries.
            while next < *number {
                push_row(&mut rows, widths, 0, 0, if next == 0 { 0xFFFF } else { 0 });
                next += 1;
            }
            match *entry {
                XRefEntry::Free => push_row(&mut rows, widths, 0, 0, 0),
                XRefEntry::InUse { offset, generation } => {
                    push_row(&mut rows, widths, 1, offset as u64, generation as u64)
                }
                XRefEntry::Compressed { stream, index } => {
                    push_row(&mut rows, widths, 2, stream as u64, index as u64)
                }
            }
            next = number + 1;
        }

        let mut dict = Dictionary::new();
        for key in ["Root", "Info", "ID"] {
            if let Some(value) = trailer.get(key) {
                dict.set(key, value.clone());
            }
        }
        dict.set("Type", Object::name("XRef"));
        dict.set("Size", size);
        dict.set(
            "W",
            widths.iter().map(|&w| Object::from(w)).collect::<Vec<_>>(),
        );

        let data = compress(&rows)?;
        let mut stream = Stream::new(dict, Vec::new());
        stream.set_encoded(data, Some("FlateDecode"));
        Ok(stream)
    }
}

fn bytes_needed(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn push_row(rows: &mut Vec<u8>, widths: [usize; 3], kind: u64, field2: u64, field3: u64) {
    for (value, width) in [kind, field2, field3].into_iter().zip(widths) {
        for shift in (0..width).rev() {
            rows.push((value >> (shift * 8)) as u8);
        }
    }
}
