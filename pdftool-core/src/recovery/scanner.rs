//! Linear scan for object definitions, used when the cross-reference data
//! cannot be trusted.

use std::collections::BTreeMap;

use crate::parser::lexer::{is_delimiter, is_whitespace};

/// A scanned `N G obj` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedObject {
    pub number: u32,
    pub generation: u16,
    pub offset: usize,
}

/// Every object definition in the file, later definitions winning, plus the
/// offsets of `trailer` keywords in file order.
#[derive(Debug, Clone, Default)]
pub struct ScanIndex {
    pub objects: BTreeMap<u32, ScannedObject>,
    pub trailers: Vec<usize>,
}

impl ScanIndex {
    pub fn get(&self, number: u32) -> Option<&ScannedObject> {
        self.objects.get(&number)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Scans `data` for object headers and trailer keywords.
pub fn scan(data: &[u8]) -> ScanIndex {
    let mut index = ScanIndex::default();
    let mut i = 0;
    while i + 3 <= data.len() {
        if &data[i..i + 3] == b"obj" && keyword_ends(data, i + 3) {
            if let Some(found) = header_before(data, i) {
                index.objects.insert(found.number, found);
            }
            i += 3;
            continue;
        }
        if data[i..].starts_with(b"trailer") && keyword_ends(data, i + 7) {
            index.trailers.push(i + 7);
            i += 7;
            continue;
        }
        i += 1;
    }
    tracing::debug!(
        "Recovery scan found {} objects and {} trailers",
        index.objects.len(),
        index.trailers.len()
    );
    index
}

fn keyword_ends(data: &[u8], end: usize) -> bool {
    data.get(end)
        .is_none_or(|&b| is_whitespace(b) || is_delimiter(b))
}

/// Reads `N G` backwards from the `obj` keyword at `obj_at`.
fn header_before(data: &[u8], obj_at: usize) -> Option<ScannedObject> {
    let mut pos = obj_at;

    let skip_ws = |mut p: usize| {
        while p > 0 && is_whitespace(data[p - 1]) {
            p -= 1;
        }
        p
    };
    let digits_back = |end: usize| {
        let mut start = end;
        while start > 0 && data[start - 1].is_ascii_digit() {
            start -= 1;
        }
        (start < end).then_some(start)
    };

    let after_gen = skip_ws(pos);
    if after_gen == pos {
        return None;
    }
    let gen_start = digits_back(after_gen)?;
    let after_num = skip_ws(gen_start);
    if after_num == gen_start {
        return None;
    }
    let num_start = digits_back(after_num)?;
    if num_start > 0 {
        let before = data[num_start - 1];
        if !is_whitespace(before) && !is_delimiter(before) {
            return None;
        }
    }
    pos = num_start;

    let number = std::str::from_utf8(&data[num_start..after_num]).ok()?.parse().ok()?;
    let generation = std::str::from_utf8(&data[gen_start..after_gen])
        .ok()?
        .parse()
        .ok()?;
    Some(ScannedObject {
        number,
        generation,
        offset: pos,
    })
}
