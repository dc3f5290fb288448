//! Cross-reference reconstruction for damaged files.
//!
//! When the `startxref` chain is unreadable the file is scanned for object
//! headers, members of object streams are indexed, and a trailer is recovered
//! from the last usable `trailer` dictionary or from the catalog object itself.

pub mod scanner;

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};
use crate::parser::lexer::Lexer;
use crate::parser::object_stream::ObjectStream;
use crate::parser::objects::{parse_indirect_object, parse_object};
use crate::parser::xref::{XRefEntry, XRefTable};
use crate::parser::ParseOptions;

pub use scanner::{scan, ScanIndex, ScannedObject};

/// Bytes inspected after an object header when classifying it.
const PROBE: usize = 512;

/// Rebuilds the cross-reference table and trailer from a linear scan.
pub fn rebuild_xref(data: &[u8], options: &ParseOptions) -> Result<(XRefTable, Dictionary)> {
    let index = scan(data);
    if index.is_empty() {
        return Err(PdfError::StructuralCorruption(
            "no object definitions found".to_string(),
        ));
    }

    let mut table = XRefTable::new();
    for found in index.objects.values() {
        table.insert(
            found.number,
            XRefEntry::InUse {
                offset: found.offset,
                generation: found.generation,
            },
        );
    }

    let mut catalog: Option<ObjectId> = None;
    let mut stream_trailers = Vec::new();
    for found in index.objects.values() {
        let probe_end = (found.offset + PROBE).min(data.len());
        let probe = &data[found.offset..probe_end];
        let interesting = contains(probe, b"/ObjStm")
            || contains(probe, b"/Catalog")
            || contains(probe, b"/XRef");
        if !interesting {
            continue;
        }
        let Ok((id, object)) = parse_indirect_object(data, found.offset, options, &|_| None) else {
            continue;
        };
        let Some(dict) = object.as_dict() else {
            continue;
        };
        if dict.is_type("Catalog") {
            catalog = Some(id);
        } else if dict.is_type("XRef") {
            stream_trailers.push(dict.clone());
        } else if let (true, Object::Stream(stream)) = (dict.is_type("ObjStm"), &object) {
            match ObjectStream::parse(stream) {
                Ok(objstm) => {
                    for (position, number) in objstm.object_numbers().enumerate() {
                        // Directly defined objects take precedence.
                        if index.get(number).is_none() {
                            table.insert(
                                number,
                                XRefEntry::Compressed {
                                    stream: id.number(),
                                    index: position as u32,
                                },
                            );
                        }
                        if catalog.is_none() {
                            if let Ok(member) = objstm.get(position, Some(number), options.max_depth) {
                                if member.as_dict().is_some_and(|d| d.is_type("Catalog")) {
                                    catalog = Some(ObjectId::new(number, 0));
                                }
                            }
                        }
                    }
                }
                Err(e) => tracing::debug!("Skipping unreadable object stream {id}: {e}"),
            }
        }
    }

    let mut trailer = index
        .trailers
        .iter()
        .rev()
        .filter_map(|&offset| {
            let mut lexer = Lexer::at(data, offset);
            match parse_object(&mut lexer, options.max_depth) {
                Ok(Object::Dictionary(dict)) => Some(dict),
                _ => None,
            }
        })
        .chain(stream_trailers.into_iter().rev())
        .find(|dict| {
            dict.get_reference("Root")
                .is_some_and(|root| table.get(root.number()).is_some())
        })
        .unwrap_or_default();

    if !trailer.contains_key("Root") {
        let root = catalog.ok_or(PdfError::MissingCatalog)?;
        trailer.set("Root", root);
    }
    for key in ["Prev", "XRefStm", "Type", "W", "Index", "Filter", "DecodeParms", "Length"] {
        trailer.remove(key);
    }
    let size = table.iter().map(|(n, _)| *n).max().unwrap_or(0) + 1;
    trailer.set("Size", size);

    tracing::debug!("Rebuilt cross-reference table with {} entries", table.len());
    Ok((table, trailer))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_from_objects_and_trailer() {
        let data = b"%PDF-1.4\n\
1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n\
trailer\n<< /Root 1 0 R /Size 3 >>\n%%EOF";
        let (table, trailer) = rebuild_xref(data, &ParseOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(trailer.get_reference("Root"), Some(ObjectId::new(1, 0)));
        assert_eq!(trailer.get_integer("Size"), Some(3));
    }

    #[test]
    fn test_catalog_found_without_trailer() {
        let data = b"%PDF-1.4\n7 0 obj\n<< /Type /Catalog /Pages 8 0 R >>\nendobj\n";
        let (_, trailer) = rebuild_xref(data, &ParseOptions::default()).unwrap();
        assert_eq!(trailer.get_reference("Root"), Some(ObjectId::new(7, 0)));
    }

    #[test]
    fn test_nothing_to_recover() {
        assert!(matches!(
            rebuild_xref(b"not a pdf at all", &ParseOptions::default()),
            Err(PdfError::StructuralCorruption(_))
        ));
    }
}
