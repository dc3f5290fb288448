//! Builds a [`Document`] from file bytes.

use std::path::Path;

use super::xref::{find_startxref, load_xref_chain, XRefTable};
use super::{ParseError, ParseOptions};
use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::objects::Dictionary;
use crate::recovery::rebuild_xref;

/// Header search window; some producers prepend junk before `%PDF-`.
const HEADER_WINDOW: usize = 1024;

/// Entry point for parsing PDF files.
pub struct PdfReader;

impl PdfReader {
    /// Reads and parses a file.
    pub fn open(path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PdfError::InputNotFound(path.to_path_buf()));
        }
        Self::parse(std::fs::read(path)?)
    }

    pub fn parse(bytes: impl Into<Vec<u8>>) -> Result<Document> {
        Self::parse_with_options(bytes, ParseOptions::default())
    }

    pub fn parse_with_options(bytes: impl Into<Vec<u8>>, options: ParseOptions) -> Result<Document> {
        let data = bytes.into();
        let mut header_warning = None;
        let version = match parse_header(&data) {
            Some(version) => version,
            None if options.lenient => {
                header_warning = Some("Missing %PDF header, assuming version 1.4".to_string());
                "1.4".to_string()
            }
            None => return Err(ParseError::InvalidHeader.into()),
        };

        let first_attempt = match read_xref(&data, &options) {
            Ok((table, trailer)) => {
                let mut document =
                    Document::from_xref(data, version.clone(), options.clone(), &table, trailer);
                document.unlock()?;
                if document.catalog().is_ok() || !options.recover_xref {
                    Ok(document)
                } else {
                    Err((
                        document.into_data(),
                        "catalog unreachable through cross-reference table".to_string(),
                    ))
                }
            }
            Err(e) if options.recover_xref => Err((data, e.to_string())),
            Err(e) => return Err(PdfError::StructuralCorruption(e.to_string())),
        };

        let mut document = match first_attempt {
            Ok(document) => document,
            Err((data, reason)) => {
                let (table, trailer) = rebuild_xref(&data, &options).map_err(|e| match e {
                    PdfError::MissingCatalog => PdfError::MissingCatalog,
                    other => PdfError::StructuralCorruption(format!(
                        "{reason}; repair failed: {other}"
                    )),
                })?;
                let mut document = Document::from_xref(data, version, options, &table, trailer);
                document.unlock()?;
                document.warn(format!("Cross-reference table rebuilt by scanning: {reason}"));
                document
            }
        };

        if let Some(warning) = header_warning {
            document.warn(warning);
        }
        document.catalog()?;
        document.refresh_pages()?;
        tracing::debug!(
            "Parsed PDF {} with {} objects and {} pages",
            document.version(),
            document.object_count(),
            document.page_count()
        );
        Ok(document)
    }
}

/// Version from the `%PDF-x.y` header.
fn parse_header(data: &[u8]) -> Option<String> {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    let at = window.windows(5).position(|w| w == b"%PDF-")?;
    let version: String = data[at + 5..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| b as char)
        .collect();
    (!version.is_empty()).then_some(version)
}

fn read_xref(data: &[u8], options: &ParseOptions) -> std::result::Result<(XRefTable, Dictionary), ParseError> {
    let start = find_startxref(data)?;
    load_xref_chain(data, start, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::rc4;
    use crate::encryption::tests::{object_key, rc4_encrypt_dict, FILE_ID};
    use crate::objects::{Object, ObjectId, Stream};
    use crate::test_support::{assemble, dict};

    /// One page whose content stream and `/Info` title are RC4 encrypted.
    fn encrypted_pdf(user_password: &[u8]) -> Vec<u8> {
        let (encrypt, key) = rc4_encrypt_dict(user_password);
        let seal = |number: u32, plain: &[u8]| rc4(&object_key(&key, ObjectId::new(number, 0), false), plain);
        let reference = |number: u32| Object::Reference(ObjectId::new(number, 0));

        let objects = vec![
            (
                1,
                Object::Dictionary(dict([
                    ("Type", Object::name("Catalog")),
                    ("Pages", reference(2)),
                ])),
            ),
            (
                2,
                Object::Dictionary(dict([
                    ("Type", Object::name("Pages")),
                    ("Kids", Object::Array(vec![reference(3)])),
                    ("Count", 1.into()),
                ])),
            ),
            (
                3,
                Object::Dictionary(dict([
                    ("Type", Object::name("Page")),
                    ("Parent", reference(2)),
                    (
                        "MediaBox",
                        Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
                    ),
                    ("Contents", reference(4)),
                ])),
            ),
            (
                4,
                Object::Stream(Stream::new(
                    Dictionary::new(),
                    seal(4, b"BT /F1 12 Tf 72 720 Td (Unlocked) Tj ET"),
                )),
            ),
            (
                5,
                Object::Dictionary(dict([("Title", Object::String(seal(5, b"Confidential")))])),
            ),
            (6, Object::Dictionary(encrypt)),
        ];
        let trailer = dict([
            ("Root", reference(1)),
            ("Info", reference(5)),
            ("Encrypt", reference(6)),
            (
                "ID",
                Object::Array(vec![
                    Object::String(FILE_ID.to_vec()),
                    Object::String(FILE_ID.to_vec()),
                ]),
            ),
        ]);
        assemble(&objects, &trailer)
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(b"%PDF-1.7\n..."), Some("1.7".to_string()));
        assert_eq!(parse_header(b"junk\n%PDF-2.0\r\n"), Some("2.0".to_string()));
        assert_eq!(parse_header(b"hello"), None);
    }

    #[test]
    fn test_strict_rejects_missing_header() {
        let result = PdfReader::parse_with_options(b"garbage".to_vec(), ParseOptions::strict());
        assert!(matches!(result, Err(PdfError::Parse(ParseError::InvalidHeader))));
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            PdfReader::open("/definitely/not/here.pdf"),
            Err(PdfError::InputNotFound(_))
        ));
    }

    #[test]
    fn test_owner_protected_document_is_decrypted() {
        let doc = PdfReader::parse(encrypted_pdf(b"")).unwrap();
        assert!(doc.is_encrypted());
        assert_eq!(doc.page_count(), 1);

        let page = doc.page(1).unwrap();
        assert_eq!(
            doc.content_stream(page).unwrap(),
            b"BT /F1 12 Tf 72 720 Td (Unlocked) Tj ET"
        );
        let title = doc.info().and_then(|info| info.get("Title")).and_then(Object::as_string);
        assert_eq!(title, Some(&b"Confidential"[..]));
    }

    #[test]
    fn test_user_password_protected_document_is_rejected() {
        let result = PdfReader::parse(encrypted_pdf(b"letmein"));
        assert!(matches!(result, Err(PdfError::EncryptedDocument(_))));
    }

    #[test]
    fn test_unrecoverable_garbage() {
        let result = PdfReader::parse(b"%PDF-1.4\nnothing useful here".to_vec());
        assert!(matches!(result, Err(PdfError::StructuralCorruption(_))));
    }
}
