//! Standard security handler.
//!
//! Documents protected only by an owner password (the common "no printing,
//! no copying" case) carry an empty user password. They are opened with that
//! empty password and every string and stream is decrypted as it is loaded.
//! Revisions 2 to 4 use RC4 or AES-128 with MD5 key derivation, revisions 5
//! and 6 use AES-256 with SHA-2 password hashes.

pub mod rc4;

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, Stream};

pub use rc4::{rc4, Rc4};

/// Password padding string from the standard security handler.
pub const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

const AES_BLOCK: usize = 16;

/// How strings or streams are encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    Rc4,
    Aes128,
    Aes256,
}

impl CryptMethod {
    fn from_cfm(cfm: Option<&str>) -> Result<Self> {
        match cfm {
            None | Some("None") => Ok(Self::Identity),
            Some("V2") => Ok(Self::Rc4),
            Some("AESV2") => Ok(Self::Aes128),
            Some("AESV3") => Ok(Self::Aes256),
            Some(other) => Err(PdfError::EncryptedDocument(format!(
                "unsupported crypt filter method /{other}"
            ))),
        }
    }
}

/// An unlocked standard security handler.
#[derive(Debug, Clone)]
pub struct SecurityHandler {
    revision: i64,
    key: Vec<u8>,
    strings: CryptMethod,
    streams: CryptMethod,
    encrypt_metadata: bool,
}

impl SecurityHandler {
    /// Parses the `/Encrypt` dictionary and authenticates with the empty user
    /// password. `file_id` is the first element of the trailer `/ID`.
    pub fn open(encrypt: &Dictionary, file_id: &[u8]) -> Result<Self> {
        let filter = encrypt.get_name("Filter").unwrap_or("");
        if filter != "Standard" {
            return Err(PdfError::EncryptedDocument(format!(
                "unsupported security handler /{filter}"
            )));
        }
        let missing = |key: &str| PdfError::EncryptedDocument(format!("/Encrypt has no /{key}"));
        let version = encrypt.get_integer("V").unwrap_or(0);
        let revision = encrypt.get_integer("R").ok_or_else(|| missing("R"))?;
        let owner = encrypt
            .get("O")
            .and_then(Object::as_string)
            .ok_or_else(|| missing("O"))?;
        let user = encrypt
            .get("U")
            .and_then(Object::as_string)
            .ok_or_else(|| missing("U"))?;
        let permissions = encrypt.get_integer("P").ok_or_else(|| missing("P"))?;
        let encrypt_metadata = encrypt
            .get("EncryptMetadata")
            .and_then(Object::as_bool)
            .unwrap_or(true);

        let (strings, streams) = match version {
            1 | 2 => (CryptMethod::Rc4, CryptMethod::Rc4),
            4 | 5 => (
                crypt_filter(encrypt, "StrF")?,
                crypt_filter(encrypt, "StmF")?,
            ),
            other => {
                return Err(PdfError::EncryptedDocument(format!(
                    "unsupported encryption version {other}"
                )))
            }
        };

        let key = match revision {
            2..=4 => {
                let length = match version {
                    1 => 5,
                    4 => 16,
                    _ => (encrypt.get_integer("Length").unwrap_or(40) / 8).clamp(5, 16) as usize,
                };
                let key = file_key(
                    revision,
                    length,
                    b"",
                    owner,
                    permissions,
                    file_id,
                    encrypt_metadata,
                );
                let expected = user_hash(revision, &key, file_id);
                let compared = if revision == 2 { 32 } else { 16 };
                if user.len() < compared || user[..compared] != expected[..compared] {
                    return Err(password_required());
                }
                key
            }
            5 | 6 => {
                let user_key = encrypt
                    .get("UE")
                    .and_then(Object::as_string)
                    .ok_or_else(|| missing("UE"))?;
                if user.len() < 48 || user_key.len() < 32 {
                    return Err(PdfError::EncryptedDocument(
                        "/U or /UE is too short".to_string(),
                    ));
                }
                let hash = password_hash(revision, b"", &user[32..40], &[])?;
                if hash[..] != user[..32] {
                    return Err(password_required());
                }
                let intermediate = password_hash(revision, b"", &user[40..48], &[])?;
                let mut key = user_key[..32].to_vec();
                cbc::Decryptor::<Aes256>::new_from_slices(&intermediate, &[0u8; AES_BLOCK])
                    .map_err(|e| PdfError::EncryptedDocument(e.to_string()))?
                    .decrypt_padded_mut::<NoPadding>(&mut key)
                    .map_err(|e| PdfError::EncryptedDocument(e.to_string()))?;
                key
            }
            other => {
                return Err(PdfError::EncryptedDocument(format!(
                    "unsupported security handler revision {other}"
                )))
            }
        };

        tracing::debug!(
            "Opened encrypted document: V{version} R{revision}, strings {strings:?}, streams {streams:?}"
        );
        Ok(Self {
            revision,
            key,
            strings,
            streams,
            encrypt_metadata,
        })
    }

    pub fn revision(&self) -> i64 {
        self.revision
    }

    /// Decrypts every string in `object` and, for streams, the stream data.
    pub fn decrypt_object(&self, id: ObjectId, object: Object) -> Result<Object> {
        Ok(match object {
            Object::String(bytes) => Object::String(self.decrypt(self.strings, id, &bytes)?),
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|item| self.decrypt_object(id, item))
                    .collect::<Result<_>>()?,
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.decrypt_dict(id, dict)?),
            Object::Stream(stream) => {
                let skip = stream.dict.is_type("XRef")
                    || (stream.dict.is_type("Metadata") && !self.encrypt_metadata)
                    || stream.filters().first().map(String::as_str) == Some("Crypt");
                let dict = self.decrypt_dict(id, stream.dict)?;
                let data = if skip {
                    stream.data
                } else {
                    self.decrypt(self.streams, id, &stream.data)?
                };
                Object::Stream(Stream::new(dict, data))
            }
            other => other,
        })
    }

    fn decrypt_dict(&self, id: ObjectId, dict: Dictionary) -> Result<Dictionary> {
        dict.into_iter()
            .map(|(key, value)| Ok((key, self.decrypt_object(id, value)?)))
            .collect()
    }

    fn decrypt(&self, method: CryptMethod, id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4(&self.object_key(id, false), data)),
            CryptMethod::Aes128 => aes_decrypt(&self.object_key(id, true), data),
            CryptMethod::Aes256 => aes_decrypt(&self.key, data),
        }
    }

    /// Per-object key: MD5 of the file key, the object number and generation.
    fn object_key(&self, id: ObjectId, aes: bool) -> Vec<u8> {
        let mut context = md5::Context::new();
        context.consume(&self.key);
        context.consume(&id.number().to_le_bytes()[..3]);
        context.consume(id.generation().to_le_bytes());
        if aes {
            context.consume(b"sAlT");
        }
        let digest = context.finalize();
        digest.0[..(self.key.len() + 5).min(16)].to_vec()
    }
}

fn password_required() -> PdfError {
    PdfError::EncryptedDocument("a user password is required".to_string())
}

fn crypt_filter(encrypt: &Dictionary, key: &str) -> Result<CryptMethod> {
    let name = encrypt.get_name(key).unwrap_or("Identity");
    if name == "Identity" {
        return Ok(CryptMethod::Identity);
    }
    let filter = encrypt
        .get("CF")
        .and_then(Object::as_dict)
        .and_then(|filters| filters.get(name))
        .and_then(Object::as_dict)
        .ok_or_else(|| PdfError::EncryptedDocument(format!("crypt filter /{name} is not defined")))?;
    CryptMethod::from_cfm(filter.get_name("CFM"))
}

/// File encryption key for revisions 2 to 4 (MD5 based).
pub fn file_key(
    revision: i64,
    length: usize,
    password: &[u8],
    owner: &[u8],
    permissions: i64,
    file_id: &[u8],
    encrypt_metadata: bool,
) -> Vec<u8> {
    let mut context = md5::Context::new();
    context.consume(pad_password(password));
    context.consume(&owner[..owner.len().min(32)]);
    context.consume((permissions as u32).to_le_bytes());
    context.consume(file_id);
    if revision >= 4 && !encrypt_metadata {
        context.consume([0xFF; 4]);
    }
    let mut digest = context.finalize().0;
    if revision >= 3 {
        for _ in 0..50 {
            digest = md5::compute(&digest[..length]).0;
        }
    }
    digest[..length].to_vec()
}

/// Expected `/U` value for revisions 2 to 4. Only the first 16 bytes are
/// significant from revision 3 on.
pub fn user_hash(revision: i64, key: &[u8], file_id: &[u8]) -> Vec<u8> {
    if revision == 2 {
        return rc4(key, &PADDING);
    }
    let mut context = md5::Context::new();
    context.consume(PADDING);
    context.consume(file_id);
    let mut hash = rc4(key, &context.finalize().0);
    for round in 1..=19u8 {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
        hash = rc4(&round_key, &hash);
    }
    hash.resize(32, 0);
    hash
}

/// Password hash for revisions 5 (plain SHA-256) and 6 (iterated SHA-2/AES).
pub fn password_hash(revision: i64, password: &[u8], salt: &[u8], user_data: &[u8]) -> Result<[u8; 32]> {
    let password = &password[..password.len().min(127)];
    let mut k = Sha256::new()
        .chain_update(password)
        .chain_update(salt)
        .chain_update(user_data)
        .finalize()
        .to_vec();

    if revision >= 6 {
        let mut round = 0u32;
        loop {
            let mut block = Vec::with_capacity(64 * (password.len() + k.len() + user_data.len()));
            for _ in 0..64 {
                block.extend_from_slice(password);
                block.extend_from_slice(&k);
                block.extend_from_slice(user_data);
            }
            let length = block.len();
            let encrypted = cbc::Encryptor::<Aes128>::new_from_slices(&k[..16], &k[16..32])
                .map_err(|e| PdfError::EncryptedDocument(e.to_string()))?
                .encrypt_padded_mut::<NoPadding>(&mut block, length)
                .map_err(|e| PdfError::EncryptedDocument(e.to_string()))?
                .to_vec();
            // the first 16 bytes as a big-endian number, modulo 3
            k = match encrypted[..16].iter().map(|&b| b as u32).sum::<u32>() % 3 {
                0 => Sha256::digest(&encrypted).to_vec(),
                1 => Sha384::digest(&encrypted).to_vec(),
                _ => Sha512::digest(&encrypted).to_vec(),
            };
            round += 1;
            let last = encrypted.last().copied().unwrap_or(0) as u32;
            if round >= 64 && last + 32 <= round {
                break;
            }
        }
    }

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&k[..32]);
    Ok(hash)
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PADDING;
    let used = password.len().min(32);
    padded[..used].copy_from_slice(&password[..used]);
    padded[used..].copy_from_slice(&PADDING[..32 - used]);
    padded
}

/// AES-CBC with the IV in the first block and PKCS#7 padding. The key
/// length selects AES-128 or AES-256.
fn aes_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() == AES_BLOCK {
        return Ok(Vec::new());
    }
    if data.len() < AES_BLOCK || data.len() % AES_BLOCK != 0 {
        return Err(PdfError::EncryptedDocument(format!(
            "AES data length {} is not a whole number of blocks",
            data.len()
        )));
    }
    let (iv, body) = data.split_at(AES_BLOCK);
    let mut buffer = body.to_vec();
    let plain = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|e| PdfError::EncryptedDocument(e.to_string()))?
            .decrypt_padded_mut::<Pkcs7>(&mut buffer)
            .map(<[u8]>::len),
        _ => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|e| PdfError::EncryptedDocument(e.to_string()))?
            .decrypt_padded_mut::<Pkcs7>(&mut buffer)
            .map(<[u8]>::len),
    }
    .map_err(|e| PdfError::EncryptedDocument(format!("AES padding: {e}")))?;
    buffer.truncate(plain);
    Ok(buffer)
}
