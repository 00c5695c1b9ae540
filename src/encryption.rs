//! Encryption model and codec
//!
//! Translates a method + permission + password triple into the cipher
//! parameters lopdf expects, and inversely decodes an opened document's
//! permission bitmask and security-handler revision into method, permission
//! and password-presence facts.

use std::collections::BTreeMap;
use std::sync::Arc;

use lopdf::encryption::crypt_filters::{
    Aes128CryptFilter, Aes256CryptFilter, CryptFilter,
};
use lopdf::encryption::{EncryptionState, EncryptionVersion, Permissions};
use lopdf::{Document, Object, StringFormat};
use md5::{Digest, Md5};
use rand::Rng as _;

use crate::error::{Error, Result};
use crate::page::AccessLevel;

// Permission bit positions from the standard security handler (PDF 32000-1,
// table 22). Bit 1 in the standard is the least significant bit.
const BIT_PRINT: u32 = 1 << 2;
const BIT_MODIFY: u32 = 1 << 3;
const BIT_COPY: u32 = 1 << 4;
const BIT_ANNOTATE: u32 = 1 << 5;
const BIT_FILL_FORMS: u32 = 1 << 8;
const BIT_ACCESSIBILITY: u32 = 1 << 9;
const BIT_ASSEMBLE: u32 = 1 << 10;
const BIT_PRINT_HIGH_QUALITY: u32 = 1 << 11;

/// The two reserved P values that mean "no restriction": all-ones, and
/// all-ones with the two reserved low bits clear. When one of these is seen
/// the opened session has owner-level access and the permission bitmask says
/// nothing about which password class was supplied.
const NO_RESTRICTION_SENTINELS: [i64; 2] = [-1, -4];

/// Cipher method of the standard security handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// RC4 with a 40-bit key (revision 2/3)
    Rc40,
    /// AES with a 128-bit key (revision 4)
    #[default]
    Aes128,
    /// AES with a 256-bit key (revision 5/6)
    Aes256,
    /// A handler revision this engine does not produce
    Unknown,
}

impl Method {
    /// Map a security-handler revision to the cipher family it implies
    pub fn from_revision(revision: i64) -> Method {
        match revision {
            2 | 3 => Method::Rc40,
            4 => Method::Aes128,
            5 | 6 => Method::Aes256,
            _ => Method::Unknown,
        }
    }
}

/// Permission flags of the standard security handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permission {
    pub print: bool,
    pub copy: bool,
    pub modify: bool,
    pub annotate: bool,
    pub fill_forms: bool,
    pub accessibility: bool,
}

impl Permission {
    /// Everything allowed
    pub fn all() -> Self {
        Permission {
            print: true,
            copy: true,
            modify: true,
            annotate: true,
            fill_forms: true,
            accessibility: true,
        }
    }

    /// Nothing allowed
    pub fn none() -> Self {
        Permission {
            print: false,
            copy: false,
            modify: false,
            annotate: false,
            fill_forms: false,
            accessibility: false,
        }
    }

    /// Raw P bitmask. Document assembly follows the modify flag and
    /// high-quality printing follows the print flag, as the desktop PDF
    /// tools this engine interoperates with expect.
    pub fn to_bits(&self) -> u32 {
        let mut bits = 0u32;
        if self.print {
            bits |= BIT_PRINT | BIT_PRINT_HIGH_QUALITY;
        }
        if self.modify {
            bits |= BIT_MODIFY | BIT_ASSEMBLE;
        }
        if self.copy {
            bits |= BIT_COPY;
        }
        if self.annotate {
            bits |= BIT_ANNOTATE;
        }
        if self.fill_forms {
            bits |= BIT_FILL_FORMS;
        }
        if self.accessibility {
            bits |= BIT_ACCESSIBILITY;
        }
        bits
    }

    /// Decode a raw P value (stored signed in the file)
    pub fn from_bits(p: i64) -> Permission {
        let bits = p as u32;
        Permission {
            print: bits & BIT_PRINT != 0,
            copy: bits & BIT_COPY != 0,
            modify: bits & BIT_MODIFY != 0,
            annotate: bits & BIT_ANNOTATE != 0,
            fill_forms: bits & BIT_FILL_FORMS != 0,
            accessibility: bits & BIT_ACCESSIBILITY != 0,
        }
    }

    fn to_flags(self) -> Permissions {
        Permissions::from_bits_truncate(u64::from(self.to_bits()))
    }
}

impl Default for Permission {
    fn default() -> Self {
        Permission::all()
    }
}

/// Target encryption settings for a save, or decoded facts about an opened
/// document.
#[derive(Debug, Clone, Default)]
pub struct Encryption {
    /// When false, every other field is ignored on save
    pub enabled: bool,
    pub method: Method,
    pub owner_password: String,
    pub user_password: String,
    /// Opening the document requires the user password
    pub open_with_password: bool,
    /// Reuse the owner password as the user password
    pub share_password: bool,
    pub permission: Permission,
}

impl Encryption {
    /// The user password actually passed to the cipher.
    ///
    /// Empty when the document should open without a password (the owner
    /// password alone gates owner-level operations). When password-gated
    /// opening is requested but no distinct user password was set, the owner
    /// password is reused so the document still has one shared secret.
    pub fn effective_user_password(&self) -> &str {
        if !self.open_with_password {
            ""
        } else if self.share_password || self.user_password.is_empty() {
            &self.owner_password
        } else {
            &self.user_password
        }
    }

    /// Apply these settings to a fully built document, in place.
    pub fn apply(&self, doc: &mut Document) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        // Key derivation reads the first element of the trailer /ID, which a
        // document built from scratch does not have yet.
        ensure_file_id(doc);

        let owner_password = self.owner_password.as_str();
        let user_password = self.effective_user_password();
        let permissions = self.permission.to_flags();

        // AES-256 does not derive the file key from the passwords; a fresh
        // random key is wrapped by them instead.
        let mut file_encryption_key = [0u8; 32];

        let version = match self.method {
            Method::Rc40 => EncryptionVersion::V1 {
                document: doc,
                owner_password,
                user_password,
                permissions,
            },
            Method::Aes128 => EncryptionVersion::V4 {
                document: doc,
                encrypt_metadata: true,
                crypt_filters: std_crypt_filter(Arc::new(Aes128CryptFilter)),
                stream_filter: b"StdCF".to_vec(),
                string_filter: b"StdCF".to_vec(),
                owner_password,
                user_password,
                permissions,
            },
            Method::Aes256 => {
                rand::rng().fill(&mut file_encryption_key);
                EncryptionVersion::V5 {
                    encrypt_metadata: true,
                    crypt_filters: std_crypt_filter(Arc::new(Aes256CryptFilter)),
                    file_encryption_key: &file_encryption_key,
                    stream_filter: b"StdCF".to_vec(),
                    string_filter: b"StdCF".to_vec(),
                    owner_password,
                    user_password,
                    permissions,
                }
            }
            Method::Unknown => {
                return Err(Error::Encryption(
                    "cannot encrypt with an unknown cipher method".to_string(),
                ));
            }
        };

        let state = EncryptionState::try_from(version)
            .map_err(|e| Error::Encryption(e.to_string()))?;
        doc.encrypt(&state)
            .map_err(|e| Error::Encryption(e.to_string()))?;
        Ok(())
    }
}

fn ensure_file_id(doc: &mut Document) {
    if doc.trailer.get(b"ID").is_ok() {
        return;
    }
    let mut hasher = Md5::new();
    hasher.update(chrono::Local::now().to_rfc3339().as_bytes());
    hasher.update(doc.max_id.to_le_bytes());
    let digest: [u8; 16] = hasher.finalize().into();
    let id = Object::String(digest.to_vec(), StringFormat::Hexadecimal);
    doc.trailer.set("ID", Object::Array(vec![id.clone(), id]));
}

fn std_crypt_filter(filter: Arc<dyn CryptFilter>) -> BTreeMap<Vec<u8>, Arc<dyn CryptFilter>> {
    let mut crypt_filters: BTreeMap<Vec<u8>, Arc<dyn CryptFilter>> = BTreeMap::new();
    crypt_filters.insert(b"StdCF".to_vec(), filter);
    crypt_filters
}

/// Raw facts read from an /Encrypt dictionary before decryption
#[derive(Debug, Clone, Copy)]
pub(crate) struct EncryptInfo {
    pub revision: i64,
    pub permissions: i64,
}

impl EncryptInfo {
    /// A sentinel P value grants owner-level access no matter which password
    /// opened the document; anything else is a restricted user session.
    pub(crate) fn access_level(&self) -> AccessLevel {
        if NO_RESTRICTION_SENTINELS.contains(&self.permissions) {
            AccessLevel::Full
        } else {
            AccessLevel::Restricted
        }
    }
}

/// Read the security-handler revision and raw permission bitmask from the
/// trailer, if the document carries an encryption dictionary at all.
pub(crate) fn read_encrypt_info(doc: &Document) -> Option<EncryptInfo> {
    let encrypt = match doc.trailer.get(b"Encrypt").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok()?,
        Object::Dictionary(dict) => dict,
        _ => return None,
    };
    let revision = encrypt.get(b"R").ok()?.as_i64().ok()?;
    let permissions = encrypt.get(b"P").ok().and_then(|p| p.as_i64().ok())?;
    Some(EncryptInfo {
        revision,
        permissions,
    })
}

/// Decode the encryption facts of a document that has been opened (and, if
/// protected, successfully decrypted with `supplied_password`).
///
/// The permission bitmask alone cannot tell which password class was
/// supplied when access is unrestricted, so the two no-restriction sentinel
/// values attribute the supplied password to the owner slot; anything else
/// means the session is restricted and the password was the user one.
///
/// Known limitation carried over from the original engine: for AES-256
/// sources opened with the owner password, the plaintext user password
/// cannot be recovered, so `user_password` stays empty rather than guessed.
pub(crate) fn decode_encryption(info: EncryptInfo, supplied_password: &str) -> Encryption {
    let mut encryption = Encryption {
        enabled: true,
        method: Method::from_revision(info.revision),
        permission: Permission::from_bits(info.permissions),
        ..Encryption::default()
    };

    if NO_RESTRICTION_SENTINELS.contains(&info.permissions) {
        encryption.owner_password = supplied_password.to_string();
    } else {
        encryption.user_password = supplied_password.to_string();
        encryption.open_with_password = !supplied_password.is_empty();
    }

    encryption
}
