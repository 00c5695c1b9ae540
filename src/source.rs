//! Source readers: opening PDF and image files
//!
//! [`DocumentSource::open`] turns a path into an [`OpenedDocument`]: the
//! object graph is loaded (decrypting protected files through a caller
//! supplied [`PasswordProvider`]), and pages, metadata, encryption facts,
//! bookmarks and attachments become enumerable. The underlying graph is
//! owned by the `OpenedDocument` and released exactly once when it drops,
//! on every exit path.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lopdf::xref::XrefEntry;
use lopdf::{Document, Object, ObjectId, Reader};

use crate::attachments::{read_attachments, Attachment};
use crate::bookmarks::{read_outline, Bookmark};
use crate::encryption::{decode_encryption, read_encrypt_info, Encryption};
use crate::error::{Error, Result};
use crate::metadata::{read_metadata, Metadata};
use crate::page::{
    AccessLevel, MediaFile, PageDescriptor, PageSize, Resolution, Rotation, SourceKind,
};
use crate::raster;

/// Number of attempts at loading a flaky source before giving up
const LOAD_ATTEMPTS: u32 = 3;
/// Fixed pause between load attempts
const LOAD_RETRY_DELAY: Duration = Duration::from_millis(150);

/// Supplies passwords for protected sources.
///
/// The open loop calls this repeatedly until the document decrypts or the
/// provider returns `None` (cancellation). Modelling the retry as an
/// explicit injected callback keeps the bound and the cancellation path
/// testable without any UI.
pub trait PasswordProvider {
    /// Return the next password to try for `path`, or `None` to give up
    fn password(&mut self, path: &Path) -> Option<String>;
}

/// Provider that never supplies a password; protected files fail to open
pub struct NoPassword;

impl PasswordProvider for NoPassword {
    fn password(&mut self, _path: &Path) -> Option<String> {
        None
    }
}

/// Provider backed by a fixed list, tried in order. Used by the CLI and by
/// tests; an interactive front end would implement [`PasswordProvider`]
/// itself.
pub struct PasswordList {
    passwords: Vec<String>,
    next: usize,
}

impl PasswordList {
    pub fn new(passwords: Vec<String>) -> Self {
        PasswordList { passwords, next: 0 }
    }

    /// A list with a single entry
    pub fn single(password: impl Into<String>) -> Self {
        PasswordList::new(vec![password.into()])
    }
}

impl PasswordProvider for PasswordList {
    fn password(&mut self, _path: &Path) -> Option<String> {
        let password = self.passwords.get(self.next)?.clone();
        self.next += 1;
        Some(password)
    }
}

/// Opens source files
pub struct DocumentSource;

impl DocumentSource {
    /// Open a PDF or image file, decrypting protected PDFs through
    /// `provider`.
    ///
    /// For a protected file the empty password is tried first (many
    /// documents are owner-locked but open freely); after that the provider
    /// is polled until it yields the right password or cancels, in which
    /// case the error is [`Error::PasswordRequired`], a recoverable
    /// condition rather than a corrupt file.
    pub fn open(path: &Path, provider: &mut dyn PasswordProvider) -> Result<OpenedDocument> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        if raster::is_image_path(path) {
            return Self::open_image(path);
        }
        Self::open_pdf(path, provider)
    }

    /// Open with a single known password (no retry loop)
    pub fn open_with_password(path: &Path, password: &str) -> Result<OpenedDocument> {
        Self::open(path, &mut PasswordList::single(password))
    }

    /// Reopen a file that was opened before, reusing its recorded password.
    /// Used by the writers' per-save cache.
    pub(crate) fn reopen(file: &MediaFile) -> Result<OpenedDocument> {
        match &file.password {
            Some(password) => Self::open_with_password(&file.path, password),
            None => Self::open(&file.path, &mut NoPassword),
        }
    }

    fn open_image(path: &Path) -> Result<OpenedDocument> {
        let pixels = raster::image_dimensions(path)?;
        let file = Arc::new(MediaFile {
            path: path.to_path_buf(),
            kind: SourceKind::Image,
            page_count: 1,
            password: None,
            access: AccessLevel::Full,
        });
        Ok(OpenedDocument {
            file,
            doc: None,
            pixels: Some(pixels),
            metadata: Metadata::default(),
            encryption: Encryption::default(),
        })
    }

    fn open_pdf(path: &Path, provider: &mut dyn PasswordProvider) -> Result<OpenedDocument> {
        let mut doc = load_with_retry(path)?;

        // Decrypting removes the /Encrypt dictionary, so capture the
        // handler facts first.
        let encrypt_info = read_encrypt_info(&doc);

        let mut used_password = String::new();
        // The loader authenticates the empty password itself and decrypts
        // the graph at load time (encryption_state set, /Encrypt still in
        // the trailer). Only a real user password leaves the document
        // locked.
        if doc.encryption_state.is_none() && doc.is_encrypted() {
            loop {
                let Some(attempt) = provider.password(path) else {
                    return Err(Error::PasswordRequired(path.to_path_buf()));
                };
                let mut candidate = load_protected(path)?;
                match candidate.decrypt(&attempt) {
                    Ok(()) => {
                        used_password = attempt;
                        doc = candidate;
                        break;
                    }
                    Err(e) => {
                        log::debug!("password rejected for {}: {}", path.display(), e);
                    }
                }
            }
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(Error::EmptyPdf(path.to_path_buf()));
        }

        let (encryption, access) = match encrypt_info {
            // Undetectable handler revision: report the document as not
            // encrypted rather than invent facts.
            None => (Encryption::default(), AccessLevel::Full),
            Some(info) => (decode_encryption(info, &used_password), info.access_level()),
        };

        let file = Arc::new(MediaFile {
            path: path.to_path_buf(),
            kind: SourceKind::Pdf,
            page_count,
            password: if used_password.is_empty() {
                None
            } else {
                Some(used_password)
            },
            access,
        });

        let metadata = read_metadata(&doc);
        Ok(OpenedDocument {
            file,
            doc: Some(doc),
            pixels: None,
            metadata,
            encryption,
        })
    }
}

fn load_with_retry(path: &Path) -> Result<Document> {
    let mut last = None;
    for attempt in 1..=LOAD_ATTEMPTS {
        match Document::load(path) {
            Ok(doc) => return Ok(doc),
            Err(e) => {
                log::debug!(
                    "load attempt {}/{} failed for {}: {}",
                    attempt,
                    LOAD_ATTEMPTS,
                    path.display(),
                    e
                );
                last = Some(e);
                if attempt < LOAD_ATTEMPTS {
                    std::thread::sleep(LOAD_RETRY_DELAY);
                }
            }
        }
    }
    Err(Error::Load {
        path: path.to_path_buf(),
        source: last.expect("at least one attempt"),
    })
}

/// Load a protected document whose user password is not empty.
///
/// The plain loader authenticates the empty password at load time; when that
/// fails it returns a document holding only the trailer, cross-reference
/// table and encryption dictionary. This re-parses every raw object off the
/// file buffer through the same reader, leaving the contents encrypted so
/// [`Document::decrypt`] can authenticate and decrypt them in place.
fn load_protected(path: &Path) -> Result<Document> {
    let buffer = std::fs::read(path)?;
    let reader = Reader {
        document: Document::load_mem(&buffer)?,
        buffer: &buffer,
        encryption_state: None,
        raw_objects: BTreeMap::new(),
    };

    let ids: Vec<ObjectId> = reader
        .document
        .reference_table
        .entries
        .iter()
        .filter_map(|(&number, entry)| match entry {
            XrefEntry::Normal { generation, .. } => Some((number, *generation)),
            // Objects in object streams surface when the stream is decrypted
            _ => None,
        })
        .collect();

    let mut parsed = Vec::with_capacity(ids.len());
    for id in ids {
        // An entry that fails to parse on its own is dropped, matching how
        // the loader treats unreadable objects.
        if let Ok(object) = reader.get_object(id, &mut HashSet::new()) {
            parsed.push((id, object));
        }
    }

    let mut doc = reader.document;
    for (id, object) in parsed {
        doc.objects.entry(id).or_insert(object);
    }
    Ok(doc)
}

/// An opened source file: the object graph plus everything the writer
/// components need to enumerate.
pub struct OpenedDocument {
    file: Arc<MediaFile>,
    /// `None` for image sources
    doc: Option<Document>,
    /// Pixel dimensions, image sources only
    pixels: Option<(u32, u32)>,
    metadata: Metadata,
    encryption: Encryption,
}

impl OpenedDocument {
    pub fn file(&self) -> &Arc<MediaFile> {
        &self.file
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn encryption(&self) -> &Encryption {
        &self.encryption
    }

    /// Borrow the underlying object graph (PDF sources only)
    pub(crate) fn graph(&self) -> Option<&Document> {
        self.doc.as_ref()
    }

    /// One descriptor per physical page, in page order. Recomputed from the
    /// object graph on each call, so the sequence is restartable.
    pub fn pages(&self) -> Vec<PageDescriptor> {
        (1..=self.file.page_count as u32)
            .filter_map(|number| self.get_page(number).ok())
            .collect()
    }

    /// Random access to a single page descriptor (1-based)
    pub fn get_page(&self, number: u32) -> Result<PageDescriptor> {
        if number == 0 || number as usize > self.file.page_count {
            return Err(Error::General(format!(
                "page {} out of range for {} ({} pages)",
                number,
                self.file.path.display(),
                self.file.page_count
            )));
        }

        let resolution = Resolution::default();
        let size = match (&self.doc, self.pixels) {
            (Some(doc), _) => page_size(doc, number).unwrap_or(PageSize::LETTER),
            (None, Some(pixels)) => raster::view_size(pixels, resolution),
            (None, None) => PageSize::LETTER,
        };

        Ok(PageDescriptor {
            file: Arc::clone(&self.file),
            number,
            size,
            // Delta from the native rotation; the native value stays in the
            // page dictionary and is carried through the import.
            rotation: Rotation::None,
            resolution,
        })
    }

    /// Embedded files of this document (empty for image sources)
    pub fn attachments(&self) -> Vec<Attachment> {
        match &self.doc {
            Some(doc) => read_attachments(doc, &self.file.path),
            None => Vec::new(),
        }
    }

    /// Flattened outline entries of this document (empty for image sources)
    pub fn bookmarks(&self) -> Vec<Bookmark> {
        match &self.doc {
            Some(doc) => read_outline(doc),
            None => Vec::new(),
        }
    }
}

/// Look up an inheritable page attribute, walking the /Parent chain
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: lopdf::ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = page_id;
    // Parent chains are short; the bound guards against cycles
    for _ in 0..64 {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok()?;
    }
    None
}

fn page_size(doc: &Document, number: u32) -> Option<PageSize> {
    let page_id = *doc.get_pages().get(&number)?;
    let media_box = inherited_attribute(doc, page_id, b"MediaBox")?;
    let media_box = match media_box {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        obj => obj,
    };
    let coords: Vec<f64> = media_box
        .as_array()
        .ok()?
        .iter()
        .filter_map(|obj| match obj {
            Object::Integer(n) => Some(*n as f64),
            Object::Real(n) => Some(f64::from(*n)),
            _ => None,
        })
        .collect();
    if coords.len() != 4 {
        return None;
    }
    Some(PageSize {
        width: (coords[2] - coords[0]).abs(),
        height: (coords[3] - coords[1]).abs(),
    })
}

/// Native /Rotate value of a source page, normalized
pub(crate) fn native_rotation(doc: &Document, page_id: lopdf::ObjectId) -> Rotation {
    inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .and_then(|degrees| Rotation::from_degrees(degrees as i32))
        .unwrap_or(Rotation::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_nonexistent_file() {
        let result = DocumentSource::open(Path::new("nonexistent.pdf"), &mut NoPassword);
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_password_list_exhausts() {
        let mut list = PasswordList::new(vec!["a".to_string(), "b".to_string()]);
        let path = Path::new("x.pdf");
        assert_eq!(list.password(path).as_deref(), Some("a"));
        assert_eq!(list.password(path).as_deref(), Some("b"));
        assert_eq!(list.password(path), None);
        assert_eq!(list.password(path), None);
    }

    #[test]
    fn test_no_password_always_cancels() {
        assert!(NoPassword.password(Path::new("x.pdf")).is_none());
    }
}
