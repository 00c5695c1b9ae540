//! Document assembly: the merge/write engine
//!
//! A [`DocumentAssembler`] takes an ordered list of page descriptors plus
//! target metadata and encryption settings, imports each page's content
//! from its source into a fresh output object graph, carries bookmarks and
//! attachments across, and serializes the result. Output is always written
//! to a temporary file next to the destination and promoted by rename, so
//! the final path only ever holds a complete document or none at all.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::attachments::{dedup_attachments, embed_attachments, Attachment};
use crate::bookmarks::{shift_and_filter, write_outline, Bookmark};
use crate::encryption::Encryption;
use crate::error::{Error, Result};
use crate::metadata::{apply_metadata, Metadata, PdfVersion};
use crate::page::{PageDescriptor, SourceKind};
use crate::raster;
use crate::source::{native_rotation, DocumentSource, OpenedDocument};

/// Dictionary keys whose references are not followed when copying a page's
/// object closure: they point back up the tree (or across to other pages)
/// and would drag the whole source document along.
const UNFOLLOWED_KEYS: [&[u8]; 3] = [b"Parent", b"P", b"Dest"];

/// Source readers opened during one save, keyed by path.
///
/// Owned by the save call and dropped when it returns, success or error, so
/// file handles never outlive the operation and nothing leaks across calls.
pub(crate) struct ReaderCache {
    readers: HashMap<PathBuf, OpenedDocument>,
    /// Paths in first-open order, for deterministic attachment collection
    order: Vec<PathBuf>,
}

impl ReaderCache {
    pub(crate) fn new() -> Self {
        ReaderCache {
            readers: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub(crate) fn get_or_open(&mut self, descriptor: &PageDescriptor) -> Result<&OpenedDocument> {
        match self.readers.entry(descriptor.file.path.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let opened = DocumentSource::reopen(&descriptor.file)?;
                self.order.push(descriptor.file.path.clone());
                Ok(entry.insert(opened))
            }
        }
    }

    /// Every attachment of every source opened so far, in open order
    pub(crate) fn all_attachments(&self) -> Vec<Attachment> {
        self.order
            .iter()
            .filter_map(|path| self.readers.get(path))
            .flat_map(|reader| reader.attachments())
            .collect()
    }
}

fn is_unfollowed(key: &[u8]) -> bool {
    UNFOLLOWED_KEYS.iter().any(|skip| *skip == key)
}

fn push_references(object: &Object, stack: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => stack.push(*id),
        Object::Array(array) => {
            for entry in array {
                push_references(entry, stack);
            }
        }
        Object::Dictionary(dict) => {
            for (key, value) in dict.iter() {
                if !is_unfollowed(key) {
                    push_references(value, stack);
                }
            }
        }
        Object::Stream(stream) => {
            for (key, value) in stream.dict.iter() {
                if !is_unfollowed(key) {
                    push_references(value, stack);
                }
            }
        }
        _ => {}
    }
}

/// Rewrite every reference in an object through `id_map`. References that
/// were deliberately not copied (see [`UNFOLLOWED_KEYS`]) become Null rather
/// than dangling pointers into the source graph.
fn renumber_references(object: &Object, id_map: &HashMap<ObjectId, ObjectId>) -> Object {
    match object {
        Object::Reference(old_id) => match id_map.get(old_id) {
            Some(new_id) => Object::Reference(*new_id),
            None => Object::Null,
        },
        Object::Array(array) => Object::Array(
            array
                .iter()
                .map(|entry| renumber_references(entry, id_map))
                .collect(),
        ),
        Object::Dictionary(dict) => {
            let mut new_dict = Dictionary::new();
            for (key, value) in dict.iter() {
                new_dict.set(key.clone(), renumber_references(value, id_map));
            }
            Object::Dictionary(new_dict)
        }
        Object::Stream(stream) => {
            let mut new_dict = Dictionary::new();
            for (key, value) in stream.dict.iter() {
                new_dict.set(key.clone(), renumber_references(value, id_map));
            }
            let mut new_stream = lopdf::Stream::new(new_dict, stream.content.clone());
            new_stream.allows_compression = stream.allows_compression;
            Object::Stream(new_stream)
        }
        _ => object.clone(),
    }
}

/// Import one page of a source document into the output graph, copying its
/// content streams, resources and annotations structurally and renumbering
/// every reference. The descriptor's rotation delta is composed with the
/// page's native rotation. The returned page object has no /Parent yet.
pub(crate) fn import_pdf_page(
    out: &mut Document,
    src: &Document,
    descriptor: &PageDescriptor,
) -> Result<ObjectId> {
    let pages = src.get_pages();
    let page_id = *pages.get(&descriptor.number).ok_or_else(|| {
        Error::General(format!(
            "page {} not found in {}",
            descriptor.number,
            descriptor.file.path.display()
        ))
    })?;

    let mut page_dict = src.get_dictionary(page_id)?.clone();

    // Inheritable attributes live on ancestor nodes we are not copying;
    // materialize them onto the page itself first.
    for key in [b"Resources".as_slice(), b"MediaBox", b"CropBox"] {
        if !page_dict.has(key) {
            if let Some(value) = crate::source::inherited_attribute(src, page_id, key) {
                page_dict.set(key.to_vec(), value.clone());
            }
        }
    }
    page_dict.remove(b"Parent");

    let rotation = native_rotation(src, page_id).plus(descriptor.rotation);
    page_dict.remove(b"Rotate");
    if rotation.degrees() != 0 {
        page_dict.set("Rotate", Object::Integer(i64::from(rotation.degrees())));
    }

    // Closure of everything the page references
    let mut stack = Vec::new();
    push_references(&Object::Dictionary(page_dict.clone()), &mut stack);
    let mut closure: BTreeSet<ObjectId> = BTreeSet::new();
    while let Some(id) = stack.pop() {
        if !closure.insert(id) {
            continue;
        }
        if let Ok(object) = src.get_object(id) {
            push_references(object, &mut stack);
        }
    }

    let id_map: HashMap<ObjectId, ObjectId> = closure
        .iter()
        .map(|old_id| (*old_id, out.new_object_id()))
        .collect();

    for old_id in &closure {
        if let Ok(object) = src.get_object(*old_id) {
            out.objects
                .insert(id_map[old_id], renumber_references(object, &id_map));
        }
    }

    let new_page = renumber_references(&Object::Dictionary(page_dict), &id_map);
    let new_page_id = out.new_object_id();
    out.objects.insert(new_page_id, new_page);
    Ok(new_page_id)
}

/// Import any page through the one kind-dispatch point
pub(crate) fn import_page(
    out: &mut Document,
    source: &OpenedDocument,
    descriptor: &PageDescriptor,
) -> Result<ObjectId> {
    match descriptor.file.kind {
        SourceKind::Image => raster::import_image_page(out, descriptor),
        SourceKind::Pdf => {
            let graph = source.graph().ok_or_else(|| {
                Error::General(format!(
                    "no object graph for {}",
                    descriptor.file.path.display()
                ))
            })?;
            import_pdf_page(out, graph, descriptor)
        }
    }
}

/// Build the page tree and catalog around imported pages and root them in
/// the trailer
pub(crate) fn attach_page_tree(out: &mut Document, page_ids: &[ObjectId]) {
    let pages_id = out.new_object_id();

    let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();
    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(page_ids.len() as i64));
    pages.set("Kids", Object::Array(kids));

    let catalog_id = out.new_object_id();
    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));

    out.objects.insert(pages_id, Object::Dictionary(pages));
    out.objects.insert(catalog_id, Object::Dictionary(catalog));
    out.trailer.set("Root", Object::Reference(catalog_id));

    for &page_id in page_ids {
        if let Ok(Object::Dictionary(dict)) = out.get_object_mut(page_id) {
            dict.set("Parent", Object::Reference(pages_id));
        }
    }
}

/// Whether promoting the temporary file may replace an existing target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Overwrite {
    Allow,
    Refuse,
}

/// Serialize a finished document to a temporary file beside `path`, then
/// promote it by rename. On any failure the temporary file is removed
/// (best effort) and the final path is left untouched. With
/// [`Overwrite::Refuse`] an existing target fails the promotion instead of
/// being replaced.
pub(crate) fn write_promoted(
    out: &mut Document,
    path: &Path,
    version: PdfVersion,
    overwrite: Overwrite,
) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".pdfworkbench-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    match serialize(out, temp.path(), version) {
        Ok(()) => {
            let persisted = match overwrite {
                Overwrite::Allow => temp.persist(path).map(|_| ()),
                Overwrite::Refuse => temp.persist_noclobber(path).map(|_| ()),
            };
            persisted.map_err(|e| Error::Io(e.error))
        }
        Err(e) => {
            if let Err(close_err) = temp.close() {
                log::warn!("could not remove temporary file: {}", close_err);
            }
            Err(e)
        }
    }
}

fn serialize(out: &mut Document, target: &Path, version: PdfVersion) -> Result<()> {
    // Cross-reference streams ("full compression") need PDF 1.5+
    if version.supports_xref_streams() {
        let mut writer = BufWriter::new(File::create(target)?);
        out.save_modern(&mut writer)?;
        writer.into_inner().map_err(|e| e.into_error())?;
    } else {
        out.save(target)?;
    }
    Ok(())
}

/// The merge/write engine.
///
/// Accumulate descriptors (insertion order is output order), set metadata
/// and encryption, then call [`DocumentAssembler::save`]. Saving borrows the
/// assembler mutably for its whole duration, so a second concurrent save on
/// the same instance is rejected at compile time. The assembler does not own
/// the `MediaFile`s its descriptors reference; sources are reopened into a
/// per-save cache and released when the save returns.
#[derive(Default)]
pub struct DocumentAssembler {
    pages: Vec<PageDescriptor>,
    metadata: Metadata,
    encryption: Encryption,
}

impl DocumentAssembler {
    pub fn new() -> Self {
        DocumentAssembler::default()
    }

    /// Append one page to the output
    pub fn push_page(&mut self, descriptor: PageDescriptor) {
        self.pages.push(descriptor);
    }

    /// Append pages in order
    pub fn extend_pages<I: IntoIterator<Item = PageDescriptor>>(&mut self, descriptors: I) {
        self.pages.extend(descriptors);
    }

    pub fn pages(&self) -> &[PageDescriptor] {
        &self.pages
    }

    pub fn clear_pages(&mut self) {
        self.pages.clear();
    }

    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn set_encryption(&mut self, encryption: Encryption) {
        self.encryption = encryption;
    }

    pub fn encryption_mut(&mut self) -> &mut Encryption {
        &mut self.encryption
    }

    /// Assemble and write the output document.
    ///
    /// Any fatal error aborts the whole save and leaves the target path
    /// untouched. A cipher failure while encrypting the already built
    /// output is reported as [`Error::Encryption`]: the inputs decrypted
    /// fine earlier, so at this stage it is an internal inconsistency, not
    /// bad user input.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if self.pages.is_empty() {
            return Err(Error::NoPages);
        }

        log::info!(
            "assembling {} pages into {}",
            self.pages.len(),
            path.display()
        );

        let mut cache = ReaderCache::new();
        let mut out = Document::with_version(self.metadata.version.to_string());
        let mut page_ids: Vec<ObjectId> = Vec::with_capacity(self.pages.len());
        let mut bookmarks: Vec<Bookmark> = Vec::new();

        for descriptor in &self.pages {
            let output_number = page_ids.len() as u32 + 1;
            let source = cache.get_or_open(descriptor)?;

            let page_id = import_page(&mut out, source, descriptor)?;
            page_ids.push(page_id);

            // Keep only the source bookmarks that land on the page just
            // imported, shifted by its position delta.
            let delta = i64::from(output_number) - i64::from(descriptor.number);
            bookmarks.extend(shift_and_filter(
                &source.bookmarks(),
                delta,
                output_number,
            ));
        }

        attach_page_tree(&mut out, &page_ids);
        apply_metadata(&mut out, &self.metadata)?;
        write_outline(&mut out, &bookmarks)?;
        embed_attachments(&mut out, &dedup_attachments(cache.all_attachments()))?;

        out.compress();
        self.encryption.apply(&mut out)?;
        write_promoted(&mut out, path, self.metadata.version, Overwrite::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_refused_overwrite_keeps_existing_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.pdf");
        std::fs::write(&target, b"keep").unwrap();

        let mut doc = Document::with_version("1.4");
        attach_page_tree(&mut doc, &[]);

        let result = write_promoted(&mut doc, &target, PdfVersion::default(), Overwrite::Refuse);
        assert!(result.is_err());
        assert_eq!(std::fs::read(&target).unwrap(), b"keep");
    }

    #[test]
    fn test_save_without_pages() {
        let mut assembler = DocumentAssembler::new();
        let result = assembler.save(Path::new("never-written.pdf"));
        assert!(matches!(result, Err(Error::NoPages)));
        assert!(!Path::new("never-written.pdf").exists());
    }

    #[test]
    fn test_unfollowed_keys() {
        assert!(is_unfollowed(b"Parent"));
        assert!(is_unfollowed(b"P"));
        assert!(is_unfollowed(b"Dest"));
        assert!(!is_unfollowed(b"Contents"));
        assert!(!is_unfollowed(b"Resources"));
    }

    #[test]
    fn test_renumber_maps_and_nulls() {
        let mut id_map = HashMap::new();
        id_map.insert((1, 0), (7, 0));

        let object = Object::Array(vec![
            Object::Reference((1, 0)),
            Object::Reference((2, 0)),
            Object::Integer(5),
        ]);
        let renumbered = renumber_references(&object, &id_map);
        let Object::Array(entries) = renumbered else {
            panic!("expected array");
        };
        assert_eq!(entries[0], Object::Reference((7, 0)));
        assert_eq!(entries[1], Object::Null);
        assert_eq!(entries[2], Object::Integer(5));
    }
}
