//! Embedded file (attachment) enumeration, deduplication and embedding
//!
//! Attachments live in the catalog's /Names → /EmbeddedFiles name tree.
//! Merging several sources can bring in byte-identical copies of the same
//! file, so embedding is deduplicated on the (name, checksum) pair.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Local;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use md5::{Digest, Md5};

use crate::error::Result;

/// One embedded file pulled out of a source document. Immutable.
///
/// The content bytes and checksum are computed lazily: enumerating the
/// attachments of a large document costs nothing until one is actually read.
#[derive(Debug, Clone)]
pub struct Attachment {
    name: String,
    source: PathBuf,
    payload: Payload,
    decoded: OnceLock<Vec<u8>>,
    checksum: OnceLock<[u8; 16]>,
}

#[derive(Debug, Clone)]
enum Payload {
    Bytes(Vec<u8>),
    /// An embedded-file stream as it sits in the source, decoded on first use
    Stream(Stream),
}

impl Attachment {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        Attachment {
            name: name.into(),
            source: source.into(),
            payload: Payload::Bytes(data),
            decoded: OnceLock::new(),
            checksum: OnceLock::new(),
        }
    }

    fn from_stream(name: impl Into<String>, source: impl Into<PathBuf>, stream: Stream) -> Self {
        Attachment {
            name: name.into(),
            source: source.into(),
            payload: Payload::Stream(stream),
            decoded: OnceLock::new(),
            checksum: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the document this attachment came from
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Content bytes, decoded from the source stream on first use
    pub fn data(&self) -> &[u8] {
        match &self.payload {
            Payload::Bytes(data) => data,
            Payload::Stream(stream) => self.decoded.get_or_init(|| {
                stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone())
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// MD5 digest of the content, computed on first use. This is the same
    /// digest that lands in the embedded stream's /Params /CheckSum entry.
    pub fn checksum(&self) -> [u8; 16] {
        *self.checksum.get_or_init(|| {
            let mut hasher = Md5::new();
            hasher.update(self.data());
            hasher.finalize().into()
        })
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn filespec_name(spec: &Dictionary) -> Option<String> {
    for key in [b"UF".as_slice(), b"F".as_slice()] {
        if let Ok(name) = spec.get(key).and_then(|obj| obj.as_str()) {
            if let Ok(name) = String::from_utf8(name.to_vec()) {
                return Some(name);
            }
        }
    }
    None
}

/// Pull the embedded stream out of a filespec's /EF dictionary
fn filespec_stream(doc: &Document, spec: &Dictionary) -> Option<Stream> {
    let ef = resolve(doc, spec.get(b"EF").ok()?).as_dict().ok()?;
    match resolve(doc, ef.get(b"F").ok()?) {
        Object::Stream(stream) => Some(stream.clone()),
        _ => None,
    }
}

fn collect_name_tree(doc: &Document, node: &Dictionary, source: &Path, out: &mut Vec<Attachment>) {
    if let Some(Object::Array(pairs)) = node.get(b"Names").ok().map(|obj| resolve(doc, obj)) {
        for pair in pairs.chunks(2) {
            if pair.len() != 2 {
                continue;
            }
            let spec = match resolve(doc, &pair[1]).as_dict() {
                Ok(spec) => spec,
                Err(_) => continue,
            };
            let name = filespec_name(spec).or_else(|| {
                pair[0]
                    .as_str()
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes.to_vec()).ok())
            });
            let (Some(name), Some(stream)) = (name, filespec_stream(doc, spec)) else {
                log::warn!(
                    "skipping unreadable attachment in {}",
                    source.display()
                );
                continue;
            };
            out.push(Attachment::from_stream(name, source, stream));
        }
    }

    if let Some(Object::Array(kids)) = node.get(b"Kids").ok().map(|obj| resolve(doc, obj)) {
        for kid in kids {
            if let Ok(kid) = resolve(doc, kid).as_dict() {
                collect_name_tree(doc, kid, source, out);
            }
        }
    }
}

/// Enumerate every embedded file of an opened document.
///
/// A single unreadable attachment is logged and skipped; it never fails the
/// enumeration.
pub fn read_attachments(doc: &Document, source: &Path) -> Vec<Attachment> {
    let mut attachments = Vec::new();

    let tree = doc
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"Names").ok())
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|names| names.get(b"EmbeddedFiles").ok())
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok());

    if let Some(tree) = tree {
        collect_name_tree(doc, tree, source, &mut attachments);
    }
    attachments
}

/// Drop attachments whose (name, checksum) pair was already seen, keeping
/// the first occurrence in input order.
pub fn dedup_attachments(attachments: Vec<Attachment>) -> Vec<Attachment> {
    let mut seen: HashSet<(String, [u8; 16])> = HashSet::new();
    attachments
        .into_iter()
        .filter(|attachment| seen.insert((attachment.name().to_string(), attachment.checksum())))
        .collect()
}

fn build_filespec(doc: &mut Document, attachment: &Attachment) -> ObjectId {
    let mut params = Dictionary::new();
    params.set("Size", Object::Integer(attachment.len() as i64));
    params.set(
        "ModDate",
        Object::String(
            Local::now().format("D:%Y%m%d%H%M%S").to_string().into_bytes(),
            lopdf::StringFormat::Literal,
        ),
    );
    params.set(
        "CheckSum",
        Object::String(
            attachment.checksum().to_vec(),
            lopdf::StringFormat::Hexadecimal,
        ),
    );

    let mut stream_dict = Dictionary::new();
    stream_dict.set("Type", Object::Name(b"EmbeddedFile".to_vec()));
    stream_dict.set("Params", Object::Dictionary(params));
    let stream = Stream::new(stream_dict, attachment.data().to_vec());
    let stream_id = doc.add_object(Object::Stream(stream));

    let name = Object::String(
        attachment.name().as_bytes().to_vec(),
        lopdf::StringFormat::Literal,
    );
    let mut ef = Dictionary::new();
    ef.set("F", Object::Reference(stream_id));

    let mut spec = Dictionary::new();
    spec.set("Type", Object::Name(b"Filespec".to_vec()));
    spec.set("F", name.clone());
    spec.set("UF", name);
    spec.set("EF", Object::Dictionary(ef));
    doc.add_object(Object::Dictionary(spec))
}

/// Embed attachments into a document being written, building a fresh
/// /Names → /EmbeddedFiles name tree. Call once per output document, after
/// the catalog exists, with an already deduplicated list.
pub fn embed_attachments(doc: &mut Document, attachments: &[Attachment]) -> Result<()> {
    if attachments.is_empty() {
        return Ok(());
    }

    // The name tree's /Names array must be sorted by key
    let mut sorted: Vec<&Attachment> = attachments.iter().collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));

    let mut names = Vec::with_capacity(sorted.len() * 2);
    for attachment in sorted {
        let spec_id = build_filespec(doc, attachment);
        names.push(Object::String(
            attachment.name().as_bytes().to_vec(),
            lopdf::StringFormat::Literal,
        ));
        names.push(Object::Reference(spec_id));
    }

    let mut embedded_files = Dictionary::new();
    embedded_files.set("Names", Object::Array(names));
    let tree_id = doc.add_object(Object::Dictionary(embedded_files));

    let mut names_dict = Dictionary::new();
    names_dict.set("EmbeddedFiles", Object::Reference(tree_id));
    let names_id = doc.add_object(Object::Dictionary(names_dict));

    let catalog = doc.catalog_mut()?;
    catalog.set("Names", Object::Reference(names_id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_payload_decodes_on_first_use() {
        let mut stream = Stream::new(Dictionary::new(), b"lazy payload".to_vec());
        stream.compress().unwrap();
        assert_ne!(stream.content, b"lazy payload".to_vec());

        let attachment = Attachment::from_stream("a.txt", "x.pdf", stream);
        assert_eq!(attachment.data(), b"lazy payload");
        assert_eq!(attachment.len(), 12);
    }

    #[test]
    fn test_checksum_stable() {
        let a = Attachment::new("a.txt", "x.pdf", b"hello".to_vec());
        let b = Attachment::new("b.txt", "y.pdf", b"hello".to_vec());
        assert_eq!(a.checksum(), b.checksum());

        let c = Attachment::new("c.txt", "z.pdf", b"other".to_vec());
        assert_ne!(a.checksum(), c.checksum());
    }

    #[test]
    fn test_dedup_same_name_same_bytes() {
        let list = vec![
            Attachment::new("report.csv", "a.pdf", b"1,2,3".to_vec()),
            Attachment::new("report.csv", "b.pdf", b"1,2,3".to_vec()),
        ];
        let kept = dedup_attachments(list);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source(), Path::new("a.pdf"));
    }

    #[test]
    fn test_dedup_keeps_distinct_content() {
        let list = vec![
            Attachment::new("report.csv", "a.pdf", b"1,2,3".to_vec()),
            Attachment::new("report.csv", "b.pdf", b"4,5,6".to_vec()),
            Attachment::new("notes.txt", "b.pdf", b"1,2,3".to_vec()),
        ];
        assert_eq!(dedup_attachments(list).len(), 3);
    }
}
