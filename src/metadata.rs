//! Document metadata: Info dictionary, PDF version and viewer preferences

use lopdf::{Dictionary, Document, Object};

use crate::error::Result;

/// PDF specification version, major.minor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        PdfVersion { major, minor }
    }

    /// Parse a version header string like "1.7"
    pub fn parse(s: &str) -> Option<PdfVersion> {
        let (major, minor) = s.split_once('.')?;
        Some(PdfVersion {
            major: major.trim().parse().ok()?,
            minor: minor.trim().parse().ok()?,
        })
    }

    /// Cross-reference streams ("full compression") are only valid from 1.5 on
    pub fn supports_xref_streams(&self) -> bool {
        (self.major, self.minor) >= (1, 5)
    }
}

impl Default for PdfVersion {
    fn default() -> Self {
        PdfVersion { major: 1, minor: 4 }
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Catalog /ViewerPreferences flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerPreferences {
    pub hide_toolbar: bool,
    pub hide_menubar: bool,
    pub fit_window: bool,
    pub center_window: bool,
    pub display_doc_title: bool,
}

impl ViewerPreferences {
    fn is_default(&self) -> bool {
        *self == ViewerPreferences::default()
    }
}

/// Document-level descriptive metadata.
///
/// Mutable value object set by the caller before a save.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub version: PdfVersion,
    pub viewer_preferences: ViewerPreferences,
}

/// Read a text entry from an Info dictionary
fn info_string(info: &Dictionary, key: &[u8]) -> Option<String> {
    let obj = info.get(key).ok()?;
    let bytes = obj.as_str().ok()?;
    String::from_utf8(bytes.to_vec()).ok()
}

fn bool_entry(dict: &Dictionary, key: &[u8]) -> bool {
    matches!(dict.get(key), Ok(Object::Boolean(true)))
}

/// Extract document metadata from an opened object graph
pub fn read_metadata(doc: &Document) -> Metadata {
    let mut metadata = Metadata {
        version: PdfVersion::parse(&doc.version).unwrap_or_default(),
        ..Metadata::default()
    };

    if let Ok(Object::Reference(info_id)) = doc.trailer.get(b"Info") {
        if let Ok(info) = doc.get_dictionary(*info_id) {
            metadata.title = info_string(info, b"Title");
            metadata.author = info_string(info, b"Author");
            metadata.subject = info_string(info, b"Subject");
            metadata.keywords = info_string(info, b"Keywords");
            metadata.creator = info_string(info, b"Creator");
            metadata.producer = info_string(info, b"Producer");
        }
    }

    if let Ok(catalog) = doc.catalog() {
        if let Ok(prefs) = catalog
            .get(b"ViewerPreferences")
            .and_then(|obj| obj.as_dict())
        {
            metadata.viewer_preferences = ViewerPreferences {
                hide_toolbar: bool_entry(prefs, b"HideToolbar"),
                hide_menubar: bool_entry(prefs, b"HideMenubar"),
                fit_window: bool_entry(prefs, b"FitWindow"),
                center_window: bool_entry(prefs, b"CenterWindow"),
                display_doc_title: bool_entry(prefs, b"DisplayDocTitle"),
            };
        }
    }

    metadata
}

fn set_info_string(info: &mut Dictionary, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        info.set(
            key,
            Object::String(value.as_bytes().to_vec(), lopdf::StringFormat::Literal),
        );
    }
}

/// Apply metadata to a document being written: Info dictionary, version
/// header and viewer preferences
pub fn apply_metadata(doc: &mut Document, metadata: &Metadata) -> Result<()> {
    doc.version = metadata.version.to_string();

    let mut info = Dictionary::new();
    set_info_string(&mut info, "Title", &metadata.title);
    set_info_string(&mut info, "Author", &metadata.author);
    set_info_string(&mut info, "Subject", &metadata.subject);
    set_info_string(&mut info, "Keywords", &metadata.keywords);
    set_info_string(&mut info, "Creator", &metadata.creator);
    set_info_string(&mut info, "Producer", &metadata.producer);
    if !info.is_empty() {
        let info_id = doc.add_object(Object::Dictionary(info));
        doc.trailer.set("Info", Object::Reference(info_id));
    }

    let prefs = &metadata.viewer_preferences;
    if !prefs.is_default() {
        let mut dict = Dictionary::new();
        if prefs.hide_toolbar {
            dict.set("HideToolbar", Object::Boolean(true));
        }
        if prefs.hide_menubar {
            dict.set("HideMenubar", Object::Boolean(true));
        }
        if prefs.fit_window {
            dict.set("FitWindow", Object::Boolean(true));
        }
        if prefs.center_window {
            dict.set("CenterWindow", Object::Boolean(true));
        }
        if prefs.display_doc_title {
            dict.set("DisplayDocTitle", Object::Boolean(true));
        }
        let prefs_id = doc.add_object(Object::Dictionary(dict));
        let catalog = doc.catalog_mut()?;
        catalog.set("ViewerPreferences", Object::Reference(prefs_id));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        assert_eq!(PdfVersion::parse("1.7"), Some(PdfVersion::new(1, 7)));
        assert_eq!(PdfVersion::parse("2.0"), Some(PdfVersion::new(2, 0)));
        assert_eq!(PdfVersion::parse("seven"), None);
    }

    #[test]
    fn test_version_xref_stream_support() {
        assert!(!PdfVersion::new(1, 4).supports_xref_streams());
        assert!(PdfVersion::new(1, 5).supports_xref_streams());
        assert!(PdfVersion::new(1, 7).supports_xref_streams());
        assert!(PdfVersion::new(2, 0).supports_xref_streams());
    }

    #[test]
    fn test_info_string_extraction() {
        let mut info = Dictionary::new();
        info.set(
            "Title",
            Object::String(b"A title".to_vec(), lopdf::StringFormat::Literal),
        );
        assert_eq!(info_string(&info, b"Title"), Some("A title".to_string()));
        assert_eq!(info_string(&info, b"Author"), None);
    }
}
