//! Outline (bookmark) handling
//!
//! Two layers live here: the pure page-delta shifting/filtering used by the
//! merge loop, and the graph-level helpers that read an `/Outlines` chain
//! out of a source document and write an accumulated list back into an
//! output document.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::Result;

/// View-fit mode of a bookmark destination
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitMode {
    /// Explicit position and zoom; any coordinate may be left unchanged
    Xyz {
        left: Option<f32>,
        top: Option<f32>,
        zoom: Option<f32>,
    },
    /// Fit the whole page
    Fit,
    /// Fit the page width, top edge at the given offset
    FitH { top: Option<f32> },
    /// Fit the bounding-box width, top edge at the given offset
    FitBH { top: Option<f32> },
    /// A destination type this engine does not carry across a merge
    Unrecognized,
}

impl FitMode {
    fn is_recognized(&self) -> bool {
        !matches!(self, FitMode::Unrecognized)
    }
}

/// One outline entry, keyed by its destination page
#[derive(Debug, Clone)]
pub struct Bookmark {
    pub title: String,
    /// 1-based destination page number
    pub page: u32,
    pub fit: FitMode,
}

/// Shift bookmark destinations by `delta` pages, then retain only the
/// entries that land on `destination_page` with a recognized fit mode.
///
/// The targeted retention (instead of copying every shifted entry) keeps
/// duplicate and orphaned bookmarks out of the output when the same source
/// page is imported into multiple output positions.
pub fn shift_and_filter(bookmarks: &[Bookmark], delta: i64, destination_page: u32) -> Vec<Bookmark> {
    bookmarks
        .iter()
        .filter_map(|bookmark| {
            let shifted = i64::from(bookmark.page) + delta;
            if shifted == i64::from(destination_page) && bookmark.fit.is_recognized() {
                Some(Bookmark {
                    page: destination_page,
                    ..bookmark.clone()
                })
            } else {
                None
            }
        })
        .collect()
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(n) => Some(*n as f32),
        Object::Real(n) => Some(*n),
        _ => None,
    }
}

/// Parse a destination array `[page /FitMode params...]` into a page number
/// and fit mode. `page_numbers` maps page object ids back to 1-based numbers.
fn parse_destination(
    dest: &[Object],
    page_numbers: &HashMap<ObjectId, u32>,
) -> Option<(u32, FitMode)> {
    let page_id = dest.first()?.as_reference().ok()?;
    let page = *page_numbers.get(&page_id)?;

    let fit = match dest.get(1).and_then(|obj| obj.as_name().ok()) {
        Some(b"XYZ") => FitMode::Xyz {
            left: dest.get(2).and_then(number),
            top: dest.get(3).and_then(number),
            zoom: dest.get(4).and_then(number).filter(|z| *z != 0.0),
        },
        Some(b"Fit") => FitMode::Fit,
        Some(b"FitH") => FitMode::FitH {
            top: dest.get(2).and_then(number),
        },
        Some(b"FitBH") => FitMode::FitBH {
            top: dest.get(2).and_then(number),
        },
        _ => FitMode::Unrecognized,
    };

    Some((page, fit))
}

/// Resolve an outline item's destination, looking through /Dest or a /GoTo
/// action's /D entry.
fn item_destination<'a>(doc: &'a Document, item: &'a Dictionary) -> Option<&'a [Object]> {
    let dest = if let Ok(dest) = item.get(b"Dest") {
        dest
    } else {
        let action = match item.get(b"A").ok()? {
            Object::Reference(id) => doc.get_object(*id).ok()?,
            obj => obj,
        };
        let action = action.as_dict().ok()?;
        if action.get(b"S").ok()?.as_name().ok()? != b"GoTo" {
            return None;
        }
        action.get(b"D").ok()?
    };
    let dest = match dest {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        obj => obj,
    };
    dest.as_array().ok().map(|arr| arr.as_slice())
}

fn walk_outline_level(
    doc: &Document,
    first: ObjectId,
    page_numbers: &HashMap<ObjectId, u32>,
    out: &mut Vec<Bookmark>,
) {
    let mut cursor = Some(first);
    // Bounded by the object count so a cyclic /Next chain cannot hang us
    let mut remaining = doc.objects.len() + 1;

    while let (Some(id), true) = (cursor, remaining > 0) {
        remaining -= 1;
        let item = match doc.get_dictionary(id) {
            Ok(dict) => dict,
            Err(_) => break,
        };

        let title = item
            .get(b"Title")
            .ok()
            .and_then(|t| t.as_str().ok())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();

        if let Some((page, fit)) = item_destination(doc, item).and_then(|dest| {
            parse_destination(dest, page_numbers)
        }) {
            out.push(Bookmark { title, page, fit });
        }

        if let Ok(child) = item.get(b"First").and_then(|obj| obj.as_reference()) {
            walk_outline_level(doc, child, page_numbers, out);
        }

        cursor = item.get(b"Next").and_then(|obj| obj.as_reference()).ok();
    }
}

/// Flatten a document's outline tree into a list of page-keyed bookmarks.
///
/// Entries whose destination cannot be resolved to a page are dropped;
/// nested entries are flattened in reading order.
pub fn read_outline(doc: &Document) -> Vec<Bookmark> {
    let page_numbers: HashMap<ObjectId, u32> = doc
        .get_pages()
        .into_iter()
        .map(|(number, id)| (id, number))
        .collect();

    let mut bookmarks = Vec::new();
    let first = doc
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"Outlines").ok())
        .and_then(|obj| obj.as_reference().ok())
        .and_then(|id| doc.get_dictionary(id).ok())
        .and_then(|outlines| outlines.get(b"First").ok())
        .and_then(|obj| obj.as_reference().ok());

    if let Some(first) = first {
        walk_outline_level(doc, first, &page_numbers, &mut bookmarks);
    }
    bookmarks
}

fn fit_param(value: Option<f32>) -> Object {
    match value {
        Some(v) => Object::Real(v),
        None => Object::Null,
    }
}

fn destination_array(page_id: ObjectId, fit: FitMode) -> Option<Vec<Object>> {
    let page = Object::Reference(page_id);
    Some(match fit {
        FitMode::Xyz { left, top, zoom } => vec![
            page,
            Object::Name(b"XYZ".to_vec()),
            fit_param(left),
            fit_param(top),
            fit_param(zoom),
        ],
        FitMode::Fit => vec![page, Object::Name(b"Fit".to_vec())],
        FitMode::FitH { top } => vec![page, Object::Name(b"FitH".to_vec()), fit_param(top)],
        FitMode::FitBH { top } => vec![page, Object::Name(b"FitBH".to_vec()), fit_param(top)],
        FitMode::Unrecognized => return None,
    })
}

/// Write a flat outline chain into a document whose page tree is already in
/// place. Entries pointing at pages the document does not have are skipped.
pub fn write_outline(doc: &mut Document, bookmarks: &[Bookmark]) -> Result<()> {
    let pages = doc.get_pages();
    let writable: Vec<(&Bookmark, ObjectId)> = bookmarks
        .iter()
        .filter_map(|bookmark| {
            let page_id = *pages.get(&bookmark.page)?;
            destination_array(page_id, bookmark.fit)?;
            Some((bookmark, page_id))
        })
        .collect();

    if writable.is_empty() {
        return Ok(());
    }

    let outlines_id = doc.new_object_id();
    let item_ids: Vec<ObjectId> = writable.iter().map(|_| doc.new_object_id()).collect();

    for (index, (bookmark, page_id)) in writable.iter().enumerate() {
        let mut item = Dictionary::new();
        item.set(
            "Title",
            Object::String(bookmark.title.as_bytes().to_vec(), lopdf::StringFormat::Literal),
        );
        item.set("Parent", Object::Reference(outlines_id));
        if index > 0 {
            item.set("Prev", Object::Reference(item_ids[index - 1]));
        }
        if index + 1 < item_ids.len() {
            item.set("Next", Object::Reference(item_ids[index + 1]));
        }
        // destination_array returned Some above
        let dest = destination_array(*page_id, bookmark.fit).unwrap();
        item.set("Dest", Object::Array(dest));
        doc.objects.insert(item_ids[index], Object::Dictionary(item));
    }

    let mut outlines = Dictionary::new();
    outlines.set("Type", Object::Name(b"Outlines".to_vec()));
    outlines.set("First", Object::Reference(item_ids[0]));
    outlines.set("Last", Object::Reference(*item_ids.last().unwrap()));
    outlines.set("Count", Object::Integer(item_ids.len() as i64));
    doc.objects.insert(outlines_id, Object::Dictionary(outlines));

    let catalog = doc.catalog_mut()?;
    catalog.set("Outlines", Object::Reference(outlines_id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bookmark(page: u32, fit: FitMode) -> Bookmark {
        Bookmark {
            title: format!("Page {}", page),
            page,
            fit,
        }
    }

    #[test]
    fn test_shift_lands_on_destination() {
        // Source bookmark at page 3; source page 3 became output page 7
        let bookmarks = vec![
            bookmark(1, FitMode::Fit),
            bookmark(3, FitMode::Fit),
            bookmark(5, FitMode::Fit),
        ];
        let kept = shift_and_filter(&bookmarks, 4, 7);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].page, 7);
        assert_eq!(kept[0].title, "Page 3");
    }

    #[test]
    fn test_negative_delta() {
        let bookmarks = vec![bookmark(9, FitMode::FitH { top: Some(10.0) })];
        let kept = shift_and_filter(&bookmarks, -8, 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].page, 1);
    }

    #[test]
    fn test_unrecognized_fit_filtered() {
        let bookmarks = vec![
            bookmark(2, FitMode::Unrecognized),
            bookmark(2, FitMode::Fit),
        ];
        let kept = shift_and_filter(&bookmarks, 0, 2);
        assert_eq!(kept.len(), 1);
        assert!(matches!(kept[0].fit, FitMode::Fit));
    }

    #[test]
    fn test_off_target_entries_dropped() {
        let bookmarks = vec![bookmark(2, FitMode::Fit)];
        assert!(shift_and_filter(&bookmarks, 1, 2).is_empty());
        assert!(shift_and_filter(&bookmarks, 0, 3).is_empty());
    }
}
