//! Page descriptors: the value objects the assembler and splitter consume
//!
//! A [`PageDescriptor`] identifies one logical page: which source file it
//! comes from, where in that file it sits, its physical size, its rotation
//! delta and its resolution. Descriptors are immutable; a rotate operation
//! replaces the descriptor rather than mutating it.

use std::path::PathBuf;
use std::sync::Arc;

/// Kind of source file a page is drawn from.
///
/// Closed set, matched exhaustively at the single import call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A PDF document; pages are imported structurally (content streams,
    /// resources and annotations carried through, never re-rendered)
    Pdf,
    /// A raster image (PNG/JPEG/BMP/TIFF/GIF); imported as one synthesized
    /// PDF page
    Image,
}

/// Access level obtained when the source was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    /// Owner-level access: no restrictions apply
    Full,
    /// User-level access: the permission bitmask applies
    Restricted,
}

/// A source file on disk, created when the source is opened and immutable
/// afterwards. Shared (via `Arc`) by every descriptor drawn from it.
#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Full path of the file
    pub path: PathBuf,
    /// PDF or raster image
    pub kind: SourceKind,
    /// Number of physical pages in the file
    pub page_count: usize,
    /// Password the file was opened with, if it was encrypted
    pub password: Option<String>,
    /// Access level obtained at open time
    pub access: AccessLevel,
}

/// Physical page size in points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    /// US Letter, the fallback when a page carries no MediaBox
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        PageSize { width, height }
    }
}

/// Page resolution in dots per inch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub x_dpi: f64,
    pub y_dpi: f64,
}

impl Resolution {
    pub fn new(x_dpi: f64, y_dpi: f64) -> Self {
        Resolution { x_dpi, y_dpi }
    }

    /// Uniform resolution on both axes
    pub fn uniform(dpi: f64) -> Self {
        Resolution { x_dpi: dpi, y_dpi: dpi }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::uniform(96.0)
    }
}

/// Rotation delta relative to the page's native rotation.
///
/// Always a multiple of 90 degrees; [`Rotation::from_degrees`] normalizes
/// arbitrary multiples of 90 (including negatives) into this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Rotate180,
    Counterclockwise90,
}

impl Rotation {
    /// Normalize a degree count to one of the four orientations.
    ///
    /// Returns `None` if the input is not a multiple of 90.
    pub fn from_degrees(degrees: i32) -> Option<Rotation> {
        if degrees % 90 != 0 {
            return None;
        }
        Some(match degrees.rem_euclid(360) {
            0 => Rotation::None,
            90 => Rotation::Clockwise90,
            180 => Rotation::Rotate180,
            270 => Rotation::Counterclockwise90,
            _ => unreachable!(),
        })
    }

    /// Degrees in 0..360
    pub fn degrees(self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Counterclockwise90 => 270,
        }
    }

    /// Compose two rotations
    pub fn plus(self, other: Rotation) -> Rotation {
        Rotation::from_degrees(self.degrees() + other.degrees()).unwrap()
    }
}

/// Identifies one logical page of output.
///
/// Created by a `DocumentSource` when enumerating pages; consumed read-only
/// by the writer components.
#[derive(Debug, Clone)]
pub struct PageDescriptor {
    /// The file this page is drawn from (shared, not owned)
    pub file: Arc<MediaFile>,
    /// 1-based page number within the file
    pub number: u32,
    /// Physical size in points
    pub size: PageSize,
    /// Rotation delta from the file's native page rotation
    pub rotation: Rotation,
    /// Resolution in dots per inch
    pub resolution: Resolution,
}

impl PageDescriptor {
    /// Return a copy of this descriptor with an additional rotation applied.
    ///
    /// Descriptors are never mutated in place; callers replace them.
    pub fn rotated(&self, by: Rotation) -> PageDescriptor {
        PageDescriptor {
            rotation: self.rotation.plus(by),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_normalization() {
        assert_eq!(Rotation::from_degrees(0), Some(Rotation::None));
        assert_eq!(Rotation::from_degrees(90), Some(Rotation::Clockwise90));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Clockwise90));
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Counterclockwise90));
        assert_eq!(Rotation::from_degrees(-180), Some(Rotation::Rotate180));
        assert_eq!(Rotation::from_degrees(720), Some(Rotation::None));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn test_rotation_compose() {
        assert_eq!(
            Rotation::Clockwise90.plus(Rotation::Clockwise90),
            Rotation::Rotate180
        );
        assert_eq!(
            Rotation::Rotate180.plus(Rotation::Rotate180),
            Rotation::None
        );
        assert_eq!(
            Rotation::Counterclockwise90.plus(Rotation::Clockwise90),
            Rotation::None
        );
    }

    #[test]
    fn test_rotated_replaces_descriptor() {
        let file = Arc::new(MediaFile {
            path: "a.pdf".into(),
            kind: SourceKind::Pdf,
            page_count: 1,
            password: None,
            access: AccessLevel::Full,
        });
        let page = PageDescriptor {
            file,
            number: 1,
            size: PageSize::LETTER,
            rotation: Rotation::None,
            resolution: Resolution::default(),
        };
        let turned = page.rotated(Rotation::Clockwise90);
        assert_eq!(page.rotation, Rotation::None);
        assert_eq!(turned.rotation, Rotation::Clockwise90);
        assert_eq!(turned.number, page.number);
    }
}
