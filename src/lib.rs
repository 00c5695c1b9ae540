//! PDF Workbench Library
//!
//! A cross-platform engine for assembling, splitting, and inspecting PDF
//! documents. This library provides functionality to:
//! - Merge pages from several PDF and image sources into one document
//! - Split a document into one file per page
//! - Carry bookmarks, attachments, metadata and encryption across a rewrite
//! - Open password-protected sources through a retry-with-callback flow
//!
//! # Example
//!
//! ```no_run
//! use pdf_workbench::{DocumentAssembler, DocumentSource, NoPassword};
//! use std::path::Path;
//!
//! let first = DocumentSource::open(Path::new("1. intro.pdf"), &mut NoPassword)
//!     .expect("Failed to open");
//! let second = DocumentSource::open(Path::new("2. advanced.pdf"), &mut NoPassword)
//!     .expect("Failed to open");
//!
//! let mut assembler = DocumentAssembler::new();
//! assembler.extend_pages(first.pages());
//! assembler.extend_pages(second.pages());
//! assembler.save(Path::new("merged.pdf")).expect("Failed to merge");
//! ```

pub mod assembler;
pub mod attachments;
pub mod bookmarks;
pub mod encryption;
pub mod error;
pub mod metadata;
pub mod page;
mod raster;
pub mod source;
pub mod splitter;

// Re-export commonly used items
pub use assembler::DocumentAssembler;
pub use attachments::Attachment;
pub use bookmarks::{shift_and_filter, Bookmark, FitMode};
pub use encryption::{Encryption, Method, Permission};
pub use error::{Error, Result};
pub use metadata::{Metadata, PdfVersion, ViewerPreferences};
pub use page::{AccessLevel, MediaFile, PageDescriptor, PageSize, Resolution, Rotation, SourceKind};
pub use source::{DocumentSource, NoPassword, OpenedDocument, PasswordList, PasswordProvider};
pub use splitter::PageSplitter;
