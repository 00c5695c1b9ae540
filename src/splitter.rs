//! Page splitting: one output file per input page
//!
//! Uses the same import machinery as the assembler but loops per page,
//! deriving a unique filename for every output and never overwriting an
//! existing file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use lopdf::Document;

use crate::assembler::{attach_page_tree, import_page, write_promoted, Overwrite, ReaderCache};
use crate::bookmarks::{shift_and_filter, write_outline};
use crate::encryption::Encryption;
use crate::error::{Error, Result};
use crate::metadata::{apply_metadata, Metadata};
use crate::page::PageDescriptor;

/// Collision suffixes probed before giving up on the pretty name. The bound
/// guarantees termination even when the folder is being filled concurrently.
const MAX_SUFFIX_PROBES: u32 = 100;

/// Derive a free output path `{base}-{page}.pdf`, inserting ` (n)` before
/// the extension on collision and falling back to a clock-derived name once
/// the probe budget is spent.
fn unique_output_path(folder: &Path, base: &str, number: u32, width: usize) -> PathBuf {
    let stem = format!("{base}-{number:0width$}");

    let candidate = folder.join(format!("{stem}.pdf"));
    if !candidate.exists() {
        return candidate;
    }
    for n in 2..=MAX_SUFFIX_PROBES {
        let candidate = folder.join(format!("{stem} ({n}).pdf"));
        if !candidate.exists() {
            return candidate;
        }
    }
    // Millisecond clock names; wait out a collision rather than reuse one
    loop {
        let candidate = folder.join(format!(
            "{stem}-{}.pdf",
            Local::now().format("%Y%m%d%H%M%S%3f")
        ));
        if !candidate.exists() {
            return candidate;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Writes every accumulated page as its own single-page document.
#[derive(Default)]
pub struct PageSplitter {
    pages: Vec<PageDescriptor>,
    metadata: Metadata,
    encryption: Encryption,
    base_name: Option<String>,
}

impl PageSplitter {
    pub fn new() -> Self {
        PageSplitter::default()
    }

    pub fn push_page(&mut self, descriptor: PageDescriptor) {
        self.pages.push(descriptor);
    }

    pub fn extend_pages<I: IntoIterator<Item = PageDescriptor>>(&mut self, descriptors: I) {
        self.pages.extend(descriptors);
    }

    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }

    pub fn set_encryption(&mut self, encryption: Encryption) {
        self.encryption = encryption;
    }

    /// Override the `{base}` part of output filenames. Defaults to the stem
    /// of the first page's source file.
    pub fn set_base_name(&mut self, base_name: impl Into<String>) {
        self.base_name = Some(base_name.into());
    }

    fn effective_base_name(&self) -> Result<String> {
        if let Some(base) = &self.base_name {
            return Ok(base.clone());
        }
        let first = self.pages.first().ok_or(Error::NoPages)?;
        first
            .file
            .path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(|stem| stem.to_string())
            .ok_or_else(|| {
                Error::InvalidName(format!(
                    "cannot derive a base name from {}",
                    first.file.path.display()
                ))
            })
    }

    /// Write one single-page PDF per accumulated descriptor into `folder`,
    /// returning the paths written, in page order.
    ///
    /// Each output gets the splitter's metadata and encryption applied, and
    /// carries the bookmarks whose destination is the split page (shifted
    /// to page 1). Failing part-way leaves the already-written files in
    /// place; the file being written is never left partial.
    pub fn save(&mut self, folder: &Path) -> Result<Vec<PathBuf>> {
        if self.pages.is_empty() {
            return Err(Error::NoPages);
        }
        if !folder.is_dir() {
            return Err(Error::FileNotFound(folder.to_path_buf()));
        }

        let base = self.effective_base_name()?;
        let width = std::cmp::max(2, self.pages.len().to_string().len());

        log::info!(
            "splitting {} pages into {}",
            self.pages.len(),
            folder.display()
        );

        let mut cache = ReaderCache::new();
        let mut written = Vec::with_capacity(self.pages.len());

        for (index, descriptor) in self.pages.iter().enumerate() {
            let sequence = index as u32 + 1;
            let source = cache.get_or_open(descriptor)?;

            let mut out = Document::with_version(self.metadata.version.to_string());
            let page_id = import_page(&mut out, source, descriptor)?;
            attach_page_tree(&mut out, &[page_id]);

            let delta = 1 - i64::from(descriptor.number);
            let bookmarks = shift_and_filter(&source.bookmarks(), delta, 1);

            apply_metadata(&mut out, &self.metadata)?;
            write_outline(&mut out, &bookmarks)?;
            out.compress();
            self.encryption.apply(&mut out)?;

            let target = unique_output_path(folder, &base, sequence, width);
            write_promoted(&mut out, &target, self.metadata.version, Overwrite::Refuse)?;
            written.push(target);
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unique_path_no_collision() {
        let dir = TempDir::new().unwrap();
        let path = unique_output_path(dir.path(), "doc", 1, 2);
        assert_eq!(path, dir.path().join("doc-01.pdf"));
    }

    #[test]
    fn test_unique_path_collision_suffix() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("doc-01.pdf"), b"x").unwrap();
        let path = unique_output_path(dir.path(), "doc", 1, 2);
        assert_eq!(path, dir.path().join("doc-01 (2).pdf"));

        std::fs::write(&path, b"x").unwrap();
        let path = unique_output_path(dir.path(), "doc", 1, 2);
        assert_eq!(path, dir.path().join("doc-01 (3).pdf"));
    }

    #[test]
    fn test_unique_path_padding_width() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            unique_output_path(dir.path(), "doc", 7, 3),
            dir.path().join("doc-007.pdf")
        );
        assert_eq!(
            unique_output_path(dir.path(), "doc", 12, 2),
            dir.path().join("doc-12.pdf")
        );
    }

    #[test]
    fn test_unique_path_exhausted_probes_falls_back() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("doc-01.pdf"), b"x").unwrap();
        for n in 2..=MAX_SUFFIX_PROBES {
            std::fs::write(dir.path().join(format!("doc-01 ({n}).pdf")), b"x").unwrap();
        }
        let path = unique_output_path(dir.path(), "doc", 1, 2);
        assert!(!path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("doc-01-"));
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_save_without_pages() {
        let dir = TempDir::new().unwrap();
        let mut splitter = PageSplitter::new();
        assert!(matches!(splitter.save(dir.path()), Err(Error::NoPages)));
    }
}
