//! Error types for the PDF workbench library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the PDF workbench library
#[derive(Error, Debug)]
pub enum Error {
    /// PDF processing error from the underlying object model
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A protected document could not be opened: the password provider
    /// declined to supply (another) password
    #[error("Password required to open: {}", .0.display())]
    PasswordRequired(PathBuf),

    /// A password or cipher failure occurred while writing output, after
    /// decryption of the inputs had already succeeded
    #[error("Encryption failure while writing output: {0}")]
    Encryption(String),

    /// A source document or page failed to load after retries
    #[error("Failed to load {}: {source}", .path.display())]
    Load {
        /// Path of the source that failed
        path: PathBuf,
        /// Underlying PDF error
        source: lopdf::Error,
    },

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),

    /// Image file could not be decoded
    #[error("Unsupported or corrupt image: {}", .0.display())]
    UnsupportedImage(PathBuf),

    /// An assembler or splitter was asked to save without any pages
    #[error("No pages to write")]
    NoPages,

    /// Output filename could not be derived
    #[error("Invalid output name: {0}")]
    InvalidName(String),

    /// General error
    #[error("{0}")]
    General(String),
}
