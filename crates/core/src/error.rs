//! Error types for slide bundle export.

use crate::backends::BackendKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the slide-bundle library.
#[derive(Error, Debug)]
pub enum SplitError {
    /// Input file not found.
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    /// Input path exists but is not a regular file.
    #[error("Input path is not a file: {0}")]
    InputNotAFile(PathBuf),

    /// Input file could not be opened for reading.
    #[error("Input file is not readable '{path}': {message}")]
    InputUnreadable { path: PathBuf, message: String },

    /// Unsupported file format.
    #[error("Unsupported file format: {extension}. Supported: .pptx")]
    UnsupportedFormat { extension: String },

    /// The input is not a well-formed presentation package.
    #[error("Invalid presentation package '{path}': {message}")]
    InvalidPackage { path: PathBuf, message: String },

    /// A rendering backend could not be located or bound.
    #[error("{backend} is not available: {message}")]
    BackendUnavailable { backend: BackendKind, message: String },

    /// A rendering backend ran but did not produce output.
    #[error("{backend} failed for '{path}': {message}")]
    BackendFailed {
        backend: BackendKind,
        path: PathBuf,
        message: String,
    },

    /// A rendering backend exceeded its time budget.
    #[error("{backend} timed out after {timeout_secs} seconds for '{path}'")]
    BackendTimeout {
        backend: BackendKind,
        path: PathBuf,
        timeout_secs: u64,
    },

    /// A single-slide fragment could not be derived or saved.
    #[error("Failed to extract slide {ordinal}: {message}")]
    FragmentFailed { ordinal: usize, message: String },

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncodingError(String),

    /// Manifest could not be read or has the wrong shape.
    #[error("Manifest error: {0}")]
    ManifestError(String),

    /// Archive could not be written.
    #[error("Failed to write archive '{path}': {message}")]
    ArchiveFailed { path: PathBuf, message: String },

    /// Archive requested with an empty file list.
    #[error("No files supplied for archive '{0}'")]
    NothingToArchive(PathBuf),

    /// An output location could not be created or claimed.
    #[error("Cannot use output location '{path}': {message}")]
    OutputDirError { path: PathBuf, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Coarse classification of failures, used to decide what reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, reported before any processing starts.
    Input,
    /// A renderer could not be used; absorbed by the preview fallback chain.
    BackendUnavailable,
    /// The output set would be inconsistent; aborts the run.
    ArtifactGeneration,
    /// Rejected configuration.
    Configuration,
}

impl SplitError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SplitError::InputNotFound(_)
            | SplitError::InputNotAFile(_)
            | SplitError::InputUnreadable { .. }
            | SplitError::UnsupportedFormat { .. }
            | SplitError::InvalidPackage { .. } => ErrorKind::Input,
            SplitError::BackendUnavailable { .. }
            | SplitError::BackendFailed { .. }
            | SplitError::BackendTimeout { .. } => ErrorKind::BackendUnavailable,
            SplitError::InvalidConfig(_) => ErrorKind::Configuration,
            _ => ErrorKind::ArtifactGeneration,
        }
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, SplitError>;
