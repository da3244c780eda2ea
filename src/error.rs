//! Error types for the catalog, the scanner and file access.

use std::path::PathBuf;
use thiserror::Error;

/// Storage-layer failures.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt value in column {column}: {value}")]
    CorruptValue { column: &'static str, value: String },

    #[error("invalid tag name: {0:?}")]
    InvalidTagName(String),

    #[error("{0}")]
    Other(String),
}

/// Scan-level failures. Per-file problems never surface here.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("a library scan is already running")]
    AlreadyRunning,

    #[error("catalog error during scan: {0}")]
    Catalog(#[from] CatalogError),
}

/// Why a cataloged path may not be served.
#[derive(Error, Debug)]
pub enum PathAccessError {
    #[error("path is outside the configured libraries: {0}")]
    OutsideLibraries(PathBuf),

    #[error("file is missing: {0}")]
    Missing(PathBuf),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("path is not absolute: {0}")]
    NotAbsolute(PathBuf),

    #[error("file to archive does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("could not find a free archive name for {0}")]
    NameConflict(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
