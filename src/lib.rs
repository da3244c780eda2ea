//! mediashelf: a media catalog that reconciles library directories against a
//! SQLite index and serves it over HTTP.

pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod library;
pub mod logging;
pub mod scanner;
pub mod server;

pub use config::Config;
pub use db::Database;
pub use error::{ArchiveError, CatalogError, PathAccessError, ScanError};
pub use scanner::{ScanOptions, ScanSummary, Scanner};
