mod schema;
pub mod backend;
pub mod media;
pub mod tags;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CatalogError, CatalogResult};
use crate::scanner::accessibility::Accessibility;
use crate::scanner::discovery::MediaKind;

pub use backend::{CatalogChange, CatalogStore};
pub use media::{MediaPage, MediaQuery, SortKey, SortOrder};
pub use schema::SCHEMA;
pub use tags::Tag;

/// Stored timestamp format. Microsecond precision, no timezone suffix.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub(crate) fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(column: &'static str, text: &str) -> CatalogResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_PARSE_FORMAT).map_err(|_| {
        CatalogError::CorruptValue {
            column,
            value: text.to_string(),
        }
    })
}

/// What a scan observes about one file. Path is the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFields {
    pub path: PathBuf,
    pub library_root: PathBuf,
    pub filename: String,
    pub capture_time: NaiveDateTime,
    pub modification_time: Option<NaiveDateTime>,
    pub size_bytes: u64,
    pub kind: MediaKind,
}

/// A cataloged media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaRecord {
    pub id: i64,
    pub path: PathBuf,
    pub library_root: PathBuf,
    pub filename: String,
    pub capture_time: NaiveDateTime,
    pub modification_time: Option<NaiveDateTime>,
    pub size_bytes: u64,
    pub kind: MediaKind,
    pub accessibility: Accessibility,
}

impl MediaRecord {
    pub fn is_accessible(&self) -> bool {
        self.accessibility.is_accessible()
    }

    /// True when the scan-observed metadata matches this record exactly.
    /// Accessibility is not compared.
    pub fn metadata_matches(&self, fields: &MediaFields) -> bool {
        self.path == fields.path
            && self.library_root == fields.library_root
            && self.filename == fields.filename
            && self.capture_time == fields.capture_time
            && self.modification_time == fields.modification_time
            && self.size_bytes == fields.size_bytes
            && self.kind == fields.kind
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the catalog at `path`.
    pub fn open(path: &Path) -> CatalogResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Self::configure(conn)
    }

    pub fn open_in_memory() -> CatalogResult<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> CatalogResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> CatalogResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}
