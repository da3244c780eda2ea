//! User-configurable listing filter.
//!
//! A filter is a plain JSON document. Every field is optional and all present
//! fields must hold for a record to pass, so the empty filter `{}` passes
//! everything.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::media::MediaEntry;
use crate::scanner::discovery::MediaKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaFilter {
    /// At least one of these tags.
    pub tags_any: Vec<String>,
    /// Every one of these tags.
    pub tags_all: Vec<String>,
    pub kind: Option<MediaKind>,
    pub library_root: Option<PathBuf>,
    /// Case-insensitive substring of the filename.
    pub filename_contains: Option<String>,
    pub captured_after: Option<NaiveDateTime>,
    pub captured_before: Option<NaiveDateTime>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub accessible: Option<bool>,
}

/// The view of a media item a filter is evaluated against.
#[derive(Debug, Clone)]
pub struct FilterRecord<'a> {
    pub tags: &'a [String],
    pub library_root: &'a Path,
    pub filename: &'a str,
    pub path: &'a Path,
    pub capture_time: NaiveDateTime,
    pub modification_time: Option<NaiveDateTime>,
    pub size_bytes: u64,
    pub kind: MediaKind,
    pub accessible: bool,
}

impl<'a> From<&'a MediaEntry> for FilterRecord<'a> {
    fn from(entry: &'a MediaEntry) -> Self {
        let record = &entry.record;
        Self {
            tags: &entry.tags,
            library_root: &record.library_root,
            filename: &record.filename,
            path: &record.path,
            capture_time: record.capture_time,
            modification_time: record.modification_time,
            size_bytes: record.size_bytes,
            kind: record.kind,
            accessible: record.is_accessible(),
        }
    }
}

impl MediaFilter {
    pub fn matches(&self, item: &FilterRecord<'_>) -> bool {
        let has_tag = |wanted: &String| item.tags.iter().any(|t| t == wanted);

        if !self.tags_any.is_empty() && !self.tags_any.iter().any(has_tag) {
            return false;
        }
        if !self.tags_all.iter().all(has_tag) {
            return false;
        }
        if self.kind.is_some_and(|kind| kind != item.kind) {
            return false;
        }
        if let Some(root) = &self.library_root {
            if root.as_path() != item.library_root {
                return false;
            }
        }
        if let Some(needle) = &self.filename_contains {
            if !item
                .filename
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if self.captured_after.is_some_and(|after| item.capture_time < after) {
            return false;
        }
        if self.captured_before.is_some_and(|before| item.capture_time > before) {
            return false;
        }
        if self.min_size.is_some_and(|min| item.size_bytes < min) {
            return false;
        }
        if self.max_size.is_some_and(|max| item.size_bytes > max) {
            return false;
        }
        if self.accessible.is_some_and(|flag| flag != item.accessible) {
            return false;
        }
        true
    }
}
