//! The catalog interface the scanner reconciles against.

use std::path::PathBuf;

use super::{Database, MediaFields, MediaRecord};
use crate::error::CatalogResult;
use crate::scanner::accessibility::Accessibility;

/// One write produced by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogChange {
    /// New path; inserted accessible.
    Insert(MediaFields),
    /// Known path with metadata drift; every field rewritten, made accessible.
    Update(MediaFields),
    /// Known path, metadata unchanged; only the state is written.
    SetAccessibility { path: PathBuf, state: Accessibility },
}

/// Storage seen by the scanner.
///
/// `mark_all_inaccessible` commits on its own. `apply` writes every change in
/// a single transaction and rolls back entirely on failure.
pub trait CatalogStore {
    fn mark_all_inaccessible(&self) -> CatalogResult<usize>;

    fn list_all(&self) -> CatalogResult<Vec<MediaRecord>>;

    fn apply(&self, changes: &[CatalogChange]) -> CatalogResult<()>;
}

impl CatalogStore for Database {
    fn mark_all_inaccessible(&self) -> CatalogResult<usize> {
        Database::mark_all_inaccessible(self)
    }

    fn list_all(&self) -> CatalogResult<Vec<MediaRecord>> {
        self.list_all_media()
    }

    fn apply(&self, changes: &[CatalogChange]) -> CatalogResult<()> {
        self.apply_changes(changes)
    }
}
