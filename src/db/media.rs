//! Media record storage, reconciliation writes and listing queries.

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::backend::CatalogChange;
use super::{format_timestamp, parse_timestamp, Database, MediaFields, MediaRecord};
use crate::error::{CatalogError, CatalogResult};
use crate::filter::{FilterRecord, MediaFilter};
use crate::scanner::accessibility::{AccessEvent, Accessibility};
use crate::scanner::discovery::MediaKind;

const MEDIA_COLUMNS: &str = "id, path, library_root, filename, capture_time, modification_time, size_bytes, kind, accessible";

/// Raw column values, converted outside the rusqlite row callback so that
/// corrupt values surface as `CatalogError::CorruptValue`.
struct MediaRow {
    id: i64,
    path: String,
    library_root: String,
    filename: String,
    capture_time: String,
    modification_time: Option<String>,
    size_bytes: i64,
    kind: String,
    accessible: bool,
}

impl MediaRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            path: row.get(1)?,
            library_root: row.get(2)?,
            filename: row.get(3)?,
            capture_time: row.get(4)?,
            modification_time: row.get(5)?,
            size_bytes: row.get(6)?,
            kind: row.get(7)?,
            accessible: row.get(8)?,
        })
    }

    fn into_record(self) -> CatalogResult<MediaRecord> {
        let capture_time = parse_timestamp("capture_time", &self.capture_time)?;
        let modification_time = self
            .modification_time
            .as_deref()
            .map(|text| parse_timestamp("modification_time", text))
            .transpose()?;
        let size_bytes = u64::try_from(self.size_bytes).map_err(|_| CatalogError::CorruptValue {
            column: "size_bytes",
            value: self.size_bytes.to_string(),
        })?;
        let kind = self.kind.parse::<MediaKind>().map_err(|_| CatalogError::CorruptValue {
            column: "kind",
            value: self.kind.clone(),
        })?;

        Ok(MediaRecord {
            id: self.id,
            path: PathBuf::from(self.path),
            library_root: PathBuf::from(self.library_root),
            filename: self.filename,
            capture_time,
            modification_time,
            size_bytes,
            kind,
            accessibility: Accessibility::from_flag(self.accessible),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    CaptureTime,
    ModificationTime,
    Path,
    Filename,
    Size,
}

impl SortKey {
    /// Unknown keys fall back to capture time.
    pub fn parse(s: &str) -> Self {
        match s {
            "modification_time" => SortKey::ModificationTime,
            "path" | "filepath" => SortKey::Path,
            "filename" => SortKey::Filename,
            "size" | "filesize" => SortKey::Size,
            _ => SortKey::CaptureTime,
        }
    }

    fn column(self) -> &'static str {
        match self {
            SortKey::CaptureTime => "capture_time",
            SortKey::ModificationTime => "modification_time",
            SortKey::Path => "path",
            SortKey::Filename => "filename",
            SortKey::Size => "size_bytes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Anything but `asc` (any case) sorts descending.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaQuery {
    pub sort: SortKey,
    pub order: SortOrder,
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl Default for MediaQuery {
    fn default() -> Self {
        Self {
            sort: SortKey::default(),
            order: SortOrder::default(),
            page: 1,
            per_page: 20,
        }
    }
}

/// A record together with its tag names.
#[derive(Debug, Clone, Serialize)]
pub struct MediaEntry {
    #[serde(flatten)]
    pub record: MediaRecord,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaPage {
    pub items: Vec<MediaEntry>,
    pub total_items: usize,
    pub total_pages: usize,
    pub current_page: usize,
}

fn paginate(entries: Vec<MediaEntry>, page: usize, per_page: usize) -> MediaPage {
    let total_items = entries.len();
    let total_pages = if per_page == 0 {
        0
    } else {
        total_items.div_ceil(per_page)
    };
    let start = page.saturating_sub(1).saturating_mul(per_page);
    let items = entries.into_iter().skip(start).take(per_page).collect();

    MediaPage {
        items,
        total_items,
        total_pages,
        current_page: page,
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

impl Database {
    pub fn list_all_media(&self) -> CatalogResult<Vec<MediaRecord>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {} FROM media ORDER BY id", MEDIA_COLUMNS))?;
        let rows = stmt
            .query_map([], MediaRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(MediaRow::into_record).collect()
    }

    pub fn get_media(&self, id: i64) -> CatalogResult<Option<MediaRecord>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {} FROM media WHERE id = ?", MEDIA_COLUMNS),
                [id],
                MediaRow::from_row,
            )
            .optional()?;
        row.map(MediaRow::into_record).transpose()
    }

    pub fn get_media_by_path(&self, path: &Path) -> CatalogResult<Option<MediaRecord>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {} FROM media WHERE path = ?", MEDIA_COLUMNS),
                [path_str(path)],
                MediaRow::from_row,
            )
            .optional()?;
        row.map(MediaRow::into_record).transpose()
    }

    /// Flip every record to inaccessible. Committed immediately.
    pub fn mark_all_inaccessible(&self) -> CatalogResult<usize> {
        let state = Accessibility::Accessible.apply(AccessEvent::PrePass);
        let count = self
            .conn()
            .execute("UPDATE media SET accessible = ?", [state.is_accessible()])?;
        Ok(count)
    }

    /// Apply a reconciliation pass in one transaction. Any failure rolls
    /// back every change of the pass.
    pub fn apply_changes(&self, changes: &[CatalogChange]) -> CatalogResult<()> {
        let tx = self.conn().unchecked_transaction()?;

        {
            let mut insert = tx.prepare_cached(
                r#"
                INSERT INTO media (
                    path, library_root, filename, capture_time, modification_time,
                    size_bytes, kind, accessible
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            let mut update = tx.prepare_cached(
                r#"
                UPDATE media SET
                    library_root = ?, filename = ?, capture_time = ?, modification_time = ?,
                    size_bytes = ?, kind = ?, accessible = ?,
                    scanned_at = CURRENT_TIMESTAMP
                WHERE path = ?
                "#,
            )?;
            let mut set_state =
                tx.prepare_cached("UPDATE media SET accessible = ? WHERE path = ?")?;
            let inserted = Accessibility::initial();
            let refreshed = Accessibility::Inaccessible.apply(AccessEvent::Rediscovered);

            for change in changes {
                match change {
                    CatalogChange::Insert(fields) => {
                        insert.execute(params![
                            path_str(&fields.path),
                            path_str(&fields.library_root),
                            fields.filename,
                            format_timestamp(&fields.capture_time),
                            fields.modification_time.as_ref().map(format_timestamp),
                            size_to_sql(fields)?,
                            fields.kind.as_str(),
                            inserted.is_accessible(),
                        ])?;
                    }
                    CatalogChange::Update(fields) => {
                        let updated = update.execute(params![
                            path_str(&fields.library_root),
                            fields.filename,
                            format_timestamp(&fields.capture_time),
                            fields.modification_time.as_ref().map(format_timestamp),
                            size_to_sql(fields)?,
                            fields.kind.as_str(),
                            refreshed.is_accessible(),
                            path_str(&fields.path),
                        ])?;
                        if updated == 0 {
                            return Err(CatalogError::Other(format!(
                                "no record to update at {}",
                                fields.path.display()
                            )));
                        }
                    }
                    CatalogChange::SetAccessibility { path, state } => {
                        set_state.execute(params![state.is_accessible(), path_str(path)])?;
                    }
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Sorted, filtered, paginated listing. The filter runs after sorting and
    /// before pagination, so page counts reflect filtered totals.
    pub fn query_media(
        &self,
        query: &MediaQuery,
        filter: Option<&MediaFilter>,
    ) -> CatalogResult<MediaPage> {
        let sql = format!(
            "SELECT {} FROM media ORDER BY {} {}, id {}",
            MEDIA_COLUMNS,
            query.sort.column(),
            query.order.keyword(),
            query.order.keyword(),
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map([], MediaRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tags = self.tag_names_by_media()?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let record = row.into_record()?;
            let tags = tags.remove(&record.id).unwrap_or_default();
            entries.push(MediaEntry { record, tags });
        }

        if let Some(filter) = filter {
            let before = entries.len();
            entries.retain(|entry| filter.matches(&FilterRecord::from(entry)));
            tracing::info!("Filter kept {} of {} items", entries.len(), before);
        }

        Ok(paginate(entries, query.page.max(1), query.per_page))
    }

    /// Remove records outright. Tag associations go with them.
    pub fn delete_media(&self, ids: &[i64]) -> CatalogResult<usize> {
        let tx = self.conn().unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM media WHERE id = ?")?;
            for id in ids {
                deleted += stmt.execute([id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    pub fn count_media(&self) -> CatalogResult<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn count_accessible(&self) -> CatalogResult<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM media WHERE accessible = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub(crate) fn tag_names_by_media(&self) -> CatalogResult<HashMap<i64, Vec<String>>> {
        let mut stmt = self.conn().prepare(
            r#"
            SELECT mt.media_id, t.name
            FROM media_tags mt
            JOIN tags t ON t.id = mt.tag_id
            ORDER BY t.name
            "#,
        )?;
        let mut map: HashMap<i64, Vec<String>> = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (media_id, name) = row?;
            map.entry(media_id).or_default().push(name);
        }
        Ok(map)
    }
}

fn size_to_sql(fields: &MediaFields) -> CatalogResult<i64> {
    i64::try_from(fields.size_bytes).map_err(|_| CatalogError::CorruptValue {
        column: "size_bytes",
        value: fields.size_bytes.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{fields, memory_db, ts};

    fn insert(db: &Database, path: &str, root: &str) -> MediaRecord {
        db.apply_changes(&[CatalogChange::Insert(fields(path, root))]).unwrap();
        db.get_media_by_path(Path::new(path)).unwrap().unwrap()
    }

    #[test]
    fn test_insert_and_read_back() {
        let db = memory_db();
        let record = insert(&db, "/lib/a.jpg", "/lib");

        assert_eq!(record.filename, "a.jpg");
        assert_eq!(record.library_root, PathBuf::from("/lib"));
        assert_eq!(record.capture_time, ts("2020-01-01T10:00:00"));
        assert_eq!(record.modification_time, Some(ts("2021-06-01T00:00:00")));
        assert_eq!(record.size_bytes, 1024);
        assert_eq!(record.kind, MediaKind::Image);
        assert!(record.is_accessible());
        assert!(record.metadata_matches(&fields("/lib/a.jpg", "/lib")));
    }

    #[test]
    fn test_update_rewrites_fields_and_restores_access() {
        let db = memory_db();
        insert(&db, "/lib/a.jpg", "/lib");
        db.mark_all_inaccessible().unwrap();

        let mut changed = fields("/lib/a.jpg", "/other");
        changed.size_bytes = 2048;
        changed.modification_time = None;
        db.apply_changes(&[CatalogChange::Update(changed.clone())]).unwrap();

        let record = db.get_media_by_path(Path::new("/lib/a.jpg")).unwrap().unwrap();
        assert!(record.metadata_matches(&changed));
        assert!(record.is_accessible());
    }

    #[test]
    fn test_failed_pass_rolls_back_everything() {
        let db = memory_db();
        insert(&db, "/lib/a.jpg", "/lib");

        let result = db.apply_changes(&[
            CatalogChange::Insert(fields("/lib/b.jpg", "/lib")),
            CatalogChange::SetAccessibility {
                path: PathBuf::from("/lib/a.jpg"),
                state: Accessibility::Inaccessible,
            },
            // Duplicate path violates the unique key
            CatalogChange::Insert(fields("/lib/a.jpg", "/lib")),
        ]);

        assert!(result.is_err());
        assert_eq!(db.count_media().unwrap(), 1);
        let a = db.get_media_by_path(Path::new("/lib/a.jpg")).unwrap().unwrap();
        assert!(a.is_accessible());
    }

    #[test]
    fn test_update_of_unknown_path_fails() {
        let db = memory_db();
        let result = db.apply_changes(&[CatalogChange::Update(fields("/lib/ghost.jpg", "/lib"))]);
        assert!(matches!(result, Err(CatalogError::Other(_))));
    }

    #[test]
    fn test_mark_all_inaccessible() {
        let db = memory_db();
        insert(&db, "/lib/a.jpg", "/lib");
        insert(&db, "/lib/b.jpg", "/lib");

        assert_eq!(db.mark_all_inaccessible().unwrap(), 2);
        assert_eq!(db.count_accessible().unwrap(), 0);
        assert_eq!(db.count_media().unwrap(), 2);
    }

    #[test]
    fn test_writes_follow_accessibility_transitions() {
        let db = memory_db();
        let inserted = insert(&db, "/lib/a.jpg", "/lib");
        assert_eq!(inserted.accessibility, Accessibility::initial());

        db.mark_all_inaccessible().unwrap();
        let marked = db.get_media(inserted.id).unwrap().unwrap();
        assert_eq!(
            marked.accessibility,
            Accessibility::Accessible.apply(AccessEvent::PrePass)
        );

        let mut drifted = fields("/lib/a.jpg", "/lib");
        drifted.size_bytes += 1;
        db.apply_changes(&[CatalogChange::Update(drifted)]).unwrap();
        let refreshed = db.get_media(inserted.id).unwrap().unwrap();
        assert_eq!(
            refreshed.accessibility,
            marked.accessibility.apply(AccessEvent::Rediscovered)
        );
    }

    #[test]
    fn test_query_sorts_and_paginates() {
        let db = memory_db();
        for (i, name) in ["a.jpg", "b.jpg", "c.jpg"].iter().enumerate() {
            let mut f = fields(&format!("/lib/{}", name), "/lib");
            f.size_bytes = (i as u64 + 1) * 100;
            db.apply_changes(&[CatalogChange::Insert(f)]).unwrap();
        }

        let query = MediaQuery {
            sort: SortKey::Size,
            order: SortOrder::Asc,
            page: 1,
            per_page: 2,
        };
        let page = db.query_media(&query, None).unwrap();
        assert_eq!(page.total_items, 3);
        assert_eq!(page.total_pages, 2);
        let names: Vec<&str> = page.items.iter().map(|e| e.record.filename.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);

        let page2 = db
            .query_media(&MediaQuery { page: 2, ..query.clone() }, None)
            .unwrap();
        assert_eq!(page2.items.len(), 1);
        assert_eq!(page2.items[0].record.filename, "c.jpg");
        assert_eq!(page2.current_page, 2);
    }

    #[test]
    fn test_empty_listing_has_zero_pages() {
        let db = memory_db();
        let page = db.query_media(&MediaQuery::default(), None).unwrap();
        assert_eq!(page.total_items, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_query_applies_filter_before_pagination() {
        let db = memory_db();
        let a = insert(&db, "/lib/a.jpg", "/lib");
        insert(&db, "/lib/b.jpg", "/lib");
        db.add_tags_to_media(a.id, &["beach".to_string()]).unwrap();

        let filter = MediaFilter {
            tags_any: vec!["beach".to_string()],
            ..Default::default()
        };
        let page = db.query_media(&MediaQuery::default(), Some(&filter)).unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].tags, vec!["beach".to_string()]);
    }

    #[test]
    fn test_delete_media_removes_tag_links() {
        let db = memory_db();
        let a = insert(&db, "/lib/a.jpg", "/lib");
        db.add_tags_to_media(a.id, &["keep".to_string()]).unwrap();

        assert_eq!(db.delete_media(&[a.id, 999]).unwrap(), 1);
        assert!(db.get_media(a.id).unwrap().is_none());
        assert!(db.tag_names_by_media().unwrap().is_empty());
        assert_eq!(db.list_tags().unwrap().len(), 1);
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(SortKey::parse("filesize"), SortKey::Size);
        assert_eq!(SortKey::parse("filepath"), SortKey::Path);
        assert_eq!(SortKey::parse("bogus"), SortKey::CaptureTime);
        assert_eq!(SortOrder::parse("ASC"), SortOrder::Asc);
        assert_eq!(SortOrder::parse("whatever"), SortOrder::Desc);
    }
}
