use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{Database, MediaRecord};
use crate::error::{CatalogError, CatalogResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

fn normalize_name(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

impl Database {
    /// Get-or-create by trimmed name. Blank names are rejected.
    pub fn create_tag(&self, name: &str) -> CatalogResult<Tag> {
        let name = normalize_name(name).ok_or_else(|| CatalogError::InvalidTagName(name.to_string()))?;

        if let Some(existing) = self.find_tag(name)? {
            return Ok(existing);
        }

        self.conn()
            .execute("INSERT INTO tags (name) VALUES (?)", [name])?;
        Ok(Tag {
            id: self.conn().last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub fn find_tag(&self, name: &str) -> CatalogResult<Option<Tag>> {
        let tag = self
            .conn()
            .query_row("SELECT id, name FROM tags WHERE name = ?", [name.trim()], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()?;
        Ok(tag)
    }

    pub fn get_tag(&self, id: i64) -> CatalogResult<Option<Tag>> {
        let tag = self
            .conn()
            .query_row("SELECT id, name FROM tags WHERE id = ?", [id], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()?;
        Ok(tag)
    }

    pub fn list_tags(&self) -> CatalogResult<Vec<Tag>> {
        let mut stmt = self.conn().prepare("SELECT id, name FROM tags ORDER BY name")?;
        let tags = stmt
            .query_map([], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    /// Returns false when no such tag exists. Media records are untouched.
    pub fn delete_tag(&self, id: i64) -> CatalogResult<bool> {
        let deleted = self.conn().execute("DELETE FROM tags WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    /// Attach tags by name, creating missing ones. Blank names are skipped.
    pub fn add_tags_to_media(&self, media_id: i64, names: &[String]) -> CatalogResult<Vec<Tag>> {
        let tx = self.conn().unchecked_transaction()?;
        let mut attached = Vec::new();
        for name in names.iter().filter_map(|n| normalize_name(n)) {
            let tag = self.create_tag(name)?;
            tx.execute(
                "INSERT OR IGNORE INTO media_tags (media_id, tag_id) VALUES (?, ?)",
                params![media_id, tag.id],
            )?;
            attached.push(tag);
        }
        tx.commit()?;
        Ok(attached)
    }

    /// Detach tags by name. Unknown names are ignored.
    pub fn remove_tags_from_media(&self, media_id: i64, names: &[String]) -> CatalogResult<usize> {
        let mut removed = 0;
        for name in names.iter().filter_map(|n| normalize_name(n)) {
            if let Some(tag) = self.find_tag(name)? {
                removed += self.conn().execute(
                    "DELETE FROM media_tags WHERE media_id = ? AND tag_id = ?",
                    params![media_id, tag.id],
                )?;
            }
        }
        Ok(removed)
    }

    pub fn tags_for_media(&self, media_id: i64) -> CatalogResult<Vec<Tag>> {
        let mut stmt = self.conn().prepare(
            r#"
            SELECT t.id, t.name
            FROM tags t
            JOIN media_tags mt ON mt.tag_id = t.id
            WHERE mt.media_id = ?
            ORDER BY t.name
            "#,
        )?;
        let tags = stmt
            .query_map([media_id], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    pub fn media_for_tag(&self, tag_id: i64) -> CatalogResult<Vec<MediaRecord>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT media_id FROM media_tags WHERE tag_id = ? ORDER BY media_id")?;
        let ids = stmt
            .query_map([tag_id], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_media(id)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
