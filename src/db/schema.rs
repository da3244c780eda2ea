pub const SCHEMA: &str = r#"
-- Media table: one row per file path ever cataloged
CREATE TABLE IF NOT EXISTS media (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    library_root TEXT NOT NULL,
    filename TEXT NOT NULL,
    capture_time TEXT NOT NULL DEFAULT '1999-01-01T00:00:00.000000',
    modification_time TEXT,
    size_bytes INTEGER NOT NULL,
    kind TEXT NOT NULL,               -- 'image' or 'video'
    accessible INTEGER NOT NULL DEFAULT 1,
    scanned_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_media_capture_time ON media(capture_time);
CREATE INDEX IF NOT EXISTS idx_media_library_root ON media(library_root);
CREATE INDEX IF NOT EXISTS idx_media_accessible ON media(accessible);

-- Tags: globally unique labels
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Media to tag mapping
CREATE TABLE IF NOT EXISTS media_tags (
    media_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (media_id, tag_id),
    FOREIGN KEY (media_id) REFERENCES media(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_media_tags_tag ON media_tags(tag_id);
"#;
