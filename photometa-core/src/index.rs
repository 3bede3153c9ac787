//! Tag index backed by SQLite.
//!
//! Maps (file, namespace, field) to value sets for fast search and
//! autocomplete. Rows are ground-truthed by scans; the embedded container
//! in each image file stays the source of record.

use crate::fields::Namespace;
use crate::identity::ContentIdentity;
use crate::PhotometaError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA_VERSION: i32 = 1;

/// One page of a file listing query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryPage {
    pub files: Vec<PathBuf>,
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub total_pages: usize,
}

impl QueryPage {
    pub fn new(files: Vec<PathBuf>, page: usize, page_size: usize, total_count: usize) -> Self {
        Self {
            files,
            page,
            page_size,
            total_count,
            total_pages: total_pages(total_count, page_size),
        }
    }
}

/// `ceil(total / page_size)`, never less than one page.
pub fn total_pages(total: usize, page_size: usize) -> usize {
    let size = page_size.max(1);
    total.div_ceil(size).max(1)
}

/// Durable tag index for one library.
pub struct TagIndex {
    conn: Connection,
}

impl TagIndex {
    /// Open or create the index database at `db_path`.
    pub fn open(db_path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory index, used by tests.
    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> crate::Result<()> {
        // WAL lets scan writers and query readers proceed concurrently
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version != 0 && version != SCHEMA_VERSION {
            return Err(PhotometaError::SchemaVersionMismatch {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        if version == 0 {
            conn.execute_batch(
                "
                -- File records: path plus content identity for staleness checks
                CREATE TABLE IF NOT EXISTS images (
                    id INTEGER PRIMARY KEY,
                    path TEXT UNIQUE NOT NULL,
                    size INTEGER NOT NULL DEFAULT 0,
                    mtime INTEGER NOT NULL DEFAULT 0
                );

                -- Distinct (namespace, field, value) triples
                CREATE TABLE IF NOT EXISTS tags (
                    id INTEGER PRIMARY KEY,
                    namespace TEXT NOT NULL,
                    field TEXT NOT NULL,
                    value TEXT NOT NULL,
                    UNIQUE(namespace, field, value)
                );

                -- File <-> value associations
                CREATE TABLE IF NOT EXISTS image_tags (
                    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
                    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                    UNIQUE(image_id, tag_id)
                );

                CREATE TABLE IF NOT EXISTS scanned_directories (
                    path TEXT PRIMARY KEY,
                    last_scan INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_images_path ON images(path);
                CREATE INDEX IF NOT EXISTS idx_tags_field ON tags(namespace, field);
                CREATE INDEX IF NOT EXISTS idx_image_tags_image ON image_tags(image_id);
                CREATE INDEX IF NOT EXISTS idx_image_tags_tag ON image_tags(tag_id);

                PRAGMA user_version = 1;
                ",
            )?;
        }

        Ok(())
    }

    /// Stored content identity for a file, if it was ever indexed.
    pub fn identity_of(&self, path: &Path) -> crate::Result<Option<ContentIdentity>> {
        let row = self
            .conn
            .query_row(
                "SELECT size, mtime FROM images WHERE path = ?",
                params![path_str(path)],
                |row| {
                    Ok(ContentIdentity {
                        len: row.get::<_, i64>(0)? as u64,
                        mtime_unix: row.get(1)?,
                    })
                },
            )
            .optional()?;
        // A placeholder row (never successfully indexed) reads as absent
        Ok(row.filter(|id| id.len != 0 || id.mtime_unix != 0))
    }

    /// Record the content identity a file was indexed at.
    pub fn record_identity(&self, path: &Path, identity: ContentIdentity) -> crate::Result<()> {
        self.conn.execute(
            "INSERT INTO images (path, size, mtime) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET size = ?2, mtime = ?3",
            params![path_str(path), identity.len as i64, identity.mtime_unix],
        )?;
        Ok(())
    }

    /// Replace all rows for (file, namespace) with the supplied field entries.
    /// Idempotent: repeating the same call leaves the same queryable state.
    pub fn upsert_fields(
        &mut self,
        path: &Path,
        namespace: Namespace,
        entries: &[(&str, Vec<String>)],
    ) -> crate::Result<()> {
        let tx = self.conn.transaction()?;
        let image_id = get_or_create_image(&tx, path)?;
        tx.execute(
            "DELETE FROM image_tags WHERE image_id = ?1 AND tag_id IN (
                SELECT id FROM tags WHERE namespace = ?2
            )",
            params![image_id, namespace.as_str()],
        )?;
        for (field, values) in entries {
            insert_values(&tx, image_id, namespace, field, values.as_slice())?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Replace the rows of a single field for one file (the write path).
    pub fn replace_field(
        &mut self,
        path: &Path,
        namespace: Namespace,
        field: &str,
        values: &[String],
    ) -> crate::Result<()> {
        let tx = self.conn.transaction()?;
        let image_id = get_or_create_image(&tx, path)?;
        tx.execute(
            "DELETE FROM image_tags WHERE image_id = ?1 AND tag_id IN (
                SELECT id FROM tags WHERE namespace = ?2 AND field = ?3
            )",
            params![image_id, namespace.as_str(), field],
        )?;
        insert_values(&tx, image_id, namespace, field, values)?;
        tx.commit()?;
        Ok(())
    }

    /// Search indexed files under `dir` by tag value.
    ///
    /// `search` is split on whitespace; every word must match at least one
    /// tag value (case-insensitive substring), each word possibly in a
    /// different tag. `required` restricts matches to one namespace/field.
    pub fn search_images(
        &self,
        dir: &Path,
        search: &str,
        required: Option<(Namespace, &str)>,
        page: usize,
        page_size: usize,
    ) -> crate::Result<QueryPage> {
        let words: Vec<String> = search.split_whitespace().map(|w| w.to_string()).collect();
        if words.is_empty() {
            return Ok(QueryPage::new(Vec::new(), page, page_size, 0));
        }

        let (clauses, mut params_vec) = word_clauses(&words, required, dir);

        let page_size = page_size.max(1);
        let count_sql = format!(
            "SELECT COUNT(DISTINCT i.id) FROM images i WHERE i.path LIKE ? ESCAPE '\\'{clauses}"
        );
        let total: i64 = self.conn.query_row(
            &count_sql,
            rusqlite::params_from_iter(params_vec.iter()),
            |row| row.get(0),
        )?;

        let select_sql = format!(
            "SELECT DISTINCT i.path FROM images i WHERE i.path LIKE ? ESCAPE '\\'{clauses}
             ORDER BY i.path LIMIT {} OFFSET {}",
            page_size,
            page * page_size
        );
        let mut stmt = self.conn.prepare(&select_sql)?;
        let files: Vec<PathBuf> = stmt
            .query_map(rusqlite::params_from_iter(params_vec.drain(..)), |row| {
                row.get::<_, String>(0)
            })?
            .filter_map(|r| r.ok())
            .map(PathBuf::from)
            .collect();

        Ok(QueryPage::new(files, page, page_size, total as usize))
    }

    /// Files under `dir` that currently have at least one value for the
    /// given field. Feeds the untagged-filter inversion.
    pub fn tagged_files(
        &self,
        dir: &Path,
        namespace: Namespace,
        field: &str,
    ) -> crate::Result<HashSet<PathBuf>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT i.path FROM images i
             JOIN image_tags it ON it.image_id = i.id
             JOIN tags t ON t.id = it.tag_id
             WHERE i.path LIKE ?1 ESCAPE '\\' AND t.namespace = ?2 AND t.field = ?3",
        )?;
        let set = stmt
            .query_map(
                params![dir_pattern(dir), namespace.as_str(), field],
                |row| row.get::<_, String>(0),
            )?
            .filter_map(|r| r.ok())
            .map(PathBuf::from)
            .collect();
        Ok(set)
    }

    /// Distinct values across the index for autocomplete.
    ///
    /// Substring-matched case-insensitively, ordered by match position then
    /// value, capped at `limit`. Only values still attached to at least one
    /// file are returned, so suggestions never outlive their last upsert.
    pub fn search_field_values(
        &self,
        query: &str,
        scope: Option<(Namespace, &str)>,
        limit: usize,
    ) -> crate::Result<Vec<String>> {
        let needle = query.trim().to_lowercase();
        let pattern = format!("%{}%", needle);

        let mut sql = String::from(
            "SELECT DISTINCT t.value FROM tags t
             WHERE EXISTS (SELECT 1 FROM image_tags it WHERE it.tag_id = t.id)
               AND LOWER(t.value) LIKE ?1",
        );
        let mut params_vec: Vec<String> = vec![pattern, needle];
        if let Some((namespace, field)) = scope {
            sql.push_str(" AND t.namespace = ?3 AND t.field = ?4");
            params_vec.push(namespace.as_str().to_string());
            params_vec.push(field.to_string());
        }
        sql.push_str(&format!(
            " ORDER BY INSTR(LOWER(t.value), ?2), t.value LIMIT {}",
            limit.max(1)
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let values = stmt
            .query_map(rusqlite::params_from_iter(params_vec.iter()), |row| {
                row.get::<_, String>(0)
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(values)
    }

    /// Delete index rows for files under `dir` that are no longer present.
    /// Dangling tag values are purged with them. Returns the number of
    /// file records removed.
    pub fn remove_orphans(
        &mut self,
        dir: &Path,
        present: &HashSet<PathBuf>,
    ) -> crate::Result<usize> {
        let tx = self.conn.transaction()?;
        let mut removed = 0usize;
        {
            let mut stmt =
                tx.prepare("SELECT id, path FROM images WHERE path LIKE ?1 ESCAPE '\\'")?;
            let rows: Vec<(i64, String)> = stmt
                .query_map(params![dir_pattern(dir)], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .filter_map(|r| r.ok())
                .collect();
            for (id, path) in rows {
                if !present.contains(Path::new(&path)) {
                    tx.execute("DELETE FROM images WHERE id = ?", params![id])?;
                    removed += 1;
                }
            }
        }
        tx.execute(
            "DELETE FROM tags WHERE NOT EXISTS (
                SELECT 1 FROM image_tags it WHERE it.tag_id = tags.id
            )",
            [],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    /// Mark a directory as having completed a scan.
    pub fn mark_directory_scanned(&self, dir: &Path) -> crate::Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.conn.execute(
            "INSERT OR REPLACE INTO scanned_directories (path, last_scan) VALUES (?1, ?2)",
            params![path_str(dir), now],
        )?;
        Ok(())
    }

    /// Whether a directory has ever completed a scan.
    pub fn directory_scanned(&self, dir: &Path) -> crate::Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM scanned_directories WHERE path = ?",
                params![path_str(dir)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// LIKE pattern matching files strictly under `dir`. Wildcard characters
/// in the directory name are escaped; use with `ESCAPE '\'`.
fn dir_pattern(dir: &Path) -> String {
    let mut s = String::new();
    for c in path_str(dir).chars() {
        if matches!(c, '%' | '_' | '\\') {
            s.push('\\');
        }
        s.push(c);
    }
    if !s.ends_with(std::path::MAIN_SEPARATOR) {
        s.push(std::path::MAIN_SEPARATOR);
    }
    s.push('%');
    s
}

fn get_or_create_image(conn: &Connection, path: &Path) -> rusqlite::Result<i64> {
    let p = path_str(path);
    if let Some(id) = conn
        .query_row("SELECT id FROM images WHERE path = ?", params![p], |row| {
            row.get(0)
        })
        .optional()?
    {
        return Ok(id);
    }
    conn.execute("INSERT INTO images (path) VALUES (?)", params![p])?;
    Ok(conn.last_insert_rowid())
}

fn insert_values(
    conn: &Connection,
    image_id: i64,
    namespace: Namespace,
    field: &str,
    values: &[String],
) -> rusqlite::Result<()> {
    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        conn.execute(
            "INSERT OR IGNORE INTO tags (namespace, field, value) VALUES (?1, ?2, ?3)",
            params![namespace.as_str(), field, value],
        )?;
        let tag_id: i64 = conn.query_row(
            "SELECT id FROM tags WHERE namespace = ?1 AND field = ?2 AND value = ?3",
            params![namespace.as_str(), field, value],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO image_tags (image_id, tag_id) VALUES (?1, ?2)",
            params![image_id, tag_id],
        )?;
    }
    Ok(())
}

/// Build the per-word EXISTS clauses and the full parameter list
/// (directory prefix first, then each word's bound values).
fn word_clauses(
    words: &[String],
    required: Option<(Namespace, &str)>,
    dir: &Path,
) -> (String, Vec<String>) {
    let mut clauses = String::new();
    let mut params_vec = vec![dir_pattern(dir)];
    for word in words {
        match required {
            Some((namespace, field)) => {
                clauses.push_str(
                    " AND EXISTS (SELECT 1 FROM image_tags it
                        JOIN tags t ON it.tag_id = t.id
                        WHERE it.image_id = i.id AND LOWER(t.value) LIKE ?
                          AND t.namespace = ? AND t.field = ?)",
                );
                params_vec.push(format!("%{}%", word.to_lowercase()));
                params_vec.push(namespace.as_str().to_string());
                params_vec.push(field.to_string());
            }
            None => {
                clauses.push_str(
                    " AND EXISTS (SELECT 1 FROM image_tags it
                        JOIN tags t ON it.tag_id = t.id
                        WHERE it.image_id = i.id AND LOWER(t.value) LIKE ?)",
                );
                params_vec.push(format!("%{}%", word.to_lowercase()));
            }
        }
    }
    (clauses, params_vec)
}
