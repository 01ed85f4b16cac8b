//! SQLite-backed catalog.
//!
//! One database holds dimensions, files, their tags and the saved views of
//! every workspace. WAL mode, schema created on open.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use linkview_core::{
    QualifyingFile, StoreError, TagChain, TagQuery, TagSelector, ViewDefinition, ViewStore,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::{check_dimension_name, check_tag_value, Catalog, Dimension, FileRecord};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS dimensions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS files (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT UNIQUE,
        workspace_id TEXT NOT NULL,
        path TEXT NOT NULL,
        display_name TEXT,
        eligible INTEGER NOT NULL DEFAULT 1,
        UNIQUE (workspace_id, path)
    );
    CREATE TABLE IF NOT EXISTS file_tags (
        file_id TEXT NOT NULL,
        dimension_id INTEGER NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (file_id, dimension_id, value)
    );
    CREATE INDEX IF NOT EXISTS idx_file_tags_value ON file_tags(dimension_id, value);
    CREATE TABLE IF NOT EXISTS views (
        workspace_id TEXT NOT NULL,
        id TEXT NOT NULL,
        name TEXT NOT NULL,
        parent_id TEXT,
        chain TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (workspace_id, id)
    );
    CREATE INDEX IF NOT EXISTS idx_views_updated ON views(workspace_id, updated_at);
    CREATE TABLE IF NOT EXISTS plan_dirs (
        workspace_id TEXT NOT NULL,
        path TEXT NOT NULL,
        PRIMARY KEY (workspace_id, path)
    );
";

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(format!("bad timestamp '{}': {}", s, e)))
}

/// SQLite-backed tag catalog and view store.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open (or create) a catalog database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)
            .map_err(|e| StoreError::Database(format!("Failed to open catalog DB: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| StoreError::Database(format!("Failed to set pragmas: {}", e)))?;

        Self::init(conn)
    }

    /// Open an in-memory catalog.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Database(format!("Failed to create schema: {}", e)))?;
        debug!("catalog schema ready");
        Ok(SqliteCatalog {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load_tags(conn: &Connection, file_id: &str) -> Result<Vec<TagSelector>, StoreError> {
        let mut stmt = conn
            .prepare(
                "SELECT t.dimension_id, d.name, t.value
                 FROM file_tags t JOIN dimensions d ON d.id = t.dimension_id
                 WHERE t.file_id = ?1
                 ORDER BY t.dimension_id, t.value",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![file_id], |row| {
                Ok(TagSelector::new(row.get(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn file_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, Option<String>, bool)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get::<_, i64>(4)? != 0,
        ))
    }

    fn to_record(
        conn: &Connection,
        (id, workspace_id, path, display_name, eligible): (String, String, String, Option<String>, bool),
    ) -> Result<FileRecord, StoreError> {
        let tags = Self::load_tags(conn, &id)?;
        Ok(FileRecord {
            id,
            workspace_id,
            path: PathBuf::from(path),
            display_name,
            eligible,
            tags,
        })
    }

    fn require_file(conn: &Connection, file_id: &str) -> Result<(), StoreError> {
        let found: Option<i64> = conn
            .query_row("SELECT seq FROM files WHERE id = ?1", params![file_id], |row| row.get(0))
            .optional()
            .map_err(db_err)?;
        match found {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("file '{}'", file_id))),
        }
    }

    fn view_from_row(row: &Row<'_>) -> rusqlite::Result<[Option<String>; 7]> {
        Ok([
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ])
    }

    fn to_view(cols: [Option<String>; 7]) -> Result<ViewDefinition, StoreError> {
        let [workspace_id, id, name, parent_id, chain, created_at, updated_at] = cols;
        let missing = || StoreError::Database("view row has NULL columns".to_string());
        let chain: TagChain = serde_json::from_str(&chain.ok_or_else(missing)?)?;
        Ok(ViewDefinition {
            id: id.ok_or_else(missing)?,
            workspace_id: workspace_id.ok_or_else(missing)?,
            name: name.ok_or_else(missing)?,
            parent_id,
            chain,
            created_at: parse_timestamp(&created_at.ok_or_else(missing)?)?,
            updated_at: parse_timestamp(&updated_at.ok_or_else(missing)?)?,
        })
    }
}

impl Catalog for SqliteCatalog {
    fn add_dimension(&self, name: &str) -> Result<Dimension, StoreError> {
        check_dimension_name(name)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO dimensions (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
            params![name],
        )
        .map_err(db_err)?;
        let id: i64 = conn
            .query_row("SELECT id FROM dimensions WHERE name = ?1", params![name], |row| row.get(0))
            .map_err(db_err)?;
        Ok(Dimension {
            id,
            name: name.to_string(),
        })
    }

    fn dimensions(&self) -> Result<Vec<Dimension>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, name FROM dimensions ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Dimension {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn add_file(
        &self,
        workspace_id: &str,
        path: &Path,
        display_name: Option<&str>,
    ) -> Result<String, StoreError> {
        let conn = self.conn();
        let path_str = path.to_string_lossy();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT seq FROM files WHERE workspace_id = ?1 AND path = ?2",
                params![workspace_id, path_str],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if exists.is_some() {
            return Err(StoreError::InvalidInput(format!(
                "file already registered: {}",
                path.display()
            )));
        }

        conn.execute(
            "INSERT INTO files (workspace_id, path, display_name) VALUES (?1, ?2, ?3)",
            params![workspace_id, path_str, display_name],
        )
        .map_err(db_err)?;
        let seq = conn.last_insert_rowid();
        let id = format!("f{:06}", seq);
        conn.execute("UPDATE files SET id = ?1 WHERE seq = ?2", params![id, seq])
            .map_err(db_err)?;
        debug!(file_id = %id, path = %path.display(), "registered file");
        Ok(id)
    }

    fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, workspace_id, path, display_name, eligible FROM files WHERE id = ?1",
                params![file_id],
                Self::file_from_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(|r| Self::to_record(&conn, r)).transpose()
    }

    fn list_files(&self, workspace_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.conn();
        let rows = {
            let mut stmt = conn
                .prepare(
                    "SELECT id, workspace_id, path, display_name, eligible
                     FROM files WHERE workspace_id = ?1 ORDER BY id",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![workspace_id], Self::file_from_row)
                .map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)?
        };
        rows.into_iter().map(|r| Self::to_record(&conn, r)).collect()
    }

    fn tag_file(&self, file_id: &str, dimension_id: i64, value: &str) -> Result<(), StoreError> {
        check_tag_value(value)?;
        let conn = self.conn();
        Self::require_file(&conn, file_id)?;
        let dim: Option<i64> = conn
            .query_row("SELECT id FROM dimensions WHERE id = ?1", params![dimension_id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_err)?;
        if dim.is_none() {
            return Err(StoreError::NotFound(format!("dimension {}", dimension_id)));
        }
        conn.execute(
            "INSERT OR IGNORE INTO file_tags (file_id, dimension_id, value) VALUES (?1, ?2, ?3)",
            params![file_id, dimension_id, value],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn untag_file(&self, file_id: &str, dimension_id: i64) -> Result<usize, StoreError> {
        let conn = self.conn();
        Self::require_file(&conn, file_id)?;
        conn.execute(
            "DELETE FROM file_tags WHERE file_id = ?1 AND dimension_id = ?2",
            params![file_id, dimension_id],
        )
        .map_err(db_err)
    }

    fn set_path(&self, file_id: &str, path: &Path) -> Result<(), StoreError> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE files SET path = ?1 WHERE id = ?2",
                params![path.to_string_lossy(), file_id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("file '{}'", file_id)));
        }
        Ok(())
    }

    fn set_eligible(&self, file_id: &str, eligible: bool) -> Result<(), StoreError> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE files SET eligible = ?1 WHERE id = ?2",
                params![eligible as i64, file_id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("file '{}'", file_id)));
        }
        Ok(())
    }

    fn remove_file(&self, file_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn();
        conn.execute("DELETE FROM file_tags WHERE file_id = ?1", params![file_id])
            .map_err(db_err)?;
        let removed = conn
            .execute("DELETE FROM files WHERE id = ?1", params![file_id])
            .map_err(db_err)?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl TagQuery for SqliteCatalog {
    async fn list_qualifying_files(
        &self,
        workspace_id: &str,
        prefix: &[TagSelector],
    ) -> Result<Vec<QualifyingFile>, StoreError> {
        let mut sql = String::from(
            "SELECT f.id, f.path, f.display_name FROM files f
             WHERE f.workspace_id = ?1 AND f.eligible = 1",
        );
        let mut values = vec![Value::Text(workspace_id.to_string())];
        for selector in prefix {
            let dim_param = values.len() + 1;
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM file_tags t
                   WHERE t.file_id = f.id AND t.dimension_id = ?{} AND t.value = ?{})",
                dim_param,
                dim_param + 1
            ));
            values.push(Value::Integer(selector.dimension_id));
            values.push(Value::Text(selector.tag_value.clone()));
        }
        sql.push_str(" ORDER BY f.id");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(QualifyingFile {
                    file_id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    display_name: row.get(2)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    async fn file(&self, file_id: &str) -> Result<Option<QualifyingFile>, StoreError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, path, display_name FROM files WHERE id = ?1",
            params![file_id],
            |row| {
                Ok(QualifyingFile {
                    file_id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    display_name: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }
}

#[async_trait]
impl ViewStore for SqliteCatalog {
    async fn get_view(
        &self,
        workspace_id: &str,
        view_id: &str,
    ) -> Result<Option<ViewDefinition>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT workspace_id, id, name, parent_id, chain, created_at, updated_at
                 FROM views WHERE workspace_id = ?1 AND id = ?2",
                params![workspace_id, view_id],
                Self::view_from_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(Self::to_view).transpose()
    }

    async fn list_views(&self, workspace_id: &str) -> Result<Vec<ViewDefinition>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT workspace_id, id, name, parent_id, chain, created_at, updated_at
                 FROM views WHERE workspace_id = ?1
                 ORDER BY updated_at, created_at, id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![workspace_id], Self::view_from_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        rows.into_iter().map(Self::to_view).collect()
    }

    async fn upsert_view(&self, view: &ViewDefinition) -> Result<(), StoreError> {
        let chain = serde_json::to_string(&view.chain)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO views (workspace_id, id, name, parent_id, chain, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(workspace_id, id) DO UPDATE SET
                name = excluded.name,
                parent_id = excluded.parent_id,
                chain = excluded.chain,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            params![
                view.workspace_id,
                view.id,
                view.name,
                view.parent_id,
                chain,
                timestamp(&view.created_at),
                timestamp(&view.updated_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_view(&self, workspace_id: &str, view_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn();
        let removed = conn
            .execute(
                "DELETE FROM views WHERE workspace_id = ?1 AND id = ?2",
                params![workspace_id, view_id],
            )
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    async fn plan_dirs(&self, workspace_id: &str) -> Result<Vec<PathBuf>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT path FROM plan_dirs WHERE workspace_id = ?1 ORDER BY path")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![workspace_id], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        rows.map(|r| r.map(PathBuf::from).map_err(db_err)).collect()
    }

    async fn add_plan_dirs(&self, workspace_id: &str, dirs: &[PathBuf]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_err)?;
        for dir in dirs {
            tx.execute(
                "INSERT OR IGNORE INTO plan_dirs (workspace_id, path) VALUES (?1, ?2)",
                params![workspace_id, dir.to_string_lossy()],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)
    }
}
