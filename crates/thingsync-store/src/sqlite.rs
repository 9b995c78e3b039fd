use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thingsync_core::Item;
use tracing::info;

use crate::durable::{BackendError, ItemRow, RowBackend, RowFields, RowFilter};

const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
";

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS things (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_things_live ON things(deleted_at);
";

impl From<rusqlite::Error> for BackendError {
    fn from(e: rusqlite::Error) -> Self {
        BackendError::new(e.to_string())
    }
}

/// SQLite rows for the durable store. Timestamps are RFC 3339 text.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open or create a database file.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BackendError::new(format!("create dir: {e}")))?;
        }
        let conn = Connection::open(path)?;
        let backend = Self::init(conn)?;
        info!(path = %path.display(), "item database opened");
        Ok(backend)
    }

    /// Private database that disappears with the value.
    pub fn in_memory() -> Result<Self, BackendError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, BackendError> {
        conn.execute_batch(PRAGMAS)
            .map_err(|e| BackendError::new(format!("pragmas: {e}")))?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| BackendError::new(format!("schema: {e}")))?;
        Ok(Self { conn })
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, BackendError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BackendError::new(format!("bad timestamp '{raw}': {e}")))
}

fn parse_optional_time(raw: Option<String>) -> Result<Option<DateTime<Utc>>, BackendError> {
    raw.as_deref().map(parse_time).transpose()
}

type RawRow = (i64, String, String, Option<String>, Option<String>);

fn into_item((id, name, created_at, updated_at, deleted_at): RawRow) -> Result<Item, BackendError> {
    Ok(Item {
        id,
        name,
        created_at: parse_time(&created_at)?,
        updated_at: parse_optional_time(updated_at)?,
        deleted_at: parse_optional_time(deleted_at)?,
    })
}

impl RowBackend for SqliteBackend {
    fn insert(&mut self, row: &ItemRow) -> Result<i64, BackendError> {
        let _ = self.conn.execute(
            "INSERT INTO things (name, created_at) VALUES (?1, ?2)",
            params![row.name, row.created_at.to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&mut self, key: i64, fields: &RowFields) -> Result<(), BackendError> {
        let changed = self.conn.execute(
            "UPDATE things SET
                 name = COALESCE(?1, name),
                 updated_at = COALESCE(?2, updated_at),
                 deleted_at = COALESCE(?3, deleted_at)
             WHERE id = ?4",
            params![
                fields.name,
                fields.updated_at.map(|t| t.to_rfc3339()),
                fields.deleted_at.map(|t| t.to_rfc3339()),
                key,
            ],
        )?;
        if changed == 0 {
            return Err(BackendError::new(format!("no row with key {key}")));
        }
        Ok(())
    }

    fn select(&mut self, filter: RowFilter) -> Result<Vec<Item>, BackendError> {
        let read = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RawRow> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        };
        let raw: Vec<RawRow> = match filter {
            RowFilter::Live => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, name, created_at, updated_at, deleted_at
                     FROM things WHERE deleted_at IS NULL ORDER BY id",
                )?;
                stmt.query_map([], read)?.collect::<rusqlite::Result<_>>()?
            }
            RowFilter::All => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, name, created_at, updated_at, deleted_at
                     FROM things ORDER BY id",
                )?;
                stmt.query_map([], read)?.collect::<rusqlite::Result<_>>()?
            }
            RowFilter::Key(key) => self
                .conn
                .query_row(
                    "SELECT id, name, created_at, updated_at, deleted_at
                     FROM things WHERE id = ?1",
                    [key],
                    read,
                )
                .optional()?
                .into_iter()
                .collect(),
        };
        raw.into_iter().map(into_item).collect()
    }
}
