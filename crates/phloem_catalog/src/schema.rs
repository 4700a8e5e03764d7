//! Schema creation and migration. All CREATE TABLE statements live here.

use crate::error::Result;
use rusqlite::Connection;
use tracing::debug;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    parent_folder_id INTEGER REFERENCES folders(id),
    zip_file_id INTEGER REFERENCES files(id),
    mod_time INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_folder_id);
CREATE INDEX IF NOT EXISTS idx_folders_zip ON folders(zip_file_id);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    basename TEXT NOT NULL,
    parent_folder_id INTEGER NOT NULL REFERENCES folders(id),
    zip_file_id INTEGER REFERENCES files(id),
    size INTEGER NOT NULL,
    mod_time INTEGER NOT NULL,
    media_info TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_parent ON files(parent_folder_id);
CREATE INDEX IF NOT EXISTS idx_files_basename ON files(basename);
CREATE INDEX IF NOT EXISTS idx_files_zip ON files(zip_file_id);

CREATE TABLE IF NOT EXISTS file_fingerprints (
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (file_id, kind)
);

CREATE INDEX IF NOT EXISTS idx_fingerprints_lookup ON file_fingerprints(kind, value);
"#;

/// Per-connection pragmas. WAL allows readers to proceed while a writer
/// holds its transaction; the busy timeout covers short writer overlap
/// before the retry loop kicks in.
pub(crate) fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

pub(crate) fn ensure_schema(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        debug!(from = version, to = SCHEMA_VERSION, "catalog schema migrated");
    }

    Ok(())
}
