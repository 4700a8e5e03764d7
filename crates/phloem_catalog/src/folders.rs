//! Folder entries and their store.

use crate::error::{CatalogError, Result};
use crate::types::{from_millis, to_millis, FileId, FolderId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A directory known to the catalog.
///
/// `id` is `None` until the folder has been persisted with
/// [`FolderStore::create`]. A folder inside an archive carries the archive
/// file's id in `zip_file_id` and its path is prefixed by the archive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: Option<FolderId>,
    pub path: String,
    pub parent_folder_id: Option<FolderId>,
    pub zip_file_id: Option<FileId>,
    pub mod_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    pub fn id_required(&self) -> Result<FolderId> {
        self.id.ok_or(CatalogError::MissingId { entity: "folder" })
    }
}

pub struct FolderStore<'c> {
    conn: &'c Connection,
}

const FOLDER_COLUMNS: &str =
    "id, path, parent_folder_id, zip_file_id, mod_time, created_at, updated_at";

impl<'c> FolderStore<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn find_by_id(&self, id: FolderId) -> Result<Option<Folder>> {
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1");
        let folder = self
            .conn
            .query_row(&sql, params![id.as_i64()], folder_from_row)
            .optional()?;
        Ok(folder)
    }

    /// Look up a folder by its full path. The case-insensitive variant is
    /// used after a miss when the filesystem at that path folds case.
    pub fn find_by_path(&self, path: &str, case_sensitive: bool) -> Result<Option<Folder>> {
        let sql = if case_sensitive {
            format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE path = ?1")
        } else {
            format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE path = ?1 COLLATE NOCASE")
        };
        let folder = self
            .conn
            .query_row(&sql, params![path], folder_from_row)
            .optional()?;
        Ok(folder)
    }

    pub fn find_children(&self, parent: FolderId) -> Result<Vec<Folder>> {
        let sql =
            format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE parent_folder_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let folders = stmt
            .query_map(params![parent.as_i64()], folder_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    /// Candidate folders for move detection: same basename, not inside an
    /// archive. Ascending id order makes the winning candidate deterministic.
    pub fn find_move_candidates(&self, basename: &str) -> Result<Vec<Folder>> {
        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders \
             WHERE zip_file_id IS NULL AND path LIKE ?1 ESCAPE '\\' ORDER BY id"
        );
        let pattern = format!("%/{}", escape_like(basename));
        let mut stmt = self.conn.prepare(&sql)?;
        let folders = stmt
            .query_map(params![pattern], folder_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    /// All folders inside the given archive, parents before children.
    pub fn find_in_zip(&self, zip_file_id: FileId) -> Result<Vec<Folder>> {
        let sql =
            format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE zip_file_id = ?1 ORDER BY path");
        let mut stmt = self.conn.prepare(&sql)?;
        let folders = stmt
            .query_map(params![zip_file_id.as_i64()], folder_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    /// Insert the folder and assign its id.
    pub fn create(&self, folder: &mut Folder) -> Result<()> {
        self.conn.execute(
            "INSERT INTO folders (path, parent_folder_id, zip_file_id, mod_time, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                folder.path,
                folder.parent_folder_id.map(FolderId::as_i64),
                folder.zip_file_id.map(FileId::as_i64),
                to_millis(folder.mod_time),
                to_millis(folder.created_at),
                to_millis(folder.updated_at),
            ],
        )?;
        folder.id = Some(FolderId::from_raw(self.conn.last_insert_rowid()));
        Ok(())
    }

    pub fn update(&self, folder: &Folder) -> Result<()> {
        let id = folder.id_required()?;
        self.conn.execute(
            "UPDATE folders SET path = ?1, parent_folder_id = ?2, zip_file_id = ?3, \
             mod_time = ?4, created_at = ?5, updated_at = ?6 WHERE id = ?7",
            params![
                folder.path,
                folder.parent_folder_id.map(FolderId::as_i64),
                folder.zip_file_id.map(FileId::as_i64),
                to_millis(folder.mod_time),
                to_millis(folder.created_at),
                to_millis(folder.updated_at),
                id.as_i64(),
            ],
        )?;
        Ok(())
    }
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: Some(FolderId::from_raw(row.get(0)?)),
        path: row.get(1)?,
        parent_folder_id: row.get::<_, Option<i64>>(2)?.map(FolderId::from_raw),
        zip_file_id: row.get::<_, Option<i64>>(3)?.map(FileId::from_raw),
        mod_time: from_millis(row.get(4)?),
        created_at: from_millis(row.get(5)?),
        updated_at: from_millis(row.get(6)?),
    })
}

/// Escapes LIKE metacharacters so stored paths containing `%` or `_` cannot
/// widen a pattern. The escape character is `\`.
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
