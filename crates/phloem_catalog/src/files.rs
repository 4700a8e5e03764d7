//! File entries and their store.

use crate::error::{CatalogError, Result};
use crate::fingerprint::{Fingerprint, FingerprintKind, Fingerprints};
use crate::types::{from_millis, to_millis, FileId, FolderId};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Format-specific metadata populated by decorators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaInfo {
    Video(VideoInfo),
    Image(ImageInfo),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub format: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub width: i64,
    pub height: i64,
    pub frame_rate: f64,
    pub bit_rate: i64,
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub format: String,
    pub width: i64,
    pub height: i64,
}

/// A file known to the catalog.
///
/// `id` is `None` until persisted with [`FileStore::create`]. `path` always
/// equals the parent folder's path joined with `basename`, and a file inside
/// an archive carries the archive file's id in `zip_file_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogFile {
    pub id: Option<FileId>,
    pub path: String,
    pub basename: String,
    pub parent_folder_id: FolderId,
    pub zip_file_id: Option<FileId>,
    pub size: i64,
    pub mod_time: DateTime<Utc>,
    pub fingerprints: Fingerprints,
    pub media: Option<MediaInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogFile {
    pub fn id_required(&self) -> Result<FileId> {
        self.id.ok_or(CatalogError::MissingId { entity: "file" })
    }
}

pub struct FileStore<'c> {
    conn: &'c Connection,
}

const FILE_COLUMNS: &str = "id, path, basename, parent_folder_id, zip_file_id, size, mod_time, \
                            media_info, created_at, updated_at";

impl<'c> FileStore<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn find_by_id(&self, id: FileId) -> Result<Option<CatalogFile>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1");
        let file = self
            .conn
            .query_row(&sql, params![id.as_i64()], file_from_row)
            .optional()?;
        self.attach_fingerprints(file)
    }

    pub fn find_by_path(&self, path: &str, case_sensitive: bool) -> Result<Option<CatalogFile>> {
        let sql = if case_sensitive {
            format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1")
        } else {
            format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1 COLLATE NOCASE")
        };
        let file = self
            .conn
            .query_row(&sql, params![path], file_from_row)
            .optional()?;
        self.attach_fingerprints(file)
    }

    /// All files carrying the given fingerprint, in ascending id order. The
    /// ordering is load-bearing: rename detection picks the first missing
    /// candidate.
    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<CatalogFile>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE id IN (SELECT file_id FROM file_fingerprints WHERE kind = ?1 AND value = ?2) \
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![fingerprint.kind.as_str(), fingerprint.value],
                file_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        self.attach_fingerprints_all(rows)
    }

    /// All files inside the given archive, parents-first by path.
    pub fn find_in_zip(&self, zip_file_id: FileId) -> Result<Vec<CatalogFile>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE zip_file_id = ?1 ORDER BY path");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![zip_file_id.as_i64()], file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        self.attach_fingerprints_all(rows)
    }

    /// Insert the file and its fingerprint set, assigning the file's id.
    pub fn create(&self, file: &mut CatalogFile) -> Result<()> {
        self.conn.execute(
            "INSERT INTO files (path, basename, parent_folder_id, zip_file_id, size, mod_time, \
             media_info, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                file.path,
                file.basename,
                file.parent_folder_id.as_i64(),
                file.zip_file_id.map(FileId::as_i64),
                file.size,
                to_millis(file.mod_time),
                media_to_json(&file.media)?,
                to_millis(file.created_at),
                to_millis(file.updated_at),
            ],
        )?;
        let id = FileId::from_raw(self.conn.last_insert_rowid());
        file.id = Some(id);
        self.replace_fingerprints(id, &file.fingerprints)?;
        Ok(())
    }

    /// Update the file row and replace its stored fingerprint set with the
    /// set on the struct.
    pub fn update(&self, file: &CatalogFile) -> Result<()> {
        let id = file.id_required()?;
        self.conn.execute(
            "UPDATE files SET path = ?1, basename = ?2, parent_folder_id = ?3, zip_file_id = ?4, \
             size = ?5, mod_time = ?6, media_info = ?7, created_at = ?8, updated_at = ?9 \
             WHERE id = ?10",
            params![
                file.path,
                file.basename,
                file.parent_folder_id.as_i64(),
                file.zip_file_id.map(FileId::as_i64),
                file.size,
                to_millis(file.mod_time),
                media_to_json(&file.media)?,
                to_millis(file.created_at),
                to_millis(file.updated_at),
                id.as_i64(),
            ],
        )?;
        self.replace_fingerprints(id, &file.fingerprints)?;
        Ok(())
    }

    fn replace_fingerprints(&self, id: FileId, fingerprints: &Fingerprints) -> Result<()> {
        self.conn.execute(
            "DELETE FROM file_fingerprints WHERE file_id = ?1",
            params![id.as_i64()],
        )?;
        let mut stmt = self
            .conn
            .prepare("INSERT INTO file_fingerprints (file_id, kind, value) VALUES (?1, ?2, ?3)")?;
        for fp in fingerprints.iter() {
            stmt.execute(params![id.as_i64(), fp.kind.as_str(), fp.value])?;
        }
        Ok(())
    }

    fn attach_fingerprints(&self, file: Option<CatalogFile>) -> Result<Option<CatalogFile>> {
        let Some(mut file) = file else {
            return Ok(None);
        };
        file.fingerprints = self.load_fingerprints(file.id_required()?)?;
        Ok(Some(file))
    }

    fn attach_fingerprints_all(&self, rows: Vec<CatalogFile>) -> Result<Vec<CatalogFile>> {
        let mut files = Vec::with_capacity(rows.len());
        for mut file in rows {
            file.fingerprints = self.load_fingerprints(file.id_required()?)?;
            files.push(file);
        }
        Ok(files)
    }

    fn load_fingerprints(&self, id: FileId) -> Result<Fingerprints> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, value FROM file_fingerprints WHERE file_id = ?1 ORDER BY kind")?;
        let fingerprints = stmt
            .query_map(params![id.as_i64()], |row| {
                Ok(Fingerprint {
                    kind: FingerprintKind::from_db(&row.get::<_, String>(0)?),
                    value: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Fingerprints::new(fingerprints))
    }
}

fn media_to_json(media: &Option<MediaInfo>) -> Result<Option<String>> {
    media
        .as_ref()
        .map(|info| serde_json::to_string(info).map_err(CatalogError::MediaJson))
        .transpose()
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogFile> {
    let media = row
        .get::<_, Option<String>>(7)?
        .map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))
        })
        .transpose()?;

    Ok(CatalogFile {
        id: Some(FileId::from_raw(row.get(0)?)),
        path: row.get(1)?,
        basename: row.get(2)?,
        parent_folder_id: FolderId::from_raw(row.get(3)?),
        zip_file_id: row.get::<_, Option<i64>>(4)?.map(FileId::from_raw),
        size: row.get(5)?,
        mod_time: from_millis(row.get(6)?),
        media,
        fingerprints: Fingerprints::default(),
        created_at: from_millis(row.get(8)?),
        updated_at: from_millis(row.get(9)?),
    })
}
