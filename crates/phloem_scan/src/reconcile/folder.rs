//! Folder reconciliation.
//!
//! Per walked directory the decision is one of: create, update in place,
//! or adopt an existing row that moved here from elsewhere. A move carries
//! the whole stored subtree with it, inside the same transaction.

use crate::error::{Result, ScanError};
use crate::scanner::Scanner;
use crate::stats::FolderOutcome;
use chrono::Utc;
use phloem_catalog::{FileId, Folder, TxnContext};
use phloem_vfs::{path as vpath, FileInfo, Vfs};
use std::sync::Arc;
use tracing::info;

impl Scanner {
    /// Reconcile one directory, returning its committed row and what
    /// happened to it. A move adoption reports new, like the create path it
    /// branched from.
    pub(crate) fn scan_folder(
        &self,
        vfs: &Arc<dyn Vfs>,
        folder_path: &str,
        info: &FileInfo,
        zip_file_id: Option<FileId>,
    ) -> Result<(Folder, FolderOutcome)> {
        self.catalog.with_txn::<_, ScanError, _>(|ctx| {
            let folders = ctx.folders();

            let mut existing = folders.find_by_path(folder_path, true)?;

            // Case-insensitive filesystems may report a folder whose stored
            // path differs only in case. Archive members are always
            // case-sensitive.
            if existing.is_none()
                && zip_file_id.is_none()
                && !vfs.is_path_case_sensitive(folder_path)
            {
                existing = folders.find_by_path(folder_path, false)?;
            }

            let (folder, outcome) = match existing {
                Some(found) => {
                    self.on_existing_folder(ctx, folder_path, info, zip_file_id, found)?
                }
                None => (
                    self.on_new_folder(ctx, folder_path, info, zip_file_id)?,
                    FolderOutcome::New,
                ),
            };

            if let Some(id) = folder.id {
                self.cache_folder_id(&folder.path, id);
            }

            Ok((folder, outcome))
        })
    }

    fn on_new_folder(
        &self,
        ctx: &TxnContext<'_>,
        folder_path: &str,
        info: &FileInfo,
        zip_file_id: Option<FileId>,
    ) -> Result<Folder> {
        if zip_file_id.is_none() {
            if let Some(moved) = self.detect_folder_move(ctx, folder_path)? {
                return Ok(moved);
            }
        }

        let now = Utc::now();
        let parent_folder_id = match vpath::parent(folder_path) {
            // A missing parent row means this is a top-level root, which is
            // legitimate during parallel scans.
            Some(parent) => self.folder_id_for(ctx, parent)?,
            None => None,
        };

        let mut folder = Folder {
            id: None,
            path: folder_path.to_string(),
            parent_folder_id,
            zip_file_id,
            mod_time: info.mod_time,
            created_at: now,
            updated_at: now,
        };

        let log_path = folder_path.to_string();
        ctx.add_post_commit_hook(move || {
            info!("{} doesn't exist. Creating new folder entry...", log_path);
        })?;

        ctx.folders().create(&mut folder)?;
        Ok(folder)
    }

    /// A new path with a known basename whose old location is gone from disk
    /// is a move, not a fresh folder. Candidates are visited in ascending id
    /// order and the first missing one wins.
    fn detect_folder_move(
        &self,
        ctx: &TxnContext<'_>,
        new_path: &str,
    ) -> Result<Option<Folder>> {
        let basename = vpath::file_name(new_path);

        for candidate in ctx.folders().find_move_candidates(basename)? {
            if candidate.path == new_path {
                continue;
            }
            if self.vfs.lstat(&candidate.path).is_ok() {
                continue;
            }

            let old_path = candidate.path.clone();
            let mut moved = candidate;
            moved.path = new_path.to_string();
            moved.parent_folder_id = match vpath::parent(new_path) {
                Some(parent) => self.folder_id_for(ctx, parent)?,
                None => None,
            };
            moved.updated_at = Utc::now();
            ctx.folders().update(&moved)?;

            self.repair_subfolder_paths(ctx, &moved)?;

            let log_new = new_path.to_string();
            ctx.add_post_commit_hook(move || {
                info!("{} moved to {}. Updating path...", old_path, log_new);
            })?;

            return Ok(Some(moved));
        }

        Ok(None)
    }

    /// Rewrite descendant folder paths after `parent` moved, depth-first,
    /// within the caller's transaction.
    fn repair_subfolder_paths(&self, ctx: &TxnContext<'_>, parent: &Folder) -> Result<()> {
        let parent_id = parent.id_required().map_err(ScanError::from)?;

        for child in ctx.folders().find_children(parent_id)? {
            let mut child = child;
            child.path = vpath::join(&parent.path, vpath::file_name(&child.path));
            child.updated_at = Utc::now();
            ctx.folders().update(&child)?;
            self.repair_subfolder_paths(ctx, &child)?;
        }
        Ok(())
    }

    fn on_existing_folder(
        &self,
        ctx: &TxnContext<'_>,
        folder_path: &str,
        info: &FileInfo,
        zip_file_id: Option<FileId>,
        mut existing: Folder,
    ) -> Result<(Folder, FolderOutcome)> {
        let mut update = false;

        if existing.mod_time != info.mod_time {
            existing.mod_time = info.mod_time;
            update = true;
        }

        // Path differing from a successful lookup means a case-only change
        // on a case-insensitive filesystem.
        if existing.path != folder_path {
            existing.path = folder_path.to_string();
            update = true;
        }

        if existing.zip_file_id != zip_file_id {
            existing.zip_file_id = zip_file_id;
            update = true;
        }

        if !update {
            return Ok((existing, FolderOutcome::Unchanged));
        }

        existing.updated_at = Utc::now();
        ctx.folders().update(&existing)?;
        Ok((existing, FolderOutcome::Updated))
    }
}
