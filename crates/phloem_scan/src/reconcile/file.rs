//! File reconciliation.
//!
//! Per file the decision is one of: create, update, adopt via rename
//! detection, or leave unchanged. Rename detection treats a fingerprint
//! match whose recorded path is no longer observable as the same entity at
//! a new location, preserving its id and creation time.

use crate::error::{Result, ScanError};
use crate::scanner::{ScannedEntry, Scanner};
use crate::stats::{FileOutcome, ScanOutcome};
use chrono::Utc;
use phloem_catalog::{CatalogFile, FingerprintKind, Fingerprints, TxnContext};
use phloem_vfs::path as vpath;
use tracing::{debug, info};

enum RenameDecision {
    NotARename,
    Renamed(CatalogFile),
    /// The candidate was claimed by a concurrent worker mid-decision.
    Lost,
}

impl Scanner {
    /// Reconcile one file, returning the committed row and what happened.
    pub(crate) fn scan_file(&self, entry: &ScannedEntry) -> Result<FileOutcome> {
        let existing = self.catalog.with_db::<_, ScanError, _>(|ctx| {
            let files = ctx.files();
            let mut found = files.find_by_path(&entry.path, true)?;

            // The per-path probe decides whether a relaxed lookup makes
            // sense; archive overlays always report case-sensitive.
            if found.is_none() && !entry.vfs.is_path_case_sensitive(&entry.path) {
                found = files.find_by_path(&entry.path, false)?;
            }
            Ok(found)
        })?;

        match existing {
            None => self.on_new_file(entry),
            Some(found) => self.on_existing_file(entry, found),
        }
    }

    fn on_new_file(&self, entry: &ScannedEntry) -> Result<FileOutcome> {
        let now = Utc::now();

        let parent_path = vpath::parent(&entry.path).ok_or_else(|| {
            ScanError::MissingParentFolder {
                path: entry.path.clone(),
            }
        })?;
        let parent_folder_id = self
            .catalog
            .with_db::<_, ScanError, _>(|ctx| self.folder_id_for(ctx, parent_path))?
            .ok_or_else(|| ScanError::MissingParentFolder {
                path: entry.path.clone(),
            })?;

        let mut draft = CatalogFile {
            id: None,
            path: entry.path.clone(),
            basename: entry.basename.clone(),
            parent_folder_id,
            zip_file_id: entry.zip_file_id,
            size: entry.size,
            mod_time: entry.mod_time,
            fingerprints: Fingerprints::default(),
            media: None,
            created_at: now,
            updated_at: now,
        };

        let fresh = self.calculate_fingerprints(&entry.vfs, &draft, &entry.path, false)?;
        draft.fingerprints = fresh.clone();

        // Decorate before rename detection so that detection sees populated
        // metadata.
        let mut draft = self.fire_decorators(&entry.vfs, draft)?;

        match self.handle_rename(entry, &draft, &fresh)? {
            RenameDecision::Renamed(renamed) => {
                return Ok(FileOutcome {
                    file: renamed,
                    status: ScanOutcome::Renamed,
                });
            }
            // Another worker claimed the candidate first; decide again
            // against the refreshed catalog state.
            RenameDecision::Lost => return self.scan_file(entry),
            RenameDecision::NotARename => {}
        }

        self.catalog.with_txn::<_, ScanError, _>(|ctx| {
            ctx.files().create(&mut draft)?;
            self.fire_handlers(ctx, &draft, None)
        })?;

        Ok(FileOutcome {
            file: draft,
            status: ScanOutcome::New,
        })
    }

    /// Look for catalog rows sharing a fingerprint whose recorded location
    /// no longer checks out. The first missing candidate (ascending id) is
    /// adopted: it keeps its id, creation time and fingerprint set, and
    /// takes every other field from the new snapshot.
    fn handle_rename(
        &self,
        entry: &ScannedEntry,
        draft: &CatalogFile,
        fresh: &Fingerprints,
    ) -> Result<RenameDecision> {
        let mut candidates: Vec<CatalogFile> = Vec::new();
        self.catalog.with_db::<_, ScanError, _>(|ctx| {
            for fp in fresh.iter() {
                for candidate in ctx.files().find_by_fingerprint(fp)? {
                    if !candidates.iter().any(|c| c.id == candidate.id) {
                        candidates.push(candidate);
                    }
                }
            }
            Ok(())
        })?;

        let mut missing: Vec<CatalogFile> = Vec::new();
        for candidate in candidates {
            // Same archive scope only: both outside archives, or both in
            // the same one.
            if candidate.zip_file_id != entry.zip_file_id {
                continue;
            }

            let Some(candidate_vfs) = self.vfs_for_candidate(&candidate)? else {
                missing.push(candidate);
                continue;
            };

            match candidate_vfs.lstat(&candidate.path) {
                Err(_) => missing.push(candidate),
                Ok(candidate_info) => {
                    if candidate.path.eq_ignore_ascii_case(&entry.path)
                        && !candidate_vfs.is_path_case_sensitive(&candidate.path)
                    {
                        // A case-insensitive hit at the new path is the same
                        // file observed under its old spelling.
                        missing.push(candidate);
                    } else if !self.accept_entry(&candidate.path, &candidate_info) {
                        debug!(
                            "File {:?} no longer in library paths. Treating as a move.",
                            candidate.path
                        );
                        missing.push(candidate);
                    }
                }
            }
        }

        if missing.is_empty() {
            return Ok(RenameDecision::NotARename);
        }

        let original = missing.remove(0);
        let original_id = original.id_required().map_err(ScanError::from)?;
        let old_path = original.path.clone();
        let new_path = draft.path.clone();

        info!("{} moved to {}. Updating path...", old_path, new_path);

        let mut updated = original.clone();
        updated.path = draft.path.clone();
        updated.basename = draft.basename.clone();
        updated.parent_folder_id = draft.parent_folder_id;
        updated.zip_file_id = draft.zip_file_id;
        updated.size = draft.size;
        updated.mod_time = draft.mod_time;
        updated.media = draft.media.clone();
        updated.updated_at = draft.updated_at;

        let mut lost = false;
        self.catalog.with_txn::<_, ScanError, _>(|ctx| {
            // Write transactions serialize, so re-checking the claim here
            // closes the race between two workers adopting the same row.
            lost = !matches!(
                ctx.files().find_by_id(original_id)?,
                Some(current) if current.path == old_path
            );
            if lost {
                return Ok(());
            }

            ctx.files().update(&updated)?;

            if self.is_zip_file(&updated.basename) {
                self.transfer_zip_hierarchy(ctx, &updated, &old_path)?;
            }

            self.fire_handlers(ctx, &updated, Some(&original))
        })?;

        if lost {
            return Ok(RenameDecision::Lost);
        }
        Ok(RenameDecision::Renamed(updated))
    }

    /// Repath everything recorded inside a renamed archive. The rows keep
    /// their `zip_file_id`; only the path prefix changes.
    fn transfer_zip_hierarchy(
        &self,
        ctx: &TxnContext<'_>,
        zip_file: &CatalogFile,
        old_path: &str,
    ) -> Result<()> {
        let zip_id = zip_file.id_required().map_err(ScanError::from)?;
        let new_path = zip_file.path.as_str();
        let old_prefix = format!("{old_path}/");
        let now = Utc::now();

        for mut folder in ctx.folders().find_in_zip(zip_id)? {
            if folder.path == old_path {
                // The archive-root folder follows the archive file itself.
                folder.path = new_path.to_string();
                folder.parent_folder_id = Some(zip_file.parent_folder_id);
            } else if let Some(rest) = folder.path.strip_prefix(&old_prefix) {
                folder.path = format!("{new_path}/{rest}");
            } else {
                continue;
            }
            folder.updated_at = now;
            ctx.folders().update(&folder)?;
        }

        for mut inner in ctx.files().find_in_zip(zip_id)? {
            let Some(rest) = inner.path.strip_prefix(&old_prefix) else {
                continue;
            };
            inner.path = format!("{new_path}/{rest}");
            inner.updated_at = now;
            ctx.files().update(&inner)?;
        }

        Ok(())
    }

    fn on_existing_file(
        &self,
        entry: &ScannedEntry,
        existing: CatalogFile,
    ) -> Result<FileOutcome> {
        // A stored path differing from the walked one after a successful
        // lookup is a case change, either of the basename or of an ancestor
        // folder; both rewrite the row.
        let changed = existing.mod_time != entry.mod_time || existing.path != entry.path;
        let force_rescan = self.options.rescan;

        if !changed && !force_rescan {
            return self.on_unchanged_file(entry, existing);
        }

        let old = existing.clone();
        if !changed && force_rescan {
            info!("rescanning {}", existing.path);
        } else {
            info!("{} has been updated: rescanning", existing.path);
        }

        let mut existing = existing;
        existing.path = entry.path.clone();
        existing.basename = entry.basename.clone();
        existing.mod_time = entry.mod_time;
        existing.size = entry.size;
        existing.updated_at = Utc::now();

        let fresh = self.calculate_fingerprints(&entry.vfs, &existing, &entry.path, false)?;
        self.remove_outdated_fingerprints(&mut existing, &fresh);
        existing.fingerprints.merge(&fresh);

        let existing = self.fire_decorators(&entry.vfs, existing)?;

        self.catalog.with_txn::<_, ScanError, _>(|ctx| {
            ctx.files().update(&existing)?;
            self.fire_handlers(ctx, &existing, Some(&old))
        })?;

        Ok(FileOutcome {
            file: existing,
            status: ScanOutcome::Updated,
        })
    }

    /// An MD5 recorded for previous contents is stale once the oshash moves
    /// and no fresh MD5 was produced to replace it.
    fn remove_outdated_fingerprints(&self, file: &mut CatalogFile, fresh: &Fingerprints) {
        let oshash_changed = match (
            fresh.get(&FingerprintKind::Oshash),
            file.fingerprints.get(&FingerprintKind::Oshash),
        ) {
            (Some(new), Some(old)) => new != old,
            _ => false,
        };

        if !oshash_changed
            || fresh.get(&FingerprintKind::Md5).is_some()
            || file.fingerprints.get(&FingerprintKind::Md5).is_none()
        {
            return;
        }

        info!("Removing outdated checksum from {}", file.path);
        file.fingerprints.remove(&FingerprintKind::Md5);
    }

    fn on_unchanged_file(
        &self,
        entry: &ScannedEntry,
        mut existing: CatalogFile,
    ) -> Result<FileOutcome> {
        let missing_metadata = self.is_missing_metadata(&entry.vfs, &existing);
        if missing_metadata {
            info!("Updating metadata for {}", existing.path);
            existing.size = entry.size;
            existing = self.fire_decorators(&entry.vfs, existing)?;
            existing.updated_at = Utc::now();

            self.catalog.with_txn::<_, ScanError, _>(|ctx| {
                ctx.files().update(&existing)?;
                Ok(())
            })?;
        }

        // Fill in fingerprint kinds the calculator now produces but the row
        // lacks; identical sets write nothing.
        let fingerprints =
            self.calculate_fingerprints(&entry.vfs, &existing, &entry.path, true)?;
        if fingerprints.contents_changed(&existing.fingerprints) {
            existing.fingerprints.merge(&fingerprints);
            existing.updated_at = Utc::now();

            self.catalog.with_txn::<_, ScanError, _>(|ctx| {
                ctx.files().update(&existing)?;
                Ok(())
            })?;
        }

        if self.is_handler_required(&existing) {
            self.catalog
                .with_txn::<_, ScanError, _>(|ctx| self.fire_handlers(ctx, &existing, None))?;
            return Ok(FileOutcome {
                file: existing,
                status: ScanOutcome::Updated,
            });
        }

        if missing_metadata {
            // Reporting updated lets the walker rescan an enclosing
            // archive's contents.
            return Ok(FileOutcome {
                file: existing,
                status: ScanOutcome::Updated,
            });
        }

        Ok(FileOutcome {
            file: existing,
            status: ScanOutcome::Unchanged,
        })
    }
}
