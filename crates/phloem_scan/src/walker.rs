//! Depth-first traversal of a root.
//!
//! Folders are reconciled inline on the walker thread so their ids exist
//! before contained files are handed to the workers. Archive files are also
//! reconciled inline, then their internal tree is walked through the zip
//! overlay with every entry tagged by the archive file's id.

use crate::error::{Result, ScanError};
use crate::scanner::{ScannedEntry, Scanner, WalkContext};
use crate::stats::ScanOutcome;
use phloem_vfs::{effective_size, path as vpath, FileInfo, Vfs};
use std::sync::Arc;

impl Scanner {
    pub(crate) fn walk_root(&self, root: &str, wc: &WalkContext<'_>) -> Result<()> {
        let info = self.vfs.lstat(root)?;
        if !info.is_dir {
            return Err(ScanError::NotADirectory(root.to_string()));
        }

        let (accepted, prune) = self.evaluate_filters(root, &info);
        if !accepted && prune {
            return Ok(());
        }

        if accepted {
            let (_, outcome) = self.scan_folder(&self.vfs, root, &info, None)?;
            wc.counters.record_folder(outcome);
        }
        self.walk_dir(Arc::clone(&self.vfs), root, None, wc)
    }

    fn walk_dir(
        &self,
        vfs: Arc<dyn Vfs>,
        dir: &str,
        zip_file_id: Option<phloem_catalog::FileId>,
        wc: &WalkContext<'_>,
    ) -> Result<()> {
        wc.counters.inc_dirs();

        for info in vfs.read_dir(dir)? {
            if wc.cancel.is_cancelled() {
                return Ok(());
            }

            let child = vpath::join(dir, &info.name);
            let (accepted, prune) = self.evaluate_filters(&child, &info);

            if info.is_dir {
                if !accepted && prune {
                    continue;
                }
                if accepted {
                    match self.scan_folder(&vfs, &child, &info, zip_file_id) {
                        Ok((_, outcome)) => wc.counters.record_folder(outcome),
                        Err(e) => {
                            // Without a committed folder row, children cannot
                            // resolve their parent; skip the subtree.
                            wc.record_error(&child, &e);
                            continue;
                        }
                    }
                }
                if let Err(e) = self.walk_dir(Arc::clone(&vfs), &child, zip_file_id, wc) {
                    wc.record_error(&child, &e);
                }
                continue;
            }

            if !accepted {
                continue;
            }

            wc.counters.inc_discovered();

            if self.is_zip_file(&info.name) {
                if let Err(e) = self.scan_archive(&vfs, &child, &info, zip_file_id, wc) {
                    wc.record_error(&child, &e);
                }
                continue;
            }

            match self.make_entry(&vfs, &child, &info, zip_file_id) {
                Ok(entry) => {
                    // A send fails only when all workers have exited, which
                    // happens on cancellation.
                    if wc.tx.send(entry).is_err() {
                        return Ok(());
                    }
                }
                Err(e) => wc.record_error(&child, &e),
            }
        }

        Ok(())
    }

    /// Reconcile an archive as an ordinary file, then walk its contents.
    ///
    /// The internal walk only runs when the archive is new or updated; an
    /// unchanged archive cannot have changed contents. A renamed archive's
    /// rows were already repathed during rename handling.
    fn scan_archive(
        &self,
        vfs: &Arc<dyn Vfs>,
        path: &str,
        info: &FileInfo,
        zip_file_id: Option<phloem_catalog::FileId>,
        wc: &WalkContext<'_>,
    ) -> Result<()> {
        let entry = self.make_entry(vfs, path, info, zip_file_id)?;
        let outcome = self.scan_file(&entry)?;
        wc.counters.record(outcome.status);

        if !matches!(outcome.status, ScanOutcome::New | ScanOutcome::Updated) {
            return Ok(());
        }

        let zip_id = outcome.file.id_required().map_err(ScanError::from)?;
        let mounted = vfs.open_zip(path)?;

        // The archive itself acts as the folder hosting its top-level
        // entries.
        let root_info = FileInfo {
            name: info.name.clone(),
            size: 0,
            mod_time: info.mod_time,
            is_dir: true,
            is_symlink: false,
        };
        let (_, outcome) = self.scan_folder(&mounted, path, &root_info, Some(zip_id))?;
        wc.counters.record_folder(outcome);
        self.walk_dir(mounted, path, Some(zip_id), wc)
    }

    fn make_entry(
        &self,
        vfs: &Arc<dyn Vfs>,
        path: &str,
        info: &FileInfo,
        zip_file_id: Option<phloem_catalog::FileId>,
    ) -> Result<ScannedEntry> {
        let size = effective_size(vfs.as_ref(), path, info)?;
        Ok(ScannedEntry {
            path: path.to_string(),
            basename: info.name.clone(),
            size,
            mod_time: info.mod_time,
            zip_file_id,
            info: info.clone(),
            vfs: Arc::clone(vfs),
        })
    }
}
