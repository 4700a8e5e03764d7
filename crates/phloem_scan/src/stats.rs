//! Scan statistics, aggregated across walker and worker threads.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Terminal classification of one scanned file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    New,
    Renamed,
    Updated,
    Unchanged,
}

/// Terminal classification of one reconciled folder. A folder adopted by
/// move detection counts as new: it entered the catalog under a path that
/// did not exist before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderOutcome {
    New,
    Updated,
    Unchanged,
}

/// A scanned file together with its classification.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: phloem_catalog::CatalogFile,
    pub status: ScanOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub dirs_scanned: u64,
    pub folders_new: u64,
    pub folders_updated: u64,
    pub files_discovered: u64,
    pub files_new: u64,
    pub files_renamed: u64,
    pub files_updated: u64,
    pub files_unchanged: u64,
    pub errors: u64,
    pub duration_ms: u64,
}

/// Result of a whole scan: aggregate stats plus per-path errors. A non-empty
/// error list does not fail the scan; unaffected files are still processed.
#[derive(Debug)]
pub struct ScanReport {
    pub stats: ScanStats,
    pub errors: Vec<(String, String)>,
}

#[derive(Default)]
pub(crate) struct Counters {
    dirs_scanned: AtomicU64,
    folders_new: AtomicU64,
    folders_updated: AtomicU64,
    files_discovered: AtomicU64,
    files_new: AtomicU64,
    files_renamed: AtomicU64,
    files_updated: AtomicU64,
    files_unchanged: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    pub(crate) fn inc_dirs(&self) {
        self.dirs_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_discovered(&self) {
        self.files_discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, outcome: ScanOutcome) {
        let counter = match outcome {
            ScanOutcome::New => &self.files_new,
            ScanOutcome::Renamed => &self.files_renamed,
            ScanOutcome::Updated => &self.files_updated,
            ScanOutcome::Unchanged => &self.files_unchanged,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_folder(&self, outcome: FolderOutcome) {
        let counter = match outcome {
            FolderOutcome::New => &self.folders_new,
            FolderOutcome::Updated => &self.folders_updated,
            FolderOutcome::Unchanged => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ScanStats {
        ScanStats {
            dirs_scanned: self.dirs_scanned.load(Ordering::Relaxed),
            folders_new: self.folders_new.load(Ordering::Relaxed),
            folders_updated: self.folders_updated.load(Ordering::Relaxed),
            files_discovered: self.files_discovered.load(Ordering::Relaxed),
            files_new: self.files_new.load(Ordering::Relaxed),
            files_renamed: self.files_renamed.load(Ordering::Relaxed),
            files_updated: self.files_updated.load(Ordering::Relaxed),
            files_unchanged: self.files_unchanged.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            duration_ms: 0,
        }
    }
}
