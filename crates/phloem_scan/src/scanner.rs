//! Scanner construction, the worker pool, and helpers shared by the walker
//! and the reconciler.
//!
//! The scan runs as one walker thread plus a bounded pool of reconciler
//! workers. The walker handles folders (and archive files) inline so that a
//! folder's id is committed before any file beneath it is reconciled; all
//! other files flow through a bounded channel to the workers.

use crate::cancel::CancelToken;
use crate::error::{Result, ScanError};
use crate::options::ScanOptions;
use crate::pipeline::{Acceptance, ScanPipeline, VfsOpener};
use crate::stats::{Counters, ScanReport, ScanStats};
use chrono::{DateTime, Utc};
use phloem_catalog::{Catalog, CatalogFile, FileId, Fingerprints, FolderId, TxnContext};
use phloem_vfs::{path as vpath, FileInfo, Vfs};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

const QUEUE_DEPTH_PER_WORKER: usize = 16;

/// A file captured by the walker, waiting for reconciliation.
pub struct ScannedEntry {
    pub path: String,
    pub basename: String,
    pub size: i64,
    pub mod_time: DateTime<Utc>,
    pub zip_file_id: Option<FileId>,
    pub info: FileInfo,
    pub vfs: Arc<dyn Vfs>,
}

/// Scans configured roots into the catalog.
///
/// See the crate docs for the walk/reconcile split. A `Scanner` is immutable
/// during a scan and can be shared across the worker threads it spawns.
pub struct Scanner {
    pub(crate) catalog: Catalog,
    pub(crate) vfs: Arc<dyn Vfs>,
    pub(crate) options: ScanOptions,
    pub(crate) pipeline: ScanPipeline,
    // Written by the walker as folders commit; readers fall back to a
    // catalog lookup on miss, so stale entries are harmless.
    pub(crate) folder_ids: Mutex<HashMap<String, FolderId>>,
}

pub(crate) struct WalkContext<'s> {
    pub(crate) tx: SyncSender<ScannedEntry>,
    pub(crate) counters: &'s Counters,
    pub(crate) errors: &'s Mutex<Vec<(String, String)>>,
    pub(crate) cancel: &'s CancelToken,
}

impl WalkContext<'_> {
    pub(crate) fn record_error(&self, path: &str, err: &ScanError) {
        warn!("scanning {path}: {err}");
        self.counters.inc_errors();
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((path.to_string(), err.to_string()));
    }
}

impl Scanner {
    pub fn new(
        catalog: Catalog,
        vfs: Arc<dyn Vfs>,
        options: ScanOptions,
        pipeline: ScanPipeline,
    ) -> Self {
        Self {
            catalog,
            vfs,
            options,
            pipeline,
            folder_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Walk every configured root and reconcile it against the catalog.
    ///
    /// Per-file failures are collected in the report; the scan keeps going.
    /// Cancellation stops the walk and lets workers finish their in-flight
    /// file before exiting.
    pub fn scan(&self, cancel: &CancelToken) -> Result<ScanReport> {
        let started = Instant::now();
        info!(roots = self.options.roots.len(), "starting scan");

        // The cache is scoped to one scan session; ids from an earlier scan
        // may no longer exist after catalog surgery.
        self.folder_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();

        let counters = Counters::default();
        let errors: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());
        let workers = self.options.worker_count();

        std::thread::scope(|scope| {
            let (tx, rx) =
                std::sync::mpsc::sync_channel::<ScannedEntry>(workers * QUEUE_DEPTH_PER_WORKER);
            let rx = Arc::new(Mutex::new(rx));

            for _ in 0..workers {
                let rx = Arc::clone(&rx);
                let counters = &counters;
                let errors = &errors;
                scope.spawn(move || self.file_worker(rx, counters, errors, cancel));
            }

            let wc = WalkContext {
                tx,
                counters: &counters,
                errors: &errors,
                cancel,
            };

            for root in &self.options.roots {
                if cancel.is_cancelled() {
                    break;
                }
                if let Err(e) = self.walk_root(root, &wc) {
                    wc.record_error(root, &e);
                }
            }
            // Dropping the WalkContext closes the channel and drains the
            // workers.
        });

        let mut stats = counters.snapshot();
        stats.duration_ms = started.elapsed().as_millis() as u64;
        log_scan_complete(&stats);

        Ok(ScanReport {
            stats,
            errors: errors
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        })
    }

    fn file_worker(
        &self,
        rx: Arc<Mutex<Receiver<ScannedEntry>>>,
        counters: &Counters,
        errors: &Mutex<Vec<(String, String)>>,
        cancel: &CancelToken,
    ) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let received = rx
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .recv();
            let Ok(entry) = received else {
                return;
            };

            match self.scan_file(&entry) {
                Ok(outcome) => counters.record(outcome.status),
                Err(e) => {
                    warn!("scanning file {}: {e}", entry.path);
                    counters.inc_errors();
                    errors
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push((entry.path.clone(), e.to_string()));
                }
            }
        }
    }

    /// Union acceptance: accept when no filters are configured or any filter
    /// accepts. A rejected directory prunes only when every filter asked for
    /// the prune (the dual of the any-accepts rule).
    pub(crate) fn evaluate_filters(&self, path: &str, info: &FileInfo) -> (bool, bool) {
        if self.pipeline.scan_filters.is_empty() {
            return (true, false);
        }

        let mut prune = true;
        for filter in &self.pipeline.scan_filters {
            match filter.accept(path, info) {
                Acceptance::Accept => return (true, false),
                Acceptance::Reject => prune = false,
                Acceptance::RejectAndPrune => {}
            }
        }
        (false, prune)
    }

    pub(crate) fn accept_entry(&self, path: &str, info: &FileInfo) -> bool {
        self.evaluate_filters(path, info).0
    }

    pub(crate) fn is_zip_file(&self, name: &str) -> bool {
        let Some(ext) = vpath::extension(name) else {
            return false;
        };
        self.options
            .zip_extensions
            .iter()
            .any(|zip_ext| ext.eq_ignore_ascii_case(zip_ext))
    }

    pub(crate) fn cache_folder_id(&self, path: &str, id: FolderId) {
        self.folder_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_string(), id);
    }

    /// Resolve a folder path to its id via the session cache, falling back
    /// to a case-sensitive catalog lookup.
    pub(crate) fn folder_id_for(
        &self,
        ctx: &TxnContext<'_>,
        path: &str,
    ) -> Result<Option<FolderId>> {
        let cached = self
            .folder_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .copied();
        if cached.is_some() {
            return Ok(cached);
        }

        let Some(folder) = ctx.folders().find_by_path(path, true)? else {
            return Ok(None);
        };
        if let Some(id) = folder.id {
            self.cache_folder_id(&folder.path, id);
        }
        Ok(folder.id)
    }

    pub(crate) fn calculate_fingerprints(
        &self,
        vfs: &Arc<dyn Vfs>,
        file: &CatalogFile,
        path: &str,
        use_existing: bool,
    ) -> Result<Fingerprints> {
        if !use_existing {
            info!("Calculating fingerprints for {} ...", path);
        }
        let opener = VfsOpener::new(Arc::clone(vfs), path);
        self.pipeline
            .fingerprint_calculator
            .calculate(file, &opener, use_existing)
    }

    pub(crate) fn fire_decorators(
        &self,
        vfs: &Arc<dyn Vfs>,
        mut file: CatalogFile,
    ) -> Result<CatalogFile> {
        for decorator in &self.pipeline.decorators {
            file = decorator.decorate(vfs.as_ref(), file)?;
        }
        Ok(file)
    }

    pub(crate) fn fire_handlers(
        &self,
        ctx: &TxnContext<'_>,
        file: &CatalogFile,
        old: Option<&CatalogFile>,
    ) -> Result<()> {
        for handler in &self.pipeline.handlers {
            handler.handle(ctx, file, old)?;
        }
        Ok(())
    }

    pub(crate) fn is_handler_required(&self, file: &CatalogFile) -> bool {
        self.pipeline
            .handler_required_filters
            .iter()
            .any(|filter| filter.accept(file))
    }

    pub(crate) fn is_missing_metadata(&self, vfs: &Arc<dyn Vfs>, file: &CatalogFile) -> bool {
        self.pipeline
            .decorators
            .iter()
            .any(|decorator| decorator.is_missing_metadata(vfs.as_ref(), file))
    }

    /// Resolve the filesystem a catalog row lives on by walking its archive
    /// chain. `Ok(None)` means the chain cannot be opened, which rename
    /// detection reads as evidence the row is missing.
    pub(crate) fn vfs_for_candidate(&self, file: &CatalogFile) -> Result<Option<Arc<dyn Vfs>>> {
        let Some(zip_id) = file.zip_file_id else {
            return Ok(Some(Arc::clone(&self.vfs)));
        };

        let zip_file = self
            .catalog
            .with_db::<_, ScanError, _>(|ctx| Ok(ctx.files().find_by_id(zip_id)?))?;
        let Some(zip_file) = zip_file else {
            return Ok(None);
        };

        let Some(host) = self.vfs_for_candidate(&zip_file)? else {
            return Ok(None);
        };
        match host.open_zip(&zip_file.path) {
            Ok(mounted) => Ok(Some(mounted)),
            Err(_) => Ok(None),
        }
    }
}

fn log_scan_complete(stats: &ScanStats) {
    info!(
        dirs = stats.dirs_scanned,
        folders_new = stats.folders_new,
        folders_updated = stats.folders_updated,
        discovered = stats.files_discovered,
        new = stats.files_new,
        renamed = stats.files_renamed,
        updated = stats.files_updated,
        unchanged = stats.files_unchanged,
        errors = stats.errors,
        duration_ms = stats.duration_ms,
        "scan complete"
    );
}
