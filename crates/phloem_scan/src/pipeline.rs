//! Capability interfaces the scanner drives.
//!
//! Each capability is a single-method trait; collaborators register ordered
//! vectors of them on [`ScanPipeline`]. Decorators enrich a file record with
//! format-specific metadata, handlers perform downstream effects inside the
//! same transaction as the persistence write, and filters gate what gets
//! walked or handled.

use crate::error::Result;
use phloem_catalog::{CatalogFile, Fingerprints, TxnContext};
use phloem_vfs::{FileInfo, ReadSeek, Vfs};
use std::io;
use std::sync::Arc;

/// Verdict of a [`PathFilter`] for a walked entry.
///
/// For directories, `Reject` still descends into the subtree (the directory
/// itself is not reconciled) while `RejectAndPrune` skips it entirely. The
/// distinction is meaningless for plain files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Accept,
    Reject,
    RejectAndPrune,
}

/// Pre-scan filter applied to every walked path.
pub trait PathFilter: Send + Sync {
    fn accept(&self, path: &str, info: &FileInfo) -> Acceptance;
}

/// Post-identification filter, used to gate handler runs for unchanged
/// files and to wrap decorators.
pub trait FileFilter: Send + Sync {
    fn accept(&self, file: &CatalogFile) -> bool;
}

/// Enriches a file record with subtype metadata while scanning.
pub trait Decorator: Send + Sync {
    /// Returns the (possibly substituted) file. An error is fatal to this
    /// file; nothing partial is persisted.
    fn decorate(&self, vfs: &dyn Vfs, file: CatalogFile) -> Result<CatalogFile>;

    /// Whether the stored record lacks metadata this decorator would
    /// populate, triggering a repair on an otherwise unchanged file.
    fn is_missing_metadata(&self, vfs: &dyn Vfs, file: &CatalogFile) -> bool;
}

/// A decorator that only runs when its filter accepts the file.
pub struct FilteredDecorator {
    decorator: Box<dyn Decorator>,
    filter: Box<dyn FileFilter>,
}

impl FilteredDecorator {
    pub fn new(decorator: Box<dyn Decorator>, filter: Box<dyn FileFilter>) -> Self {
        Self { decorator, filter }
    }
}

impl Decorator for FilteredDecorator {
    fn decorate(&self, vfs: &dyn Vfs, file: CatalogFile) -> Result<CatalogFile> {
        if self.filter.accept(&file) {
            return self.decorator.decorate(vfs, file);
        }
        Ok(file)
    }

    fn is_missing_metadata(&self, vfs: &dyn Vfs, file: &CatalogFile) -> bool {
        self.filter.accept(file) && self.decorator.is_missing_metadata(vfs, file)
    }
}

/// Downstream effect fired after a file is created, updated or renamed.
///
/// Handlers run inside the transaction that persists the file, so their
/// writes commit atomically with it; an error rolls everything back.
pub trait Handler: Send + Sync {
    fn handle(
        &self,
        ctx: &TxnContext<'_>,
        file: &CatalogFile,
        old: Option<&CatalogFile>,
    ) -> Result<()>;
}

/// Lazily opens the file a fingerprint is being computed for.
pub trait Opener: Send + Sync {
    fn open(&self) -> io::Result<Box<dyn ReadSeek>>;
}

pub struct VfsOpener {
    vfs: Arc<dyn Vfs>,
    path: String,
}

impl VfsOpener {
    pub fn new(vfs: Arc<dyn Vfs>, path: impl Into<String>) -> Self {
        Self {
            vfs,
            path: path.into(),
        }
    }
}

impl Opener for VfsOpener {
    fn open(&self) -> io::Result<Box<dyn ReadSeek>> {
        self.vfs.open(&self.path)
    }
}

/// Computes the typed digests for a file.
///
/// With `use_existing` set, digests already present on `file` may be
/// returned as-is instead of being recomputed.
pub trait FingerprintCalculator: Send + Sync {
    fn calculate(
        &self,
        file: &CatalogFile,
        opener: &dyn Opener,
        use_existing: bool,
    ) -> Result<Fingerprints>;
}

/// The ordered capability chains driven during a scan.
pub struct ScanPipeline {
    pub fingerprint_calculator: Arc<dyn FingerprintCalculator>,
    pub scan_filters: Vec<Box<dyn PathFilter>>,
    pub handler_required_filters: Vec<Box<dyn FileFilter>>,
    pub decorators: Vec<Box<dyn Decorator>>,
    pub handlers: Vec<Box<dyn Handler>>,
}

impl ScanPipeline {
    pub fn new(fingerprint_calculator: Arc<dyn FingerprintCalculator>) -> Self {
        Self {
            fingerprint_calculator,
            scan_filters: Vec::new(),
            handler_required_filters: Vec::new(),
            decorators: Vec::new(),
            handlers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use phloem_catalog::{FolderId, MediaInfo, ImageInfo};

    struct AlwaysImage;

    impl Decorator for AlwaysImage {
        fn decorate(&self, _vfs: &dyn Vfs, mut file: CatalogFile) -> Result<CatalogFile> {
            file.media = Some(MediaInfo::Image(ImageInfo {
                format: "png".to_string(),
                width: 1,
                height: 1,
            }));
            Ok(file)
        }

        fn is_missing_metadata(&self, _vfs: &dyn Vfs, file: &CatalogFile) -> bool {
            file.media.is_none()
        }
    }

    struct NeverAccept;

    impl FileFilter for NeverAccept {
        fn accept(&self, _file: &CatalogFile) -> bool {
            false
        }
    }

    fn test_file() -> CatalogFile {
        CatalogFile {
            id: None,
            path: "/lib/x.png".to_string(),
            basename: "x.png".to_string(),
            parent_folder_id: FolderId::from_raw(1),
            zip_file_id: None,
            size: 1,
            mod_time: Utc::now(),
            fingerprints: Fingerprints::default(),
            media: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn filtered_decorator_skips_rejected_files() {
        let vfs = phloem_vfs::NativeVfs::new();
        let decorator = FilteredDecorator::new(Box::new(AlwaysImage), Box::new(NeverAccept));

        let file = decorator.decorate(&vfs, test_file()).unwrap();
        assert!(file.media.is_none());
        assert!(!decorator.is_missing_metadata(&vfs, &file));
    }
}
