//! Filesystem scanner core.
//!
//! The scan process uses one walker thread and a bounded pool of reconciler
//! workers. The walker performs a depth-first traversal of the configured
//! roots, running each entry through the configured path filters. Folders
//! are reconciled inline so their catalog ids exist before contained files
//! are processed; files inside archives are walked through the zip overlay.
//! All other files are sent to the worker pool.
//!
//! Per file, the reconciler decides among four outcomes:
//!
//! - **new**: no row at this path; fingerprints are computed, decorators
//!   run, and — unless a rename is detected — a row is created.
//! - **renamed**: a fingerprint match points at a row whose recorded path is
//!   no longer observable; that row is repathed, keeping its id, creation
//!   time and fingerprints.
//! - **updated**: the row exists but mod time or basename changed (or a
//!   rescan was forced); fingerprints are recomputed and the row rewritten.
//! - **unchanged**: the row matches; missing metadata and missing
//!   fingerprint kinds are repaired opportunistically.
//!
//! Handlers run inside the same transaction as each persistence write, so
//! downstream effects commit atomically with the row.

mod cancel;
mod error;
mod filters;
mod options;
mod pipeline;
mod reconcile;
mod scanner;
mod stats;
mod walker;

pub use cancel::CancelToken;
pub use error::{Result, ScanError};
pub use filters::{GlobPathFilter, PathPrefixFilter};
pub use options::ScanOptions;
pub use pipeline::{
    Acceptance, Decorator, FileFilter, FilteredDecorator, FingerprintCalculator, Handler, Opener,
    PathFilter, ScanPipeline, VfsOpener,
};
pub use scanner::{ScannedEntry, Scanner};
pub use stats::{FileOutcome, FolderOutcome, ScanOutcome, ScanReport, ScanStats};
