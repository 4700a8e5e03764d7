//! Catalog of folders, files and their content fingerprints.
//!
//! This crate is the single source of truth for scanned filesystem state.
//! All access goes through [`Catalog`], which hands out scoped transactional
//! contexts:
//!
//! - [`Catalog::with_txn`] — a write transaction, retried on lock contention
//! - [`Catalog::with_read_txn`] — a read-only transaction
//! - [`Catalog::with_db`] — a plain connection for one-off probes
//!
//! Within a context, [`TxnContext::folders`] and [`TxnContext::files`] expose
//! the typed stores. Post-commit hooks registered with
//! [`TxnContext::add_post_commit_hook`] run exactly once after a successful
//! commit and never on rollback or retry.

mod error;
mod files;
mod fingerprint;
mod folders;
mod pool;
mod schema;
mod txn;
mod types;

pub use error::{CatalogError, Result, Retryable};
pub use files::{CatalogFile, FileStore, ImageInfo, MediaInfo, VideoInfo};
pub use fingerprint::{Fingerprint, FingerprintKind, Fingerprints};
pub use folders::{Folder, FolderStore};
pub use txn::{Catalog, TxnContext};
pub use types::{from_millis, to_millis, FileId, FolderId};
