//! Filesystem abstraction for the scanner.
//!
//! A [`Vfs`] is a tree of directories and files addressed by absolute,
//! forward-slash paths. [`NativeVfs`] wraps the host filesystem;
//! [`ZipVfs`] overlays a zip archive so that its members appear under the
//! archive file's own path (`/lib/pack.zip/inside/y.jpg`). Archives nest by
//! opening an inner archive through the enclosing handle.
//!
//! Case sensitivity is a per-path property, not a per-filesystem one, since
//! mount points can differ. [`Vfs::is_path_case_sensitive`] probes lazily and
//! caches per containing directory.

mod error;
mod native;
pub mod path;
mod zip_fs;

pub use error::VfsError;
pub use native::NativeVfs;
pub use zip_fs::ZipVfs;

use chrono::{DateTime, Utc};
use std::io::{self, Read, Seek};
use std::sync::Arc;

/// Blanket trait for seekable readers handed out by [`Vfs::open`].
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Directory entry metadata, comparable across native and archive trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Basename of the entry.
    pub name: String,
    /// Raw size in bytes; for symlinks this is the link itself, see
    /// [`effective_size`].
    pub size: i64,
    /// Modification time, truncated to whole seconds.
    pub mod_time: DateTime<Utc>,
    pub is_dir: bool,
    pub is_symlink: bool,
}

pub trait Vfs: Send + Sync {
    /// Metadata for the entry at `path`, following symlinks.
    fn stat(&self, path: &str) -> io::Result<FileInfo>;

    /// Metadata for the entry at `path`, not following symlinks.
    fn lstat(&self, path: &str) -> io::Result<FileInfo>;

    /// Open the file at `path` for reading.
    fn open(&self, path: &str) -> io::Result<Box<dyn ReadSeek>>;

    /// Entries of the directory at `path`, sorted by name.
    fn read_dir(&self, path: &str) -> io::Result<Vec<FileInfo>>;

    /// Whether the filesystem at `path` distinguishes case. Archive trees
    /// always do.
    fn is_path_case_sensitive(&self, path: &str) -> bool;

    /// Mount the zip archive stored at `path` as a nested filesystem whose
    /// entries live under `path` itself.
    fn open_zip(&self, path: &str) -> Result<Arc<dyn Vfs>, VfsError>;
}

/// Truncates to whole seconds; sub-second precision is not stored.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Size to record for an entry: symlinks resolve to the target's size.
pub fn effective_size(vfs: &dyn Vfs, path: &str, info: &FileInfo) -> io::Result<i64> {
    if info.is_symlink {
        return Ok(vfs.stat(path)?.size);
    }
    Ok(info.size)
}
