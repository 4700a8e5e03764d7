//! Host filesystem adapter.

use crate::{path, truncate_to_seconds, FileInfo, ReadSeek, Vfs, VfsError, ZipVfs};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::debug;

/// Adapter over the host filesystem.
///
/// Case-sensitivity probes are cached per containing directory because the
/// answer can differ across mount points.
#[derive(Default)]
pub struct NativeVfs {
    case_sensitivity: Mutex<HashMap<String, bool>>,
}

impl NativeVfs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Vfs for NativeVfs {
    fn stat(&self, path: &str) -> io::Result<FileInfo> {
        let meta = fs::metadata(path)?;
        Ok(info_from_metadata(path, &meta, false))
    }

    fn lstat(&self, path: &str) -> io::Result<FileInfo> {
        let meta = fs::symlink_metadata(path)?;
        Ok(info_from_metadata(path, &meta, meta.file_type().is_symlink()))
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<FileInfo>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(FileInfo {
                mod_time: mod_time_from(&meta),
                size: meta.len() as i64,
                is_dir: meta.is_dir(),
                is_symlink: meta.file_type().is_symlink(),
                name,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn is_path_case_sensitive(&self, probe_path: &str) -> bool {
        let key = path::parent(probe_path).unwrap_or(probe_path).to_string();

        if let Some(&cached) = self
            .case_sensitivity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
        {
            return cached;
        }

        // Probes default to case-sensitive when nothing on disk can answer.
        let sensitive = probe_case_sensitivity(probe_path).unwrap_or(true);
        debug!(path = probe_path, sensitive, "case-sensitivity probed");
        self.case_sensitivity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, sensitive);
        sensitive
    }

    fn open_zip(&self, path: &str) -> Result<Arc<dyn Vfs>, VfsError> {
        let reader = self.open(path)?;
        Ok(Arc::new(ZipVfs::mount(path, reader)?))
    }
}

fn info_from_metadata(path: &str, meta: &fs::Metadata, is_symlink: bool) -> FileInfo {
    FileInfo {
        name: path::file_name(path).to_string(),
        size: meta.len() as i64,
        mod_time: mod_time_from(meta),
        is_dir: meta.is_dir(),
        is_symlink,
    }
}

fn mod_time_from(meta: &fs::Metadata) -> DateTime<Utc> {
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    truncate_to_seconds(DateTime::<Utc>::from(modified))
}

/// Walks from the leaf towards the root looking for an existing component
/// whose name contains letters, then checks whether the case-flipped variant
/// resolves to the same entry.
fn probe_case_sensitivity(start: &str) -> Option<bool> {
    let mut current = start.to_string();

    loop {
        let name = path::file_name(&current);
        let flipped = flip_case(name);
        let parent = path::parent(&current)?.to_string();

        if flipped != name && fs::symlink_metadata(&current).is_ok() {
            let sibling = path::join(&parent, &flipped);
            return Some(!same_entry(&current, &sibling));
        }

        current = parent;
    }
}

fn flip_case(name: &str) -> String {
    if name.chars().any(|c| c.is_lowercase()) {
        name.to_uppercase()
    } else {
        name.to_lowercase()
    }
}

#[cfg(unix)]
fn same_entry(a: &str, b: &str) -> bool {
    use std::os::unix::fs::MetadataExt;

    let (Ok(ma), Ok(mb)) = (fs::symlink_metadata(a), fs::symlink_metadata(b)) else {
        return false;
    };
    ma.dev() == mb.dev() && ma.ino() == mb.ino()
}

#[cfg(not(unix))]
fn same_entry(_a: &str, b: &str) -> bool {
    // Without inode identity, an existing flipped-case sibling is taken as
    // the same entry. Distinct same-name-different-case siblings cannot
    // exist on the case-insensitive filesystems this branch targets.
    fs::symlink_metadata(b).is_ok()
}
