//! Zip archive overlay.
//!
//! Members of an archive at `/lib/pack.zip` appear at
//! `/lib/pack.zip/<member>`, so catalog paths compose across the archive
//! boundary. Archive trees never contain symlinks and are always
//! case-sensitive.

use crate::{path, truncate_to_seconds, FileInfo, ReadSeek, Vfs, VfsError};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::{Arc, Mutex};
use zip::ZipArchive;

struct Entry {
    /// Archive member index; `None` for directories only implied by member
    /// paths.
    index: Option<usize>,
    info: FileInfo,
}

pub struct ZipVfs {
    mount_path: String,
    archive: Mutex<ZipArchive<Box<dyn ReadSeek>>>,
    entries: HashMap<String, Entry>,
    children: HashMap<String, Vec<String>>,
}

impl ZipVfs {
    /// Index the archive read from `reader` and mount it at `mount_path`.
    pub fn mount(mount_path: &str, reader: Box<dyn ReadSeek>) -> Result<Self, VfsError> {
        let mut archive = ZipArchive::new(reader)?;

        let mut entries: HashMap<String, Entry> = HashMap::new();
        entries.insert(
            String::new(),
            Entry {
                index: None,
                info: FileInfo {
                    name: path::file_name(mount_path).to_string(),
                    size: 0,
                    mod_time: DateTime::<Utc>::UNIX_EPOCH,
                    is_dir: true,
                    is_symlink: false,
                },
            },
        );

        for index in 0..archive.len() {
            let member = archive.by_index(index)?;
            let raw_name = member.name().to_string();
            let rel = raw_name.trim_matches('/').to_string();
            if rel.is_empty() {
                continue;
            }

            let is_dir = member.is_dir();
            let info = FileInfo {
                name: path::file_name(&rel).to_string(),
                size: member.size() as i64,
                mod_time: member_mod_time(member.last_modified()),
                is_dir,
                is_symlink: false,
            };
            entries.insert(
                rel.clone(),
                Entry {
                    index: if is_dir { None } else { Some(index) },
                    info,
                },
            );

            // Archives routinely omit directory members; imply them.
            let mut ancestor = rel.as_str();
            while let Some(idx) = ancestor.rfind('/') {
                ancestor = &ancestor[..idx];
                entries.entry(ancestor.to_string()).or_insert_with(|| Entry {
                    index: None,
                    info: FileInfo {
                        name: path::file_name(ancestor).to_string(),
                        size: 0,
                        mod_time: DateTime::<Utc>::UNIX_EPOCH,
                        is_dir: true,
                        is_symlink: false,
                    },
                });
            }
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for rel in entries.keys() {
            if rel.is_empty() {
                continue;
            }
            let (parent, name) = match rel.rfind('/') {
                Some(idx) => (&rel[..idx], &rel[idx + 1..]),
                None => ("", rel.as_str()),
            };
            children
                .entry(parent.to_string())
                .or_default()
                .push(name.to_string());
        }
        for names in children.values_mut() {
            names.sort();
            names.dedup();
        }

        Ok(Self {
            mount_path: mount_path.to_string(),
            archive: Mutex::new(archive),
            entries,
            children,
        })
    }

    fn rel_of<'a>(&self, path: &'a str) -> Option<&'a str> {
        if path == self.mount_path {
            return Some("");
        }
        path.strip_prefix(&self.mount_path)
            .and_then(|rest| rest.strip_prefix('/'))
    }

    fn entry(&self, path: &str) -> io::Result<&Entry> {
        self.rel_of(path)
            .and_then(|rel| self.entries.get(rel))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }
}

impl Vfs for ZipVfs {
    fn stat(&self, path: &str) -> io::Result<FileInfo> {
        Ok(self.entry(path)?.info.clone())
    }

    fn lstat(&self, path: &str) -> io::Result<FileInfo> {
        self.stat(path)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn ReadSeek>> {
        let entry = self.entry(path)?;
        let index = entry.index.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("not a file: {path}"))
        })?;

        let mut archive = self
            .archive
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut member = archive
            .by_index(index)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut data = Vec::with_capacity(member.size() as usize);
        member.read_to_end(&mut data)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<FileInfo>> {
        let rel = self
            .rel_of(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        if !self.entries.contains_key(rel) {
            return Err(io::Error::new(io::ErrorKind::NotFound, path.to_string()));
        }

        let names = self.children.get(rel).map(Vec::as_slice).unwrap_or(&[]);
        let mut infos = Vec::with_capacity(names.len());
        for name in names {
            let child_rel = if rel.is_empty() {
                name.clone()
            } else {
                format!("{rel}/{name}")
            };
            if let Some(entry) = self.entries.get(&child_rel) {
                infos.push(entry.info.clone());
            }
        }
        Ok(infos)
    }

    fn is_path_case_sensitive(&self, _path: &str) -> bool {
        true
    }

    fn open_zip(&self, path: &str) -> Result<Arc<dyn Vfs>, VfsError> {
        if self.rel_of(path).is_none() {
            return Err(VfsError::OutsideMount(path.to_string()));
        }
        let reader = self.open(path)?;
        Ok(Arc::new(ZipVfs::mount(path, reader)?))
    }
}

fn member_mod_time(stamp: Option<zip::DateTime>) -> DateTime<Utc> {
    let Some(stamp) = stamp else {
        return DateTime::<Utc>::UNIX_EPOCH;
    };
    Utc.with_ymd_and_hms(
        stamp.year() as i32,
        stamp.month() as u32,
        stamp.day() as u32,
        stamp.hour() as u32,
        stamp.minute() as u32,
        stamp.second() as u32,
    )
    .single()
    .map(truncate_to_seconds)
    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
