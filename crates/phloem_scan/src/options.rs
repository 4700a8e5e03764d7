//! Serializable scan configuration.
//!
//! Capability objects (filters, decorators, handlers, the fingerprint
//! calculator) are injected programmatically through
//! [`crate::pipeline::ScanPipeline`]; only the plain-data knobs live here.

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Absolute paths to walk.
    #[serde(default)]
    pub roots: Vec<String>,

    /// File extensions treated as mountable archives, lowercase and without
    /// the dot.
    #[serde(default)]
    pub zip_extensions: Vec<String>,

    /// Re-process files even when mod time and basename are unchanged.
    #[serde(default)]
    pub rescan: bool,

    /// Reconciler worker threads. `0` sizes to the machine.
    #[serde(default)]
    pub parallelism: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            zip_extensions: vec!["zip".to_string()],
            rescan: false,
            parallelism: 0,
        }
    }
}

impl ScanOptions {
    /// Load options from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ScanError::Config(e.to_string()))
    }

    /// Save options to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ScanError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub(crate) fn worker_count(&self) -> usize {
        if self.parallelism > 0 {
            return self.parallelism;
        }
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trips_through_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scan.toml");

        let options = ScanOptions {
            roots: vec!["/lib".to_string()],
            zip_extensions: vec!["zip".to_string(), "cbz".to_string()],
            rescan: true,
            parallelism: 2,
        };
        options.save(&path).unwrap();

        let loaded = ScanOptions::load(&path).unwrap();
        assert_eq!(loaded.roots, options.roots);
        assert_eq!(loaded.zip_extensions, options.zip_extensions);
        assert!(loaded.rescan);
        assert_eq!(loaded.parallelism, 2);
    }

    #[test]
    fn defaults_mount_plain_zip_archives() {
        let options = ScanOptions::default();
        assert_eq!(options.zip_extensions, vec!["zip"]);
        assert!(!options.rescan);
        assert!(options.worker_count() > 0);
    }
}
