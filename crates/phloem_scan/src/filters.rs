//! Ready-made path filters.

use crate::error::{Result, ScanError};
use crate::pipeline::{Acceptance, PathFilter};
use glob::Pattern;
use phloem_vfs::FileInfo;

/// Accepts files whose path matches any glob pattern. Directories are always
/// accepted so that matching files deeper in the tree stay reachable.
pub struct GlobPathFilter {
    patterns: Vec<Pattern>,
}

impl GlobPathFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref())
                    .map_err(|e| ScanError::Pattern(format!("{}: {}", p.as_ref(), e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns: compiled })
    }
}

impl PathFilter for GlobPathFilter {
    fn accept(&self, path: &str, info: &FileInfo) -> Acceptance {
        if info.is_dir {
            return Acceptance::Accept;
        }
        if self.patterns.iter().any(|p| p.matches(path)) {
            Acceptance::Accept
        } else {
            Acceptance::Reject
        }
    }
}

/// Accepts everything under the configured library prefixes.
///
/// Directories that are ancestors of a prefix are rejected without pruning
/// so the walker can descend to the library; everything else prunes.
pub struct PathPrefixFilter {
    prefixes: Vec<String>,
}

impl PathPrefixFilter {
    pub fn new<S: Into<String>>(prefixes: impl IntoIterator<Item = S>) -> Self {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.into().trim_end_matches('/').to_string())
                .collect(),
        }
    }
}

impl PathFilter for PathPrefixFilter {
    fn accept(&self, path: &str, info: &FileInfo) -> Acceptance {
        for prefix in &self.prefixes {
            if path == prefix || path.starts_with(&format!("{prefix}/")) {
                return Acceptance::Accept;
            }
            if info.is_dir && prefix.starts_with(&format!("{path}/")) {
                return Acceptance::Reject;
            }
        }
        Acceptance::RejectAndPrune
    }
}
