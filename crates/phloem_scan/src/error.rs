use phloem_catalog::{CatalogError, Retryable};
use thiserror::Error;

pub type Result<T, E = ScanError> = std::result::Result<T, E>;

/// Errors from scanning. Per-file errors are collected into the scan report;
/// only setup failures abort a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("filesystem error: {0}")]
    Vfs(#[from] phloem_vfs::VfsError),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid filter pattern: {0}")]
    Pattern(String),

    #[error("parent folder for {path} doesn't exist")]
    MissingParentFolder { path: String },

    #[error("scan root is not a directory: {0}")]
    NotADirectory(String),

    #[error("{0}")]
    External(Box<dyn std::error::Error + Send + Sync>),
}

impl ScanError {
    /// Wraps a collaborator error (decorator, handler, fingerprint
    /// calculator) without forcing it into a catalog or IO shape.
    pub fn external(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ScanError::External(err.into())
    }
}

impl Retryable for ScanError {
    fn is_retryable(&self) -> bool {
        match self {
            ScanError::Catalog(e) => e.is_retryable(),
            _ => false,
        }
    }
}
