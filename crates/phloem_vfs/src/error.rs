use thiserror::Error;

/// Errors from filesystem adapter operations.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("not a file inside this mount: {0}")]
    OutsideMount(String),
}
