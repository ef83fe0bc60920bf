pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by cache management and persistence.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to determine a cache directory for the current user")]
    MissingCacheDir,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
