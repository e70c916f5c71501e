use std::path::PathBuf;

/// Engine error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Pattern rejected by the accurate regex engine.
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    /// Multi-pattern assembly failed for a whole class.
    #[error("cannot build prefilter for class {class}: {source}")]
    ClassCompile {
        class: String,
        #[source]
        source: crate::prefilter::CompileError,
    },

    /// A prefilter cache file failed validation.
    #[error("invalid prefilter cache file {}: {reason}", .path.display())]
    InvalidCacheFile { path: PathBuf, reason: String },

    /// File I/O error.
    #[error("io error: {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Operation requires a finalized cache.
    #[error("regexp cache is not finalized")]
    NotFinalized,
}

/// Result type using the engine Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Attach a path to an OS error.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
