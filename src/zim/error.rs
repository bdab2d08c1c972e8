//! Error types for ZIM archive access and title search.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum ZimError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is structurally invalid or does not conform to the ZIM format.
    #[error("invalid ZIM archive: {0}")]
    InvalidArchive(String),

    /// A cluster carried a compression tag outside the supported set.
    #[error("unsupported cluster compression type: {0}")]
    UnsupportedCompression(u8),

    /// The compression tag was valid but the decoder rejected the payload.
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// An entry, cluster, or blob index points outside the archive's tables.
    #[error("{kind} index {index} out of range (max {max})")]
    OutOfRange {
        kind: &'static str,
        index: u32,
        max: u32,
    },

    /// No directory entry matched the requested namespace and URL.
    #[error("entry not found in namespace '{namespace}': {url:?}")]
    NotFound { namespace: char, url: String },

    /// A redirect chain did not terminate within the hop limit.
    #[error("redirect chain exceeded {0} hops")]
    RedirectLoop(u32),

    /// Search was requested but no title index is loaded.
    #[error("search index not loaded")]
    IndexUnavailable,

    /// Random article selection exhausted its sampling budget.
    #[error("no suitable article found after {0} attempts")]
    NoArticleFound(u32),

    /// An error surfaced by the underlying tantivy index.
    #[error("title index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    /// A lock was poisoned, indicating a panic in another thread holding it.
    #[error("a lock was poisoned by a panic in another thread")]
    LockPoisoned,
}

/// A convenience `Result` type alias using the crate's `ZimError` type.
pub type Result<T> = std::result::Result<T, ZimError>;
