//! Error types for the tiled alignment cache.

use thiserror::Error;

/// Error kinds surfaced by the cache (spec §7).
///
/// `Cancelled` and `LowMemory` are deliberately absent here: cancellation is
/// a normal, expected outcome communicated via [`crate::loader::LoadOutcome`]
/// / [`crate::cache::QueryOutcome`], and low-memory recovery is handled
/// internally by the registry and never escapes as an exception.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A buffer-underflow-class fault from the reader. Sticky for the life
    /// of the process once observed (see [`crate::registry::Coordinator`]).
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// Any other exception surfaced by the upstream reader.
    #[error("reader fault: {0}")]
    ReaderFault(String),

    /// The reader has no index; the cache cannot serve `query`.
    #[error("missing index: {0}")]
    MissingIndex(String),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
