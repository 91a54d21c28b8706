//! Error types shared by the vector and graph indices.
//!
//! Both indices surface their own errors directly; the retriever wraps them
//! together with embedding and text-search errors at its own boundary.

use thiserror::Error;

/// Errors surfaced by the core indices.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum IndexError {
    /// Operation on an index that has been closed
    #[error("index is closed")]
    Closed,

    /// Vector size disagrees with the index dimension
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Lookup for an absent ID
    #[error("not found: {0}")]
    NotFound(String),

    /// Search with k = 0
    #[error("invalid k: {0}")]
    InvalidK(usize),

    /// Edge with an empty source or target ID
    #[error("invalid edge: {0}")]
    InvalidEdge(String),

    /// Removal of an absent edge
    #[error("edge not found: {source_id} -[{relation}]-> {target_id}")]
    EdgeNotFound {
        source_id: String,
        relation: String,
        target_id: String,
    },

    /// Batch operation over empty input
    #[error("empty batch")]
    EmptyBatch,

    /// Batch operation over slices of different lengths
    #[error("batch length mismatch: {ids} ids, {vectors} vectors")]
    BatchMismatch { ids: usize, vectors: usize },

    /// Persisted bytes do not parse as the expected format
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Known magic but unsupported version
    #[error("unsupported format version: {0}")]
    VersionMismatch(u32),

    /// Cooperative cancellation detected
    #[error("operation cancelled")]
    Cancelled,

    /// A lock was poisoned by a panicking writer
    #[error("lock poisoned")]
    Poisoned,

    /// IO error during save/load
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Index result type
pub type Result<T> = std::result::Result<T, IndexError>;
