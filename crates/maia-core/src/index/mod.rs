//! Vector Index
//!
//! Approximate (HNSW) and exact (brute-force) nearest-neighbor search over
//! unit-normalized vectors, behind one tagged enum. Both variants share the
//! MAIA on-disk format: a common header carries the index type, so a file
//! written by either variant reopens as the right one.

pub mod brute;
pub mod codec;
pub mod hnsw;

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{IndexError, Result};

pub use brute::BruteForceIndex;
pub use hnsw::{HnswConfig, HnswIndex, DEFAULT_EF_CONSTRUCTION, DEFAULT_EF_SEARCH, DEFAULT_M};

// ============================================================================
// SEARCH RESULT
// ============================================================================

/// One nearest-neighbor hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchResult {
    /// Memory ID
    pub id: String,
    /// Cosine similarity with the query, in [-1, 1]
    pub score: f32,
    /// Euclidean distance to the query
    pub distance: f32,
}

// ============================================================================
// TAGGED VARIANTS
// ============================================================================

/// A vector index, either HNSW or brute-force.
///
/// The retriever holds this concrete enum rather than a trait object; both
/// variants expose the same operation set.
pub enum VectorIndex {
    /// Hierarchical Navigable Small World graph
    Hnsw(HnswIndex),
    /// Exact linear scan
    BruteForce(BruteForceIndex),
}

impl VectorIndex {
    /// Create an HNSW-backed index.
    pub fn hnsw(config: HnswConfig) -> Self {
        VectorIndex::Hnsw(HnswIndex::new(config))
    }

    /// Create a brute-force index.
    pub fn brute_force(dimension: usize) -> Self {
        VectorIndex::BruteForce(BruteForceIndex::new(dimension))
    }

    /// Vector dimension of the index.
    pub fn dimension(&self) -> usize {
        match self {
            VectorIndex::Hnsw(i) => i.dimension(),
            VectorIndex::BruteForce(i) => i.dimension(),
        }
    }

    /// Number of vectors in the index.
    pub fn size(&self) -> Result<usize> {
        match self {
            VectorIndex::Hnsw(i) => i.size(),
            VectorIndex::BruteForce(i) => i.size(),
        }
    }

    /// Whether an ID is present.
    pub fn contains(&self, id: &str) -> Result<bool> {
        match self {
            VectorIndex::Hnsw(i) => i.contains(id),
            VectorIndex::BruteForce(i) => i.contains(id),
        }
    }

    /// Return the stored vector for an ID.
    pub fn get(&self, id: &str) -> Result<Vec<f32>> {
        match self {
            VectorIndex::Hnsw(i) => i.get(id),
            VectorIndex::BruteForce(i) => i.get(id),
        }
    }

    /// Insert a vector under an ID, replacing any existing entry.
    pub fn add(&self, id: &str, vector: &[f32], cancel: &CancellationToken) -> Result<()> {
        match self {
            VectorIndex::Hnsw(i) => i.add(id, vector, cancel),
            VectorIndex::BruteForce(i) => i.add(id, vector, cancel),
        }
    }

    /// Insert a batch of vectors.
    pub fn add_batch(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self {
            VectorIndex::Hnsw(i) => i.add_batch(ids, vectors, cancel),
            VectorIndex::BruteForce(i) => i.add_batch(ids, vectors, cancel),
        }
    }

    /// Remove an ID. Returns whether it was present.
    pub fn remove(&self, id: &str, cancel: &CancellationToken) -> Result<bool> {
        match self {
            VectorIndex::Hnsw(i) => i.remove(id, cancel),
            VectorIndex::BruteForce(i) => i.remove(id, cancel),
        }
    }

    /// k-nearest-neighbor search.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<VectorSearchResult>> {
        match self {
            VectorIndex::Hnsw(i) => i.search(query, k, cancel),
            VectorIndex::BruteForce(i) => i.search(query, k, cancel),
        }
    }

    /// Close the index. Idempotent.
    pub fn close(&self) {
        match self {
            VectorIndex::Hnsw(i) => i.close(),
            VectorIndex::BruteForce(i) => i.close(),
        }
    }

    /// Serialize the index in the MAIA format.
    pub fn save<W: Write>(&self, w: &mut W) -> Result<()> {
        match self {
            VectorIndex::Hnsw(i) => i.save(w),
            VectorIndex::BruteForce(i) => i.save(w),
        }
    }

    /// Deserialize a MAIA file, dispatching on the persisted index type.
    pub fn load<R: Read>(r: &mut R) -> Result<Self> {
        let (index_type, dimension) = codec::read_vector_header(r)?;
        match index_type {
            codec::INDEX_TYPE_HNSW => Ok(VectorIndex::Hnsw(HnswIndex::load_body(r, dimension)?)),
            codec::INDEX_TYPE_BRUTE_FORCE => Ok(VectorIndex::BruteForce(
                BruteForceIndex::load_body(r, dimension)?,
            )),
            other => Err(IndexError::InvalidFormat(format!(
                "unknown index type {other}"
            ))),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
