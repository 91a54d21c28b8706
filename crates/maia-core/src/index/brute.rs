//! Exact-scan vector index.
//!
//! Same operation set and error semantics as the HNSW variant, with a linear
//! scan per query. Useful below a few thousand vectors and as a recall
//! baseline.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::RwLock;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::embeddings::{cosine_similarity, euclidean_distance};
use crate::error::{IndexError, Result};
use crate::index::codec;
use crate::index::VectorSearchResult;

struct BruteState {
    closed: bool,
    vectors: HashMap<String, Vec<f32>>,
}

/// Exact nearest-neighbor index over a flat map of vectors.
pub struct BruteForceIndex {
    dimension: usize,
    state: RwLock<BruteState>,
}

impl BruteForceIndex {
    /// Create an empty index of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: RwLock::new(BruteState {
                closed: false,
                vectors: HashMap::new(),
            }),
        }
    }

    /// Vector dimension of the index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of vectors in the index.
    pub fn size(&self) -> Result<usize> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        Ok(state.vectors.len())
    }

    /// Whether an ID is present.
    pub fn contains(&self, id: &str) -> Result<bool> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        Ok(state.vectors.contains_key(id))
    }

    /// Return the stored vector for an ID.
    pub fn get(&self, id: &str) -> Result<Vec<f32>> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        state
            .vectors
            .get(id)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(id.to_string()))
    }

    /// Insert a vector under an ID, replacing any existing entry.
    pub fn add(&self, id: &str, vector: &[f32], cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let mut state = self.state.write().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        state.vectors.insert(id.to_string(), vector.to_vec());
        Ok(())
    }

    /// Insert a batch of vectors.
    pub fn add_batch(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        cancel: &CancellationToken,
    ) -> Result<()> {
        if ids.is_empty() || vectors.is_empty() {
            return Err(IndexError::EmptyBatch);
        }
        if ids.len() != vectors.len() {
            return Err(IndexError::BatchMismatch {
                ids: ids.len(),
                vectors: vectors.len(),
            });
        }
        for (id, vector) in ids.iter().zip(vectors.iter()) {
            self.add(id, vector, cancel)?;
        }
        Ok(())
    }

    /// Remove an ID. Returns whether it was present.
    pub fn remove(&self, id: &str, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let mut state = self.state.write().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        Ok(state.vectors.remove(id).is_some())
    }

    /// Exact k-nearest-neighbor search.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<VectorSearchResult>> {
        if k == 0 {
            return Err(IndexError::InvalidK(k));
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }

        let mut scored: Vec<VectorSearchResult> = state
            .vectors
            .iter()
            .map(|(id, v)| VectorSearchResult {
                id: id.clone(),
                score: cosine_similarity(query, v),
                distance: euclidean_distance(query, v),
            })
            .collect();
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Close the index. Idempotent.
    pub fn close(&self) {
        // Recover the guard from a poisoned lock; close must still release
        // the memory.
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        state.closed = true;
        state.vectors.clear();
    }

    /// Serialize the index: shared header, then `node_count` id/vector records
    /// sorted by ID for stable bytes.
    pub fn save<W: Write>(&self, w: &mut W) -> Result<()> {
        let state = self.state.read().map_err(|_| IndexError::Poisoned)?;
        if state.closed {
            return Err(IndexError::Closed);
        }
        codec::write_vector_header(w, codec::INDEX_TYPE_BRUTE_FORCE, self.dimension)?;
        w.write_i32::<LittleEndian>(state.vectors.len() as i32)?;
        let mut ids: Vec<&String> = state.vectors.keys().collect();
        ids.sort();
        for id in ids {
            codec::write_string_i32(w, id)?;
            codec::write_vector(w, &state.vectors[id])?;
        }
        debug!(nodes = state.vectors.len(), "brute-force index saved");
        Ok(())
    }

    /// Deserialize an index in the MAIA format.
    pub fn load<R: Read>(r: &mut R) -> Result<Self> {
        let (index_type, dimension) = codec::read_vector_header(r)?;
        if index_type != codec::INDEX_TYPE_BRUTE_FORCE {
            return Err(IndexError::InvalidFormat(format!(
                "expected brute-force index type, found {index_type}"
            )));
        }
        Self::load_body(r, dimension)
    }

    /// Deserialize the body after the shared header has been consumed.
    pub(crate) fn load_body<R: Read>(r: &mut R, dimension: usize) -> Result<Self> {
        let count = r.read_i32::<LittleEndian>()?;
        if count < 0 {
            return Err(IndexError::InvalidFormat(format!(
                "negative node count {count}"
            )));
        }
        let mut vectors = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let id = codec::read_string_i32(r)?;
            let vector = codec::read_vector(r)?;
            if vector.len() != dimension {
                return Err(IndexError::InvalidFormat(format!(
                    "node vector of length {} in a dimension-{dimension} index",
                    vector.len()
                )));
            }
            vectors.insert(id, vector);
        }
        Ok(Self {
            dimension,
            state: RwLock::new(BruteState {
                closed: false,
                vectors,
            }),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn test_add_search_exact() {
        let index = BruteForceIndex::new(3);
        let cancel = token();
        index.add("a", &[1.0, 0.0, 0.0], &cancel).unwrap();
        index.add("b", &[0.0, 1.0, 0.0], &cancel).unwrap();
        index.add("c", &[0.7, 0.7, 0.0], &cancel).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 2, &cancel).unwrap();
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert_eq!(results[1].id, "c");
    }

    #[test]
    fn test_remove() {
        let index = BruteForceIndex::new(2);
        let cancel = token();
        index.add("a", &[1.0, 0.0], &cancel).unwrap();
        assert!(index.remove("a", &cancel).unwrap());
        assert!(!index.remove("a", &cancel).unwrap());
        assert_eq!(index.size().unwrap(), 0);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let index = BruteForceIndex::new(2);
        let cancel = token();
        index.add("a", &[1.0, 0.0], &cancel).unwrap();
        index.add("b", &[0.0, 1.0], &cancel).unwrap();

        let mut buf = Vec::new();
        index.save(&mut buf).unwrap();
        let loaded = BruteForceIndex::load(&mut std::io::Cursor::new(&buf)).unwrap();

        assert_eq!(loaded.size().unwrap(), 2);
        assert_eq!(loaded.get("a").unwrap(), vec![1.0, 0.0]);
        let results = loaded.search(&[0.0, 1.0], 1, &cancel).unwrap();
        assert_eq!(results[0].id, "b");
    }

    #[test]
    fn test_closed() {
        let index = BruteForceIndex::new(2);
        index.close();
        assert!(matches!(
            index.add("a", &[1.0, 0.0], &token()),
            Err(IndexError::Closed)
        ));
        let mut buf = Vec::new();
        assert!(matches!(index.save(&mut buf), Err(IndexError::Closed)));
    }
}
