//! Record Store Interface
//!
//! The record store owns the memories; the core only reads from it. It is
//! consumed through the [`RecordStore`] trait, and a store miss during
//! retrieval silently drops the candidate. An [`InMemoryStore`] reference
//! backend is provided for tests and self-contained deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::memory::{Memory, MemoryType};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Record store error types
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found
    #[error("memory not found: {0}")]
    NotFound(String),
    /// Backend failure
    #[error("store error: {0}")]
    Backend(String),
    /// A lock was poisoned by a panicking writer
    #[error("lock poisoned")]
    Poisoned,
}

// ============================================================================
// FILTERS
// ============================================================================

/// Metadata filters for a direct store search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Exact-match namespace filter
    pub namespace: Option<String>,
    /// Memory types to include; empty means all
    pub types: Vec<MemoryType>,
    /// Required tags (AND semantics)
    pub tags: Vec<String>,
    /// Maximum number of records; 0 means unlimited
    pub limit: usize,
}

impl SearchFilters {
    /// Whether a memory passes every filter.
    pub fn matches(&self, memory: &Memory) -> bool {
        if let Some(ns) = &self.namespace {
            if memory.namespace != *ns {
                return false;
            }
        }
        if !self.types.is_empty() && !self.types.contains(&memory.memory_type) {
            return false;
        }
        self.tags.iter().all(|t| memory.has_tag(t))
    }
}

// ============================================================================
// TRAIT
// ============================================================================

/// Read access to the external record store.
pub trait RecordStore: Send + Sync {
    /// Fetch a memory by ID.
    fn get(&self, id: &str) -> Result<Memory, StoreError>;

    /// Metadata search over {namespace, types, tags, limit}.
    fn search(&self, filters: &SearchFilters) -> Result<Vec<Memory>, StoreError>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Reference [`RecordStore`] backed by a map, with the write operations a
/// caller needs to drive the full pipeline in tests.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, Memory>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a memory, replacing any record with the same ID.
    pub fn create(&self, memory: Memory) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        records.insert(memory.id.clone(), memory);
        Ok(())
    }

    /// Update an existing memory.
    pub fn update(&self, memory: Memory) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        if !records.contains_key(&memory.id) {
            return Err(StoreError::NotFound(memory.id));
        }
        records.insert(memory.id.clone(), memory);
        Ok(())
    }

    /// Delete a memory. Returns whether it was present.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        Ok(records.remove(id).is_some())
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        // Counting is safe on a poisoned map; recover the guard.
        self.records.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stamp an access on a record, bumping its count.
    pub fn touch(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let memory = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        memory.touch();
        Ok(())
    }
}

impl RecordStore for InMemoryStore {
    fn get(&self, id: &str) -> Result<Memory, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn search(&self, filters: &SearchFilters) -> Result<Vec<Memory>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        let mut hits: Vec<Memory> = records
            .values()
            .filter(|m| filters.matches(m))
            .cloned()
            .collect();
        // Newest first keeps the fallback path deterministic and useful.
        hits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        if filters.limit > 0 {
            hits.truncate(filters.limit);
        }
        Ok(hits)
    }
}

// ============================================================================
// TESTS
// ============================================================================
