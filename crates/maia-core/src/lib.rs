//! # MAIA Core
//!
//! Memory substrate for AI agents: a namespace-scoped store of textual
//! memories retrievable by semantic similarity, full-text match, tag/type
//! filters, and graph relationships, reassembled into a token-budgeted
//! context string for LLM prompts.
//!
//! The core is the multi-index retrieval and context-assembly engine:
//!
//! - **Vector Index**: native HNSW over unit-normalized vectors (plus an
//!   exact brute-force variant) with a stable little-endian on-disk format
//! - **Graph Index**: directed multi-relation graph with weighted edges,
//!   bounded BFS traversal, and its own on-disk format
//! - **Scorer**: pure fusion of vector, text, graph, recency, and frequency
//!   signals
//! - **Retriever**: fans out across the indices, filters, fuses, and ranks
//! - **Query Analyzer**: rule-based intent/keyword/entity classification
//! - **Context Assembler**: three-zone, token-budgeted prompt assembly
//!
//! The record store, full-text index, and embedding provider are external
//! collaborators consumed through small traits; in-memory reference
//! implementations are bundled so the whole pipeline runs self-contained.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use maia_core::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let store = Arc::new(InMemoryStore::new());
//! let text = Arc::new(InMemoryTextIndex::new());
//! let embedder = Arc::new(MockEmbedder::new(64));
//! let vectors = Arc::new(VectorIndex::hnsw(HnswConfig::new(64)));
//!
//! let memory = Memory::new("project:demo", "The cache warms up in about five minutes");
//! let embedding = embedder.embed(&memory.content, &cancel).unwrap();
//! vectors.add(&memory.id, &embedding, &cancel).unwrap();
//! text.index(&memory).unwrap();
//! store.create(memory).unwrap();
//!
//! let retriever = Retriever::new(store)
//!     .with_embedder(embedder)
//!     .with_vector_index(vectors)
//!     .with_text_index(text);
//! let response = retriever
//!     .retrieve("cache warmup time", &RetrieveOptions::default(), &cancel)
//!     .unwrap();
//!
//! let context = ContextAssembler::new().assemble(&response.items, 4000);
//! assert!(context.content.contains("cache"));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod context;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod index;
pub mod memory;
pub mod retrieval;
pub mod scoring;
pub mod store;
pub mod text;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Memory types
pub use memory::{Memory, MemorySource, MemoryType};

// Errors
pub use error::{IndexError, Result};

// Embeddings
pub use embeddings::{
    cosine_similarity, dot_product, euclidean_distance, normalize, EmbeddingError,
    EmbeddingProvider, MockEmbedder,
};

// Vector index
pub use index::{
    BruteForceIndex, HnswConfig, HnswIndex, VectorIndex, VectorSearchResult,
    DEFAULT_EF_CONSTRUCTION, DEFAULT_EF_SEARCH, DEFAULT_M,
};

// Graph index
pub use graph::{
    Direction, Edge, GraphIndex, Relation, TraversalResult, TraverseOptions,
};

// Scoring
pub use scoring::{
    boost_score, combined_score, decay_score, frequency_score, recency_score, text_match_score,
    vector_similarity_score, ScoreWeights, RECENCY_HALF_LIFE_SECS,
};

// Record store interface
pub use store::{InMemoryStore, RecordStore, SearchFilters, StoreError};

// Text index interface
pub use text::{
    InMemoryTextIndex, TextHit, TextIndex, TextSearchError, TextSearchRequest, TextSearchResponse,
};

// Retrieval
pub use retrieval::{
    Analysis, Entity, EntityKind, QueryAnalyzer, QueryIntent, RetrievalResponse, RetrievalResult,
    RetrieveError, RetrieveOptions, Retriever, RetrieverConfig, TemporalScope, TokenBudget,
};

// Context assembly
pub use context::{
    ApproxTokenEstimator, AssemblerConfig, ContextAssembler, ContextOutput, Placement,
    TokenEstimator, Zone, ZoneStats, ZoneUsage,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Analysis, AssemblerConfig, ContextAssembler, ContextOutput, Direction, Edge,
        EmbeddingProvider, GraphIndex, HnswConfig, IndexError, InMemoryStore, InMemoryTextIndex,
        Memory, MemorySource, MemoryType, MockEmbedder, QueryAnalyzer, QueryIntent, RecordStore,
        Relation, RetrievalResult, RetrieveOptions, Retriever, RetrieverConfig, ScoreWeights,
        TextIndex, TraverseOptions, VectorIndex, Zone,
    };
}
