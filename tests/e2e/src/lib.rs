//! Shared fixtures for the MAIA end-to-end tests.
//!
//! Builds a fully wired pipeline over the in-memory reference backends:
//! record store, text index, HNSW vector index, graph index, and the
//! deterministic mock embedder.

use std::sync::Arc;

use maia_core::prelude::*;
use maia_core::VectorIndex;
use tokio_util::sync::CancellationToken;

/// Embedding dimension used across the e2e suite.
pub const DIM: usize = 64;

/// A fully wired retrieval pipeline with handles to every component.
pub struct Pipeline {
    pub store: Arc<InMemoryStore>,
    pub text: Arc<InMemoryTextIndex>,
    pub vectors: Arc<VectorIndex>,
    pub graph: Arc<GraphIndex>,
    pub embedder: Arc<MockEmbedder>,
    pub retriever: Retriever,
}

impl Pipeline {
    /// Build an empty pipeline.
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let text = Arc::new(InMemoryTextIndex::new());
        let vectors = Arc::new(VectorIndex::hnsw(HnswConfig::new(DIM)));
        let graph = Arc::new(GraphIndex::new());
        let embedder = Arc::new(MockEmbedder::new(DIM));
        let retriever = Retriever::new(store.clone())
            .with_embedder(embedder.clone())
            .with_vector_index(vectors.clone())
            .with_text_index(text.clone())
            .with_graph_index(graph.clone());
        Self {
            store,
            text,
            vectors,
            graph,
            embedder,
            retriever,
        }
    }

    /// Write a memory through every index, the way a caller is expected to:
    /// store first, then the derived indices.
    pub fn ingest(&self, id: &str, namespace: &str, content: &str, memory_type: MemoryType) {
        let cancel = CancellationToken::new();
        let mut memory = Memory::new(namespace, content).with_type(memory_type);
        memory.id = id.to_string();
        let embedding = self
            .embedder
            .embed(content, &cancel)
            .expect("embedding test content");
        self.store.create(memory.clone()).expect("storing test memory");
        self.vectors
            .add(id, &embedding, &cancel)
            .expect("indexing test vector");
        self.text.index(&memory).expect("indexing test text");
    }

    /// Remove a memory from the store and every index.
    pub fn evict(&self, id: &str) {
        let cancel = CancellationToken::new();
        let _ = self.store.delete(id);
        let _ = self.vectors.remove(id, &cancel);
        let _ = self.text.delete(id);
        let _ = self.graph.remove_node(id, &cancel);
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
