//! Retriever
//!
//! Turns a natural-language query plus filter options into a ranked list of
//! memories with per-signal sub-scores. Fans out to the vector index (after
//! embedding), the full-text index, and the graph index, fuses the signals
//! through the scorer, then filters, sorts, and truncates.
//!
//! The retriever holds no locks of its own; it serializes only on its
//! constituents'.

pub mod analyzer;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use lru::LruCache;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::error::IndexError;
use crate::graph::{Direction, GraphIndex, Relation, TraverseOptions};
use crate::index::VectorIndex;
use crate::memory::{Memory, MemoryType};
use crate::scoring::{self, ScoreWeights};
use crate::store::{RecordStore, SearchFilters};
use crate::text::{TextIndex, TextSearchError, TextSearchRequest};

pub use analyzer::{
    Analysis, Entity, EntityKind, QueryAnalyzer, QueryIntent, TemporalScope, TokenBudget,
};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Retrieval error types. Sub-index errors surface unwrapped.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// Embedding provider failure
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Vector or graph index failure
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Text index failure
    #[error(transparent)]
    Text(#[from] TextSearchError),
    /// Cooperative cancellation detected
    #[error("operation cancelled")]
    Cancelled,
    /// A lock was poisoned by a panicking writer
    #[error("lock poisoned")]
    Poisoned,
}

// ============================================================================
// CONFIGURATION AND OPTIONS
// ============================================================================

/// Retriever configuration.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Result count when the options give none
    pub default_limit: usize,
    /// Fusion weights
    pub weights: ScoreWeights,
    /// Default minimum combined score
    pub min_score: f64,
    /// Capacity of the query-embedding LRU cache
    pub embedding_cache_size: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            weights: ScoreWeights::default(),
            min_score: 0.0,
            embedding_cache_size: 128,
        }
    }
}

/// Per-call retrieval options.
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Exact-match namespace post-filter
    pub namespace: Option<String>,
    /// Final truncation; non-positive falls back to the config default
    pub limit: usize,
    /// Memory type post-filter; empty means all
    pub types: Vec<MemoryType>,
    /// Required tags (AND semantics)
    pub tags: Vec<String>,
    /// Minimum combined score; None falls back to the config default
    pub min_score: Option<f64>,
    /// Enable the vector search path
    pub use_vector: bool,
    /// Enable the text search path
    pub use_text: bool,
    /// Enable graph expansion (requires `related_to` seeds)
    pub use_graph: bool,
    /// Seed IDs for graph expansion
    pub related_to: Vec<String>,
    /// Relation allow-list for graph traversal
    pub graph_relations: Vec<Relation>,
    /// Max BFS depth; non-positive defaults to 2
    pub graph_depth: usize,
    /// Optional analyzer output; informational
    pub analysis: Option<Analysis>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            limit: 0,
            types: Vec::new(),
            tags: Vec::new(),
            min_score: None,
            use_vector: true,
            use_text: true,
            use_graph: false,
            related_to: Vec::new(),
            graph_relations: Vec::new(),
            graph_depth: 0,
            analysis: None,
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// One ranked retrieval result with its sub-scores.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// The full memory record
    pub memory: Memory,
    /// Fused ranking score in [0, 1]
    pub score: f64,
    /// Vector-similarity sub-score
    pub vector_score: f64,
    /// Text-match sub-score
    pub text_score: f64,
    /// Graph-proximity sub-score
    pub graph_score: f64,
    /// Recency sub-score
    pub recency_score: f64,
    /// Access-frequency sub-score
    pub frequency_score: f64,
    /// Content highlight fragments from the text index
    pub highlights: Vec<String>,
}

/// Retrieval response: ranked items plus diagnostics.
#[derive(Debug, Clone)]
pub struct RetrievalResponse {
    /// Ranked results, best first, at most `limit` of them
    pub items: Vec<RetrievalResult>,
    /// Result count after filtering, before truncation
    pub total: usize,
    /// Wall-clock time of the retrieval
    pub query_time: Duration,
}

#[derive(Default)]
struct Candidate {
    vector_score: f64,
    text_score: f64,
    graph_score: Option<f64>,
    highlights: Vec<String>,
}

// ============================================================================
// RETRIEVER
// ============================================================================

/// Multi-index retriever over the four capabilities it needs: an embedding
/// provider plus vector index, a text index, a graph index, and the record
/// store. All but the store are optional; absent ones simply contribute no
/// candidates.
pub struct Retriever {
    config: RetrieverConfig,
    store: Arc<dyn RecordStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    vector: Option<Arc<VectorIndex>>,
    text: Option<Arc<dyn TextIndex>>,
    graph: Option<Arc<GraphIndex>>,
    embed_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl Retriever {
    /// Create a retriever over a record store.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let config = RetrieverConfig::default();
        let cache_size =
            NonZeroUsize::new(config.embedding_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            store,
            embedder: None,
            vector: None,
            text: None,
            graph: None,
            embed_cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: RetrieverConfig) -> Self {
        let cache_size =
            NonZeroUsize::new(config.embedding_cache_size).unwrap_or(NonZeroUsize::MIN);
        self.embed_cache = Mutex::new(LruCache::new(cache_size));
        self.config = config;
        self
    }

    /// Attach an embedding provider (enables the vector path).
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Attach a vector index.
    pub fn with_vector_index(mut self, index: Arc<VectorIndex>) -> Self {
        self.vector = Some(index);
        self
    }

    /// Attach a full-text index.
    pub fn with_text_index(mut self, index: Arc<dyn TextIndex>) -> Self {
        self.text = Some(index);
        self
    }

    /// Attach a graph index.
    pub fn with_graph_index(mut self, index: Arc<GraphIndex>) -> Self {
        self.graph = Some(index);
        self
    }

    /// Retrieve memories for a query.
    pub fn retrieve(
        &self,
        query: &str,
        opts: &RetrieveOptions,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResponse, RetrieveError> {
        let started = Instant::now();
        if cancel.is_cancelled() {
            return Err(RetrieveError::Cancelled);
        }
        let limit = if opts.limit > 0 {
            opts.limit
        } else {
            self.config.default_limit
        };

        let mut candidates: HashMap<String, Candidate> = HashMap::new();

        // 1. Vector candidates.
        if opts.use_vector {
            if let (Some(embedder), Some(vector)) = (&self.embedder, &self.vector) {
                let query_vec = self.embed_query(query, embedder.as_ref(), cancel)?;
                let hits = vector.search(&query_vec, 2 * limit, cancel)?;
                for hit in hits {
                    let entry = candidates.entry(hit.id).or_default();
                    entry.vector_score = scoring::vector_similarity_score(hit.score as f64);
                }
            }
        }

        // 2. Text candidates.
        if opts.use_text {
            if let Some(text) = &self.text {
                let response = text.search(&TextSearchRequest {
                    query: query.to_string(),
                    namespace: opts.namespace.clone(),
                    tags: opts.tags.clone(),
                    memory_type: None,
                    limit: 2 * limit,
                    offset: 0,
                    highlight: true,
                })?;
                for hit in response.hits {
                    let entry = candidates.entry(hit.id).or_default();
                    entry.text_score = scoring::text_match_score(hit.score, response.max_score);
                    entry.highlights.extend(hit.highlights);
                }
            }
        }

        // 3. Graph candidates. Per-seed failures are swallowed so the other
        // seeds still contribute; cancellation still propagates.
        if opts.use_graph && !opts.related_to.is_empty() {
            if let Some(graph) = &self.graph {
                let traverse_opts = TraverseOptions {
                    direction: Direction::Both,
                    max_depth: if opts.graph_depth > 0 { opts.graph_depth } else { 2 },
                    max_results: 3 * limit,
                    min_weight: 0.0,
                    include_path: false,
                    relations: opts.graph_relations.clone(),
                };
                for seed in &opts.related_to {
                    match graph.traverse(seed, &traverse_opts, cancel) {
                        Ok(results) => {
                            for r in results {
                                let score = r.cumulative_weight as f64 / r.depth as f64;
                                let entry = candidates.entry(r.id).or_default();
                                entry.graph_score = Some(
                                    entry.graph_score.map(|g| g.max(score)).unwrap_or(score),
                                );
                            }
                        }
                        Err(IndexError::Cancelled) => return Err(RetrieveError::Cancelled),
                        Err(e) => warn!(seed = %seed, error = %e, "graph seed traversal failed"),
                    }
                }
            }
        }

        // 4. Fallback: direct metadata search when no strategy produced
        // candidates.
        if candidates.is_empty() {
            let filters = SearchFilters {
                namespace: opts.namespace.clone(),
                types: opts.types.clone(),
                tags: opts.tags.clone(),
                limit,
            };
            match self.store.search(&filters) {
                Ok(records) => {
                    for memory in records {
                        candidates.entry(memory.id.clone()).or_default();
                    }
                }
                Err(e) => warn!(error = %e, "fallback store search failed"),
            }
        }

        // 5. Fetch, filter, fuse.
        let now = Utc::now();
        let min_score = opts.min_score.unwrap_or(self.config.min_score);
        let mut results = Vec::with_capacity(candidates.len());
        for (id, candidate) in candidates {
            if cancel.is_cancelled() {
                return Err(RetrieveError::Cancelled);
            }
            let Ok(memory) = self.store.get(&id) else {
                continue;
            };
            if let Some(ns) = &opts.namespace {
                if memory.namespace != *ns {
                    continue;
                }
            }
            if !opts.types.is_empty() && !opts.types.contains(&memory.memory_type) {
                continue;
            }
            if !opts.tags.iter().all(|t| memory.has_tag(t)) {
                continue;
            }

            let recency = scoring::recency_score(memory.accessed_at, now);
            let graph_score = match candidate.graph_score {
                Some(g) => g,
                None => self.probe_graph(&id, opts),
            };
            let score = scoring::combined_score(
                &self.config.weights,
                candidate.vector_score,
                candidate.text_score,
                recency,
                memory.access_count,
                graph_score,
            );
            if score < min_score {
                continue;
            }
            let frequency = scoring::frequency_score(memory.access_count);
            results.push(RetrievalResult {
                memory,
                score,
                vector_score: candidate.vector_score,
                text_score: candidate.text_score,
                graph_score,
                recency_score: recency,
                frequency_score: frequency,
                highlights: candidate.highlights,
            });
        }

        // 6. Sort and truncate.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        let total = results.len();
        results.truncate(limit);

        let query_time = started.elapsed();
        debug!(
            total,
            returned = results.len(),
            elapsed_ms = query_time.as_millis() as u64,
            "retrieval complete"
        );
        Ok(RetrievalResponse {
            items: results,
            total,
            query_time,
        })
    }

    /// Embed the query, memoizing through the LRU cache.
    fn embed_query(
        &self,
        query: &str,
        embedder: &dyn EmbeddingProvider,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, RetrieveError> {
        if let Some(cached) = self
            .embed_cache
            .lock()
            .map_err(|_| RetrieveError::Poisoned)?
            .get(query)
        {
            return Ok(cached.clone());
        }
        let vector = embedder.embed(query, cancel)?;
        self.embed_cache
            .lock()
            .map_err(|_| RetrieveError::Poisoned)?
            .put(query.to_string(), vector.clone());
        Ok(vector)
    }

    /// Graph proximity for a candidate that traversal did not reach: a
    /// direct edge to or from any seed scores 1.0, a two-hop connection via
    /// an outgoing or incoming intermediary scores `weight * 0.5`; the
    /// maximum over all seeds wins. Runs whenever a graph index and seeds
    /// are present, independent of the `use_graph` expansion switch.
    fn probe_graph(&self, id: &str, opts: &RetrieveOptions) -> f64 {
        let Some(graph) = &self.graph else {
            return 0.0;
        };
        if opts.related_to.is_empty() {
            return 0.0;
        }

        let mut best = 0.0f64;
        for seed in &opts.related_to {
            if seed == id {
                continue;
            }
            let direct = graph.has_edge(id, seed, None).unwrap_or(false)
                || graph.has_edge(seed, id, None).unwrap_or(false);
            if direct {
                return 1.0;
            }
            for edge in graph.get_outgoing(id).unwrap_or_default() {
                let via = &edge.target_id;
                if graph.has_edge(via, seed, None).unwrap_or(false)
                    || graph.has_edge(seed, via, None).unwrap_or(false)
                {
                    best = best.max(edge.weight as f64 * 0.5);
                }
            }
            for edge in graph.get_incoming(id).unwrap_or_default() {
                let via = &edge.source_id;
                if graph.has_edge(via, seed, None).unwrap_or(false)
                    || graph.has_edge(seed, via, None).unwrap_or(false)
                {
                    best = best.max(edge.weight as f64 * 0.5);
                }
            }
        }
        best
    }
}

// ============================================================================
// TESTS
// ============================================================================
