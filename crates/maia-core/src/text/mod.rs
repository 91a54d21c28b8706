//! Full-Text Index Interface
//!
//! The full-text index is an external collaborator consumed through the
//! [`TextIndex`] trait: index a memory, search with filters and highlights,
//! delete by ID. The bundled [`InMemoryTextIndex`] scores by token overlap
//! and produces naive `<em>` highlight fragments - enough for tests and
//! small self-contained deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::memory::{Memory, MemoryType};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Text index error types
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TextSearchError {
    /// Backend failure
    #[error("text index error: {0}")]
    Backend(String),
    /// A lock was poisoned by a panicking writer
    #[error("lock poisoned")]
    Poisoned,
}

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

/// A full-text search request.
#[derive(Debug, Clone, Default)]
pub struct TextSearchRequest {
    /// Query text
    pub query: String,
    /// Exact-match namespace filter
    pub namespace: Option<String>,
    /// Required tags (AND semantics)
    pub tags: Vec<String>,
    /// Memory type filter
    pub memory_type: Option<MemoryType>,
    /// Maximum number of hits; 0 means a default of 10
    pub limit: usize,
    /// Hits to skip for pagination
    pub offset: usize,
    /// Produce content highlight fragments
    pub highlight: bool,
}

/// One full-text hit.
#[derive(Debug, Clone)]
pub struct TextHit {
    /// Memory ID
    pub id: String,
    /// Raw relevance score; normalize against `max_score`
    pub score: f64,
    /// Content fragments with matches wrapped in `<em>` tags
    pub highlights: Vec<String>,
}

/// Search response: hits plus the data needed to normalize their scores.
#[derive(Debug, Clone, Default)]
pub struct TextSearchResponse {
    /// Matching hits, best first
    pub hits: Vec<TextHit>,
    /// Total matches before pagination
    pub total: usize,
    /// Best raw score of the whole match set
    pub max_score: f64,
}

// ============================================================================
// TRAIT
// ============================================================================

/// The full-text index capability consumed by the retriever.
pub trait TextIndex: Send + Sync {
    /// Add or replace a memory's document.
    fn index(&self, memory: &Memory) -> Result<(), TextSearchError>;

    /// Search with filters; hits are ordered best-first.
    fn search(&self, request: &TextSearchRequest) -> Result<TextSearchResponse, TextSearchError>;

    /// Remove a document by memory ID.
    fn delete(&self, id: &str) -> Result<(), TextSearchError>;
}

// ============================================================================
// IN-MEMORY TEXT INDEX
// ============================================================================

struct StoredDoc {
    namespace: String,
    tags: Vec<String>,
    memory_type: MemoryType,
    content: String,
    tokens: Vec<String>,
}

/// Reference [`TextIndex`] scoring by lowercase token overlap.
#[derive(Default)]
pub struct InMemoryTextIndex {
    docs: RwLock<HashMap<String, StoredDoc>>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl InMemoryTextIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        // Counting is safe on a poisoned map; recover the guard.
        self.docs.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A fragment of up to eight words around the first occurrence of
    /// `token`, with matching words wrapped in `<em>` tags.
    fn highlight_fragment(content: &str, token: &str) -> Option<String> {
        let words: Vec<&str> = content.split_whitespace().collect();
        let hit = words.iter().position(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .eq_ignore_ascii_case(token)
        })?;
        let start = hit.saturating_sub(4);
        let end = (hit + 4).min(words.len());
        let fragment: Vec<String> = words[start..end]
            .iter()
            .map(|w| {
                let core = w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
                if core.eq_ignore_ascii_case(token) {
                    w.replace(core, &format!("<em>{core}</em>"))
                } else {
                    (*w).to_string()
                }
            })
            .collect();
        Some(fragment.join(" "))
    }
}

impl TextIndex for InMemoryTextIndex {
    fn index(&self, memory: &Memory) -> Result<(), TextSearchError> {
        let mut docs = self.docs.write().map_err(|_| TextSearchError::Poisoned)?;
        docs.insert(
            memory.id.clone(),
            StoredDoc {
                namespace: memory.namespace.clone(),
                tags: memory.tags.clone(),
                memory_type: memory.memory_type,
                content: memory.content.clone(),
                tokens: tokenize(&memory.content),
            },
        );
        Ok(())
    }

    fn search(&self, request: &TextSearchRequest) -> Result<TextSearchResponse, TextSearchError> {
        let query_tokens = tokenize(&request.query);
        if query_tokens.is_empty() {
            return Ok(TextSearchResponse::default());
        }
        let docs = self.docs.read().map_err(|_| TextSearchError::Poisoned)?;

        let mut hits: Vec<TextHit> = Vec::new();
        for (id, doc) in docs.iter() {
            if let Some(ns) = &request.namespace {
                if doc.namespace != *ns {
                    continue;
                }
            }
            if let Some(t) = request.memory_type {
                if doc.memory_type != t {
                    continue;
                }
            }
            if !request.tags.iter().all(|t| doc.tags.iter().any(|d| d == t)) {
                continue;
            }

            // Raw score: occurrences of query tokens in the document.
            let mut score = 0.0;
            let mut matched: Vec<&str> = Vec::new();
            for qt in &query_tokens {
                let count = doc.tokens.iter().filter(|t| *t == qt).count();
                if count > 0 {
                    score += count as f64;
                    matched.push(qt);
                }
            }
            if score == 0.0 {
                continue;
            }

            let highlights = if request.highlight {
                matched
                    .iter()
                    .filter_map(|t| Self::highlight_fragment(&doc.content, t))
                    .collect()
            } else {
                Vec::new()
            };
            hits.push(TextHit {
                id: id.clone(),
                score,
                highlights,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        let total = hits.len();
        let max_score = hits.first().map(|h| h.score).unwrap_or(0.0);

        let limit = if request.limit == 0 { 10 } else { request.limit };
        let hits = hits
            .into_iter()
            .skip(request.offset)
            .take(limit)
            .collect();
        Ok(TextSearchResponse {
            hits,
            total,
            max_score,
        })
    }

    fn delete(&self, id: &str) -> Result<(), TextSearchError> {
        let mut docs = self.docs.write().map_err(|_| TextSearchError::Poisoned)?;
        docs.remove(id);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(ns: &str, content: &str) -> Memory {
        Memory::new(ns, content)
    }

    #[test]
    fn test_index_and_search() {
        let index = InMemoryTextIndex::new();
        let m1 = doc("ns", "machine learning is a field of study");
        let m2 = doc("ns", "cooking pasta requires boiling water");
        index.index(&m1).unwrap();
        index.index(&m2).unwrap();

        let response = index
            .search(&TextSearchRequest {
                query: "machine learning".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.hits[0].id, m1.id);
        assert!(response.max_score > 0.0);
    }

    #[test]
    fn test_search_respects_filters() {
        let index = InMemoryTextIndex::new();
        let m1 = doc("a", "shared term here");
        let m2 = doc("b", "shared term there");
        index.index(&m1).unwrap();
        index.index(&m2).unwrap();

        let response = index
            .search(&TextSearchRequest {
                query: "shared".to_string(),
                namespace: Some("a".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.hits[0].id, m1.id);
    }

    #[test]
    fn test_highlights_wrap_matches() {
        let index = InMemoryTextIndex::new();
        let m = doc("ns", "Rust memory safety without garbage collection");
        index.index(&m).unwrap();

        let response = index
            .search(&TextSearchRequest {
                query: "memory".to_string(),
                highlight: true,
                ..Default::default()
            })
            .unwrap();
        assert!(response.hits[0]
            .highlights
            .iter()
            .any(|h| h.contains("<em>memory</em>")));
    }

    #[test]
    fn test_delete() {
        let index = InMemoryTextIndex::new();
        let m = doc("ns", "to be removed");
        index.index(&m).unwrap();
        index.delete(&m.id).unwrap();
        let response = index
            .search(&TextSearchRequest {
                query: "removed".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.total, 0);
    }

    #[test]
    fn test_pagination() {
        let index = InMemoryTextIndex::new();
        for i in 0..5 {
            index.index(&doc("ns", &format!("common token {i}"))).unwrap();
        }
        let page = index
            .search(&TextSearchRequest {
                query: "common".to_string(),
                limit: 2,
                offset: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.hits.len(), 2);
    }
}
