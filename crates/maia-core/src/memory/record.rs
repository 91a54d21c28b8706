//! The memory record and its type/provenance enums.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// MEMORY TYPES
// ============================================================================

/// Types of memories
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Long-lived facts and knowledge
    #[default]
    Semantic,
    /// Events and conversational history
    Episodic,
    /// Short-lived session state
    Working,
}

impl MemoryType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Semantic => "semantic",
            MemoryType::Episodic => "episodic",
            MemoryType::Working => "working",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "episodic" => MemoryType::Episodic,
            "working" => MemoryType::Working,
            _ => MemoryType::Semantic,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a memory came from
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    /// Written directly by the user
    #[default]
    User,
    /// Extracted from a conversation or document
    Extracted,
    /// Inferred by the agent
    Inferred,
    /// Imported from an external system
    Imported,
}

impl MemorySource {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::User => "user",
            MemorySource::Extracted => "extracted",
            MemorySource::Inferred => "inferred",
            MemorySource::Imported => "imported",
        }
    }
}

impl std::fmt::Display for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// MEMORY RECORD
// ============================================================================

/// A stored unit of text, the addressable subject of all indices.
///
/// Records are owned by the record store; the vector and graph indices hold
/// only derived handles (the ID plus, for the vector index, a copy of the
/// vector).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Namespace scope; filters are exact-match
    pub namespace: String,
    /// The actual content
    pub content: String,
    /// Type of memory (semantic, episodic, working)
    pub memory_type: MemoryType,
    /// Tags for categorization
    pub tags: Vec<String>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last modified
    pub updated_at: DateTime<Utc>,
    /// When the memory was last accessed; None if never
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessed_at: Option<DateTime<Utc>>,
    /// Number of times the memory was accessed
    pub access_count: u64,
    /// Confidence in the memory (0.0 - 1.0)
    pub confidence: f32,
    /// Provenance
    pub source: MemorySource,
    /// Unit-normalized embedding, when one has been generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl Memory {
    /// Create a new memory with a fresh UUID and current timestamps.
    pub fn new(namespace: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            namespace: namespace.into(),
            content: content.into(),
            memory_type: MemoryType::default(),
            tags: Vec::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            accessed_at: None,
            access_count: 0,
            confidence: 1.0,
            source: MemorySource::default(),
            vector: None,
        }
    }

    /// Set the memory type
    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        self
    }

    /// Set the tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the provenance
    pub fn with_source(mut self, source: MemorySource) -> Self {
        self.source = source;
        self
    }

    /// Attach an embedding vector
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Whether the memory carries a given tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Record an access: stamps `accessed_at` and bumps `access_count`.
    pub fn touch(&mut self) {
        self.accessed_at = Some(Utc::now());
        self.access_count += 1;
    }
}

// ============================================================================
// TESTS
// ============================================================================
