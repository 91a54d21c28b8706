//! Query Analyzer
//!
//! Rule-based, deterministic classification of a user query into intent,
//! keywords, entities, context-type mix, temporal scope, and a per-type
//! token budget. No model calls; regexes are compiled once and the stopword
//! table is read-only shared data.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::memory::MemoryType;

// ============================================================================
// TABLES
// ============================================================================

static STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did", "do",
    "does", "for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "if", "in",
    "into", "is", "it", "its", "me", "my", "no", "not", "of", "on", "or", "our", "she", "so",
    "that", "the", "their", "them", "then", "there", "these", "they", "this", "to", "us", "was",
    "we", "were", "what", "when", "where", "which", "who", "why", "will", "with", "would", "you",
    "your",
];

static QUESTION_STARTERS: &[&str] = &[
    "what", "who", "where", "when", "why", "how", "which", "is", "are", "was", "were", "do",
    "does", "did", "can", "could", "would", "should", "will",
];

static COMMAND_STARTERS: &[&str] = &[
    "find", "get", "show", "tell", "give", "list", "search", "fetch", "retrieve", "remember",
    "recall", "look",
];

static EPISODIC_TRIGGERS: &[&str] = &[
    "remember",
    "last time",
    "previous",
    "before",
    "history",
    "conversation",
];

static WORKING_TRIGGERS: &[&str] = &["current", "now", "this session", "just"];

static RECENT_TRIGGERS: &[&str] = &["recent", "latest", "just", "today", "yesterday", "this week"];

static ALL_TIME_TRIGGERS: &[&str] = &["history", "all time", "ever", "always"];

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9']+").expect("token regex"));

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(today|yesterday|tomorrow|last week|next week|monday|tuesday|wednesday|thursday|friday|saturday|sunday|\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}(?:/\d{2,4})?)\b",
    )
    .expect("date regex")
});

static PERSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+").expect("person regex"));

/// Total token budget the analyzer splits across memory types.
pub const TOTAL_TOKEN_BUDGET: usize = 4000;

// ============================================================================
// ANALYSIS TYPES
// ============================================================================

/// Classified query intent.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// Interrogative query
    Question,
    /// Imperative retrieval request
    Command,
    /// Short keyword-style lookup
    Search,
    /// Free-form conversational text
    Conversation,
    /// Could not be classified
    #[default]
    Unknown,
}

/// Temporal scope of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemporalScope {
    /// Emphasize recently accessed memories
    Recent,
    /// No recency emphasis
    #[default]
    Historical,
    /// Explicitly spans all time
    AllTime,
}

/// Kind of an extracted entity.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A date or relative time expression
    Date,
    /// A capitalized person-like name
    Person,
}

/// An entity extracted from the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Matched text
    pub text: String,
    /// Entity kind
    pub kind: EntityKind,
    /// Byte span in the query
    pub span: (usize, usize),
}

/// Per-type token budget split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Budget for semantic memories
    pub semantic: usize,
    /// Budget for episodic memories
    pub episodic: usize,
    /// Budget for working memories
    pub working: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            semantic: 2000,
            episodic: 1500,
            working: 500,
        }
    }
}

/// Output of query analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    /// Classified intent
    pub intent: QueryIntent,
    /// Deduped, stopword-filtered keywords
    pub keywords: Vec<String>,
    /// Extracted entities
    pub entities: Vec<Entity>,
    /// Memory types the query is about
    pub context_types: Vec<MemoryType>,
    /// Temporal scope
    pub temporal_scope: TemporalScope,
    /// Token budget split across context types
    pub token_budget: TokenBudget,
    /// Classification confidence in [0, 0.95]
    pub confidence: f64,
}

// ============================================================================
// ANALYZER
// ============================================================================

/// Rule-based query analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryAnalyzer;

impl QueryAnalyzer {
    /// Create an analyzer. Tables and regexes are process-wide statics.
    pub fn new() -> Self {
        Self
    }

    /// Analyze a query.
    pub fn analyze(&self, query: &str) -> Analysis {
        let query = query.trim();
        if query.is_empty() {
            return Analysis {
                intent: QueryIntent::Unknown,
                keywords: Vec::new(),
                entities: Vec::new(),
                context_types: vec![MemoryType::Semantic],
                temporal_scope: TemporalScope::AllTime,
                token_budget: TokenBudget::default(),
                confidence: 0.0,
            };
        }

        let lower = query.to_lowercase();
        let keywords = extract_keywords(query);
        let entities = extract_entities(query);
        let intent = classify_intent(query, &lower);
        let context_types = context_types(intent, &lower);
        let temporal_scope = temporal_scope(&lower);
        let token_budget = split_token_budget(&context_types);

        let mut confidence = 0.5;
        confidence += 0.02 * keywords.len().min(5) as f64;
        if !entities.is_empty() {
            confidence += 0.1;
        }
        if intent != QueryIntent::Unknown {
            confidence += 0.2;
        }
        let confidence = confidence.min(0.95);

        Analysis {
            intent,
            keywords,
            entities,
            context_types,
            temporal_scope,
            token_budget,
            confidence,
        }
    }
}

/// Lowercased tokens minus stopwords and single characters, deduped
/// preserving first appearance.
fn extract_keywords(query: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut keywords = Vec::new();
    for token in TOKEN_RE.find_iter(query) {
        let word = token.as_str().to_lowercase();
        if word.len() < 2 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        if seen.insert(word.clone()) {
            keywords.push(word);
        }
    }
    keywords
}

fn extract_entities(query: &str) -> Vec<Entity> {
    let mut entities = Vec::new();
    for m in DATE_RE.find_iter(query) {
        entities.push(Entity {
            text: m.as_str().to_string(),
            kind: EntityKind::Date,
            span: (m.start(), m.end()),
        });
    }
    for m in PERSON_RE.find_iter(query) {
        entities.push(Entity {
            text: m.as_str().to_string(),
            kind: EntityKind::Person,
            span: (m.start(), m.end()),
        });
    }
    entities
}

fn classify_intent(query: &str, lower: &str) -> QueryIntent {
    let first = lower
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_alphanumeric());
    if QUESTION_STARTERS.contains(&first) || query.ends_with('?') {
        return QueryIntent::Question;
    }
    if COMMAND_STARTERS.contains(&first) {
        return QueryIntent::Command;
    }
    if query.split_whitespace().count() <= 3 {
        return QueryIntent::Search;
    }
    QueryIntent::Conversation
}

/// Phrase triggers match as substrings; single-word triggers must match a
/// whole token ("everything" does not trigger "ever").
fn has_trigger(lower: &str, trigger: &str) -> bool {
    if trigger.contains(' ') {
        lower.contains(trigger)
    } else {
        TOKEN_RE.find_iter(lower).any(|t| t.as_str() == trigger)
    }
}

fn context_types(intent: QueryIntent, lower: &str) -> Vec<MemoryType> {
    let mut types = Vec::new();
    if matches!(intent, QueryIntent::Question | QueryIntent::Search) {
        types.push(MemoryType::Semantic);
    }
    if EPISODIC_TRIGGERS.iter().any(|t| has_trigger(lower, t)) {
        types.push(MemoryType::Episodic);
    }
    if WORKING_TRIGGERS.iter().any(|t| has_trigger(lower, t)) {
        types.push(MemoryType::Working);
    }
    if types.is_empty() {
        types.push(MemoryType::Semantic);
    }
    types
}

fn temporal_scope(lower: &str) -> TemporalScope {
    if RECENT_TRIGGERS.iter().any(|t| has_trigger(lower, t)) {
        TemporalScope::Recent
    } else if ALL_TIME_TRIGGERS.iter().any(|t| has_trigger(lower, t)) {
        TemporalScope::AllTime
    } else {
        TemporalScope::Historical
    }
}

fn split_token_budget(context_types: &[MemoryType]) -> TokenBudget {
    let only = |t: MemoryType| context_types.len() == 1 && context_types[0] == t;
    if context_types.contains(&MemoryType::Working) {
        TokenBudget {
            semantic: 1500,
            episodic: 1500,
            working: 1000,
        }
    } else if only(MemoryType::Semantic) {
        TokenBudget {
            semantic: 3500,
            episodic: 0,
            working: 500,
        }
    } else if only(MemoryType::Episodic) {
        TokenBudget {
            semantic: 500,
            episodic: 3000,
            working: 500,
        }
    } else {
        TokenBudget::default()
    }
}

// ============================================================================
// TESTS
// ============================================================================
