//! Context Assembler
//!
//! Turns a ranked list of retrieval results into one token-budgeted context
//! string arranged in three positional zones: Critical (top-ranked,
//! system-prompt adjacent), Middle (secondary), and Recency (most recently
//! accessed). Tokens are opaque units; only their count matters, estimated
//! at bytes/4 unless an external tokenizer is supplied.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::retrieval::RetrievalResult;

// ============================================================================
// TOKEN ESTIMATION
// ============================================================================

/// Counts tokens in a text. The assembler only uses the count.
pub trait TokenEstimator: Send + Sync {
    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize;
}

/// Conservative default estimator: `ceil(bytes / 4)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenEstimator;

impl TokenEstimator for ApproxTokenEstimator {
    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

// ============================================================================
// ZONES
// ============================================================================

/// A budgeted, contiguous section of the emitted context string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    /// Top-ranked results, system-prompt adjacent
    Critical,
    /// Secondary results
    Middle,
    /// Most-recently-accessed results
    Recency,
}

impl Zone {
    fn header(&self) -> &'static str {
        match self {
            Zone::Critical => "### Critical Context",
            Zone::Middle => "### Supporting Context",
            Zone::Recency => "### Recent Activity",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Zone::Critical => write!(f, "critical"),
            Zone::Middle => write!(f, "middle"),
            Zone::Recency => write!(f, "recency"),
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Assembler configuration.
#[derive(Clone)]
pub struct AssemblerConfig {
    /// Critical zone share of the global budget
    pub critical_share: f64,
    /// Middle zone share of the global budget
    pub middle_share: f64,
    /// Recency zone share of the global budget
    pub recency_share: f64,
    /// Truncate the last item of a zone to fit instead of skipping it
    pub allow_truncation: bool,
    /// External tokenizer; None uses the bytes/4 estimator
    pub estimator: Option<Arc<dyn TokenEstimator>>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            critical_share: 0.4,
            middle_share: 0.4,
            recency_share: 0.2,
            allow_truncation: true,
            estimator: None,
        }
    }
}

impl std::fmt::Debug for AssemblerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssemblerConfig")
            .field("critical_share", &self.critical_share)
            .field("middle_share", &self.middle_share)
            .field("recency_share", &self.recency_share)
            .field("allow_truncation", &self.allow_truncation)
            .field("estimator", &self.estimator.is_some())
            .finish()
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Where one memory landed in the assembled context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    /// Memory ID
    pub id: String,
    /// Zone the memory was placed in
    pub zone: Zone,
    /// Token count charged against the zone
    pub tokens: usize,
    /// Whether the content was truncated to fit
    pub truncated: bool,
}

/// Tokens used vs. budgeted for one zone.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ZoneStats {
    /// Tokens admitted into the zone
    pub used: usize,
    /// Zone token budget
    pub budget: usize,
}

/// Per-zone statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ZoneUsage {
    /// Critical zone
    pub critical: ZoneStats,
    /// Middle zone
    pub middle: ZoneStats,
    /// Recency zone
    pub recency: ZoneStats,
}

/// The assembled context and its diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextOutput {
    /// The assembled context string
    pub content: String,
    /// Per-memory placement records
    pub placements: Vec<Placement>,
    /// Total tokens admitted across all zones
    pub total_tokens: usize,
    /// The global budget the assembly ran under
    pub budget: usize,
    /// Whether any memory was truncated
    pub truncated: bool,
    /// Per-zone used/budget statistics
    pub zones: ZoneUsage,
}

// ============================================================================
// ASSEMBLER
// ============================================================================

struct ZoneFill {
    zone: Zone,
    budget: usize,
    used: usize,
    /// Set once a truncated tail item is admitted; the zone takes no more.
    sealed: bool,
    entries: Vec<(String, String)>, // (memory id, content as emitted)
}

impl ZoneFill {
    fn new(zone: Zone, budget: usize) -> Self {
        Self {
            zone,
            budget,
            used: 0,
            sealed: false,
            entries: Vec::new(),
        }
    }

    fn remaining(&self) -> usize {
        if self.sealed {
            0
        } else {
            self.budget - self.used
        }
    }
}

/// Token-budgeted three-zone context assembler. Stateless between calls.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: AssemblerConfig,
}

impl ContextAssembler {
    /// Create an assembler with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an assembler with a custom configuration.
    pub fn with_config(config: AssemblerConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    fn count_tokens(&self, text: &str) -> usize {
        match &self.config.estimator {
            Some(estimator) => estimator.count(text),
            None => ApproxTokenEstimator.count(text),
        }
    }

    /// Assemble the ranked results into a context string under `budget`
    /// total tokens.
    ///
    /// Ranked results fill Critical and then Middle in rank order; the
    /// Recency zone is then filled by `accessed_at` descending from the
    /// still-unplaced results. A memory already admitted to Critical or
    /// Middle is silently skipped during the recency pass. When truncation
    /// is enabled, each zone may end in at most one partial item.
    pub fn assemble(&self, results: &[RetrievalResult], budget: usize) -> ContextOutput {
        let mut zones = ZoneUsage::default();
        if budget == 0 {
            return ContextOutput {
                content: String::new(),
                placements: Vec::new(),
                total_tokens: 0,
                budget,
                truncated: false,
                zones,
            };
        }

        let mut critical = ZoneFill::new(
            Zone::Critical,
            (budget as f64 * self.config.critical_share).floor() as usize,
        );
        let mut middle = ZoneFill::new(
            Zone::Middle,
            (budget as f64 * self.config.middle_share).floor() as usize,
        );
        let mut recency = ZoneFill::new(
            Zone::Recency,
            (budget as f64 * self.config.recency_share).floor() as usize,
        );

        let mut placements: Vec<Placement> = Vec::new();
        let mut placed: std::collections::HashSet<&str> = std::collections::HashSet::new();

        // Rank walk: Critical while it has room, then Middle.
        for result in results {
            if result.memory.content.is_empty() || placed.contains(result.memory.id.as_str()) {
                continue;
            }
            let admitted = self.admit(&mut critical, result, &mut placements)
                || self.admit(&mut middle, result, &mut placements);
            if admitted {
                placed.insert(result.memory.id.as_str());
            }
        }

        // Recency pass: most recently accessed first among the unplaced.
        let mut by_recency: Vec<&RetrievalResult> = results
            .iter()
            .filter(|r| !r.memory.content.is_empty() && !placed.contains(r.memory.id.as_str()))
            .collect();
        by_recency.sort_by(|a, b| b.memory.accessed_at.cmp(&a.memory.accessed_at));
        for result in by_recency {
            if placed.contains(result.memory.id.as_str()) {
                continue;
            }
            if self.admit(&mut recency, result, &mut placements) {
                placed.insert(result.memory.id.as_str());
            }
        }

        // Assemble the output string: header per non-empty zone, memory
        // contents separated by `---`.
        let mut sections: Vec<String> = Vec::new();
        for fill in [&critical, &middle, &recency] {
            if fill.entries.is_empty() {
                continue;
            }
            let body: Vec<&str> = fill.entries.iter().map(|(_, c)| c.as_str()).collect();
            sections.push(format!("{}\n\n{}", fill.zone.header(), body.join("\n---\n")));
        }
        let content = sections.join("\n\n");

        let total_tokens = critical.used + middle.used + recency.used;
        let truncated = placements.iter().any(|p| p.truncated);
        zones.critical = ZoneStats {
            used: critical.used,
            budget: critical.budget,
        };
        zones.middle = ZoneStats {
            used: middle.used,
            budget: middle.budget,
        };
        zones.recency = ZoneStats {
            used: recency.used,
            budget: recency.budget,
        };

        debug!(
            total_tokens,
            budget,
            placed = placements.len(),
            truncated,
            "context assembled"
        );
        ContextOutput {
            content,
            placements,
            total_tokens,
            budget,
            truncated,
            zones,
        }
    }

    /// Try to admit one result into a zone. Whole if it fits; as a single
    /// truncated tail item when allowed; otherwise not at all.
    fn admit(
        &self,
        fill: &mut ZoneFill,
        result: &RetrievalResult,
        placements: &mut Vec<Placement>,
    ) -> bool {
        let remaining = fill.remaining();
        if remaining == 0 {
            return false;
        }
        let content = &result.memory.content;
        let tokens = self.count_tokens(content);

        if tokens <= remaining {
            fill.used += tokens;
            fill.entries.push((result.memory.id.clone(), content.clone()));
            placements.push(Placement {
                id: result.memory.id.clone(),
                zone: fill.zone,
                tokens,
                truncated: false,
            });
            return true;
        }
        if !self.config.allow_truncation {
            return false;
        }

        let (cut, cut_tokens) = self.truncate_to_fit(content, remaining);
        if cut.is_empty() {
            return false;
        }
        fill.used += cut_tokens;
        fill.sealed = true;
        fill.entries.push((result.memory.id.clone(), cut));
        placements.push(Placement {
            id: result.memory.id.clone(),
            zone: fill.zone,
            tokens: cut_tokens,
            truncated: true,
        });
        true
    }

    /// Cut `content` down so its token count fits `max_tokens`, respecting
    /// char boundaries.
    fn truncate_to_fit(&self, content: &str, max_tokens: usize) -> (String, usize) {
        let mut bytes = (max_tokens * 4).min(content.len());
        loop {
            while bytes > 0 && !content.is_char_boundary(bytes) {
                bytes -= 1;
            }
            if bytes == 0 {
                return (String::new(), 0);
            }
            let tokens = self.count_tokens(&content[..bytes]);
            if tokens <= max_tokens {
                return (content[..bytes].to_string(), tokens);
            }
            bytes -= 1;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
