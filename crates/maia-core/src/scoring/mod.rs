//! Scoring
//!
//! Pure, stateless functions combining per-signal scores into a final
//! ranking score. All outputs live in [0, 1]; fusion is a weighted sum
//! clamped to that range.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recency half-life: an unaccessed-for-a-week memory scores 0.5.
pub const RECENCY_HALF_LIFE_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Access count at which the frequency score saturates at 1.0.
pub const FREQUENCY_SATURATION: f64 = 1000.0;

// ============================================================================
// WEIGHTS
// ============================================================================

/// Weights for the fused ranking score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Weight of the vector-similarity signal
    pub vector: f64,
    /// Weight of the text-match signal
    pub text: f64,
    /// Weight of the recency signal
    pub recency: f64,
    /// Weight of the access-frequency signal
    pub frequency: f64,
    /// Weight of the graph-proximity signal
    pub graph: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            vector: 0.35,
            text: 0.25,
            recency: 0.20,
            frequency: 0.10,
            graph: 0.10,
        }
    }
}

impl ScoreWeights {
    /// Legacy split for deployments without a graph index: the graph weight
    /// is zero and the remainder is rebalanced.
    pub fn without_graph() -> Self {
        Self {
            vector: 0.40,
            text: 0.25,
            recency: 0.25,
            frequency: 0.10,
            graph: 0.0,
        }
    }
}

// ============================================================================
// PER-SIGNAL SCORES
// ============================================================================

/// Exponential-decay recency score with a 7-day half-life.
/// Never-accessed memories score a neutral 0.5.
pub fn recency_score(accessed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match accessed_at {
        None => 0.5,
        Some(t) => {
            let age_secs = (now - t).num_milliseconds() as f64 / 1000.0;
            let age_secs = age_secs.max(0.0);
            0.5f64.powf(age_secs / RECENCY_HALF_LIFE_SECS)
        }
    }
}

/// Log-scaled access-frequency score, saturating at 1000 accesses.
pub fn frequency_score(access_count: u64) -> f64 {
    if access_count == 0 {
        return 0.0;
    }
    ((1.0 + access_count as f64).ln() / (1.0 + FREQUENCY_SATURATION).ln()).min(1.0)
}

/// Map cosine similarity in [-1, 1] to [0, 1].
pub fn vector_similarity_score(cosine: f64) -> f64 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Normalize a raw text-match score by the best score of the result set.
pub fn text_match_score(raw: f64, max: f64) -> f64 {
    if max > 0.0 {
        (raw / max).min(1.0)
    } else {
        0.0
    }
}

// ============================================================================
// FUSION
// ============================================================================

/// Fuse the per-signal scores into one ranking score in [0, 1].
///
/// Monotonic non-decreasing in every sub-score when weights are
/// non-negative. Weights are taken as given; a configuration whose weights
/// do not sum to 1 is bounded by the final clamp rather than rejected.
pub fn combined_score(
    weights: &ScoreWeights,
    vector: f64,
    text: f64,
    recency: f64,
    access_count: u64,
    graph: f64,
) -> f64 {
    let score = weights.vector * vector
        + weights.text * text
        + weights.recency * recency
        + weights.frequency * frequency_score(access_count)
        + weights.graph * graph;
    score.clamp(0.0, 1.0)
}

/// Multiplicative boost, capped at 1.0.
pub fn boost_score(score: f64, factor: f64) -> f64 {
    (score * factor).min(1.0)
}

/// Exponential decay of a score by age, capped at 1.0.
pub fn decay_score(score: f64, age_secs: f64, half_life_secs: f64) -> f64 {
    if half_life_secs <= 0.0 {
        return score.min(1.0);
    }
    (score * 0.5f64.powf(age_secs.max(0.0) / half_life_secs)).min(1.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_recency_never_accessed() {
        assert_eq!(recency_score(None, Utc::now()), 0.5);
    }

    #[test]
    fn test_recency_half_life() {
        let now = Utc::now();
        let week_ago = now - Duration::days(7);
        let score = recency_score(Some(week_ago), now);
        assert!((score - 0.5).abs() < 1e-3);

        let fresh = recency_score(Some(now), now);
        assert!((fresh - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_recency_monotonic_in_age() {
        let now = Utc::now();
        let newer = recency_score(Some(now - Duration::hours(1)), now);
        let older = recency_score(Some(now - Duration::days(3)), now);
        assert!(newer > older);
    }

    #[test]
    fn test_frequency_bounds() {
        assert_eq!(frequency_score(0), 0.0);
        assert!(frequency_score(1) > 0.0);
        assert!((frequency_score(1000) - 1.0).abs() < 1e-9);
        assert_eq!(frequency_score(1_000_000), 1.0);
    }

    #[test]
    fn test_vector_similarity_mapping() {
        assert_eq!(vector_similarity_score(1.0), 1.0);
        assert_eq!(vector_similarity_score(-1.0), 0.0);
        assert!((vector_similarity_score(0.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_text_match_normalization() {
        assert_eq!(text_match_score(2.0, 4.0), 0.5);
        assert_eq!(text_match_score(5.0, 4.0), 1.0);
        assert_eq!(text_match_score(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_combined_defaults_sum_to_one() {
        let w = ScoreWeights::default();
        assert!((w.vector + w.text + w.recency + w.frequency + w.graph - 1.0).abs() < 1e-9);
        let legacy = ScoreWeights::without_graph();
        assert!(
            (legacy.vector + legacy.text + legacy.recency + legacy.frequency + legacy.graph - 1.0)
                .abs()
                < 1e-9
        );
        assert_eq!(legacy.graph, 0.0);
    }

    #[test]
    fn test_combined_in_unit_range() {
        let w = ScoreWeights::default();
        assert_eq!(combined_score(&w, 0.0, 0.0, 0.0, 0, 0.0), 0.0);
        let full = combined_score(&w, 1.0, 1.0, 1.0, 1000, 1.0);
        assert!((full - 1.0).abs() < 1e-9);

        // Overweighted configuration is clamped, not rejected.
        let heavy = ScoreWeights {
            vector: 2.0,
            ..ScoreWeights::default()
        };
        assert_eq!(combined_score(&heavy, 1.0, 1.0, 1.0, 1000, 1.0), 1.0);
    }

    #[test]
    fn test_combined_monotonic_in_each_signal() {
        let w = ScoreWeights::default();
        let base = combined_score(&w, 0.5, 0.5, 0.5, 10, 0.5);
        assert!(combined_score(&w, 0.6, 0.5, 0.5, 10, 0.5) >= base);
        assert!(combined_score(&w, 0.5, 0.6, 0.5, 10, 0.5) >= base);
        assert!(combined_score(&w, 0.5, 0.5, 0.6, 10, 0.5) >= base);
        assert!(combined_score(&w, 0.5, 0.5, 0.5, 20, 0.5) >= base);
        assert!(combined_score(&w, 0.5, 0.5, 0.5, 10, 0.6) >= base);
    }

    #[test]
    fn test_boost_and_decay() {
        assert_eq!(boost_score(0.4, 2.0), 0.8);
        assert_eq!(boost_score(0.9, 2.0), 1.0);
        let decayed = decay_score(0.8, RECENCY_HALF_LIFE_SECS, RECENCY_HALF_LIFE_SECS);
        assert!((decayed - 0.4).abs() < 1e-9);
    }
}
