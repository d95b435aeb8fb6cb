//! Topic routing domain types and the [`TopicSearch`] trait.
//!
//! - [`TopicAnchor`]: a labeled reference embedding for one topic
//! - [`RoutingCandidate`]: one scored hit from an index query
//! - [`RoutingState`]: per-session hysteresis memory, mutated only by the router
//! - [`PromptFragment`] / [`ComposedPrompt`]: prompt catalog entries and the final artifact

use crate::error::RoutingError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A labeled reference vector for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAnchor {
    /// Unique topic identifier (e.g. "stress").
    pub topic_id: String,
    /// Human-readable label.
    pub label: String,
    /// Reference embedding. Every anchor in an index shares one dimension.
    pub vector: Vec<f32>,
    /// Tie-break priority; lower wins.
    #[serde(default)]
    pub priority: i32,
}

/// One scored result of an index query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingCandidate {
    pub topic_id: String,
    /// Cosine similarity in [-1, 1].
    pub similarity: f32,
}

impl RoutingCandidate {
    pub fn new(topic_id: impl Into<String>, similarity: f32) -> Self {
        Self {
            topic_id: topic_id.into(),
            similarity,
        }
    }
}

/// How exact similarity ties are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Lower anchor priority first, then topic id.
    #[default]
    Priority,
    /// Topic id only; priorities are ignored.
    TopicId,
}

/// Sort scored candidates into routing order: descending similarity, then
/// the tie-break policy. `scored` pairs each candidate with its anchor priority.
pub fn rank_candidates(scored: &mut [(RoutingCandidate, i32)], tie_break: TieBreak) {
    scored.sort_by(|(a, a_priority), (b, b_priority)| {
        let by_similarity = b.similarity.total_cmp(&a.similarity);
        let by_priority = match tie_break {
            TieBreak::Priority => a_priority.cmp(b_priority),
            TieBreak::TopicId => Ordering::Equal,
        };
        by_similarity
            .then(by_priority)
            .then_with(|| a.topic_id.cmp(&b.topic_id))
    });
}

/// Per-session routing memory.
///
/// `current_topic == None` is the `NoTopic` state; `Some(t)` is `Locked(t)`.
/// Lives as long as a counseling conversation and is never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingState {
    pub current_topic: Option<String>,
    pub turns_since_switch: u32,
    pub last_candidates: Vec<RoutingCandidate>,
}

impl RoutingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.current_topic.is_some()
    }

    /// Back to `NoTopic` with no history.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A prompt template for one topic, or the default fragment when
/// `topic_id` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptFragment {
    pub topic_id: Option<String>,
    pub template: String,
}

impl PromptFragment {
    pub fn default_fragment(template: impl Into<String>) -> Self {
        Self {
            topic_id: None,
            template: template.into(),
        }
    }

    pub fn for_topic(topic_id: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            topic_id: Some(topic_id.into()),
            template: template.into(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.topic_id.is_none()
    }
}

/// The system prompt handed to the generative model for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedPrompt {
    pub text: String,
    pub topic_id: Option<String>,
    pub truncated: bool,
}

/// Nearest-neighbor search over topic anchors.
///
/// The linear-scan `TopicIndex` is the only implementation today; the trait
/// keeps the router independent of it.
pub trait TopicSearch: Send + Sync {
    /// Anchor dimension, or `None` when the index holds no anchors.
    fn dimension(&self) -> Option<usize>;

    /// Number of anchors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` candidates in routing order. An empty index yields an empty
    /// list; a wrong-sized vector yields [`RoutingError::DimensionMismatch`].
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RoutingCandidate>, RoutingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: &str, similarity: f32, priority: i32) -> (RoutingCandidate, i32) {
        (RoutingCandidate::new(id, similarity), priority)
    }

    fn ids(scored: &[(RoutingCandidate, i32)]) -> Vec<&str> {
        scored.iter().map(|(c, _)| c.topic_id.as_str()).collect()
    }

    #[test]
    fn ranks_by_descending_similarity() {
        let mut list = vec![
            scored("sleep", 0.2, 0),
            scored("stress", 0.9, 0),
            scored("family", 0.5, 0),
        ];
        rank_candidates(&mut list, TieBreak::Priority);
        assert_eq!(ids(&list), vec!["stress", "family", "sleep"]);
    }

    #[test]
    fn ties_prefer_lower_priority_then_id() {
        let mut list = vec![
            scored("b_topic", 0.7, 1),
            scored("c_topic", 0.7, 0),
            scored("a_topic", 0.7, 1),
        ];
        rank_candidates(&mut list, TieBreak::Priority);
        assert_eq!(ids(&list), vec!["c_topic", "a_topic", "b_topic"]);
    }

    #[test]
    fn topic_id_tie_break_ignores_priority() {
        let mut list = vec![scored("b_topic", 0.7, 0), scored("a_topic", 0.7, 5)];
        rank_candidates(&mut list, TieBreak::TopicId);
        assert_eq!(ids(&list), vec!["a_topic", "b_topic"]);
    }

    #[test]
    fn state_reset_clears_lock() {
        let mut state = RoutingState {
            current_topic: Some("stress".into()),
            turns_since_switch: 4,
            last_candidates: vec![RoutingCandidate::new("stress", 0.8)],
        };
        assert!(state.is_locked());
        state.reset();
        assert_eq!(state, RoutingState::new());
    }

    #[test]
    fn tie_break_deserializes_snake_case() {
        let tb: TieBreak = serde_json::from_str("\"topic_id\"").unwrap();
        assert_eq!(tb, TieBreak::TopicId);
    }
}
