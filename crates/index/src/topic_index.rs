//! Linear-scan cosine index over topic anchors.
//!
//! Built once at startup and immutable afterwards, so it can be shared
//! across sessions behind an `Arc` without locking.

use crate::vector::{cosine_similarity, is_finite};
use mindchat_core::{
    RoutingCandidate, RoutingError, TieBreak, TopicAnchor, TopicSearch, rank_candidates,
};
use std::collections::HashSet;
use tracing::{debug, info};

/// Exact nearest-topic search over a handful of anchors.
#[derive(Debug, Clone)]
pub struct TopicIndex {
    anchors: Vec<TopicAnchor>,
    dimension: Option<usize>,
    tie_break: TieBreak,
}

impl TopicIndex {
    /// Build an index, rejecting anchors that could never be compared:
    /// differing dimensions, empty or non-finite vectors, duplicate ids.
    pub fn new(anchors: Vec<TopicAnchor>, tie_break: TieBreak) -> Result<Self, RoutingError> {
        let dimension = anchors.first().map(|a| a.vector.len());
        let mut seen = HashSet::new();

        for anchor in &anchors {
            if let Some(expected) = dimension
                && anchor.vector.len() != expected
            {
                return Err(RoutingError::DimensionMismatch {
                    expected,
                    actual: anchor.vector.len(),
                });
            }
            if anchor.vector.is_empty() || !is_finite(&anchor.vector) {
                return Err(RoutingError::InvalidVector(format!(
                    "anchor '{}' has an empty or non-finite vector",
                    anchor.topic_id
                )));
            }
            if !seen.insert(anchor.topic_id.as_str()) {
                return Err(RoutingError::CatalogMisconfigured(format!(
                    "duplicate anchor for topic '{}'",
                    anchor.topic_id
                )));
            }
        }

        info!(anchors = anchors.len(), dimension = ?dimension, "Topic index built");
        Ok(Self {
            anchors,
            dimension,
            tie_break,
        })
    }

    /// An index with no anchors. Every query returns no candidates.
    pub fn empty() -> Self {
        Self {
            anchors: Vec::new(),
            dimension: None,
            tie_break: TieBreak::default(),
        }
    }

    pub fn anchors(&self) -> &[TopicAnchor] {
        &self.anchors
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    pub fn contains(&self, topic_id: &str) -> bool {
        self.anchors.iter().any(|a| a.topic_id == topic_id)
    }
}

impl TopicSearch for TopicIndex {
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn len(&self) -> usize {
        self.anchors.len()
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RoutingCandidate>, RoutingError> {
        let Some(expected) = self.dimension else {
            return Ok(Vec::new());
        };
        if vector.len() != expected {
            return Err(RoutingError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        if !is_finite(vector) {
            return Err(RoutingError::InvalidVector(
                "query vector contains non-finite values".into(),
            ));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(RoutingCandidate, i32)> = self
            .anchors
            .iter()
            .map(|anchor| {
                let similarity = cosine_similarity(&anchor.vector, vector);
                (RoutingCandidate::new(&anchor.topic_id, similarity), anchor.priority)
            })
            .collect();

        rank_candidates(&mut scored, self.tie_break);
        scored.truncate(k);

        let candidates: Vec<RoutingCandidate> = scored.into_iter().map(|(c, _)| c).collect();
        debug!(
            k,
            best = candidates.first().map(|c| c.topic_id.as_str()),
            similarity = candidates.first().map(|c| c.similarity),
            "Topic index query"
        );
        Ok(candidates)
    }
}
