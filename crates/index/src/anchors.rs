//! Topic anchor construction.
//!
//! A topic's anchor is the normalized centroid of its exemplar utterances.
//! Anchors are rebuilt only when the persisted anchor file is missing or was
//! produced by a different model or catalog.

use crate::store::{AnchorFile, catalog_fingerprint};
use crate::vector::centroid;
use mindchat_core::{EmbeddingError, TopicAnchor};
use mindchat_embeddings::EmbeddingProvider;
use std::path::Path;
use tracing::{debug, info, warn};

/// The routing-relevant part of one catalog topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicExemplars {
    pub topic_id: String,
    pub label: String,
    pub priority: i32,
    pub examples: Vec<String>,
}

/// Computes topic anchors with the shared embedding provider.
pub struct AnchorBuilder<'a> {
    provider: &'a EmbeddingProvider,
}

impl<'a> AnchorBuilder<'a> {
    pub fn new(provider: &'a EmbeddingProvider) -> Self {
        Self { provider }
    }

    /// Embed every exemplar and average them per topic.
    ///
    /// Topics with no usable exemplars are skipped with a warning. Fails only
    /// when the provider is unavailable.
    pub fn build(&self, topics: &[TopicExemplars]) -> Result<Vec<TopicAnchor>, EmbeddingError> {
        if let EmbeddingProvider::Unavailable { reason } = self.provider {
            return Err(EmbeddingError::Unavailable(reason.clone()));
        }

        let mut anchors = Vec::with_capacity(topics.len());
        for topic in topics {
            let mut vectors = Vec::with_capacity(topic.examples.len());
            for example in &topic.examples {
                match self.provider.embed(example) {
                    Ok(embedding) if !embedding.empty_input => vectors.push(embedding.vector),
                    Ok(_) => {}
                    Err(e) => {
                        warn!(topic = %topic.topic_id, error = %e, "Skipping exemplar that failed to embed");
                    }
                }
            }

            match centroid(&vectors) {
                Some(vector) => {
                    debug!(topic = %topic.topic_id, exemplars = vectors.len(), "Anchor built");
                    anchors.push(TopicAnchor {
                        topic_id: topic.topic_id.clone(),
                        label: topic.label.clone(),
                        vector,
                        priority: topic.priority,
                    });
                }
                None => {
                    warn!(topic = %topic.topic_id, "Topic has no usable exemplars, not routable");
                }
            }
        }

        info!(anchors = anchors.len(), topics = topics.len(), "Topic anchors computed");
        Ok(anchors)
    }

    /// Reuse the anchor file at `path` when it still matches, otherwise build
    /// and rewrite it. File problems are logged; they never fail the build.
    pub fn load_or_build(
        &self,
        topics: &[TopicExemplars],
        path: Option<&Path>,
    ) -> Result<Vec<TopicAnchor>, EmbeddingError> {
        let (Some(model_id), Some(dimension)) = (self.provider.model_id(), self.provider.dimension())
        else {
            return self.build(topics);
        };
        let Some(path) = path else {
            return self.build(topics);
        };
        let fingerprint = catalog_fingerprint(topics);

        match AnchorFile::load(path) {
            Ok(Some(file)) if file.matches(model_id, dimension, &fingerprint) => {
                info!(path = %path.display(), anchors = file.anchors.len(), "Reusing persisted anchors");
                return Ok(file.anchors);
            }
            Ok(Some(_)) => {
                info!(path = %path.display(), "Persisted anchors are stale, rebuilding");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable anchor file"),
        }

        let anchors = self.build(topics)?;
        let file = AnchorFile::new(model_id, dimension, fingerprint, anchors);
        if let Err(e) = file.save(path) {
            warn!(error = %e, "Failed to persist anchors");
        }
        Ok(file.anchors)
    }
}
