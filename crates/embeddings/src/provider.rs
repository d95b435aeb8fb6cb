//! The process-wide embedding handle.
//!
//! Loading is attempted exactly once. A failed load leaves the provider in
//! [`EmbeddingProvider::Unavailable`] for the rest of the process; nothing
//! retries it.

use crate::cache::EmbeddingCache;
use mindchat_config::AppConfig;
use mindchat_core::{Embedder, EmbeddingError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of embedding one input.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    /// Input was blank after trimming; `vector` is all zeros.
    pub empty_input: bool,
}

/// A loaded model plus its input memo.
pub struct ReadyModel {
    model: Box<dyn Embedder>,
    cache: EmbeddingCache,
}

impl ReadyModel {
    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let dimension = self.model.dimension();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            warn!("Embedding requested for blank text, returning zero vector");
            return Ok(Embedding {
                vector: vec![0.0; dimension],
                empty_input: true,
            });
        }

        if let Some(hit) = self.cache.get(text) {
            debug!(chars = text.len(), "Embedding cache hit");
            return Ok(Embedding {
                vector: hit.to_vec(),
                empty_input: false,
            });
        }

        let vector = self.model.embed(trimmed)?;
        if vector.len() != dimension {
            return Err(EmbeddingError::Inference(format!(
                "model '{}' returned {} values, expected {}",
                self.model.model_id(),
                vector.len(),
                dimension
            )));
        }

        self.cache.insert(text, Arc::from(vector.as_slice()));
        Ok(Embedding {
            vector,
            empty_input: false,
        })
    }
}

/// Either a ready model or the reason there is none.
pub enum EmbeddingProvider {
    Ready(ReadyModel),
    Unavailable { reason: String },
}

impl EmbeddingProvider {
    /// Wrap an already-loaded model.
    pub fn ready(model: Box<dyn Embedder>, cache_size: usize) -> Self {
        Self::Ready(ReadyModel {
            model,
            cache: EmbeddingCache::new(cache_size),
        })
    }

    /// A provider that will never embed anything.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Load the configured model. Never fails: a load error yields `Unavailable`.
    pub fn load(config: &AppConfig) -> Self {
        match load_model(config) {
            Ok(model) => {
                info!(
                    model = model.model_id(),
                    dimension = model.dimension(),
                    "Embedding model loaded"
                );
                Self::ready(model, config.embedding.cache_size)
            }
            Err(e) => {
                warn!(error = %e, "Embedding model unavailable, topic routing disabled");
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn dimension(&self) -> Option<usize> {
        match self {
            Self::Ready(m) => Some(m.dimension()),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn model_id(&self) -> Option<&str> {
        match self {
            Self::Ready(m) => Some(m.model_id()),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }

    /// Embed `text`. Blank text yields a zero vector flagged `empty_input`.
    pub fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        match self {
            Self::Ready(model) => model.embed(text),
            Self::Unavailable { reason } => Err(EmbeddingError::Unavailable(reason.clone())),
        }
    }
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(m) => f
                .debug_struct("Ready")
                .field("model_id", &m.model_id())
                .field("dimension", &m.dimension())
                .field("cached", &m.cache.len())
                .finish(),
            Self::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

#[cfg(feature = "local")]
fn load_model(config: &AppConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    let model = crate::local::BertEmbedder::load(config)?;
    Ok(Box::new(model))
}

#[cfg(not(feature = "local"))]
fn load_model(_config: &AppConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    Err(EmbeddingError::Unavailable(
        "built without local embedding support (enable the `local` feature)".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls; maps text length onto a 3-d vector.
    struct CountingEmbedder {
        calls: Arc<AtomicUsize>,
    }

    impl Embedder for CountingEmbedder {
        fn model_id(&self) -> &str {
            "counting"
        }
        fn dimension(&self) -> usize {
            3
        }
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0, 0.0])
        }
    }

    struct WrongSizeEmbedder;

    impl Embedder for WrongSizeEmbedder {
        fn model_id(&self) -> &str {
            "wrong"
        }
        fn dimension(&self) -> usize {
            4
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0])
        }
    }

    fn counting() -> (EmbeddingProvider, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = EmbeddingProvider::ready(
            Box::new(CountingEmbedder {
                calls: Arc::clone(&calls),
            }),
            8,
        );
        (provider, calls)
    }

    #[test]
    fn ready_provider_returns_fixed_dimension() {
        let (provider, _) = counting();
        let embedding = provider.embed("work is crushing me").unwrap();
        assert_eq!(embedding.vector.len(), 3);
        assert!(!embedding.empty_input);
        assert_eq!(provider.dimension(), Some(3));
        assert_eq!(provider.model_id(), Some("counting"));
    }

    #[test]
    fn blank_text_is_zero_vector_not_error() {
        let (provider, calls) = counting();
        let embedding = provider.embed("   \n").unwrap();
        assert!(embedding.empty_input);
        assert_eq!(embedding.vector, vec![0.0, 0.0, 0.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn repeated_input_is_memoized() {
        let (provider, calls) = counting();
        let first = provider.embed("I argued with my partner").unwrap();
        let second = provider.embed("I argued with my partner").unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        provider.embed("something else").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unavailable_provider_always_errors() {
        let provider = EmbeddingProvider::unavailable("weights missing");
        assert!(!provider.is_available());
        assert_eq!(provider.dimension(), None);
        assert_eq!(provider.unavailable_reason(), Some("weights missing"));
        for text in ["", "hello", "I feel anxious"] {
            assert!(matches!(
                provider.embed(text),
                Err(EmbeddingError::Unavailable(_))
            ));
        }
    }

    #[test]
    fn wrong_sized_output_is_inference_error() {
        let provider = EmbeddingProvider::ready(Box::new(WrongSizeEmbedder), 8);
        assert!(matches!(
            provider.embed("hello"),
            Err(EmbeddingError::Inference(_))
        ));
    }

    #[cfg(not(feature = "local"))]
    #[test]
    fn load_without_local_feature_is_unavailable() {
        let provider = EmbeddingProvider::load(&AppConfig::default());
        assert!(!provider.is_available());
        assert!(provider.unavailable_reason().unwrap().contains("local"));
    }
}
