//! Embedder trait: the seam between text and vectors.

use crate::error::EmbeddingError;

/// A loaded text embedding model.
///
/// Implementations must be deterministic for a given model and input, and
/// must always return vectors of length [`Embedder::dimension`].
///
/// Calls are synchronous: model inference is CPU-bound, and callers that
/// cannot block (an interactive front end) offload them to a blocking worker.
pub trait Embedder: Send + Sync {
    /// Identifier of the model (e.g. a Hugging Face repo id).
    fn model_id(&self) -> &str;

    /// Output vector dimension.
    fn dimension(&self) -> usize;

    /// Embed a single, non-empty text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
