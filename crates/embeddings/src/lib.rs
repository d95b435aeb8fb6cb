//! Embedding provider for MindChat.
//!
//! [`EmbeddingProvider`] is the single process-wide handle to the embedding
//! model. It is either `Ready` or permanently `Unavailable`; every consumer
//! matches on that and the routing subsystem degrades to "topic routing
//! disabled" through it.
//!
//! The real model (a BERT sentence encoder run with Candle) is compiled only
//! with the `local` feature.

pub mod cache;
pub mod normalize;
pub mod provider;

#[cfg(feature = "local")]
pub mod local;

pub use cache::EmbeddingCache;
pub use normalize::{l2_norm, l2_normalize};
pub use provider::{Embedding, EmbeddingProvider, ReadyModel};
