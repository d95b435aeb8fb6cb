//! # MindChat Core
//!
//! Domain types, traits, and error definitions for MindChat's counseling
//! topic routing. This crate has **no model or storage dependencies**; it
//! defines the shapes every other crate implements against.
//!
//! ## Design Philosophy
//!
//! The two seams of the routing subsystem are traits defined here:
//! - [`Embedder`]: text in, fixed-length vector out
//! - [`TopicSearch`]: vector in, ranked topic candidates out
//!
//! Implementations live in `mindchat-embeddings` and `mindchat-index`, so a
//! test can swap in a scripted embedder or an approximate index without
//! touching the router.

pub mod error;
pub mod message;
pub mod embedding;
pub mod routing;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{CatalogError, EmbeddingError, RoutingError};
pub use message::{ChatMode, Message, Role, SessionId};
pub use embedding::Embedder;
pub use routing::{
    ComposedPrompt, PromptFragment, RoutingCandidate, RoutingState, TieBreak, TopicAnchor,
    TopicSearch, rank_candidates,
};
pub use event::{DecisionReason, EventBus, RoutingEvent};
