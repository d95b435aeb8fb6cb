//! Counseling topic routing for MindChat.
//!
//! Each counseling turn flows through:
//!
//! 1. **Embed** the latest user utterance with the shared provider
//! 2. **Query** the topic index for the nearest topic anchors
//! 3. **Decide** with hysteresis against the session's routing state
//! 4. **Look up** the topic's prompt fragment in the catalog
//! 5. **Compose** persona, fragment and recent conversation into one system prompt
//!
//! Nothing in this pipeline fails a turn: a missing model, a bad vector or a
//! stale result all fall back to the default fragment. Only a catalog with no
//! default fragment is rejected, at startup.

pub mod catalog;
pub mod pipeline;
pub mod policy;
pub mod session;
pub mod synthesizer;

pub use catalog::{PromptCatalog, TopicEntry};
pub use pipeline::{CounselingRouter, RoutedTurn, TurnOutcome, build_topic_index};
pub use policy::{RoutingDecision, TopicRouter};
pub use session::RoutingSession;
pub use synthesizer::{PromptSynthesizer, compose};
