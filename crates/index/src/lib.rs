//! Topic index for MindChat.
//!
//! Holds the topic anchors and answers nearest-topic queries by cosine
//! similarity. Anchors are computed from catalog exemplars with the shared
//! embedding provider and optionally persisted so later starts skip the
//! exemplar embedding pass.

pub mod anchors;
pub mod store;
pub mod topic_index;
pub mod vector;

pub use anchors::{AnchorBuilder, TopicExemplars};
pub use store::{AnchorFile, AnchorStoreError, catalog_fingerprint};
pub use topic_index::TopicIndex;
pub use vector::{centroid, cosine_similarity};
