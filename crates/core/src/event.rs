//! Routing event bus, the observability hook for routing decisions.
//!
//! One [`RoutingEvent`] is published per applied turn. Subscribers are
//! diagnostics only: publishing never blocks and silently drops events when
//! nobody is listening or a slow receiver has lagged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Why the router reached its decision for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Session is not in counseling mode; routing skipped.
    ModeInactive,
    /// Embedding model unavailable or the query failed.
    Disabled,
    /// No usable candidates (empty index, no user utterance).
    NoCandidates,
    /// Best candidate under the match threshold.
    BelowThreshold,
    /// Kept the current topic within the switch margin.
    Sticky,
    /// Locked onto a new topic.
    Switched,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::ModeInactive => "mode_inactive",
            DecisionReason::Disabled => "disabled",
            DecisionReason::NoCandidates => "no_candidates",
            DecisionReason::BelowThreshold => "below_threshold",
            DecisionReason::Sticky => "sticky",
            DecisionReason::Switched => "switched",
        }
    }
}

/// Diagnostics for one routed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingEvent {
    pub session_id: String,
    pub turn: u64,
    pub topic_id: Option<String>,
    pub similarity: Option<f32>,
    pub reason: DecisionReason,
    pub truncated: bool,
    pub timestamp: DateTime<Utc>,
}

/// A broadcast-based event bus for routing events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<RoutingEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: RoutingEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RoutingEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
