//! Per-session routing memory and turn counter.
//!
//! A session owns its [`RoutingState`] and hands out monotonically
//! increasing turn numbers. A routing result is applied only while its turn
//! is still the latest one issued; anything older is superseded and
//! discarded without touching the state.

use mindchat_core::{ChatMode, RoutingState, SessionId};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug)]
pub(crate) struct SessionInner {
    pub(crate) mode: ChatMode,
    pub(crate) state: RoutingState,
}

/// One conversation's routing handle.
#[derive(Debug)]
pub struct RoutingSession {
    id: SessionId,
    latest_turn: AtomicU64,
    inner: Mutex<SessionInner>,
}

impl RoutingSession {
    pub fn new(mode: ChatMode) -> Self {
        Self::with_id(SessionId::new(), mode)
    }

    pub fn with_id(id: SessionId, mode: ChatMode) -> Self {
        Self {
            id,
            latest_turn: AtomicU64::new(0),
            inner: Mutex::new(SessionInner {
                mode,
                state: RoutingState::new(),
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Issue the next turn number. Any turn issued earlier is now stale.
    pub fn begin_turn(&self) -> u64 {
        self.latest_turn.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The most recently issued turn (0 before the first).
    pub fn latest_turn(&self) -> u64 {
        self.latest_turn.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, turn: u64) -> bool {
        self.latest_turn() == turn
    }

    pub async fn mode(&self) -> ChatMode {
        self.inner.lock().await.mode
    }

    /// Snapshot of the routing state.
    pub async fn state(&self) -> RoutingState {
        self.inner.lock().await.state.clone()
    }

    /// Switch modes. Supersedes any turn in flight; clears the topic lock
    /// when `reset_state` is set.
    pub async fn set_mode(&self, mode: ChatMode, reset_state: bool) {
        let mut inner = self.inner.lock().await;
        self.latest_turn.fetch_add(1, Ordering::SeqCst);
        if inner.mode != mode {
            debug!(session = %self.id, from = %inner.mode, to = %mode, "Chat mode switched");
            if reset_state {
                inner.state.reset();
            }
        }
        inner.mode = mode;
    }

    /// Clear the routing state, keeping the mode.
    pub async fn reset(&self) {
        self.inner.lock().await.state.reset();
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().await
    }
}
