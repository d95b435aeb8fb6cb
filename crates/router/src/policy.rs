//! Topic routing state machine.
//!
//! States are `NoTopic` and `Locked(topic)`. Per turn, given candidates
//! ranked best first:
//!
//! 1. No candidates (or routing disabled): `NoTopic`, state kept apart from
//!    `last_candidates` being cleared.
//! 2. Best below the match threshold: decision `NoTopic`. A lock survives
//!    until `turns_since_switch` exceeds the grace window.
//! 3. Locked and the current topic scores within the switch margin of the
//!    best: stay locked.
//! 4. Otherwise lock onto the best candidate.
//!
//! `turns_since_switch` counts below-threshold turns since the lock was last
//! confirmed. It restarts at 0 whenever a turn switches, releases or
//! re-confirms (sticky) the lock, so a lock of any age survives `grace_turns`
//! weak turns in a row.

use mindchat_config::RoutingPolicy;
use mindchat_core::{DecisionReason, RoutingCandidate, RoutingState};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the router chose for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// `None` means the default fragment.
    pub topic_id: Option<String>,
    /// Similarity of the chosen topic, or of the best candidate on `NoTopic`.
    pub similarity: Option<f32>,
    pub reason: DecisionReason,
}

impl RoutingDecision {
    pub fn no_topic(reason: DecisionReason) -> Self {
        Self {
            topic_id: None,
            similarity: None,
            reason,
        }
    }
}

/// The hysteresis policy. Stateless; all memory lives in [`RoutingState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicRouter {
    policy: RoutingPolicy,
}

impl TopicRouter {
    pub fn new(policy: RoutingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Decide for this turn and update `state`.
    pub fn decide(&self, state: &mut RoutingState, candidates: &[RoutingCandidate]) -> RoutingDecision {
        let (next, decision) = self.plan(state, candidates);
        *state = next;
        decision
    }

    /// Routing could not produce candidates (model unavailable, bad vector,
    /// dimension mismatch). Same transition as an empty candidate list.
    pub fn fail_open(&self, state: &mut RoutingState, reason: DecisionReason) -> RoutingDecision {
        state.last_candidates.clear();
        debug!(reason = reason.as_str(), "Routing fell back to default fragment");
        RoutingDecision::no_topic(reason)
    }

    /// The pure transition: next state and decision, without touching `state`.
    pub fn plan(
        &self,
        state: &RoutingState,
        candidates: &[RoutingCandidate],
    ) -> (RoutingState, RoutingDecision) {
        let mut next = state.clone();

        let Some(best) = candidates.first() else {
            next.last_candidates.clear();
            return (next, RoutingDecision::no_topic(DecisionReason::NoCandidates));
        };
        next.last_candidates = candidates.to_vec();

        if best.similarity < self.policy.match_threshold {
            next.turns_since_switch = next.turns_since_switch.saturating_add(1);
            if next.is_locked() && next.turns_since_switch > self.policy.grace_turns {
                debug!(
                    topic = next.current_topic.as_deref(),
                    "Topic lock released after grace window"
                );
                next.current_topic = None;
                next.turns_since_switch = 0;
            }
            let decision = RoutingDecision {
                topic_id: None,
                similarity: Some(best.similarity),
                reason: DecisionReason::BelowThreshold,
            };
            return (next, decision);
        }

        if let Some(current) = next.current_topic.clone() {
            let floor = best.similarity - self.policy.switch_margin;
            if let Some(held) = candidates
                .iter()
                .find(|c| c.topic_id == current && c.similarity >= floor)
            {
                next.turns_since_switch = 0;
                let decision = RoutingDecision {
                    topic_id: Some(current),
                    similarity: Some(held.similarity),
                    reason: DecisionReason::Sticky,
                };
                return (next, decision);
            }
        }

        next.current_topic = Some(best.topic_id.clone());
        next.turns_since_switch = 0;
        let decision = RoutingDecision {
            topic_id: Some(best.topic_id.clone()),
            similarity: Some(best.similarity),
            reason: DecisionReason::Switched,
        };
        (next, decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: &str, similarity: f32) -> RoutingCandidate {
        RoutingCandidate::new(id, similarity)
    }

    fn locked(topic: &str, turns: u32) -> RoutingState {
        RoutingState {
            current_topic: Some(topic.into()),
            turns_since_switch: turns,
            last_candidates: vec![],
        }
    }

    fn router() -> TopicRouter {
        TopicRouter::new(RoutingPolicy::default())
    }

    #[test]
    fn scenario_a_locks_on_clear_match() {
        let mut state = RoutingState::new();
        let decision = router().decide(&mut state, &[c("stress", 0.8), c("relationship", 0.3)]);
        assert_eq!(decision.topic_id.as_deref(), Some("stress"));
        assert_eq!(decision.reason, DecisionReason::Switched);
        assert_eq!(state.current_topic.as_deref(), Some("stress"));
        assert_eq!(state.turns_since_switch, 0);
        assert_eq!(state.last_candidates.len(), 2);
    }

    #[test]
    fn scenario_b_weak_match_stays_unlocked() {
        let mut state = RoutingState::new();
        let decision = router().decide(&mut state, &[c("stress", 0.5)]);
        assert_eq!(decision.topic_id, None);
        assert_eq!(decision.reason, DecisionReason::BelowThreshold);
        assert_eq!(decision.similarity, Some(0.5));
        assert!(!state.is_locked());
    }

    #[test]
    fn scenario_c_current_topic_within_margin_sticks() {
        let mut state = locked("stress", 2);
        let decision = router().decide(&mut state, &[c("relationship", 0.82), c("stress", 0.79)]);
        assert_eq!(decision.topic_id.as_deref(), Some("stress"));
        assert_eq!(decision.reason, DecisionReason::Sticky);
        assert_eq!(decision.similarity, Some(0.79));
        assert_eq!(state.current_topic.as_deref(), Some("stress"));
        assert_eq!(state.turns_since_switch, 0);
    }

    #[test]
    fn clear_winner_switches_topic() {
        let mut state = locked("stress", 5);
        let decision = router().decide(&mut state, &[c("relationship", 0.9), c("stress", 0.6)]);
        assert_eq!(decision.topic_id.as_deref(), Some("relationship"));
        assert_eq!(decision.reason, DecisionReason::Switched);
        assert_eq!(state.turns_since_switch, 0);
    }

    #[test]
    fn current_topic_absent_from_candidates_switches() {
        let mut state = locked("stress", 1);
        let decision = router().decide(&mut state, &[c("sleep", 0.7)]);
        assert_eq!(decision.topic_id.as_deref(), Some("sleep"));
    }

    #[test]
    fn lock_survives_grace_window_then_releases() {
        let router = router();
        let mut state = locked("stress", 0);

        // First weak turn: within grace, lock kept but decision is NoTopic.
        let first = router.decide(&mut state, &[c("stress", 0.4)]);
        assert_eq!(first.topic_id, None);
        assert_eq!(state.current_topic.as_deref(), Some("stress"));
        assert_eq!(state.turns_since_switch, 1);

        // Second weak turn exceeds grace (1): unlock.
        router.decide(&mut state, &[c("stress", 0.4)]);
        assert!(!state.is_locked());
        assert_eq!(state.turns_since_switch, 0);
    }

    #[test]
    fn established_lock_survives_one_ambiguous_turn() {
        let router = router();
        let mut state = RoutingState::new();
        router.decide(&mut state, &[c("stress", 0.8), c("relationship", 0.3)]);
        for _ in 0..3 {
            let sticky = router.decide(&mut state, &[c("stress", 0.8), c("relationship", 0.78)]);
            assert_eq!(sticky.reason, DecisionReason::Sticky);
        }

        let weak = router.decide(&mut state, &[c("stress", 0.4)]);
        assert_eq!(weak.topic_id, None);
        assert_eq!(state.current_topic.as_deref(), Some("stress"));

        // Scenario C on the following turn still holds the lock.
        let next = router.decide(&mut state, &[c("relationship", 0.82), c("stress", 0.79)]);
        assert_eq!(next.topic_id.as_deref(), Some("stress"));
        assert_eq!(next.reason, DecisionReason::Sticky);
    }

    #[test]
    fn consecutive_weak_turns_release_an_established_lock() {
        let router = router();
        let mut state = locked("stress", 0);
        router.decide(&mut state, &[c("stress", 0.9)]);
        router.decide(&mut state, &[c("stress", 0.9)]);

        router.decide(&mut state, &[c("stress", 0.4)]);
        assert!(state.is_locked());
        router.decide(&mut state, &[c("stress", 0.4)]);
        assert!(!state.is_locked());
    }

    #[test]
    fn weak_turn_inside_grace_can_resume_lock() {
        let router = router();
        let mut state = locked("stress", 0);
        router.decide(&mut state, &[c("stress", 0.4)]);
        let decision = router.decide(&mut state, &[c("relationship", 0.62), c("stress", 0.6)]);
        assert_eq!(decision.topic_id.as_deref(), Some("stress"));
        assert_eq!(decision.reason, DecisionReason::Sticky);
    }

    #[test]
    fn no_candidates_clears_only_last_candidates() {
        let mut state = locked("stress", 3);
        state.last_candidates = vec![c("stress", 0.9)];
        let decision = router().decide(&mut state, &[]);
        assert_eq!(decision, RoutingDecision::no_topic(DecisionReason::NoCandidates));
        assert_eq!(state.current_topic.as_deref(), Some("stress"));
        assert_eq!(state.turns_since_switch, 3);
        assert!(state.last_candidates.is_empty());
    }

    #[test]
    fn fail_open_keeps_lock_and_returns_default() {
        let mut state = locked("grief", 2);
        state.last_candidates = vec![c("grief", 0.9)];
        let decision = router().fail_open(&mut state, DecisionReason::Disabled);
        assert_eq!(decision.topic_id, None);
        assert_eq!(decision.reason, DecisionReason::Disabled);
        assert_eq!(state.current_topic.as_deref(), Some("grief"));
        assert!(state.last_candidates.is_empty());
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let router = router();
        let state = locked("stress", 1);
        let candidates = [c("relationship", 0.7), c("stress", 0.68)];
        let (next_a, decision_a) = router.plan(&state, &candidates);
        let (next_b, decision_b) = router.plan(&state, &candidates);
        assert_eq!(decision_a, decision_b);
        assert_eq!(next_a, next_b);
        assert_eq!(state, locked("stress", 1), "plan does not mutate its input");
    }

    #[test]
    fn alternating_best_within_margin_changes_topic_at_most_once() {
        let router = router();
        let mut state = RoutingState::new();
        let mut changes = 0;
        let mut previous: Option<String> = None;

        for turn in 0..20 {
            let candidates = if turn % 2 == 0 {
                [c("stress", 0.80), c("anxiety", 0.77)]
            } else {
                [c("anxiety", 0.80), c("stress", 0.77)]
            };
            router.decide(&mut state, &candidates);
            if state.current_topic != previous {
                changes += 1;
                previous = state.current_topic.clone();
            }
        }
        assert_eq!(changes, 1);
        assert_eq!(state.current_topic.as_deref(), Some("stress"));
    }

    #[test]
    fn thresholds_are_configurable() {
        let router = TopicRouter::new(RoutingPolicy {
            match_threshold: 0.9,
            switch_margin: 0.0,
            grace_turns: 0,
            ..RoutingPolicy::default()
        });
        let mut state = RoutingState::new();
        assert_eq!(router.decide(&mut state, &[c("stress", 0.85)]).topic_id, None);

        let mut state = locked("stress", 0);
        router.decide(&mut state, &[c("stress", 0.5)]);
        assert!(!state.is_locked(), "zero grace releases on the first weak turn");
    }
}
