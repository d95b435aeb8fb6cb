//! System prompt synthesis.
//!
//! Layout, top to bottom:
//!
//! 1. **Persona**: never trimmed
//! 2. **Topic fragment**: never trimmed
//! 3. **Recent conversation**: chronological, oldest turns dropped first
//!
//! Length is measured in characters. Synthesis is pure: identical inputs
//! always produce identical output.

use mindchat_core::{ComposedPrompt, Message, PromptFragment, Role};
use tracing::debug;

const HISTORY_HEADER: &str = "[Recent Conversation]\n";
const SECTION_SEPARATOR: &str = "\n\n";

/// Composes system prompts against a fixed persona and length budget.
#[derive(Debug, Clone)]
pub struct PromptSynthesizer {
    base_persona: String,
    max_length: usize,
}

impl PromptSynthesizer {
    pub fn new(base_persona: impl Into<String>, max_length: usize) -> Self {
        Self {
            base_persona: base_persona.into(),
            max_length,
        }
    }

    pub fn base_persona(&self) -> &str {
        &self.base_persona
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn compose(&self, fragment: Option<&PromptFragment>, recent: &[Message]) -> ComposedPrompt {
        compose(&self.base_persona, fragment, recent, self.max_length)
    }
}

/// Build the system prompt for one turn.
///
/// Messages are taken newest first until the next one would overflow
/// `max_length`; everything older is dropped and `truncated` is set. System
/// messages are not part of the transcript. Persona and fragment are kept
/// whole even when they alone exceed the budget.
pub fn compose(
    base_persona: &str,
    fragment: Option<&PromptFragment>,
    recent: &[Message],
    max_length: usize,
) -> ComposedPrompt {
    let mut text = base_persona.trim().to_string();
    if let Some(fragment) = fragment {
        let template = fragment.template.trim();
        if !template.is_empty() {
            if !text.is_empty() {
                text.push_str(SECTION_SEPARATOR);
            }
            text.push_str(template);
        }
    }

    let transcript: Vec<&Message> = recent.iter().filter(|m| m.role != Role::System).collect();
    let mut used = text.chars().count();
    let mut lines: Vec<String> = Vec::new();

    // Newest to oldest, stopping at the first turn that does not fit.
    for msg in transcript.iter().rev() {
        let line = format!("{}: {}", msg.role.label(), msg.content.trim());
        let cost = if lines.is_empty() {
            let separator = if text.is_empty() { 0 } else { SECTION_SEPARATOR.len() };
            separator + HISTORY_HEADER.len() + line.chars().count()
        } else {
            1 + line.chars().count()
        };
        if used + cost > max_length {
            break;
        }
        used += cost;
        lines.push(line);
    }

    let dropped = transcript.len() - lines.len();
    if !lines.is_empty() {
        lines.reverse();
        if !text.is_empty() {
            text.push_str(SECTION_SEPARATOR);
        }
        text.push_str(HISTORY_HEADER);
        text.push_str(&lines.join("\n"));
    }

    if dropped > 0 {
        debug!(
            dropped,
            kept = lines.len(),
            max_length,
            "Oldest turns dropped to fit prompt budget"
        );
    }

    ComposedPrompt {
        text,
        topic_id: fragment.and_then(|f| f.topic_id.clone()),
        truncated: dropped > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("user message number {i:02}"))
                } else {
                    Message::assistant(format!("assistant reply number {i:02}"))
                }
            })
            .collect()
    }

    fn fragment() -> PromptFragment {
        PromptFragment::for_topic("stress", "The user seems stressed.")
    }

    #[test]
    fn sections_in_order() {
        let messages = vec![Message::user("work is too much"), Message::assistant("I hear you")];
        let prompt = compose("You are kind.", Some(&fragment()), &messages, 10_000);

        assert_eq!(
            prompt.text,
            "You are kind.\n\nThe user seems stressed.\n\n[Recent Conversation]\n\
             User: work is too much\nAssistant: I hear you"
        );
        assert_eq!(prompt.topic_id.as_deref(), Some("stress"));
        assert!(!prompt.truncated);
    }

    #[test]
    fn no_fragment_no_messages_is_just_persona() {
        let prompt = compose("You are kind.", None, &[], 100);
        assert_eq!(prompt.text, "You are kind.");
        assert_eq!(prompt.topic_id, None);
        assert!(!prompt.truncated);
    }

    #[test]
    fn system_messages_are_not_transcript() {
        let messages = vec![Message::system("hidden"), Message::user("hello")];
        let prompt = compose("P", None, &messages, 1000);
        assert!(!prompt.text.contains("hidden"));
        assert!(prompt.text.ends_with("User: hello"));
    }

    #[test]
    fn scenario_d_drops_oldest_and_keeps_persona_and_fragment() {
        let persona = "p".repeat(50);
        let template = "f".repeat(80);
        let fragment = PromptFragment::for_topic("stress", template.clone());
        let messages = conversation(10);

        let full = compose(&persona, Some(&fragment), &messages, usize::MAX);
        let full_len = full.text.chars().count();
        let budget = full_len - 200;

        let prompt = compose(&persona, Some(&fragment), &messages, budget);
        assert!(prompt.truncated);
        assert!(prompt.text.chars().count() <= budget);
        assert!(prompt.text.starts_with(&format!("{persona}\n\n{template}")));

        // The newest turn survives, the oldest does not.
        assert!(prompt.text.contains("number 09"));
        assert!(!prompt.text.contains("number 00"));

        // Kept turns are a contiguous, chronological suffix.
        let kept: Vec<&str> = prompt
            .text
            .lines()
            .filter(|l| l.starts_with("User:") || l.starts_with("Assistant:"))
            .collect();
        let expected: Vec<String> = messages[10 - kept.len()..]
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn oversized_persona_is_never_cut() {
        let persona = "x".repeat(500);
        let prompt = compose(&persona, Some(&fragment()), &conversation(3), 100);
        assert!(prompt.truncated);
        assert!(prompt.text.starts_with(&persona));
        assert!(prompt.text.ends_with("The user seems stressed."));
        assert!(!prompt.text.contains("[Recent Conversation]"));
    }

    #[test]
    fn exact_fit_is_not_truncated() {
        let messages = vec![Message::user("hi")];
        let full = compose("P", None, &messages, usize::MAX);
        let exact = compose("P", None, &messages, full.text.chars().count());
        assert_eq!(exact, full);
        assert!(!exact.truncated);
    }

    #[test]
    fn budget_counts_characters_not_bytes() {
        let messages = vec![Message::user("眠れません")];
        let full = compose("P", None, &messages, usize::MAX);
        let prompt = compose("P", None, &messages, full.text.chars().count());
        assert!(!prompt.truncated);
    }

    #[test]
    fn synthesizer_is_deterministic() {
        let synthesizer = PromptSynthesizer::new("You are kind.", 120);
        let messages = conversation(6);
        assert_eq!(
            synthesizer.compose(Some(&fragment()), &messages),
            synthesizer.compose(Some(&fragment()), &messages)
        );
    }
}
