use std::sync::Arc;

use tracing::{debug, warn};

use crate::brain::Brain;
use crate::error::Result;
use crate::extract;
use crate::types::{ChatMessage, HISTORY_WINDOW, IntentDecision};

/// Decides what the user wants and whether automation can start.
pub struct IntentClassifier {
    brain: Arc<dyn Brain>,
}

impl IntentClassifier {
    pub fn new(brain: Arc<dyn Brain>) -> Self {
        Self { brain }
    }

    /// Only a failed model call is an error; unreadable replies fall back to
    /// a clarifying question.
    pub async fn classify(&self, message: &str, history: &[ChatMessage]) -> Result<IntentDecision> {
        let prompt = build_prompt(message, recent(history));
        let reply = self.brain.generate(&prompt, None).await?;
        let decision = parse_intent(&reply, message);
        debug!(
            intent = decision.intent.as_str(),
            ready = decision.ready_to_start,
            missing = decision.missing_info.len(),
            "intent classified"
        );
        Ok(decision)
    }
}

/// The trailing [`HISTORY_WINDOW`] entries.
pub fn recent(history: &[ChatMessage]) -> &[ChatMessage] {
    &history[history.len().saturating_sub(HISTORY_WINDOW)..]
}

pub fn parse_intent(reply: &str, message: &str) -> IntentDecision {
    let mut decision = extract::decode_or_else(reply, || {
        warn!(reply, "could not parse intent from the model reply");
        IntentDecision::fallback(message)
    });
    if decision.task_description.trim().is_empty() {
        decision.task_description = message.to_string();
    }
    if decision.suggested_response.trim().is_empty() {
        decision.suggested_response = IntentDecision::CLARIFYING_PROMPT.to_string();
    }
    decision
}

pub fn build_prompt(message: &str, history: &[ChatMessage]) -> String {
    let history = serde_json::to_string_pretty(history).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"You help a user automate tasks in a web browser. Work out what they want from their latest message.

Latest message: "{message}"
Recent conversation:
{history}

Typical tasks are sending an email, searching the web, opening a website or filling in a form.
Decide which task this is, what required details are still missing, and whether the browser can start now.

Reply with one JSON object and nothing else:
{{
  "intent": "email | search | navigate | form | other",
  "task_description": "clear, self-contained description of the task",
  "missing_info": ["required details the user has not given"],
  "ready_to_start": true,
  "suggested_response": "what to say to the user"
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Intent;

    #[test]
    fn recent_keeps_last_five() {
        let history: Vec<_> = (0..8).map(|i| ChatMessage::user(format!("m{i}"))).collect();
        let window = recent(&history);
        assert_eq!(window.len(), 5);
        assert_eq!(window[0].content, "m3");
        assert_eq!(recent(&history[..2]).len(), 2);
    }

    #[test]
    fn prose_reply_falls_back_to_clarifying_question() {
        let decision = parse_intent("Sorry, I'm not sure.", "book me a flight");
        assert_eq!(decision.intent, Intent::Other);
        assert!(!decision.ready_to_start);
        assert_eq!(decision.task_description, "book me a flight");
        assert_eq!(decision.suggested_response, IntentDecision::CLARIFYING_PROMPT);
    }

    #[test]
    fn missing_description_uses_raw_message() {
        let decision = parse_intent(
            r#"{"intent": "search", "ready_to_start": true, "suggested_response": "On it"}"#,
            "look up the weather",
        );
        assert_eq!(decision.intent, Intent::Search);
        assert_eq!(decision.task_description, "look up the weather");
        assert!(decision.can_start());
    }

    #[test]
    fn prompt_quotes_message_and_history() {
        let history = vec![ChatMessage::user("hello")];
        let prompt = build_prompt("search cats", &history);
        assert!(prompt.contains("Latest message: \"search cats\""));
        assert!(prompt.contains("\"role\": \"user\""));
        assert!(prompt.contains("\"content\": \"hello\""));
    }
}
