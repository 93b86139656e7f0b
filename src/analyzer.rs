use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::brain::Brain;
use crate::extract;
use crate::hands::{PageCapture, PageDriver, capture_state};
use crate::types::{Decision, PageAnalysis, TaskState};

/// Looks at the current page and asks the model for the next action.
pub struct PageAnalyzer {
    brain: Arc<dyn Brain>,
}

impl PageAnalyzer {
    pub fn new(brain: Arc<dyn Brain>) -> Self {
        Self { brain }
    }

    pub async fn analyze(
        &self,
        page: Option<&dyn PageDriver>,
        intent: &str,
        task_state: &TaskState,
    ) -> PageAnalysis {
        let Some(page) = page else {
            return PageAnalysis {
                analysis: Decision::error("Browser page not available."),
                ..Default::default()
            };
        };

        let PageCapture {
            screenshot,
            url,
            title,
        } = capture_state(page).await;
        let outline = page.outline().await.unwrap_or_else(|e| {
            debug!(error = %e, "page outline unavailable");
            String::new()
        });

        let prompt = build_prompt(&url, &title, intent, task_state, &outline);
        let image = (!screenshot.is_empty()).then(|| screenshot.as_bytes());

        let analysis = match self.brain.generate(&prompt, image).await {
            Ok(reply) => parse_decision(&reply),
            Err(e) => {
                error!(error = %e, "page analysis failed");
                Decision::error(format!("Error: {e}"))
            }
        };
        debug!(action = ?analysis.action, status = ?analysis.status, "page analyzed");

        PageAnalysis {
            analysis,
            screenshot,
            url,
            title,
        }
    }
}

/// Decode the model's reply, degrading to a `wait` decision.
pub fn parse_decision(reply: &str) -> Decision {
    extract::decode_or_else(reply, || {
        warn!(reply, "could not parse a decision from the model reply");
        Decision::fallback()
    })
}

pub fn build_prompt(
    url: &str,
    title: &str,
    intent: &str,
    task_state: &TaskState,
    outline: &str,
) -> String {
    let state = serde_json::to_string_pretty(task_state).unwrap_or_else(|_| "{}".to_string());
    let outline = if outline.trim().is_empty() {
        "(none detected)"
    } else {
        outline
    };

    format!(
        r#"You are operating a web browser for a user. The attached image is a screenshot of the visible part of the page.

Current URL: {url}
Page title: {title}
User intent: {intent}
Task state:
{state}

Interactive elements (target them with a selector like [data-eid="e3"]):
{outline}

Decide the single next action that moves the task forward. Reply with one JSON object and nothing else:
{{
  "action": "click | type | navigate | wait | complete | error",
  "target": "CSS selector, or the exact visible text of the element",
  "value": "text to type, or the URL to open",
  "description": "short human-readable description of the action",
  "status": "continue | complete | error",
  "missing_info": ["anything you need from the user"]
}}

Use "complete" with status "complete" once the intent has been fulfilled."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionKind, DecisionStatus};

    #[test]
    fn prompt_embeds_page_and_task_context() {
        let mut state = TaskState::new();
        state.insert("intent".into(), "search".into());
        let prompt = build_prompt(
            "https://www.google.com/",
            "Google",
            "search for rust",
            &state,
            "",
        );
        assert!(prompt.contains("Current URL: https://www.google.com/"));
        assert!(prompt.contains("Page title: Google"));
        assert!(prompt.contains("User intent: search for rust"));
        assert!(prompt.contains("\"intent\": \"search\""));
        assert!(prompt.contains("(none detected)"));
    }

    #[test]
    fn fenced_reply_is_decoded_exactly() {
        let reply = "```json\n{\"action\": \"type\", \"target\": \"textarea[name=q]\", \"value\": \"rust\", \"description\": \"Type query\", \"status\": \"continue\", \"missing_info\": []}\n```";
        let decision = parse_decision(reply);
        assert_eq!(
            decision,
            Decision {
                action: ActionKind::Type,
                target: Some("textarea[name=q]".into()),
                value: Some("rust".into()),
                description: "Type query".into(),
                status: DecisionStatus::Continue,
                missing_info: vec![],
            }
        );
    }

    #[test]
    fn unknown_action_keeps_terminal_status() {
        let decision = parse_decision(
            "```json\n{\"action\": \"scroll\", \"description\": \"Done\", \"status\": \"complete\"}\n```",
        );
        assert_eq!(decision.action, ActionKind::Wait);
        assert_eq!(decision.status, DecisionStatus::Complete);
        assert_eq!(decision.description, "Done");
    }

    #[test]
    fn duplicate_locator_names_keep_the_target() {
        let decision = parse_decision(
            r##"{"action": "click", "target": "#a", "element_selector": "#a", "status": "continue"}"##,
        );
        assert_eq!(decision.action, ActionKind::Click);
        assert_eq!(decision.target.as_deref(), Some("#a"));
    }
}
