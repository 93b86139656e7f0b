use std::sync::Arc;

use browser_control_agent::analyzer::PageAnalyzer;
use browser_control_agent::classifier::IntentClassifier;
use browser_control_agent::mock::{MockBrain, MockPage};
use browser_control_agent::types::{
    ActionKind, ChatMessage, Decision, DecisionStatus, Intent, TaskState,
};

#[tokio::test]
async fn analysis_without_page_skips_the_model() {
    let brain = Arc::new(MockBrain::new().with_reply(r#"{"action": "click"}"#));
    let analyzer = PageAnalyzer::new(brain.clone());

    let result = analyzer.analyze(None, "anything", &TaskState::new()).await;

    assert_eq!(result.analysis.action, ActionKind::Error);
    assert_eq!(result.analysis.status, DecisionStatus::Error);
    assert!(result.screenshot.is_empty());
    assert!(result.url.is_empty() && result.title.is_empty());
    assert!(brain.prompts().is_empty());
    assert_eq!(brain.remaining(), 1);
}

#[tokio::test]
async fn analysis_sends_screenshot_and_page_context() {
    let brain = Arc::new(MockBrain::new().with_reply(
        "Here you go:\n```json\n{\"action\": \"click\", \"target\": \"#login\", \"description\": \"Open login\", \"status\": \"continue\"}\n```",
    ));
    let analyzer = PageAnalyzer::new(brain.clone());
    let page = MockPage::new().with_title("Welcome");
    let mut state = TaskState::new();
    state.insert("intent".into(), "form".into());

    let result = analyzer.analyze(Some(&page), "log in", &state).await;

    assert_eq!(result.analysis.action, ActionKind::Click);
    assert_eq!(result.analysis.target.as_deref(), Some("#login"));
    assert_eq!(result.title, "Welcome");
    assert!(!result.screenshot.is_empty());

    let prompts = brain.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].had_image);
    assert!(prompts[0].prompt.contains("Page title: Welcome"));
    assert!(prompts[0].prompt.contains("User intent: log in"));
    assert!(prompts[0].prompt.contains("\"intent\": \"form\""));
    assert!(prompts[0].prompt.contains("[e0] input type=text name=q"));
}

#[tokio::test]
async fn unparseable_reply_degrades_to_wait() {
    let brain = Arc::new(MockBrain::new().with_reply("I'm not sure what to do here."));
    let analyzer = PageAnalyzer::new(brain);
    let page = MockPage::new();

    let result = analyzer.analyze(Some(&page), "task", &TaskState::new()).await;

    assert_eq!(result.analysis, Decision::fallback());
}

#[tokio::test]
async fn model_failure_becomes_error_decision() {
    let brain = Arc::new(MockBrain::new().with_error("quota exceeded"));
    let analyzer = PageAnalyzer::new(brain);
    let page = MockPage::new();

    let result = analyzer.analyze(Some(&page), "task", &TaskState::new()).await;

    assert_eq!(result.analysis.status, DecisionStatus::Error);
    assert!(result.analysis.description.contains("quota exceeded"));
    assert!(!result.screenshot.is_empty());
}

#[tokio::test]
async fn screenshot_failure_is_not_fatal() {
    let brain = Arc::new(MockBrain::new().with_reply(r#"{"action": "wait", "status": "continue"}"#));
    let analyzer = PageAnalyzer::new(brain.clone());
    let page = MockPage::new().failing_screenshot();

    let result = analyzer.analyze(Some(&page), "task", &TaskState::new()).await;

    assert!(result.screenshot.is_empty());
    assert_eq!(result.analysis.action, ActionKind::Wait);
    assert!(!brain.prompts()[0].had_image);
}

#[tokio::test]
async fn classifier_reads_fenced_reply() {
    let brain = Arc::new(MockBrain::new().with_reply(
        "```json\n{\"intent\": \"email\", \"task_description\": \"Email Bob\", \"missing_info\": [\"Bob's address\"], \"ready_to_start\": false, \"suggested_response\": \"What is Bob's email address?\"}\n```",
    ));
    let classifier = IntentClassifier::new(brain);

    let intent = classifier
        .classify("email bob", &[ChatMessage::user("email bob")])
        .await
        .unwrap();

    assert_eq!(intent.intent, Intent::Email);
    assert_eq!(intent.task_description, "Email Bob");
    assert_eq!(intent.missing_info, vec!["Bob's address".to_string()]);
    assert!(!intent.can_start());
    assert_eq!(intent.suggested_response, "What is Bob's email address?");
}

#[tokio::test]
async fn classifier_only_sees_recent_history() {
    let brain = Arc::new(MockBrain::new().with_reply("no json"));
    let classifier = IntentClassifier::new(brain.clone());
    let history: Vec<_> = (0..7).map(|i| ChatMessage::user(format!("msg-{i}"))).collect();

    let intent = classifier.classify("msg-6", &history).await.unwrap();

    assert_eq!(intent.intent, Intent::Other);
    assert!(!intent.ready_to_start);
    let prompt = &brain.prompts()[0].prompt;
    assert!(!prompt.contains("msg-1"));
    assert!(prompt.contains("msg-2"));
    assert!(!brain.prompts()[0].had_image);
}

#[tokio::test]
async fn classifier_propagates_model_errors() {
    let brain = Arc::new(MockBrain::new().with_error("network down"));
    let classifier = IntentClassifier::new(brain);
    assert!(classifier.classify("hi", &[]).await.is_err());
}
