//! Per-connection control loop.
//!
//! A [`Session`] owns everything one client needs: its conversation, the facts
//! gathered about the current task and, once a task starts, its own browser.
//! Messages are handled one at a time; every step is pushed to the client as
//! soon as it happens.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::analyzer::PageAnalyzer;
use crate::brain::Brain;
use crate::classifier::IntentClassifier;
use crate::config::SessionSettings;
use crate::error::{AgentError, Result};
use crate::executor::ActionExecutor;
use crate::hands::{BrowserLauncher, PageCapture, PageDriver, capture_state};
use crate::types::{
    ChatMessage, DecisionStatus, Intent, IntentDecision, LoadState, ResponsePayload,
    ResponseStatus, ServerEvent, TaskState,
};

pub type EventSender = mpsc::Sender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Classifying,
    AwaitingUserInfo,
    Automating,
    Completed,
    Errored,
}

async fn emit(events: &EventSender, event: ServerEvent) -> Result<()> {
    events
        .send(event)
        .await
        .map_err(|_| AgentError::TransportClosed)
}

pub struct Session {
    classifier: IntentClassifier,
    analyzer: PageAnalyzer,
    executor: ActionExecutor,
    launcher: Arc<dyn BrowserLauncher>,
    settings: SessionSettings,
    page: Option<Box<dyn PageDriver>>,
    history: Vec<ChatMessage>,
    task_state: TaskState,
    current_task: Option<String>,
    state: SessionState,
}

impl Session {
    pub fn new(
        brain: Arc<dyn Brain>,
        launcher: Arc<dyn BrowserLauncher>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(Arc::clone(&brain)),
            analyzer: PageAnalyzer::new(brain),
            executor: ActionExecutor::new(),
            launcher,
            settings,
            page: None,
            history: Vec::new(),
            task_state: TaskState::new(),
            current_task: None,
            state: SessionState::Idle,
        }
    }

    pub fn with_executor(mut self, executor: ActionExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn task_state(&self) -> &TaskState {
        &self.task_state
    }

    pub fn current_task(&self) -> Option<&str> {
        self.current_task.as_deref()
    }

    pub fn has_browser(&self) -> bool {
        self.page.is_some()
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session transition");
        self.state = next;
    }

    /// Terminal states are reported to the caller, then the session rests.
    fn finish(&mut self, outcome: SessionState) -> SessionState {
        self.transition(outcome);
        self.transition(SessionState::Idle);
        outcome
    }

    /// Process one user message to completion.
    ///
    /// Returns the state the message left the session in (`AwaitingUserInfo`,
    /// `Completed` or `Errored`). The only error is a closed transport, after
    /// which the caller should [`shutdown`](Self::shutdown) the session.
    pub async fn handle_message(
        &mut self,
        message: &str,
        events: &EventSender,
    ) -> Result<SessionState> {
        self.transition(SessionState::Classifying);
        self.history.push(ChatMessage::user(message));

        let intent = match self.classifier.classify(message, &self.history).await {
            Ok(intent) => intent,
            Err(e) => {
                error!(error = %e, "intent classification failed");
                self.reply_error(&e, events).await?;
                return Ok(self.finish(SessionState::Errored));
            }
        };
        self.remember_intent(&intent);

        if !intent.can_start() {
            info!(missing = ?intent.missing_info, "waiting for more information");
            self.task_state
                .insert("missing_info".into(), json!(intent.missing_info));
            self.history
                .push(ChatMessage::assistant(&intent.suggested_response));
            emit(
                events,
                ServerEvent::Response(ResponsePayload {
                    missing_info: Some(intent.missing_info.clone()),
                    ..ResponsePayload::text(
                        intent.suggested_response.clone(),
                        ResponseStatus::WaitingForInfo,
                    )
                }),
            )
            .await?;
            self.transition(SessionState::AwaitingUserInfo);
            return Ok(self.state);
        }
        self.task_state.remove("missing_info");

        let task = intent.task_description.clone();
        let start = match self.open_start_page(intent.intent).await {
            Ok(capture) => capture,
            Err(e) => {
                error!(error = %e, "could not open the start page");
                self.reply_error(&e, events).await?;
                return Ok(self.finish(SessionState::Errored));
            }
        };

        let notice = format!("Starting task: {task}. I've opened the browser.");
        self.history.push(ChatMessage::assistant(&notice));
        emit(
            events,
            ServerEvent::Response(ResponsePayload {
                screenshot: Some(start.screenshot),
                url: Some(start.url),
                title: Some(start.title),
                ..ResponsePayload::text(notice, ResponseStatus::InProgress)
            }),
        )
        .await?;

        self.transition(SessionState::Automating);
        let outcome = self.run_automation(&task, events).await?;
        info!(outcome = ?outcome, "task finished");
        Ok(self.finish(outcome))
    }

    fn remember_intent(&mut self, intent: &IntentDecision) {
        self.current_task = Some(intent.task_description.clone());
        self.task_state
            .insert("intent".into(), json!(intent.intent.as_str()));
        self.task_state
            .insert("task_description".into(), json!(intent.task_description));
    }

    async fn reply_error(&mut self, err: &AgentError, events: &EventSender) -> Result<()> {
        let text = format!("I encountered an error: {err}. Please try again.");
        self.history.push(ChatMessage::assistant(&text));
        emit(
            events,
            ServerEvent::Response(ResponsePayload::text(text, ResponseStatus::Error)),
        )
        .await
    }

    /// Launch the browser if needed and load the start page for `intent`.
    async fn open_start_page(&mut self, intent: Intent) -> Result<PageCapture> {
        if self.page.is_none() {
            info!("launching browser for session");
            self.page = Some(self.launcher.launch().await?);
        }
        let page = self
            .page
            .as_deref()
            .ok_or_else(|| AgentError::Browser("Browser page not available.".into()))?;

        let url = self.settings.start_url_for(intent);
        info!(%url, intent = intent.as_str(), "opening start page");
        page.goto(url).await?;
        page.wait_for_load_state(LoadState::NetworkIdle).await?;
        Ok(capture_state(page).await)
    }

    /// Analyze → act until the model reports a terminal status or an action fails.
    async fn run_automation(&mut self, task: &str, events: &EventSender) -> Result<SessionState> {
        let mut steps = 0usize;
        loop {
            if let Some(max) = self.settings.max_steps {
                if steps >= max {
                    warn!(max, "step limit reached");
                    emit(
                        events,
                        ServerEvent::Error {
                            message: format!("Reached maximum step limit ({max})"),
                        },
                    )
                    .await?;
                    return Ok(SessionState::Errored);
                }
            }

            let analysis = self
                .analyzer
                .analyze(self.page.as_deref(), task, &self.task_state)
                .await;
            let decision = analysis.analysis.clone();
            emit(events, ServerEvent::Analysis(analysis)).await?;

            match decision.status {
                DecisionStatus::Complete => return Ok(SessionState::Completed),
                DecisionStatus::Error => return Ok(SessionState::Errored),
                DecisionStatus::Continue => {}
            }

            let outcome = self.executor.execute(self.page.as_deref(), &decision).await;
            steps += 1;
            self.task_state
                .insert("steps_completed".into(), json!(steps));
            self.task_state
                .insert("last_action".into(), json!(decision.description));

            let success = outcome.success;
            emit(events, ServerEvent::ActionResult(outcome)).await?;
            if !success {
                return Ok(SessionState::Errored);
            }
        }
    }

    /// Close the browser (once) and forget the conversation.
    pub async fn shutdown(&mut self) {
        if let Some(mut page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!(error = %e, "error closing browser");
            }
            info!("browser session closed");
        }
        self.history.clear();
        self.task_state.clear();
        self.current_task = None;
        self.state = SessionState::Idle;
    }
}
