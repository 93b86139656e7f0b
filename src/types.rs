use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of trailing history entries shown to the intent classifier.
pub const HISTORY_WINDOW: usize = 5;
/// Per-attempt timeout for each click locator strategy.
pub const CLICK_TIMEOUT: Duration = Duration::from_millis(3000);
/// Pause performed by the `wait` action.
pub const WAIT_ACTION_DELAY: Duration = Duration::from_secs(2);
pub const OUTLINE_MAX_CHARS: usize = 4000;
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Who authored a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A message in the per-connection conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Free-form facts gathered about the task in progress.
pub type TaskState = serde_json::Map<String, serde_json::Value>;

/// Raw image bytes, carried as a base64 string on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screenshot(pub Vec<u8>);

impl Screenshot {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

impl From<Vec<u8>> for Screenshot {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for Screenshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Screenshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Treats an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The browser operation a decision asks for.
///
/// Unrecognised actions decode as `Wait`, so the rest of the reply still
/// counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ActionKind {
    Click,
    Type,
    Navigate,
    #[default]
    Wait,
    Complete,
    Error,
}

impl From<String> for ActionKind {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "click" => ActionKind::Click,
            "type" => ActionKind::Type,
            "navigate" => ActionKind::Navigate,
            "complete" => ActionKind::Complete,
            "error" => ActionKind::Error,
            _ => ActionKind::Wait,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum DecisionStatus {
    #[default]
    Continue,
    Complete,
    Error,
}

impl From<String> for DecisionStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "complete" => DecisionStatus::Complete,
            "error" => DecisionStatus::Error,
            _ => DecisionStatus::Continue,
        }
    }
}

/// The model's proposal for the next step, produced fresh every cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDecision")]
pub struct Decision {
    pub action: ActionKind,
    /// Element locator: a CSS selector or the element's visible text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub description: String,
    pub status: DecisionStatus,
    pub missing_info: Vec<String>,
}

/// Wire form of [`Decision`]; older replies use `element_selector` and
/// `needs_info`, sometimes next to the current names.
#[derive(Deserialize)]
struct RawDecision {
    #[serde(default, deserialize_with = "null_as_default")]
    action: ActionKind,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    element_selector: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    status: DecisionStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    missing_info: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    needs_info: Vec<String>,
}

impl From<RawDecision> for Decision {
    fn from(raw: RawDecision) -> Self {
        let missing_info = if raw.missing_info.is_empty() {
            raw.needs_info
        } else {
            raw.missing_info
        };
        Self {
            action: raw.action,
            target: raw.target.or(raw.element_selector),
            value: raw.value,
            description: raw.description,
            status: raw.status,
            missing_info,
        }
    }
}

impl Decision {
    /// Used whenever the model's reply cannot be decoded.
    pub fn fallback() -> Self {
        Self {
            action: ActionKind::Wait,
            description: "Analyzing page...".to_string(),
            status: DecisionStatus::Continue,
            ..Default::default()
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            action: ActionKind::Error,
            description: description.into(),
            status: DecisionStatus::Error,
            ..Default::default()
        }
    }
}

/// Coarse task category reported by the intent classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Intent {
    Email,
    Search,
    Navigate,
    Form,
    #[default]
    Other,
}

impl From<String> for Intent {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "email" => Intent::Email,
            "search" => Intent::Search,
            "navigate" => Intent::Navigate,
            "form" => Intent::Form,
            _ => Intent::Other,
        }
    }
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Email => "email",
            Intent::Search => "search",
            Intent::Navigate => "navigate",
            Intent::Form => "form",
            Intent::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    #[serde(default, deserialize_with = "null_as_default")]
    pub intent: Intent,
    #[serde(default, deserialize_with = "null_as_default")]
    pub task_description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub missing_info: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ready_to_start: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub suggested_response: String,
}

impl IntentDecision {
    pub const CLARIFYING_PROMPT: &'static str = "I understand you want me to help with browser automation. Could you provide more specific details?";

    /// Safe default used when the classification reply is unreadable.
    pub fn fallback(message: &str) -> Self {
        Self {
            intent: Intent::Other,
            task_description: message.to_string(),
            missing_info: Vec::new(),
            ready_to_start: false,
            suggested_response: Self::CLARIFYING_PROMPT.to_string(),
        }
    }

    pub fn can_start(&self) -> bool {
        self.ready_to_start && self.missing_info.is_empty()
    }
}

/// Result of executing one decision against the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub description: String,
    pub screenshot: Screenshot,
    pub url: String,
    pub title: String,
}

/// A decision together with the page state it was made from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub analysis: Decision,
    pub screenshot: Screenshot,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    WaitingForInfo,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Screenshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_info: Option<Vec<String>>,
}

impl ResponsePayload {
    pub fn text(response: impl Into<String>, status: ResponseStatus) -> Self {
        Self {
            response: response.into(),
            screenshot: None,
            url: None,
            title: None,
            status,
            missing_info: None,
        }
    }
}

/// Events streamed to the client over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Response(ResponsePayload),
    Analysis(PageAnalysis),
    ActionResult(ActionOutcome),
    Error { message: String },
}

/// Frame sent by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub message: String,
}

/// Page readiness conditions a driver can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    NetworkIdle,
}
