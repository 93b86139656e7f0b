use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model error: {0}")]
    Brain(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport connection closed")]
    TransportClosed,
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Why a single browser action could not be carried out.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{action} action requires a non-empty '{param}'")]
    MissingParameter {
        action: &'static str,
        param: &'static str,
    },

    #[error("{0}")]
    Browser(String),

    #[error("no locator strategy matched '{target}': {last_error}")]
    LocatorExhausted { target: String, last_error: String },
}

impl From<AgentError> for ActionError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Browser(msg) => ActionError::Browser(msg),
            other => ActionError::Browser(other.to_string()),
        }
    }
}
