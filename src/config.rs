use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::brain::{DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_MODEL};
use crate::error::{AgentError, Result};
use crate::types::{DEFAULT_MAX_STEPS, Intent};

pub const DEFAULT_START_URL: &str = "https://www.google.com";
pub const DEFAULT_EMAIL_START_URL: &str = "https://mail.google.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Gemini,
    Openai,
}

impl Provider {
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Openai => "OPENAI_API_KEY",
        }
    }
}

/// Command-line and environment configuration for the agent server.
#[derive(Debug, Clone, Parser)]
#[command(name = "agent", about = "Drive a real browser from a chat window")]
pub struct AgentConfig {
    #[arg(long, env = "AGENT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "AGENT_PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "AGENT_PROVIDER", value_enum, default_value_t = Provider::Gemini)]
    pub provider: Provider,

    /// Model name; defaults depend on the provider.
    #[arg(long, env = "AGENT_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "AGENT_HEADLESS", default_value_t = false)]
    pub headless: bool,

    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    #[arg(long, default_value_t = 1280)]
    pub window_width: u32,

    #[arg(long, default_value_t = 720)]
    pub window_height: u32,

    /// Maximum actions per task; 0 disables the cap.
    #[arg(long, env = "AGENT_MAX_STEPS", default_value_t = DEFAULT_MAX_STEPS)]
    pub max_steps: usize,

    #[arg(long, env = "AGENT_START_URL", default_value = DEFAULT_START_URL)]
    pub start_url: String,

    #[arg(long, env = "AGENT_EMAIL_START_URL", default_value = DEFAULT_EMAIL_START_URL)]
    pub email_start_url: String,
}

impl AgentConfig {
    pub fn model_name(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model.as_str(),
            (None, Provider::Gemini) => DEFAULT_GEMINI_MODEL,
            (None, Provider::Openai) => DEFAULT_OPENAI_MODEL,
        }
    }

    pub fn api_key(&self) -> Result<String> {
        let var = self.provider.api_key_var();
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(AgentError::Config(format!("{var} not set in environment"))),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn launch(&self) -> LaunchConfig {
        LaunchConfig {
            headless: self.headless,
            chrome_path: self.chrome_path.clone(),
            window_width: self.window_width,
            window_height: self.window_height,
        }
    }

    pub fn session(&self) -> SessionSettings {
        SessionSettings {
            start_url: self.start_url.clone(),
            email_start_url: self.email_start_url.clone(),
            max_steps: (self.max_steps > 0).then_some(self.max_steps),
        }
    }
}

/// How Chrome is launched for each connection.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            window_width: 1280,
            window_height: 720,
        }
    }
}

/// Per-connection loop settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub start_url: String,
    pub email_start_url: String,
    pub max_steps: Option<usize>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            start_url: DEFAULT_START_URL.to_string(),
            email_start_url: DEFAULT_EMAIL_START_URL.to_string(),
            max_steps: Some(DEFAULT_MAX_STEPS),
        }
    }
}

impl SessionSettings {
    /// Webmail for email tasks, the search page for everything else.
    pub fn start_url_for(&self, intent: Intent) -> &str {
        match intent {
            Intent::Email => &self.email_start_url,
            _ => &self.start_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_arguments() {
        let config = AgentConfig::try_parse_from(["agent"]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.model_name(), DEFAULT_GEMINI_MODEL);
        assert_eq!(config.session().max_steps, Some(DEFAULT_MAX_STEPS));
    }

    #[test]
    fn zero_max_steps_disables_cap() {
        let config =
            AgentConfig::try_parse_from(["agent", "--max-steps", "0", "--provider", "openai"])
                .unwrap();
        assert_eq!(config.session().max_steps, None);
        assert_eq!(config.model_name(), DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn start_page_depends_only_on_email_intent() {
        let settings = SessionSettings::default();
        assert_eq!(settings.start_url_for(Intent::Email), DEFAULT_EMAIL_START_URL);
        for intent in [Intent::Search, Intent::Navigate, Intent::Form, Intent::Other] {
            assert_eq!(settings.start_url_for(intent), DEFAULT_START_URL);
        }
    }
}
