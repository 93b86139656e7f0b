use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ActionError;
use crate::hands::{PageCapture, PageDriver, capture_state};
use crate::types::{
    ActionKind, ActionOutcome, CLICK_TIMEOUT, Decision, LoadState, WAIT_ACTION_DELAY,
};

/// Ways of finding the element a click decision points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorStrategy {
    /// Treat the target as a CSS selector.
    Selector,
    /// Treat the target as the element's exact visible text.
    ExactText,
}

/// Tried in order until one succeeds.
pub const CLICK_STRATEGIES: [LocatorStrategy; 2] =
    [LocatorStrategy::Selector, LocatorStrategy::ExactText];

/// Carries out one decision against the page and reports what happened.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    click_timeout: Duration,
    wait_delay: Duration,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self {
            click_timeout: CLICK_TIMEOUT,
            wait_delay: WAIT_ACTION_DELAY,
        }
    }
}

fn required<'a>(
    field: &'a Option<String>,
    action: &'static str,
    param: &'static str,
) -> Result<&'a str, ActionError> {
    field
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ActionError::MissingParameter { action, param })
}

impl ActionExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wait_delay(mut self, delay: Duration) -> Self {
        self.wait_delay = delay;
        self
    }

    /// Never fails: every error becomes an unsuccessful outcome carrying a
    /// fresh capture of the page.
    pub async fn execute(&self, page: Option<&dyn PageDriver>, decision: &Decision) -> ActionOutcome {
        let Some(page) = page else {
            return ActionOutcome {
                success: false,
                description: "Browser page not available.".to_string(),
                ..Default::default()
            };
        };

        let result = self.perform(page, decision).await;
        if let Err(e) = page.wait_for_load_state(LoadState::DomContentLoaded).await {
            debug!(error = %e, "page did not settle after action");
        }
        let PageCapture {
            screenshot,
            url,
            title,
        } = capture_state(page).await;

        let (success, description) = match result {
            Ok(()) => {
                let description = if decision.description.trim().is_empty() {
                    "Action completed successfully".to_string()
                } else {
                    decision.description.clone()
                };
                (true, description)
            }
            Err(e) => {
                warn!(action = ?decision.action, error = %e, "action failed");
                (false, format!("Action failed: {e}"))
            }
        };

        ActionOutcome {
            success,
            description,
            screenshot,
            url,
            title,
        }
    }

    async fn perform(&self, page: &dyn PageDriver, decision: &Decision) -> Result<(), ActionError> {
        match decision.action {
            ActionKind::Navigate => {
                let url = required(&decision.value, "navigate", "value")?;
                info!(url, "navigating");
                page.goto(url).await?;
                page.wait_for_load_state(LoadState::NetworkIdle).await?;
            }
            ActionKind::Click => {
                let target = required(&decision.target, "click", "target")?;
                self.click(page, target).await?;
            }
            ActionKind::Type => {
                let target = required(&decision.target, "type", "target")?;
                let value = decision
                    .value
                    .as_deref()
                    .ok_or(ActionError::MissingParameter {
                        action: "type",
                        param: "value",
                    })?;
                info!(selector = target, chars = value.chars().count(), "typing");
                page.fill(target, value).await?;
            }
            ActionKind::Wait => tokio::time::sleep(self.wait_delay).await,
            ActionKind::Complete | ActionKind::Error => {}
        }
        Ok(())
    }

    /// Walk [`CLICK_STRATEGIES`] and report which one landed.
    pub async fn click(
        &self,
        page: &dyn PageDriver,
        target: &str,
    ) -> Result<LocatorStrategy, ActionError> {
        let mut last_error = String::new();
        for strategy in CLICK_STRATEGIES {
            let attempt = match strategy {
                LocatorStrategy::Selector => page.click(target, self.click_timeout).await,
                LocatorStrategy::ExactText => page.click_by_text(target, self.click_timeout).await,
            };
            match attempt {
                Ok(()) => {
                    info!(locator = target, ?strategy, "clicked");
                    return Ok(strategy);
                }
                Err(e) => {
                    warn!(locator = target, ?strategy, error = %e, "click attempt failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(ActionError::LocatorExhausted {
            target: target.to_string(),
            last_error,
        })
    }
}
