//! Browser control: the page-level primitives the agent loop consumes and a
//! Chrome implementation of them on top of `headless_chrome`.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info, warn};

use crate::config::LaunchConfig;
use crate::dom;
use crate::error::{AgentError, Result};
use crate::types::{LoadState, Screenshot};

/// Upper bound on any single load-state wait.
const LOAD_STATE_TIMEOUT: Duration = Duration::from_secs(30);
/// Quiet period treated as "network idle" once the document is complete.
const NETWORK_QUIET: Duration = Duration::from_millis(500);
const FILL_TIMEOUT: Duration = Duration::from_secs(5);

/// One live page the agent can drive.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn wait_for_load_state(&self, state: LoadState) -> Result<()>;
    /// Click the first element matching a CSS selector.
    async fn click(&self, selector: &str, timeout: Duration) -> Result<()>;
    /// Click the first element whose visible text equals `text`.
    async fn click_by_text(&self, text: &str, timeout: Duration) -> Result<()>;
    /// Replace the value of a form control.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;
    /// PNG of the visible viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;
    async fn url(&self) -> Result<String>;
    async fn title(&self) -> Result<String>;
    /// Text listing of interactive elements, see [`dom::capture_outline`].
    async fn outline(&self) -> Result<String>;
    /// Release the page and its browser. Calling it twice is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Creates the browser for a session on first use.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>>;
}

/// Screenshot, URL and title captured together.
#[derive(Debug, Clone, Default)]
pub struct PageCapture {
    pub screenshot: Screenshot,
    pub url: String,
    pub title: String,
}

/// Best-effort capture: each failing piece comes back empty.
pub async fn capture_state(page: &dyn PageDriver) -> PageCapture {
    let screenshot = page.screenshot().await.unwrap_or_else(|e| {
        warn!(error = %e, "failed to take screenshot");
        Vec::new()
    });
    let url = page.url().await.unwrap_or_default();
    let title = page.title().await.unwrap_or_default();
    PageCapture {
        screenshot: Screenshot(screenshot),
        url,
        title,
    }
}

/// A Chrome process with one active tab, owned by a single connection.
pub struct BrowserSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(config: &LaunchConfig) -> Result<Self> {
        let options = LaunchOptions {
            headless: config.headless,
            sandbox: false,
            path: config.chrome_path.clone(),
            window_size: Some((config.window_width, config.window_height)),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
            ],
            // Chat sessions can sit idle for a long time between messages.
            idle_browser_timeout: Duration::from_secs(60 * 60),
            ..Default::default()
        };

        info!(headless = config.headless, "starting Chrome");
        let browser = Browser::new(options)
            .map_err(|e| AgentError::Browser(format!("Browser launch failed: {e:#}")))?;
        let tab = browser
            .new_tab()
            .map_err(|e| AgentError::Browser(format!("Failed to create tab: {e:#}")))?;
        info!("Chrome ready");

        Ok(Self {
            browser: Some(browser),
            tab,
        })
    }

    /// Run a blocking tab operation off the async runtime.
    async fn with_tab<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Arc<Tab>) -> anyhow::Result<T> + Send + 'static,
    {
        if self.browser.is_none() {
            return Err(AgentError::Browser("Browser page not available.".into()));
        }
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || op(&tab))
            .await
            .map_err(|e| AgentError::Browser(format!("browser task panicked: {e}")))?
            .map_err(|e| AgentError::Browser(format!("{e:#}")))
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn goto(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        debug!(%url, "navigating");
        self.with_tab(move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn wait_for_load_state(&self, state: LoadState) -> Result<()> {
        self.with_tab(move |tab| match state {
            LoadState::DomContentLoaded => {
                dom::wait_for_ready_state(tab, LOAD_STATE_TIMEOUT, |s| s != "loading")
            }
            LoadState::NetworkIdle => {
                dom::wait_for_ready_state(tab, LOAD_STATE_TIMEOUT, |s| s == "complete")?;
                std::thread::sleep(NETWORK_QUIET);
                Ok(())
            }
        })
        .await
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)?
                .click()?;
            Ok(())
        })
        .await
    }

    async fn click_by_text(&self, text: &str, timeout: Duration) -> Result<()> {
        let text = text.to_string();
        self.with_tab(move |tab| {
            // The marking poll spends the whole per-attempt timeout.
            dom::mark_by_exact_text(tab, &text, timeout)?;
            tab.find_element(dom::TEXT_MATCH_SELECTOR)?.click()?;
            Ok(())
        })
        .await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let selector = selector.to_string();
        let value = value.to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, FILL_TIMEOUT)?
                .click()?;
            dom::clear_value(tab, &selector)?;
            if !value.is_empty() {
                tab.type_str(&value)?;
            }
            Ok(())
        })
        .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.with_tab(|tab| {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .await
    }

    async fn url(&self) -> Result<String> {
        self.with_tab(|tab| dom::get_current_url(tab)).await
    }

    async fn title(&self) -> Result<String> {
        self.with_tab(|tab| dom::get_page_title(tab)).await
    }

    async fn outline(&self) -> Result<String> {
        self.with_tab(|tab| dom::capture_outline(tab)).await
    }

    async fn close(&mut self) -> Result<()> {
        let Some(browser) = self.browser.take() else {
            return Ok(());
        };
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.close(false) {
                debug!(error = %e, "tab close failed, dropping browser anyway");
            }
            // Dropping the Browser terminates the Chrome process.
            drop(browser);
        })
        .await
        .map_err(|e| AgentError::Browser(format!("browser shutdown panicked: {e}")))?;
        info!("browser closed");
        Ok(())
    }
}

/// Launches a fresh Chrome for every session.
pub struct ChromeLauncher {
    config: LaunchConfig,
}

impl ChromeLauncher {
    pub fn new(config: LaunchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>> {
        let config = self.config.clone();
        let session = tokio::task::spawn_blocking(move || BrowserSession::launch(&config))
            .await
            .map_err(|e| AgentError::Browser(format!("Browser launch panicked: {e}")))??;
        Ok(Box::new(session))
    }
}
