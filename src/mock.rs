//! In-memory stand-ins for the model and the browser, for deterministic tests.
//!
//! Neither double touches the network or spawns a process. Both record what
//! they were asked to do so tests can assert on it afterwards.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::brain::Brain;
use crate::error::{AgentError, Result};
use crate::hands::{BrowserLauncher, PageDriver};
use crate::types::LoadState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A prompt the mock brain received.
#[derive(Debug, Clone)]
pub struct RecordedPrompt {
    pub prompt: String,
    pub had_image: bool,
}

/// Returns queued replies in order; errors once the queue runs dry.
#[derive(Default)]
pub struct MockBrain {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    pub prompts: Arc<Mutex<Vec<RecordedPrompt>>>,
}

impl MockBrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Ok(text.into()));
        self
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Err(message.into()));
        self
    }

    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        lock(&self.prompts).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl Brain for MockBrain {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str, image: Option<&[u8]>) -> Result<String> {
        lock(&self.prompts).push(RecordedPrompt {
            prompt: prompt.to_string(),
            had_image: image.is_some_and(|b| !b.is_empty()),
        });
        match lock(&self.replies).pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(AgentError::Brain(message)),
            None => Err(AgentError::Brain("mock brain has no more replies".into())),
        }
    }
}

/// A browser call observed by [`MockPage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCall {
    Goto(String),
    WaitFor(LoadState),
    Click(String),
    ClickByText(String),
    Fill(String, String),
    Screenshot,
    Url,
    Title,
    Outline,
}

#[derive(Debug, Default)]
pub struct PageLog {
    pub calls: Vec<PageCall>,
    pub closes: usize,
}

impl PageLog {
    /// Calls that change the page, ignoring reads and waits.
    pub fn interactions(&self) -> Vec<PageCall> {
        self.calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    PageCall::Goto(_)
                        | PageCall::Click(_)
                        | PageCall::ClickByText(_)
                        | PageCall::Fill(..)
                )
            })
            .cloned()
            .collect()
    }
}

/// Scriptable page: selectors exist unless marked missing, visible texts
/// must be registered to be clickable by text.
pub struct MockPage {
    log: Arc<Mutex<PageLog>>,
    url: Mutex<String>,
    title: String,
    screenshot: Vec<u8>,
    missing_selectors: HashSet<String>,
    texts: HashSet<String>,
    fail_navigation: bool,
    fail_screenshot: bool,
}

impl Default for MockPage {
    fn default() -> Self {
        Self {
            log: Arc::default(),
            url: Mutex::new("about:blank".to_string()),
            title: "Mock Page".to_string(),
            screenshot: vec![0x89, b'P', b'N', b'G'],
            missing_selectors: HashSet::new(),
            texts: HashSet::new(),
            fail_navigation: false,
            fail_screenshot: false,
        }
    }
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_missing_selector(mut self, selector: impl Into<String>) -> Self {
        self.missing_selectors.insert(selector.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.texts.insert(text.into());
        self
    }

    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    pub fn failing_screenshot(mut self) -> Self {
        self.fail_screenshot = true;
        self
    }

    /// Shared handle to the call log; stays valid after the page is boxed.
    pub fn log(&self) -> Arc<Mutex<PageLog>> {
        Arc::clone(&self.log)
    }

    fn record(&self, call: PageCall) {
        lock(&self.log).calls.push(call);
    }

    fn ensure_open(&self) -> Result<()> {
        if lock(&self.log).closes > 0 {
            return Err(AgentError::Browser("Browser page not available.".into()));
        }
        Ok(())
    }

    fn find(&self, selector: &str, timeout: Duration) -> Result<()> {
        if self.missing_selectors.contains(selector) {
            return Err(AgentError::Browser(format!(
                "Timeout {}ms exceeded waiting for selector \"{selector}\"",
                timeout.as_millis()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.ensure_open()?;
        self.record(PageCall::Goto(url.to_string()));
        if self.fail_navigation {
            return Err(AgentError::Browser(format!("net::ERR_NAME_NOT_RESOLVED at {url}")));
        }
        *lock(&self.url) = url.to_string();
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState) -> Result<()> {
        self.ensure_open()?;
        self.record(PageCall::WaitFor(state));
        Ok(())
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        self.record(PageCall::Click(selector.to_string()));
        self.find(selector, timeout)
    }

    async fn click_by_text(&self, text: &str, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        self.record(PageCall::ClickByText(text.to_string()));
        if self.texts.contains(text) {
            Ok(())
        } else {
            Err(AgentError::Browser(format!(
                "no element with text \"{text}\" within {}ms",
                timeout.as_millis()
            )))
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.ensure_open()?;
        self.record(PageCall::Fill(selector.to_string(), value.to_string()));
        self.find(selector, Duration::from_secs(5))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.record(PageCall::Screenshot);
        if self.fail_screenshot {
            return Err(AgentError::Browser("screenshot failed".into()));
        }
        Ok(self.screenshot.clone())
    }

    async fn url(&self) -> Result<String> {
        self.ensure_open()?;
        self.record(PageCall::Url);
        Ok(lock(&self.url).clone())
    }

    async fn title(&self) -> Result<String> {
        self.ensure_open()?;
        self.record(PageCall::Title);
        Ok(self.title.clone())
    }

    async fn outline(&self) -> Result<String> {
        self.ensure_open()?;
        self.record(PageCall::Outline);
        Ok("[e0] input type=text name=q".to_string())
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.log).closes += 1;
        Ok(())
    }
}

/// Hands out one prepared [`MockPage`] and counts launches.
pub struct MockLauncher {
    page: Mutex<Option<MockPage>>,
    failure: Option<String>,
    pub launches: Arc<AtomicUsize>,
}

impl MockLauncher {
    pub fn new(page: MockPage) -> Self {
        Self {
            page: Mutex::new(Some(page)),
            failure: None,
            launches: Arc::default(),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            page: Mutex::new(None),
            failure: Some(message.into()),
            launches: Arc::default(),
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(AgentError::Browser(message.clone()));
        }
        let page = lock(&self.page)
            .take()
            .ok_or_else(|| AgentError::Browser("mock page already launched".into()))?;
        Ok(Box::new(page))
    }
}
