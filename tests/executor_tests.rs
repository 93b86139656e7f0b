use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use browser_control_agent::executor::{ActionExecutor, LocatorStrategy};
use browser_control_agent::mock::{MockPage, PageCall};
use browser_control_agent::types::{ActionKind, Decision, DecisionStatus, LoadState};
use tracing_subscriber::fmt::MakeWriter;

fn decision(action: ActionKind, target: Option<&str>, value: Option<&str>) -> Decision {
    Decision {
        action,
        target: target.map(String::from),
        value: value.map(String::from),
        description: format!("{action:?}"),
        status: DecisionStatus::Continue,
        missing_info: vec![],
    }
}

fn executor() -> ActionExecutor {
    ActionExecutor::new().with_wait_delay(Duration::ZERO)
}

#[tokio::test]
async fn click_falls_back_to_exact_text() {
    let page = MockPage::new()
        .with_missing_selector("Sign in")
        .with_text("Sign in");
    let log = page.log();

    let outcome = executor()
        .execute(Some(&page), &decision(ActionKind::Click, Some("Sign in"), None))
        .await;

    assert!(outcome.success, "{}", outcome.description);
    assert_eq!(
        log.lock().unwrap().interactions(),
        vec![
            PageCall::Click("Sign in".into()),
            PageCall::ClickByText("Sign in".into()),
        ]
    );
}

#[tokio::test]
async fn click_uses_selector_when_it_matches() {
    let page = MockPage::new();
    let strategy = executor().click(&page, "#submit").await.unwrap();
    assert_eq!(strategy, LocatorStrategy::Selector);
    assert_eq!(
        page.log().lock().unwrap().interactions(),
        vec![PageCall::Click("#submit".into())]
    );
}

#[tokio::test]
async fn click_reports_underlying_error_when_all_strategies_fail() {
    let page = MockPage::new().with_missing_selector("#nope");

    let outcome = executor()
        .execute(Some(&page), &decision(ActionKind::Click, Some("#nope"), None))
        .await;

    assert!(!outcome.success);
    assert!(outcome.description.starts_with("Action failed:"));
    assert!(outcome.description.contains("no element with text \"#nope\""));
}

#[tokio::test]
async fn navigate_without_url_never_touches_the_browser() {
    let page = MockPage::new();
    let log = page.log();

    for value in [None, Some("")] {
        let outcome = executor()
            .execute(Some(&page), &decision(ActionKind::Navigate, None, value))
            .await;
        assert!(!outcome.success);
        assert!(outcome.description.contains("'value'"));
    }
    assert!(log.lock().unwrap().interactions().is_empty());
}

#[tokio::test]
async fn navigate_waits_for_network_idle() {
    let page = MockPage::new();
    let log = page.log();

    let outcome = executor()
        .execute(
            Some(&page),
            &decision(ActionKind::Navigate, None, Some("https://example.com")),
        )
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.url, "https://example.com");
    let calls = log.lock().unwrap().calls.clone();
    let goto = calls
        .iter()
        .position(|c| *c == PageCall::Goto("https://example.com".into()))
        .unwrap();
    assert_eq!(calls[goto + 1], PageCall::WaitFor(LoadState::NetworkIdle));
    assert_eq!(calls[goto + 2], PageCall::WaitFor(LoadState::DomContentLoaded));
}

#[tokio::test]
async fn failed_action_still_recaptures_the_page() {
    let page = MockPage::new()
        .with_title("Login")
        .failing_navigation();

    let outcome = executor()
        .execute(
            Some(&page),
            &decision(ActionKind::Navigate, None, Some("https://unreachable.invalid")),
        )
        .await;

    assert!(!outcome.success);
    assert!(outcome.description.contains("ERR_NAME_NOT_RESOLVED"));
    assert!(!outcome.screenshot.is_empty());
    assert_eq!(outcome.title, "Login");
    assert_eq!(outcome.url, "about:blank");
}

#[tokio::test]
async fn type_accepts_empty_value_but_not_missing_one() {
    let page = MockPage::new();

    let cleared = executor()
        .execute(Some(&page), &decision(ActionKind::Type, Some("#q"), Some("")))
        .await;
    assert!(cleared.success);

    let missing = executor()
        .execute(Some(&page), &decision(ActionKind::Type, Some("#q"), None))
        .await;
    assert!(!missing.success);

    assert_eq!(
        page.log().lock().unwrap().interactions(),
        vec![PageCall::Fill("#q".into(), String::new())]
    );
}

#[tokio::test]
async fn type_into_missing_element_fails() {
    let page = MockPage::new().with_missing_selector("#ghost");
    let outcome = executor()
        .execute(Some(&page), &decision(ActionKind::Type, Some("#ghost"), Some("hi")))
        .await;
    assert!(!outcome.success);
    assert!(outcome.description.contains("#ghost"));
}

#[tokio::test]
async fn wait_does_not_interact_with_the_page() {
    let page = MockPage::new();
    let outcome = executor()
        .execute(Some(&page), &decision(ActionKind::Wait, None, None))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.description, "Wait");
    assert!(page.log().lock().unwrap().interactions().is_empty());
}

#[tokio::test]
async fn blank_description_gets_default_text() {
    let page = MockPage::new();
    let mut wait = decision(ActionKind::Wait, None, None);
    wait.description.clear();
    let outcome = executor().execute(Some(&page), &wait).await;
    assert_eq!(outcome.description, "Action completed successfully");
}

#[tokio::test]
async fn missing_page_is_a_structured_failure() {
    let outcome = executor()
        .execute(None, &decision(ActionKind::Click, Some("#a"), None))
        .await;
    assert!(!outcome.success);
    assert_eq!(outcome.description, "Browser page not available.");
    assert!(outcome.screenshot.is_empty());
    assert!(outcome.url.is_empty());
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn typed_values_stay_out_of_the_logs() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let page = MockPage::new();
    let outcome = executor()
        .execute(
            Some(&page),
            &decision(ActionKind::Type, Some("#password"), Some("hunter2")),
        )
        .await;

    assert!(outcome.success);
    let output = logs.text();
    assert!(output.contains("#password"), "{output}");
    assert!(!output.contains("hunter2"), "{output}");
}
