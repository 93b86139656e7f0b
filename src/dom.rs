//! JavaScript helpers evaluated inside the page.
//!
//! All functions here are blocking and expect to run on a blocking thread.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use headless_chrome::Tab;

use crate::types::OUTLINE_MAX_CHARS;

/// Attribute set on the element picked by [`mark_by_exact_text`].
pub const TEXT_MATCH_ATTR: &str = "data-agent-text-match";
pub const TEXT_MATCH_SELECTOR: &str = "[data-agent-text-match]";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Produces a compact list of visible interactive elements.
///
/// Non-destructive apart from tagging: each link, button, input, textarea and
/// select gets a `data-eid="eN"` attribute so it can be targeted later with
/// `[data-eid="eN"]`. Tags from a previous outline are cleared first.
const OUTLINE_JS: &str = r#"
(() => {
  document.querySelectorAll('[data-eid]').forEach(el => el.removeAttribute('data-eid'));
  const SKIP = new Set(['SCRIPT','STYLE','NOSCRIPT','SVG','LINK']);
  let id = 0;
  const lines = [];
  const seen = new Set();

  function isVisible(el) {
    if (el.offsetParent === null && el.tagName !== 'BODY' && el.tagName !== 'HTML') return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0';
  }

  function walk(node, depth) {
    if (depth > 15) return;
    for (const child of node.children) {
      if (SKIP.has(child.tagName)) continue;
      if (!isVisible(child)) continue;
      const tag = child.tagName.toLowerCase();
      if (['a','button','input','textarea','select'].includes(tag)) {
        const eid = 'e' + (id++);
        child.setAttribute('data-eid', eid);
        const text = (child.textContent || '').trim().replace(/\s+/g, ' ').slice(0, 60);
        let desc = '[' + eid + '] ';
        if (tag === 'a') {
          desc += 'link "' + text + '"';
        } else if (tag === 'button') {
          desc += 'button "' + text + '"';
        } else if (tag === 'select') {
          desc += 'select [' + [...child.options].map(o => o.text.trim().slice(0, 20)).join('|') + ']';
        } else {
          desc += tag + ' type=' + (child.type || 'text');
          if (child.placeholder) desc += ' placeholder="' + child.placeholder + '"';
          if (child.name) desc += ' name=' + child.name;
          if (child.getAttribute('aria-label')) desc += ' label="' + child.getAttribute('aria-label') + '"';
        }
        if (!seen.has(desc)) {
          seen.add(desc);
          lines.push(desc);
        }
      }
      walk(child, depth + 1);
    }
  }

  if (document.body) walk(document.body, 0);
  return lines.join('\n');
})()
"#;

/// Tags the first element, in document order, whose normalized visible text
/// equals the target. Among nested matches the innermost one is chosen.
const MARK_BY_TEXT_JS: &str = r#"
((target) => {
  const ATTR = 'data-agent-text-match';
  document.querySelectorAll('[' + ATTR + ']').forEach(el => el.removeAttribute(ATTR));
  const norm = s => (s || '').replace(/\s+/g, ' ').trim();
  const textOf = el => (el.tagName === 'INPUT' && ['submit', 'button'].includes(el.type))
    ? norm(el.value)
    : norm(el.innerText);
  const want = norm(target);
  if (!want || !document.body) return false;
  for (const el of document.body.querySelectorAll('*')) {
    if (['SCRIPT', 'STYLE', 'NOSCRIPT'].includes(el.tagName)) continue;
    if (textOf(el) !== want) continue;
    if ([...el.children].some(c => textOf(c) === want)) continue;
    el.setAttribute(ATTR, '1');
    return true;
  }
  return false;
})
"#;

fn evaluate_string(tab: &Arc<Tab>, js: &str) -> Result<Option<String>> {
    let result = tab.evaluate(js, false)?;
    Ok(result.value.and_then(|v| v.as_str().map(String::from)))
}

/// Capture the interactive-element outline, truncated on a char boundary.
pub fn capture_outline(tab: &Arc<Tab>) -> Result<String> {
    let raw = evaluate_string(tab, OUTLINE_JS)?.unwrap_or_default();
    let total = raw.chars().count();
    if total > OUTLINE_MAX_CHARS {
        let head: String = raw.chars().take(OUTLINE_MAX_CHARS).collect();
        Ok(format!("{head}\n... [truncated, {total} total chars]"))
    } else {
        Ok(raw)
    }
}

/// Get the current page URL.
pub fn get_current_url(tab: &Arc<Tab>) -> Result<String> {
    Ok(evaluate_string(tab, "window.location.href")?.unwrap_or_else(|| tab.get_url()))
}

/// Get the current page title.
pub fn get_page_title(tab: &Arc<Tab>) -> Result<String> {
    Ok(evaluate_string(tab, "document.title")?.unwrap_or_default())
}

pub fn ready_state(tab: &Arc<Tab>) -> Result<String> {
    Ok(evaluate_string(tab, "document.readyState")?.unwrap_or_default())
}

/// Call `check` every [`POLL_INTERVAL`] until it returns true or `timeout`
/// runs out. `Ok(false)` means the deadline passed.
pub fn poll_until(timeout: Duration, mut check: impl FnMut() -> Result<bool>) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if check()? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Poll `document.readyState` until `accept` says yes or the deadline passes.
pub fn wait_for_ready_state(
    tab: &Arc<Tab>,
    timeout: Duration,
    accept: impl Fn(&str) -> bool,
) -> Result<()> {
    // Evaluation fails transiently while a navigation swaps documents.
    let ready = poll_until(timeout, || Ok(ready_state(tab).is_ok_and(|s| accept(&s))))?;
    if !ready {
        bail!("timed out after {}ms waiting for page load", timeout.as_millis());
    }
    Ok(())
}

/// Tag the element whose visible text equals `text`, retrying until `timeout`.
pub fn mark_by_exact_text(tab: &Arc<Tab>, text: &str, timeout: Duration) -> Result<()> {
    let literal = serde_json::to_string(text)?;
    let js = format!("{MARK_BY_TEXT_JS}({literal})");
    let found = poll_until(timeout, || {
        Ok(tab
            .evaluate(&js, false)?
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    })?;
    if !found {
        bail!("no element with text \"{text}\" within {}ms", timeout.as_millis());
    }
    Ok(())
}

/// Empty a form control's value and notify listeners.
pub fn clear_value(tab: &Arc<Tab>, selector: &str) -> Result<()> {
    let literal = serde_json::to_string(selector)?;
    tab.evaluate(
        &format!(
            "(() => {{ const el = document.querySelector({literal}); \
             if (el && 'value' in el) {{ el.value = ''; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); }} }})()"
        ),
        false,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_match_selector_names_the_attribute() {
        assert_eq!(TEXT_MATCH_SELECTOR, format!("[{TEXT_MATCH_ATTR}]"));
        assert!(MARK_BY_TEXT_JS.contains(TEXT_MATCH_ATTR));
    }

    #[test]
    fn poll_stops_at_the_deadline() {
        let timeout = Duration::from_millis(250);
        let mut calls = 0;
        let started = Instant::now();
        let found = poll_until(timeout, || {
            calls += 1;
            Ok(false)
        })
        .unwrap();
        let elapsed = started.elapsed();
        assert!(!found);
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout * 2, "{elapsed:?}");
        assert!(calls >= 2);
    }

    #[test]
    fn poll_returns_as_soon_as_check_passes() {
        let mut calls = 0;
        let found = poll_until(Duration::from_secs(5), || {
            calls += 1;
            Ok(calls == 3)
        })
        .unwrap();
        assert!(found);
        assert_eq!(calls, 3);
    }

    #[test]
    fn poll_propagates_check_errors() {
        let result = poll_until(Duration::from_secs(5), || bail!("tab crashed"));
        assert!(result.unwrap_err().to_string().contains("tab crashed"));
    }

    #[test]
    fn text_literal_is_escaped_for_js() {
        let literal = serde_json::to_string("Say \"hi\"\n").unwrap();
        assert_eq!(literal, r#""Say \"hi\"\n""#);
    }
}
