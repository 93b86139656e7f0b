//! Lenient decoding of JSON objects embedded in free-form model replies.
//!
//! Models wrap their answer in prose, markdown fences or both. Decoding tries
//! fenced blocks first, then every balanced `{...}` object in reading order,
//! and hands back the first one that deserializes into the expected shape.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

static FENCED_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced JSON pattern is valid")
});

/// Contents of every fenced code block that holds a JSON object.
pub fn fenced_objects(text: &str) -> Vec<&str> {
    FENCED_OBJECT
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Top-level brace-balanced substrings, skipping braces inside string literals.
pub fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        found.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    found
}

/// Decode the first JSON object in `text` that fits `T`.
pub fn decode_lenient<T: DeserializeOwned>(text: &str) -> Option<T> {
    let candidates = fenced_objects(text)
        .into_iter()
        .chain(balanced_objects(text));

    for candidate in candidates {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Some(value),
            Err(e) => debug!(error = %e, "skipping undecodable JSON candidate"),
        }
    }
    None
}

/// Like [`decode_lenient`] but falls back to a typed default.
pub fn decode_or_else<T, F>(text: &str, fallback: F) -> T
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    decode_lenient(text).unwrap_or_else(fallback)
}
