//! Structured extraction: pull a JSON payload out of free-form model text
//! and validate it against a typed shape.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

use crate::error::GatewayError;

fn fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```").ok())
        .as_ref()
}

fn think_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").ok())
        .as_ref()
}

/// Candidate JSON snippets, most specific first
fn candidates(text: &str) -> Vec<String> {
    let text = match think_re() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    };
    let mut out = Vec::new();

    if let Some(re) = fence_re() {
        for cap in re.captures_iter(&text) {
            if let Some(body) = cap.get(1) {
                out.push(body.as_str().trim().to_string());
            }
        }
    }

    out.push(text.trim().to_string());

    // Outermost object or array span
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                out.push(text[start..=end].to_string());
            }
        }
    }
    out
}

/// Parse the first candidate that matches `T`
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, GatewayError> {
    if text.trim().is_empty() {
        return Err(GatewayError::MalformedResponse("empty response".to_string()));
    }

    let mut last_error = None;
    for candidate in candidates(text) {
        match serde_json::from_str::<T>(&candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }

    let preview: String = text.chars().take(80).collect();
    Err(GatewayError::MalformedResponse(format!(
        "{} (response began: {:?})",
        last_error.map(|e| e.to_string()).unwrap_or_default(),
        preview
    )))
}
