// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Oracle response parsing.
//!
//! Models answer with one JSON object per response, possibly wrapped in a
//! code fence or surrounded by prose. Extraction is lenient about the
//! wrapping and strict about the contents: an unknown action name or a
//! malformed `wait` field rejects the whole response.

use qo_core::{ActionKind, ActionRequest, WaitDirective};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoJson,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

#[derive(Deserialize)]
struct RawResponse {
    action: String,
    #[serde(default)]
    params: serde_json::Value,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    wait: WaitDirective,
    #[serde(default)]
    auto_complete_todo: bool,
    #[serde(default)]
    condense: bool,
    #[serde(default)]
    bug_report: Option<String>,
}

/// Parse one raw oracle reply into an [`ActionRequest`].
pub fn parse_response(raw: &str) -> Result<ActionRequest, ParseError> {
    let body = extract_json(raw).ok_or(ParseError::NoJson)?;
    let parsed: RawResponse =
        serde_json::from_str(body).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let kind = ActionKind::from_name(&parsed.action)
        .ok_or_else(|| ParseError::UnknownAction(parsed.action.clone()))?;

    let params = match parsed.params {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        serde_json::Value::Object(map) => serde_json::Value::Object(map),
        other => return Err(ParseError::Malformed(format!("params must be an object: {other}"))),
    };

    Ok(ActionRequest {
        kind,
        params,
        reasoning: parsed.reasoning,
        wait: parsed.wait,
        auto_complete_todo: parsed.auto_complete_todo,
        condense: parsed.condense,
        bug_report: parsed.bug_report,
    })
}

/// Locate the JSON object in a possibly-fenced, possibly-chatty reply.
///
/// Prefers a ```json fence when present, otherwise takes the outermost
/// brace-balanced span.
fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if let Some(fenced) = extract_fenced(trimmed) {
        return Some(fenced);
    }
    let start = trimmed.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in trimmed[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&trimmed[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn extract_fenced(raw: &str) -> Option<&str> {
    let fence_start = raw.find("```")?;
    let after = &raw[fence_start + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let fence_end = body.find("```")?;
    let inner = body[..fence_end].trim();
    inner.starts_with('{').then_some(inner)
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
