// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action fingerprints for response clustering.
//!
//! Two responses land in the same cluster iff their fingerprints match.
//! Batches fingerprint by sub-action types: `batch_sync` keeps declaration
//! order (order is semantics), `batch_async` sorts (order-independent).
//! Everything else fingerprints by action name, canonicalized params, and
//! the wait directive.

use qo_core::{ActionRequest, WaitDirective};

/// Canonical cluster key for one parsed response.
pub fn fingerprint(req: &ActionRequest) -> String {
    if req.kind.is_batch() {
        let mut kinds: Vec<String> = req.sub_kinds().iter().map(|k| k.name()).collect();
        if req.kind == qo_core::ActionKind::BatchAsync {
            kinds.sort_unstable();
        }
        return format!("{}[{}]", req.kind, kinds.join("+"));
    }
    format!("{}:{}:{}", req.kind, canonical_json(&req.params), wait_key(req.wait))
}

fn wait_key(wait: WaitDirective) -> String {
    match wait {
        WaitDirective::Continue => "w=0".to_string(),
        WaitDirective::Block => "w=block".to_string(),
        WaitDirective::Timed(secs) => format!("w={secs}"),
    }
}

/// Render JSON with recursively sorted object keys so key order never
/// splits a cluster.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            let inner: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        serde_json::Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod tests;
