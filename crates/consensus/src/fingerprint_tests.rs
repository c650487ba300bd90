// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use qo_core::{ActionKind, ActionRequest};
use serde_json::json;

fn batch(kind: ActionKind, subs: &[&str]) -> ActionRequest {
    let actions: Vec<serde_json::Value> =
        subs.iter().map(|s| json!({ "action": s, "params": {} })).collect();
    ActionRequest::new(kind).params(json!({ "actions": actions }))
}

#[test]
fn param_key_order_does_not_split_clusters() {
    let a = ActionRequest::new(ActionKind::ApiCall)
        .params(json!({"url": "https://x", "method": "GET"}));
    let b = ActionRequest::new(ActionKind::ApiCall)
        .params(json!({"method": "GET", "url": "https://x"}));
    assert_eq!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn differing_params_split_clusters() {
    let a = ActionRequest::new(ActionKind::ApiCall).params(json!({"url": "https://x"}));
    let b = ActionRequest::new(ActionKind::ApiCall).params(json!({"url": "https://y"}));
    assert_ne!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn wait_directive_is_part_of_identity() {
    let timed = ActionRequest::new(ActionKind::Wait).wait(qo_core::WaitDirective::Timed(5));
    let block = ActionRequest::new(ActionKind::Wait).wait(qo_core::WaitDirective::Block);
    assert_ne!(fingerprint(&timed), fingerprint(&block));
}

#[test]
fn batch_sync_is_order_sensitive() {
    let ab = batch(ActionKind::BatchSync, &["write_file", "run_shell"]);
    let ba = batch(ActionKind::BatchSync, &["run_shell", "write_file"]);
    assert_ne!(fingerprint(&ab), fingerprint(&ba));
}

#[test]
fn batch_async_is_order_insensitive() {
    let ab = batch(ActionKind::BatchAsync, &["write_file", "run_shell"]);
    let ba = batch(ActionKind::BatchAsync, &["run_shell", "write_file"]);
    assert_eq!(fingerprint(&ab), fingerprint(&ba));
}

#[test]
fn batch_params_beyond_sub_types_are_ignored() {
    let a = batch(ActionKind::BatchAsync, &["run_shell"]);
    let mut b = batch(ActionKind::BatchAsync, &["run_shell"]);
    b.params["note"] = json!("extra");
    assert_eq!(fingerprint(&a), fingerprint(&b));
}

proptest! {
    /// batch_async fingerprints are invariant under any permutation of the
    /// sub-action list.
    #[test]
    fn batch_async_fingerprint_is_permutation_invariant(
        mut subs in proptest::collection::vec(
            prop_oneof![
                Just("run_shell"),
                Just("write_file"),
                Just("read_file"),
                Just("api_call"),
                Just("send_message"),
            ],
            1..6,
        ),
        rotation in 0usize..6,
    ) {
        let original = batch(ActionKind::BatchAsync, &subs);
        let subs_len = subs.len();
        subs.rotate_left(rotation % subs_len);
        let rotated = batch(ActionKind::BatchAsync, &subs);
        prop_assert_eq!(fingerprint(&original), fingerprint(&rotated));
    }
}
