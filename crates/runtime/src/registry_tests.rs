// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::mailbox::MessageSender;

fn handle(id: &str, parent: Option<&str>) -> (AgentHandle, mpsc::UnboundedReceiver<AgentMsg>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (_done_tx, done_rx) = watch::channel(false);
    let handle = AgentHandle::new(
        AgentId::from_string(id),
        parent.map(AgentId::from_string),
        TaskId::from_string("tsk-t"),
        tx,
        done_rx,
    );
    (handle, rx)
}

#[test]
fn register_lookup_unregister() {
    let registry = Registry::new();
    let (h, _rx) = handle("agt-a", None);
    registry.register(h);

    assert!(registry.get(&AgentId::from_string("agt-a")).is_some());
    assert_eq!(registry.len(), 1);

    registry.unregister(&AgentId::from_string("agt-a"));
    assert!(registry.get(&AgentId::from_string("agt-a")).is_none());
    assert!(registry.is_empty());
}

#[test]
fn children_of_filters_by_parent() {
    let registry = Registry::new();
    let (parent, _p) = handle("agt-p", None);
    let (c1, _r1) = handle("agt-c1", Some("agt-p"));
    let (c2, _r2) = handle("agt-c2", Some("agt-p"));
    let (other, _r3) = handle("agt-x", Some("agt-q"));
    registry.register(parent);
    registry.register(c1);
    registry.register(c2);
    registry.register(other);

    let children = registry.children_of(&AgentId::from_string("agt-p"));
    let mut ids: Vec<String> = children.iter().map(|h| h.agent_id.to_string()).collect();
    ids.sort();
    assert_eq!(ids, vec!["agt-c1", "agt-c2"]);
}

#[test]
fn siblings_exclude_self_and_require_a_parent() {
    let registry = Registry::new();
    let (c1, _r1) = handle("agt-c1", Some("agt-p"));
    let (c2, _r2) = handle("agt-c2", Some("agt-p"));
    let (root, _r3) = handle("agt-p", None);
    registry.register(c1);
    registry.register(c2);
    registry.register(root);

    let siblings = registry.siblings_of(&AgentId::from_string("agt-c1"));
    assert_eq!(siblings.len(), 1);
    assert_eq!(siblings[0].agent_id, "agt-c2");

    assert!(registry.siblings_of(&AgentId::from_string("agt-p")).is_empty());
}

#[tokio::test]
async fn send_enqueues_until_receiver_drops() {
    let registry = Registry::new();
    let (h, mut rx) = handle("agt-a", None);
    registry.register(h.clone());

    assert!(h.send(AgentMsg::Message {
        content: "hi".into(),
        sender: MessageSender::User,
    }));
    assert!(matches!(rx.recv().await, Some(AgentMsg::Message { .. })));

    drop(rx);
    assert!(!h.send(AgentMsg::TriggerConsensus));
}

#[test]
fn reregistering_replaces_the_handle() {
    let registry = Registry::new();
    let (h1, rx1) = handle("agt-a", None);
    registry.register(h1);
    drop(rx1);

    let (h2, _rx2) = handle("agt-a", None);
    registry.register(h2);

    let got = registry.get(&AgentId::from_string("agt-a")).unwrap();
    assert!(got.send(AgentMsg::TriggerConsensus));
    assert_eq!(registry.len(), 1);
}
