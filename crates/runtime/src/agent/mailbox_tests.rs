// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn message(content: &str) -> AgentMsg {
    AgentMsg::Message { content: content.into(), sender: MessageSender::User }
}

#[tokio::test]
async fn drain_counts_triggers_and_stashes_the_rest() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut mailbox = Mailbox::new(rx);

    tx.send(AgentMsg::TriggerConsensus).unwrap();
    tx.send(message("between")).unwrap();
    tx.send(AgentMsg::TriggerConsensus).unwrap();
    tx.send(AgentMsg::TriggerConsensus).unwrap();
    tx.send(message("after")).unwrap();

    assert_eq!(mailbox.drain_triggers(), 3);

    // Stashed messages come out first, in arrival order.
    match mailbox.next().await {
        Some(AgentMsg::Message { content, .. }) => assert_eq!(content, "between"),
        other => panic!("unexpected: {other:?}"),
    }
    match mailbox.next().await {
        Some(AgentMsg::Message { content, .. }) => assert_eq!(content, "after"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn drain_on_empty_mailbox_is_zero() {
    let (_tx, rx) = mpsc::unbounded_channel();
    let mut mailbox = Mailbox::new(rx);
    assert_eq!(mailbox.drain_triggers(), 0);
}

#[tokio::test]
async fn drain_is_capped_against_floods() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut mailbox = Mailbox::new(rx);

    for _ in 0..(TRIGGER_DRAIN_CAP + 10) {
        tx.send(AgentMsg::TriggerConsensus).unwrap();
    }

    assert_eq!(mailbox.drain_triggers(), TRIGGER_DRAIN_CAP);
    assert_eq!(mailbox.drain_triggers(), 10);
}

#[tokio::test]
async fn next_returns_none_when_senders_drop() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut mailbox = Mailbox::new(rx);
    tx.send(message("last")).unwrap();
    drop(tx);

    assert!(mailbox.next().await.is_some());
    assert!(mailbox.next().await.is_none());
}
