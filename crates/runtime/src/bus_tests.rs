// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use qo_core::{AgentId, LogLevel, TaskId};

fn log_event(message: &str) -> BusEvent {
    BusEvent::LogEntry {
        agent_id: AgentId::from_string("agt-a"),
        level: LogLevel::Info,
        message: message.into(),
        meta: None,
    }
}

#[tokio::test]
async fn subscriber_receives_in_publish_order() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe("agents:agt-a:logs");

    bus.publish("agents:agt-a:logs", log_event("one"));
    bus.publish("agents:agt-a:logs", log_event("two"));

    assert_eq!(rx.recv().await.unwrap(), log_event("one"));
    assert_eq!(rx.recv().await.unwrap(), log_event("two"));
}

#[tokio::test]
async fn publish_without_subscribers_is_dropped_not_blocked() {
    let bus = EventBus::new();
    bus.publish("agents:nobody:logs", log_event("lost"));

    // Subscribing afterwards sees nothing from before.
    let mut rx = bus.subscribe("agents:nobody:logs");
    bus.publish("agents:nobody:logs", log_event("seen"));
    assert_eq!(rx.recv().await.unwrap(), log_event("seen"));
}

#[tokio::test]
async fn topics_are_isolated() {
    let bus = EventBus::new();
    let mut a = bus.subscribe("agents:agt-a:logs");
    let mut b = bus.subscribe("agents:agt-b:logs");

    bus.publish("agents:agt-a:logs", log_event("for a"));

    assert_eq!(a.recv().await.unwrap(), log_event("for a"));
    assert!(b.try_recv().is_err());
}

#[tokio::test]
async fn dead_subscriber_does_not_stall_publishers() {
    let bus = EventBus::new();
    let rx = bus.subscribe("agents:agt-a:logs");
    drop(rx);

    // Both publishes return immediately.
    bus.publish("agents:agt-a:logs", log_event("one"));
    bus.publish("agents:agt-a:logs", log_event("two"));
}

#[tokio::test]
async fn each_subscriber_gets_its_own_copy() {
    let bus = EventBus::new();
    let mut a = bus.subscribe(topics::LIFECYCLE);
    let mut b = bus.subscribe(topics::LIFECYCLE);

    bus.publish(topics::LIFECYCLE, log_event("fanout"));

    assert_eq!(a.recv().await.unwrap(), log_event("fanout"));
    assert_eq!(b.recv().await.unwrap(), log_event("fanout"));
}

#[test]
fn topic_names_follow_the_contract() {
    let agent = AgentId::from_string("agt-a");
    let task = TaskId::from_string("tsk-t");
    assert_eq!(topics::agent_logs(&agent), "agents:agt-a:logs");
    assert_eq!(topics::agent_messages(&agent), "agents:agt-a:messages");
    assert_eq!(topics::task_messages(&task), "tasks:tsk-t:messages");
    assert_eq!(topics::task_costs(&task), "tasks:tsk-t:costs");
}
