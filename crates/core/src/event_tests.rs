// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::action::ActionKind;
use crate::id::{ActionId, AgentId, TaskId};

#[test]
fn serializes_with_domain_tagged_type() {
    let event = BusEvent::AgentSpawned {
        agent_id: AgentId::from_string("agt-a"),
        task_id: TaskId::from_string("tsk-t"),
        parent_id: None,
        timestamp: 5,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "agent:spawned");
    assert_eq!(json["agent_id"], "agt-a");
    assert!(json.get("parent_id").is_none());
}

#[test]
fn round_trips_action_payloads() {
    let event = BusEvent::ActionStarted {
        agent_id: AgentId::from_string("agt-a"),
        action_type: ActionKind::RunShell,
        action_id: ActionId(3),
        params: serde_json::json!({"command": "ls"}),
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: BusEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn agent_id_accessor_covers_every_variant() {
    let id = AgentId::from_string("agt-x");
    let events = vec![
        BusEvent::AgentTerminated { agent_id: id, reason: "normal".into(), timestamp: 1 },
        BusEvent::ActionCompleted { agent_id: id, action_id: ActionId(1), result: "ok".into() },
        BusEvent::LogEntry {
            agent_id: id,
            level: LogLevel::Info,
            message: "hello".into(),
            meta: None,
        },
        BusEvent::MessageReceived { agent_id: id, message: "hi".into() },
        BusEvent::CostRecorded {
            agent_id: id,
            cost_type: "oracle_tokens".into(),
            amount: 12.0,
            meta: None,
        },
        BusEvent::TodosUpdated { agent_id: id, todos: vec![] },
    ];
    for event in events {
        assert_eq!(*event.agent_id(), id);
        assert!(!event.log_summary().is_empty());
    }
}
