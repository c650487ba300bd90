// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-bus payloads.
//!
//! Serializes with `{"type": "domain:event", ...fields}` format. Delivery
//! semantics (topics, at-most-once, per-publisher ordering) live in the
//! runtime's bus; these are just the wire shapes subscribers see.

use crate::action::ActionKind;
use crate::id::{ActionId, AgentId, TaskId};
use crate::todo::TodoItem;
use serde::{Deserialize, Serialize};

/// Severity of a `log:entry` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

crate::simple_display! {
    LogLevel {
        Debug => "debug",
        Info => "info",
        Warn => "warn",
        Error => "error",
    }
}

/// Everything published onto the in-process event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    #[serde(rename = "agent:spawned")]
    AgentSpawned {
        agent_id: AgentId,
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<AgentId>,
        timestamp: u64,
    },

    #[serde(rename = "agent:terminated")]
    AgentTerminated { agent_id: AgentId, reason: String, timestamp: u64 },

    #[serde(rename = "action:started")]
    ActionStarted {
        agent_id: AgentId,
        action_type: ActionKind,
        action_id: ActionId,
        params: serde_json::Value,
    },

    #[serde(rename = "action:completed")]
    ActionCompleted { agent_id: AgentId, action_id: ActionId, result: String },

    #[serde(rename = "log:entry")]
    LogEntry {
        agent_id: AgentId,
        level: LogLevel,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<serde_json::Value>,
    },

    #[serde(rename = "todos:updated")]
    TodosUpdated { agent_id: AgentId, todos: Vec<TodoItem> },

    #[serde(rename = "message:received")]
    MessageReceived { agent_id: AgentId, message: String },

    #[serde(rename = "cost:recorded")]
    CostRecorded {
        agent_id: AgentId,
        cost_type: String,
        amount: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<serde_json::Value>,
    },
}

impl BusEvent {
    /// The agent this payload concerns.
    pub fn agent_id(&self) -> &AgentId {
        match self {
            BusEvent::AgentSpawned { agent_id, .. }
            | BusEvent::AgentTerminated { agent_id, .. }
            | BusEvent::ActionStarted { agent_id, .. }
            | BusEvent::ActionCompleted { agent_id, .. }
            | BusEvent::LogEntry { agent_id, .. }
            | BusEvent::TodosUpdated { agent_id, .. }
            | BusEvent::MessageReceived { agent_id, .. }
            | BusEvent::CostRecorded { agent_id, .. } => agent_id,
        }
    }

    /// Compact form for tracing lines.
    pub fn log_summary(&self) -> String {
        match self {
            BusEvent::AgentSpawned { agent_id, .. } => format!("agent:spawned {agent_id}"),
            BusEvent::AgentTerminated { agent_id, reason, .. } => {
                format!("agent:terminated {agent_id} reason={reason}")
            }
            BusEvent::ActionStarted { agent_id, action_type, action_id, .. } => {
                format!("action:started {agent_id} {action_type} {action_id}")
            }
            BusEvent::ActionCompleted { agent_id, action_id, .. } => {
                format!("action:completed {agent_id} {action_id}")
            }
            BusEvent::LogEntry { agent_id, level, message, .. } => {
                format!("log:entry {agent_id} [{level}] {message}")
            }
            BusEvent::TodosUpdated { agent_id, todos } => {
                format!("todos:updated {agent_id} n={}", todos.len())
            }
            BusEvent::MessageReceived { agent_id, .. } => format!("message:received {agent_id}"),
            BusEvent::CostRecorded { agent_id, cost_type, amount, .. } => {
                format!("cost:recorded {agent_id} {cost_type}={amount}")
            }
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
