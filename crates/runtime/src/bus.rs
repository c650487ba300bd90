// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process topic-based publish/subscribe.
//!
//! Delivery is best-effort and at-most-once per subscriber: publishing to a
//! topic nobody subscribed to drops the event, lagging subscribers lose the
//! oldest events, and a dead subscriber never stalls a publisher. Per-topic
//! order follows each publisher's send order.

use parking_lot::Mutex;
use qo_core::BusEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 256;

/// Shared event hub. Cheap to clone.
#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<BusEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking publish. Events published before the first subscriber
    /// on a topic are dropped.
    pub fn publish(&self, topic: &str, event: BusEvent) {
        let sender = self.channels.lock().get(topic).cloned();
        if let Some(sender) = sender {
            // A send error just means every subscriber went away.
            let _ = sender.send(event);
        }
    }

    /// Subscribe to a topic, creating its channel on first use.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusEvent> {
        self.channels
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    pub fn topic_count(&self) -> usize {
        self.channels.lock().len()
    }
}

/// Topic name construction.
pub mod topics {
    use qo_core::{AgentId, TaskId};

    pub const LIFECYCLE: &str = "agents:lifecycle";
    pub const ACTIONS: &str = "actions:all";

    pub fn agent_logs(agent_id: &AgentId) -> String {
        format!("agents:{agent_id}:logs")
    }

    pub fn agent_messages(agent_id: &AgentId) -> String {
        format!("agents:{agent_id}:messages")
    }

    pub fn agent_todos(agent_id: &AgentId) -> String {
        format!("agents:{agent_id}:todos")
    }

    pub fn task_messages(task_id: &TaskId) -> String {
        format!("tasks:{task_id}:messages")
    }

    pub fn task_costs(task_id: &TaskId) -> String {
        format!("tasks:{task_id}:costs")
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
