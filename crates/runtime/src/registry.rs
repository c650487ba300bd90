// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry: `agent_id → live handle`, with parent/child lookups.
//!
//! Registration happens when the supervisor spawns an agent; unregistration
//! happens asynchronously when the supervisor observes the agent's exit.
//! Lookups are therefore eventually consistent relative to termination —
//! callers needing post-termination absence wait on the handle's `done`
//! signal first.

use crate::agent::mailbox::AgentMsg;
use parking_lot::Mutex;
use qo_core::{AgentId, TaskId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Cheap clonable reference to one live agent.
#[derive(Clone)]
pub struct AgentHandle {
    pub agent_id: AgentId,
    pub parent_id: Option<AgentId>,
    pub task_id: TaskId,
    tx: mpsc::UnboundedSender<AgentMsg>,
    done: watch::Receiver<bool>,
}

impl AgentHandle {
    pub(crate) fn new(
        agent_id: AgentId,
        parent_id: Option<AgentId>,
        task_id: TaskId,
        tx: mpsc::UnboundedSender<AgentMsg>,
        done: watch::Receiver<bool>,
    ) -> Self {
        Self { agent_id, parent_id, task_id, tx, done }
    }

    /// Enqueue a message. Returns false once the agent's mailbox is gone.
    pub fn send(&self, msg: AgentMsg) -> bool {
        self.tx.send(msg).is_ok()
    }

    /// Park until the agent has finished initializing.
    pub async fn wait_for_ready(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(AgentMsg::WaitForReady { reply }) {
            let _ = rx.await;
        }
    }

    /// True once the agent task has fully exited.
    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait (unbounded) for the agent task to exit.
    pub async fn wait_done(&self) {
        let mut done = self.done.clone();
        while !*done.borrow() {
            if done.changed().await.is_err() {
                break;
            }
        }
    }
}

/// The live-agent index. Cheap to clone.
#[derive(Clone, Default)]
pub struct Registry {
    agents: Arc<Mutex<HashMap<AgentId, AgentHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: AgentHandle) {
        self.agents.lock().insert(handle.agent_id, handle);
    }

    pub fn unregister(&self, agent_id: &AgentId) -> Option<AgentHandle> {
        self.agents.lock().remove(agent_id)
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<AgentHandle> {
        self.agents.lock().get(agent_id).cloned()
    }

    /// All live children of `parent_id`, in no particular order.
    pub fn children_of(&self, parent_id: &AgentId) -> Vec<AgentHandle> {
        self.agents
            .lock()
            .values()
            .filter(|h| h.parent_id.as_ref() == Some(parent_id))
            .cloned()
            .collect()
    }

    /// Live agents sharing this agent's parent, excluding itself.
    pub fn siblings_of(&self, agent_id: &AgentId) -> Vec<AgentHandle> {
        let guard = self.agents.lock();
        let Some(parent_id) = guard.get(agent_id).and_then(|h| h.parent_id) else {
            return Vec::new();
        };
        guard
            .values()
            .filter(|h| h.parent_id == Some(parent_id) && h.agent_id != *agent_id)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<AgentHandle> {
        self.agents.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
