// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persistence boundary.
//!
//! Storage is consumed through [`PersistenceStore`]; schema and SQL live
//! elsewhere. Writes are idempotent; agents log and swallow transient
//! errors rather than crash-loop on a flaky store.

use async_trait::async_trait;
use qo_core::{AgentId, Budget, ModelHistories, TaskId, TodoList};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistError {
    #[error("transient persistence error: {0}")]
    Transient(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// One child relationship as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub child_id: AgentId,
    pub spawned_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_allocated: Option<f64>,
    /// Spend reported by the child; used to release unspent escrow.
    #[serde(default)]
    pub spent: f64,
}

/// Full serialized agent state: everything needed to restore the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<AgentId>,
    pub task_id: TaskId,
    pub profile_name: String,
    pub profile_description: String,
    pub model_pool: Vec<qo_core::ModelId>,
    pub capabilities: Vec<qo_core::CapabilityGroup>,
    pub children: Vec<ChildEntry>,
    pub histories: ModelHistories,
    pub todos: TodoList,
    pub budget: Budget,
    pub over_budget: bool,
    pub spent: f64,
    pub action_counter: u64,
    pub timer_generation: u64,
    /// Write timestamp; the only field that varies between otherwise
    /// identical snapshots.
    pub captured_at: u64,
}

qo_core::builder! {
    pub struct AgentSnapshotBuilder => AgentSnapshot {
        into {
            profile_name: String = "restored",
            profile_description: String = "",
        }
        set {
            agent_id: AgentId = AgentId::new(),
            parent_id: Option<AgentId> = None,
            task_id: TaskId = TaskId::from_string("tsk-test"),
            model_pool: Vec<qo_core::ModelId> = Vec::new(),
            capabilities: Vec<qo_core::CapabilityGroup> = Vec::new(),
            children: Vec<ChildEntry> = Vec::new(),
            histories: ModelHistories = ModelHistories::default(),
            todos: TodoList = TodoList::default(),
            budget: Budget = Budget::untracked(),
            over_budget: bool = false,
            spent: f64 = 0.0,
            action_counter: u64 = 0,
            timer_generation: u64 = 0,
            captured_at: u64 = 1,
        }
    }
}

/// Storage consumed by the runtime.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Record a newly created agent. Idempotent.
    async fn save_agent(&self, snapshot: &AgentSnapshot) -> Result<(), PersistError>;

    /// Write the agent's current conversation/escrow state. Idempotent.
    async fn persist_ace_state(&self, snapshot: &AgentSnapshot) -> Result<(), PersistError>;

    /// Record one inbound message for the dashboard's timeline.
    async fn persist_message(&self, agent_id: &AgentId, content: &str)
        -> Result<(), PersistError>;

    /// All snapshots needed to rebuild the tree after a restart.
    async fn load_agents_for_restore(&self) -> Result<Vec<AgentSnapshot>, PersistError>;

    /// Latest snapshot for one agent, for one-for-one restarts.
    async fn load_agent(&self, agent_id: &AgentId) -> Result<Option<AgentSnapshot>, PersistError>;
}

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;

#[cfg(any(test, feature = "test-support"))]
mod memory {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// In-memory store for tests: latest snapshot per agent plus a message
    /// log, with a switch to simulate transient failures.
    #[derive(Default)]
    pub struct MemoryStore {
        snapshots: Mutex<HashMap<AgentId, AgentSnapshot>>,
        messages: Mutex<Vec<(AgentId, String)>>,
        fail_writes: Mutex<bool>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent write fail with a transient error.
        pub fn fail_writes(&self, fail: bool) {
            *self.fail_writes.lock() = fail;
        }

        pub fn snapshot(&self, agent_id: &AgentId) -> Option<AgentSnapshot> {
            self.snapshots.lock().get(agent_id).cloned()
        }

        pub fn snapshot_count(&self) -> usize {
            self.snapshots.lock().len()
        }

        pub fn messages_for(&self, agent_id: &AgentId) -> Vec<String> {
            self.messages
                .lock()
                .iter()
                .filter(|(id, _)| id == agent_id)
                .map(|(_, m)| m.clone())
                .collect()
        }

        /// Preload a snapshot, as if a previous run persisted it.
        pub fn seed(&self, snapshot: AgentSnapshot) {
            self.snapshots.lock().insert(snapshot.agent_id, snapshot);
        }

        fn check_writable(&self) -> Result<(), PersistError> {
            if *self.fail_writes.lock() {
                Err(PersistError::Transient("simulated write failure".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PersistenceStore for MemoryStore {
        async fn save_agent(&self, snapshot: &AgentSnapshot) -> Result<(), PersistError> {
            self.check_writable()?;
            self.snapshots.lock().insert(snapshot.agent_id, snapshot.clone());
            Ok(())
        }

        async fn persist_ace_state(&self, snapshot: &AgentSnapshot) -> Result<(), PersistError> {
            self.check_writable()?;
            self.snapshots.lock().insert(snapshot.agent_id, snapshot.clone());
            Ok(())
        }

        async fn persist_message(
            &self,
            agent_id: &AgentId,
            content: &str,
        ) -> Result<(), PersistError> {
            self.check_writable()?;
            self.messages.lock().push((*agent_id, content.to_string()));
            Ok(())
        }

        async fn load_agents_for_restore(&self) -> Result<Vec<AgentSnapshot>, PersistError> {
            Ok(self.snapshots.lock().values().cloned().collect())
        }

        async fn load_agent(
            &self,
            agent_id: &AgentId,
        ) -> Result<Option<AgentSnapshot>, PersistError> {
            Ok(self.snapshots.lock().get(agent_id).cloned())
        }
    }
}
