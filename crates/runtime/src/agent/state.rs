// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent state record.
//!
//! Owned exclusively by one agent process; never shared. Everything here
//! mutates only inside the owning task's mailbox handling.

use crate::config::AgentConfig;
use crate::persist::{AgentSnapshot, ChildEntry};
use indexmap::IndexMap;
use qo_core::{
    ActionId, ActionKind, AgentId, Budget, ModelHistories, TaskId, TodoList, WaitDirective,
};

/// Lifecycle phase of one agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Initializing,
    Ready,
    Dismissing,
    Terminating,
}

qo_core::simple_display! {
    LifecyclePhase {
        Initializing => "initializing",
        Ready => "ready",
        Dismissing => "dismissing",
        Terminating => "terminating",
    }
}

/// Why an agent task returned. Restart policy is transient: only `Fault`
/// exits are restarted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Normal,
    Fault(String),
}

impl ExitReason {
    pub fn label(&self) -> String {
        match self {
            ExitReason::Normal => "normal".to_string(),
            ExitReason::Fault(reason) => format!("fault: {reason}"),
        }
    }
}

/// One dispatched action awaiting its result.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub kind: ActionKind,
    pub params: serde_json::Value,
    pub started_at: u64,
    pub auto_complete_todo: bool,
    pub wait: WaitDirective,
    /// The router executing this action.
    pub router_id: qo_core::RouterId,
}

/// The record from the data model: identity, topology, conversation,
/// decision-loop bookkeeping, budget, and flags.
pub struct AgentState {
    pub agent_id: AgentId,
    pub parent_id: Option<AgentId>,
    pub task_id: TaskId,
    pub profile_name: String,
    pub profile_description: String,

    /// Ordered child set; keys are unique by construction.
    pub children: IndexMap<AgentId, ChildEntry>,
    pub histories: ModelHistories,
    pub todos: TodoList,

    pub pending_actions: IndexMap<ActionId, PendingAction>,
    pub action_counter: u64,
    pub timer_generation: u64,

    pub consensus_scheduled: bool,
    pub consensus_retry_count: u32,
    pub dismissing: bool,

    pub budget: Budget,
    /// Latched: once true, never cleared while the process lives.
    pub over_budget: bool,
    pub spent: f64,

    pub phase: LifecyclePhase,
}

impl AgentState {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            agent_id: config.agent_id,
            parent_id: config.parent_id,
            task_id: config.task_id,
            profile_name: config.profile_name.clone(),
            profile_description: config.profile_description.clone(),
            children: IndexMap::new(),
            histories: ModelHistories::for_pool(&config.model_pool),
            todos: TodoList::default(),
            pending_actions: IndexMap::new(),
            action_counter: 0,
            timer_generation: 0,
            consensus_scheduled: false,
            consensus_retry_count: 0,
            dismissing: false,
            budget: config.budget,
            over_budget: false,
            spent: 0.0,
            phase: LifecyclePhase::Initializing,
        }
    }

    /// Rebuild from a persisted snapshot, preserving histories, children,
    /// counters, and the over-budget latch.
    pub fn from_snapshot(snapshot: &AgentSnapshot) -> Self {
        let mut children = IndexMap::new();
        for entry in &snapshot.children {
            children.insert(entry.child_id, entry.clone());
        }
        Self {
            agent_id: snapshot.agent_id,
            parent_id: snapshot.parent_id,
            task_id: snapshot.task_id,
            profile_name: snapshot.profile_name.clone(),
            profile_description: snapshot.profile_description.clone(),
            children,
            histories: snapshot.histories.clone(),
            todos: snapshot.todos.clone(),
            pending_actions: IndexMap::new(),
            action_counter: snapshot.action_counter,
            timer_generation: snapshot.timer_generation,
            consensus_scheduled: false,
            consensus_retry_count: 0,
            dismissing: false,
            budget: snapshot.budget,
            over_budget: snapshot.over_budget,
            spent: snapshot.spent,
            phase: LifecyclePhase::Initializing,
        }
    }

    pub fn to_snapshot(&self, config: &AgentConfig, captured_at: u64) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: self.agent_id,
            parent_id: self.parent_id,
            task_id: self.task_id,
            profile_name: self.profile_name.clone(),
            profile_description: self.profile_description.clone(),
            model_pool: config.model_pool.clone(),
            capabilities: config.capabilities.clone(),
            children: self.children.values().cloned().collect(),
            histories: self.histories.clone(),
            todos: self.todos.clone(),
            budget: self.budget,
            over_budget: self.over_budget,
            spent: self.spent,
            action_counter: self.action_counter,
            timer_generation: self.timer_generation,
            captured_at,
        }
    }

    /// Allocate the next action identifier.
    pub fn next_action_id(&mut self) -> ActionId {
        self.action_counter += 1;
        ActionId(self.action_counter)
    }

    /// Idempotent child insert. Returns true when the child was new.
    pub fn add_child(&mut self, entry: ChildEntry) -> bool {
        if self.children.contains_key(&entry.child_id) {
            return false;
        }
        self.children.insert(entry.child_id, entry);
        true
    }

    /// Idempotent child removal.
    pub fn remove_child(&mut self, child_id: &AgentId) -> Option<ChildEntry> {
        self.children.shift_remove(child_id)
    }

    /// Fold new spend into the budget view, latching `over_budget`.
    pub fn record_spend(&mut self, amount: f64) {
        self.spent += amount;
        self.over_budget = self.over_budget || self.budget.is_over_budget(self.spent);
    }
}

/// Snapshot of the live process for tests and diagnostics.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub struct AgentProbe {
    pub agent_id: AgentId,
    pub phase: LifecyclePhase,
    pub consensus_scheduled: bool,
    pub consensus_retry_count: u32,
    pub wait_timer: Option<(String, u64)>,
    pub timer_generation: u64,
    pub pending_actions: Vec<(ActionId, ActionKind)>,
    pub active_router_count: usize,
    pub shell_commands: Vec<qo_core::CommandId>,
    pub children: Vec<AgentId>,
    pub budget: Budget,
    pub over_budget: bool,
    pub spent: f64,
    pub todos: TodoList,
    pub history_lens: Vec<(qo_core::ModelId, usize)>,
    pub queued_messages: usize,
    pub drained_triggers_total: u64,
    pub cycles_started: u64,
}
