// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent mailbox: message shapes and the drain-before-run wrapper.
//!
//! Every external poke is an enqueue; all state mutation happens in the
//! consumer. The wrapper adds a stash so `trigger_consensus` messages can
//! be selectively drained without disturbing the relative order of
//! everything else.

use qo_core::{
    ActionFailure, ActionId, ActionKind, AgentId, BatchItemResult, CommandId, ResultPayload,
    RouterId, TodoItem,
};
use qo_consensus::{ConsensusError, Decision};
use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};

/// Who sent an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSender {
    User,
    Agent(AgentId),
    System,
}

/// Everything an agent's mailbox can carry.
#[derive(Debug)]
pub enum AgentMsg {
    /// Inbound message from the user, another agent, or the system.
    Message { content: String, sender: MessageSender },

    /// Run (or coalesce into) a consensus cycle.
    TriggerConsensus,

    /// A wait timer fired. Stale generations are discarded.
    WaitTimeout { logical_id: String, generation: u64 },

    /// The spawned consensus task finished.
    CycleComplete { outcome: Result<Decision, ConsensusError> },

    /// An action router finished its one action.
    ActionResult { action_id: ActionId, result: Result<ResultPayload, ActionFailure> },

    /// One sub-action of a batch completed. Routed without a
    /// `pending_actions` lookup — the dispatcher is the batch coordinator.
    BatchActionResult {
        action_id: ActionId,
        sub_kind: ActionKind,
        result: Result<ResultPayload, ActionFailure>,
    },

    /// All sub-actions of a batch finished.
    BatchCompleted { batch_id: ActionId, results: Vec<BatchItemResult> },

    /// A long-running shell finished after its initial async result.
    ShellCompleted { command_id: CommandId, result: Result<ResultPayload, ActionFailure> },

    /// spawn_child resolution for the requesting agent.
    SpawnComplete { child_id: AgentId, result: Result<(), String> },

    /// Child tracking casts. Inserts and removals are idempotent.
    ChildSpawned { child_id: AgentId, spawned_at: u64, budget_allocated: Option<f64> },
    ChildRestored { child_id: AgentId, spawned_at: u64, budget_allocated: Option<f64> },
    ChildDismissed { child_id: AgentId },

    /// A child's final spend report, sent during its termination.
    ChildTerminated { child_id: AgentId, spent: f64 },

    /// Atomic read-modify-write of a child's allocation, serialized
    /// through this (parent) agent's mailbox. Errors are wire reasons
    /// (`insufficient_budget`, unknown child).
    AdjustChildBudget {
        child_id: AgentId,
        new_allocated: f64,
        reply: oneshot::Sender<Result<(), String>>,
    },

    /// Replace the agent's todo list.
    SetTodos { items: Vec<TodoItem>, reply: oneshot::Sender<()> },

    /// Monitor fired: one of this agent's routers exited.
    RouterDown { router_id: RouterId },

    /// Monitor fired: a related agent process (parent or child) exited.
    PeerDown { agent_id: AgentId },

    /// Graceful stop (dismissal or supervisor shutdown).
    StopRequested,

    /// Park the caller until initialization completes.
    WaitForReady { reply: oneshot::Sender<()> },

    /// Test-support state inspection.
    #[cfg(any(test, feature = "test-support"))]
    Probe { reply: oneshot::Sender<super::state::AgentProbe> },
}

/// Upper bound on `trigger_consensus` messages consumed per drain, so a
/// flood cannot starve other mailbox traffic.
pub(crate) const TRIGGER_DRAIN_CAP: usize = 64;

/// Single-consumer mailbox with a stash preserving non-drained messages.
pub(crate) struct Mailbox {
    rx: mpsc::UnboundedReceiver<AgentMsg>,
    stash: VecDeque<AgentMsg>,
}

impl Mailbox {
    pub fn new(rx: mpsc::UnboundedReceiver<AgentMsg>) -> Self {
        Self { rx, stash: VecDeque::new() }
    }

    /// Next message: stashed messages first (they arrived earlier), then
    /// the channel. `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<AgentMsg> {
        if let Some(msg) = self.stash.pop_front() {
            return Some(msg);
        }
        self.rx.recv().await
    }

    /// Non-blocking drain of queued `trigger_consensus` messages, capped.
    /// Other message kinds encountered are stashed in arrival order.
    /// Returns the number of triggers consumed.
    pub fn drain_triggers(&mut self) -> usize {
        let mut drained = 0;
        while drained < TRIGGER_DRAIN_CAP {
            match self.rx.try_recv() {
                Ok(AgentMsg::TriggerConsensus) => drained += 1,
                Ok(other) => self.stash.push_back(other),
                Err(_) => break,
            }
        }
        drained
    }

    /// Drop everything queued. Used during termination so reply channels
    /// held by queued requests close and their senders unblock.
    pub fn drop_pending(&mut self) {
        self.stash.clear();
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
#[path = "mailbox_tests.rs"]
mod tests;
