// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mailbox message handlers. One input is fully handled before the next.

use super::mailbox::{AgentMsg, MessageSender};
use super::process::{AgentProc, Flow};
use super::state::LifecyclePhase;
use crate::bus::topics;
use crate::persist::ChildEntry;
use qo_consensus::{ConsensusError, Decision};
use qo_core::{
    ActionFailure, ActionId, ActionKind, AgentId, BatchItemResult, BusEvent, Clock, CommandId,
    ContentPart, EntryContent, HistoryEntry, HistoryKind, LogLevel, ResultPayload, RouterId,
    TodoItem,
};
use std::time::Duration;

impl<C: Clock> AgentProc<C> {
    pub(super) async fn handle(&mut self, msg: AgentMsg) -> Flow {
        match msg {
            AgentMsg::Message { content, sender } => self.on_message(content, sender).await,
            AgentMsg::TriggerConsensus => self.on_trigger_consensus(),
            AgentMsg::WaitTimeout { logical_id, generation } => {
                self.on_wait_timeout(&logical_id, generation)
            }
            AgentMsg::CycleComplete { outcome } => self.on_cycle_complete(outcome).await,
            AgentMsg::ActionResult { action_id, result } => {
                self.on_action_result(action_id, result)
            }
            AgentMsg::BatchActionResult { action_id, sub_kind, result } => {
                self.on_batch_action_result(action_id, sub_kind, result)
            }
            AgentMsg::BatchCompleted { batch_id, results } => {
                self.on_batch_completed(batch_id, results)
            }
            AgentMsg::ShellCompleted { command_id, result } => {
                self.on_shell_completed(command_id, result)
            }
            AgentMsg::SpawnComplete { child_id, result } => {
                self.on_spawn_complete(child_id, result)
            }
            AgentMsg::ChildSpawned { child_id, spawned_at, budget_allocated } => {
                self.on_child_added(child_id, spawned_at, budget_allocated, "spawned")
            }
            AgentMsg::ChildRestored { child_id, spawned_at, budget_allocated } => {
                self.on_child_added(child_id, spawned_at, budget_allocated, "restored")
            }
            AgentMsg::ChildDismissed { child_id } => {
                self.settle_child_removal(&child_id, "dismissed");
                Flow::Continue
            }
            AgentMsg::ChildTerminated { child_id, spent } => {
                if let Some(entry) = self.state.children.get_mut(&child_id) {
                    entry.spent = spent;
                }
                self.settle_child_removal(&child_id, "terminated");
                Flow::Continue
            }
            AgentMsg::AdjustChildBudget { child_id, new_allocated, reply } => {
                let outcome = self.on_adjust_child_budget(child_id, new_allocated);
                let _ = reply.send(outcome);
                Flow::Continue
            }
            AgentMsg::SetTodos { items, reply } => {
                self.on_set_todos(items);
                let _ = reply.send(());
                Flow::Continue
            }
            AgentMsg::RouterDown { router_id } => self.on_router_down(router_id),
            AgentMsg::PeerDown { agent_id } => self.on_peer_down(agent_id),
            AgentMsg::StopRequested => self.on_stop_requested(),
            AgentMsg::WaitForReady { reply } => {
                let _ = reply.send(());
                Flow::Continue
            }
            #[cfg(any(test, feature = "test-support"))]
            AgentMsg::Probe { reply } => {
                let _ = reply.send(self.probe());
                Flow::Continue
            }
        }
    }

    /// Persist, append to every model history, broadcast, and schedule a
    /// continuation. Messages arriving mid-cycle are buffered.
    async fn on_message(&mut self, content: String, sender: MessageSender) -> Flow {
        if self.cycle_in_flight {
            self.queued.push_back((content, sender));
            return Flow::Continue;
        }
        self.ingest_message(content, sender).await;
        self.schedule_consensus();
        Flow::Continue
    }

    pub(super) async fn ingest_message(&mut self, content: String, sender: MessageSender) {
        if let Err(e) = self.deps.store.persist_message(&self.state.agent_id, &content).await {
            tracing::warn!(agent_id = %self.state.agent_id, error = %e, "persist_message failed");
        }

        let (kind, text) = match sender {
            MessageSender::User => (HistoryKind::User, content.clone()),
            MessageSender::System => (HistoryKind::System, content.clone()),
            MessageSender::Agent(from) => (HistoryKind::Agent, format!("[from {from}] {content}")),
        };
        let now = self.now();
        self.state.histories.append_all(HistoryEntry::new(kind, text, now));

        let event = BusEvent::MessageReceived { agent_id: self.state.agent_id, message: content };
        self.deps.bus.publish(&topics::agent_messages(&self.state.agent_id), event.clone());
        self.deps.bus.publish(&topics::task_messages(&self.state.task_id), event);
    }

    /// Coalesced cycle start: drain queued triggers, clear flags, cancel
    /// the wait timer, run at most one cycle.
    fn on_trigger_consensus(&mut self) -> Flow {
        if !self.state.consensus_scheduled && self.wait_timer.is_none() {
            tracing::debug!(agent_id = %self.state.agent_id, "discarding stale trigger");
            return Flow::Continue;
        }

        let drained = self.mailbox.drain_triggers();
        self.drained_total += drained as u64;
        if drained > 0 {
            tracing::debug!(agent_id = %self.state.agent_id, drained, "coalesced queued triggers");
        }

        self.state.consensus_scheduled = false;
        self.cancel_wait_timer();

        if self.config.suppress_auto_consensus {
            return Flow::Continue;
        }
        if self.cycle_in_flight {
            // Run again once the current cycle lands.
            self.state.consensus_scheduled = true;
            return Flow::Continue;
        }
        self.start_cycle();
        Flow::Continue
    }

    /// Stale-generation timeouts are discarded; a current one behaves like
    /// a trigger.
    fn on_wait_timeout(&mut self, logical_id: &str, generation: u64) -> Flow {
        let current = self
            .wait_timer
            .as_ref()
            .is_some_and(|t| t.matches(logical_id, generation));
        if !current {
            tracing::debug!(
                agent_id = %self.state.agent_id,
                logical_id,
                generation,
                "discarding stale wait timeout"
            );
            return Flow::Continue;
        }

        self.wait_timer = None;
        let now = self.now();
        self.state.histories.append_all(HistoryEntry::new(
            HistoryKind::Event,
            format!("wait expired ({logical_id})"),
            now,
        ));

        let drained = self.mailbox.drain_triggers();
        self.drained_total += drained as u64;
        self.state.consensus_scheduled = false;

        if self.config.suppress_auto_consensus {
            return Flow::Continue;
        }
        if self.cycle_in_flight {
            self.state.consensus_scheduled = true;
            return Flow::Continue;
        }
        self.start_cycle();
        Flow::Continue
    }

    async fn on_cycle_complete(
        &mut self,
        outcome: Result<Decision, ConsensusError>,
    ) -> Flow {
        self.cycle_in_flight = false;

        let flow = match outcome {
            Err(e) => {
                self.state.consensus_retry_count += 1;
                tracing::warn!(
                    agent_id = %self.state.agent_id,
                    error = %e,
                    retry = self.state.consensus_retry_count,
                    "consensus cycle failed"
                );
                if self.state.consensus_retry_count <= self.config.max_consensus_retries {
                    self.schedule_consensus();
                } else {
                    self.state.consensus_retry_count = 0;
                    self.log(LogLevel::Warn, "consensus retries exhausted; waiting");
                    self.arm_wait_timer(
                        "safe-wait".to_string(),
                        Duration::from_secs(self.config.safe_wait_secs),
                    );
                }
                Flow::Continue
            }
            Ok(decision) => {
                self.state.consensus_retry_count = 0;
                self.record_decision(&decision);
                self.apply_decision(decision).await
            }
        };

        if let Flow::Stop(reason) = flow {
            return Flow::Stop(reason);
        }

        if !self.queued.is_empty() {
            let queued: Vec<_> = self.queued.drain(..).collect();
            for (content, sender) in queued {
                self.ingest_message(content, sender).await;
            }
            self.schedule_consensus();
        }
        if self.state.consensus_scheduled {
            // Set while the cycle was in flight; re-poke the mailbox.
            let _ = self.self_tx.send(AgentMsg::TriggerConsensus);
        }
        Flow::Continue
    }

    /// Per-model decision entries (preserving divergence) plus cost events.
    fn record_decision(&mut self, decision: &Decision) {
        let now = self.now();
        for vote in &decision.votes {
            let body = serde_json::to_string(&vote.request)
                .unwrap_or_else(|_| "{\"action\":\"wait\"}".to_string());
            self.state
                .histories
                .append(&vote.model, HistoryEntry::new(HistoryKind::Decision, body, now));
        }

        let mut total_tokens = 0u64;
        for (model, usage) in &decision.usage {
            total_tokens += usage.total();
            self.deps.bus.publish(
                &topics::task_costs(&self.state.task_id),
                BusEvent::CostRecorded {
                    agent_id: self.state.agent_id,
                    cost_type: "oracle_tokens".to_string(),
                    amount: usage.total() as f64,
                    meta: Some(serde_json::json!({ "model": model.as_str() })),
                },
            );
        }
        if total_tokens > 0 && self.config.token_rate > 0.0 {
            self.state.record_spend(total_tokens as f64 / 1000.0 * self.config.token_rate);
        }
    }

    /// Result routing with the image classifier and auto-todo completion.
    fn on_action_result(
        &mut self,
        action_id: ActionId,
        result: Result<ResultPayload, ActionFailure>,
    ) -> Flow {
        let Some(pending) = self.state.pending_actions.shift_remove(&action_id) else {
            tracing::warn!(
                agent_id = %self.state.agent_id,
                %action_id,
                "dropping result for unknown action"
            );
            return Flow::Continue;
        };

        if let Ok(ResultPayload::ShellStarted { command_id }) = &result {
            self.shell_routers.insert(*command_id, pending.router_id);
        }

        self.append_action_result(pending.kind, &result);
        self.deps.bus.publish(
            topics::ACTIONS,
            BusEvent::ActionCompleted {
                agent_id: self.state.agent_id,
                action_id,
                result: result_summary(&result),
            },
        );

        if pending.auto_complete_todo
            && result.is_ok()
            && !self.state.todos.is_empty()
            && self.state.todos.complete_first_outstanding()
        {
            self.broadcast_todos();
        }

        self.schedule_consensus();
        Flow::Continue
    }

    /// Batch sub-results bypass `pending_actions`: the dispatcher is the
    /// batch coordinator, not a one-shot action.
    fn on_batch_action_result(
        &mut self,
        _action_id: ActionId,
        sub_kind: ActionKind,
        result: Result<ResultPayload, ActionFailure>,
    ) -> Flow {
        self.append_action_result(sub_kind, &result);
        Flow::Continue
    }

    fn on_batch_completed(&mut self, batch_id: ActionId, results: Vec<BatchItemResult>) -> Flow {
        let pending = self.state.pending_actions.shift_remove(&batch_id);
        let kind = pending.map(|p| p.kind).unwrap_or(ActionKind::BatchAsync);

        let total = results.len();
        let succeeded = results.iter().filter(|r| r.result.is_ok()).count();
        let failed = total - succeeded;
        let summary = format!("{kind}: total {total}, succeeded {succeeded}, failed {failed}");

        let now = self.now();
        self.state.histories.append_all(
            HistoryEntry::new(HistoryKind::Result, summary.clone(), now)
                .with_action_type(kind.name()),
        );
        self.deps.bus.publish(
            topics::ACTIONS,
            BusEvent::ActionCompleted {
                agent_id: self.state.agent_id,
                action_id: batch_id,
                result: summary,
            },
        );

        self.schedule_consensus();
        Flow::Continue
    }

    fn on_shell_completed(
        &mut self,
        command_id: CommandId,
        result: Result<ResultPayload, ActionFailure>,
    ) -> Flow {
        self.shell_routers.remove(&command_id);
        self.append_action_result(ActionKind::RunShell, &result);
        self.schedule_consensus();
        Flow::Continue
    }

    fn on_spawn_complete(&mut self, child_id: AgentId, result: Result<(), String>) -> Flow {
        match result {
            Ok(()) => {
                tracing::debug!(agent_id = %self.state.agent_id, %child_id, "spawn complete");
            }
            Err(reason) => {
                let now = self.now();
                self.state.histories.append_all(HistoryEntry::new(
                    HistoryKind::Event,
                    format!("spawn_child failed: {reason}"),
                    now,
                ));
            }
        }
        Flow::Continue
    }

    /// Idempotent child insert; escrow is committed only on first sight.
    fn on_child_added(
        &mut self,
        child_id: AgentId,
        spawned_at: u64,
        budget_allocated: Option<f64>,
        label: &str,
    ) -> Flow {
        let added = self.state.add_child(ChildEntry {
            child_id,
            spawned_at,
            budget_allocated,
            spent: 0.0,
        });
        if !added {
            return Flow::Continue;
        }

        if let Some(amount) = budget_allocated {
            self.state.budget = self.state.budget.commit(amount);
        }
        let now = self.now();
        self.state.histories.append_all(HistoryEntry::new(
            HistoryKind::Event,
            format!("child {child_id} {label}"),
            now,
        ));
        tracing::info!(agent_id = %self.state.agent_id, %child_id, label, "child tracked");
        Flow::Continue
    }

    /// Idempotent removal; unspent escrow returns to the free pool once.
    pub(super) fn settle_child_removal(&mut self, child_id: &AgentId, label: &str) {
        let Some(entry) = self.state.remove_child(child_id) else {
            return;
        };
        if let Some(allocated) = entry.budget_allocated {
            self.state.budget = self.state.budget.release_child(allocated, entry.spent);
        }
        let now = self.now();
        self.state.histories.append_all(HistoryEntry::new(
            HistoryKind::Event,
            format!("child {child_id} {label}"),
            now,
        ));
        tracing::info!(agent_id = %self.state.agent_id, %child_id, label, "child removed");
    }

    /// Atomic read-modify-write of one child's allocation. A rejection
    /// leaves both the budget and the child entry untouched.
    fn on_adjust_child_budget(
        &mut self,
        child_id: AgentId,
        new_allocated: f64,
    ) -> Result<(), String> {
        let Some(entry) = self.state.children.get(&child_id) else {
            return Err(format!("unknown child: {child_id}"));
        };
        let current = entry.budget_allocated.unwrap_or(0.0);

        match self.state.budget.adjust_child(current, new_allocated, self.state.spent) {
            Ok(budget) => {
                self.state.budget = budget;
                if let Some(entry) = self.state.children.get_mut(&child_id) {
                    entry.budget_allocated = Some(new_allocated);
                }
                tracing::info!(
                    agent_id = %self.state.agent_id,
                    %child_id,
                    new_allocated,
                    "child budget adjusted"
                );
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn on_set_todos(&mut self, items: Vec<TodoItem>) {
        self.state.todos.set(items);
        self.broadcast_todos();
    }

    fn broadcast_todos(&self) {
        self.deps.bus.publish(
            &topics::agent_todos(&self.state.agent_id),
            BusEvent::TodosUpdated {
                agent_id: self.state.agent_id,
                todos: self.state.todos.items().to_vec(),
            },
        );
    }

    /// Router monitor fired: drop it from the router set and any shell
    /// commands it serviced, atomically with respect to this mailbox.
    fn on_router_down(&mut self, router_id: RouterId) -> Flow {
        self.active_routers.remove(&router_id);
        self.shell_routers.retain(|_, rid| *rid != router_id);
        Flow::Continue
    }

    /// A related agent exited: parent-death policy or child cleanup.
    fn on_peer_down(&mut self, agent_id: AgentId) -> Flow {
        let is_parent = self.config.parent_ref == Some(agent_id)
            || self.state.parent_id == Some(agent_id);
        if is_parent {
            let now = self.now();
            self.state.histories.append_all(HistoryEntry::new(
                HistoryKind::Event,
                format!("parent {agent_id} terminated"),
                now,
            ));
            self.log(LogLevel::Warn, format!("parent {agent_id} terminated"));
            if self.state.parent_id.is_some() {
                // Spawned children outlive their parent.
                return Flow::Continue;
            }
            return Flow::Stop("parent_down".to_string());
        }

        if self.state.children.contains_key(&agent_id) {
            self.settle_child_removal(&agent_id, "down");
        }
        Flow::Continue
    }

    /// Graceful stop. Accumulated triggers are drained first; a second
    /// request while dismissing is a no-op.
    fn on_stop_requested(&mut self) -> Flow {
        let drained = self.mailbox.drain_triggers();
        self.drained_total += drained as u64;

        if self.state.dismissing {
            return Flow::Continue;
        }
        self.state.dismissing = true;
        self.state.phase = LifecyclePhase::Dismissing;
        Flow::Stop("stop_requested".to_string())
    }

    /// Image results become `image` entries; everything else a `result`
    /// entry carrying the originating action type.
    fn append_action_result(
        &mut self,
        action_type: ActionKind,
        result: &Result<ResultPayload, ActionFailure>,
    ) {
        let now = self.now();
        let entry = match result {
            Ok(ResultPayload::Image { media_type, data }) => HistoryEntry {
                kind: HistoryKind::Image,
                content: EntryContent::Multimodal(vec![ContentPart::Image {
                    media_type: media_type.clone(),
                    data: data.clone(),
                }]),
                timestamp: now,
                action_type: Some(action_type.name()),
            },
            Ok(payload) => HistoryEntry::new(HistoryKind::Result, payload.summary(), now)
                .with_action_type(action_type.name()),
            Err(failure) => {
                HistoryEntry::new(HistoryKind::Result, format!("error: {failure}"), now)
                    .with_action_type(action_type.name())
            }
        };
        self.state.histories.append_all(entry);
    }

    #[cfg(any(test, feature = "test-support"))]
    fn probe(&self) -> super::state::AgentProbe {
        super::state::AgentProbe {
            agent_id: self.state.agent_id,
            phase: self.state.phase,
            consensus_scheduled: self.state.consensus_scheduled,
            consensus_retry_count: self.state.consensus_retry_count,
            wait_timer: self
                .wait_timer
                .as_ref()
                .map(|t| (t.logical_id.clone(), t.generation)),
            timer_generation: self.state.timer_generation,
            pending_actions: self
                .state
                .pending_actions
                .iter()
                .map(|(id, p)| (*id, p.kind))
                .collect(),
            active_router_count: self.active_routers.len(),
            shell_commands: self.shell_routers.keys().copied().collect(),
            children: self.state.children.keys().copied().collect(),
            budget: self.state.budget,
            over_budget: self.state.over_budget,
            spent: self.state.spent,
            todos: self.state.todos.clone(),
            history_lens: self
                .state
                .histories
                .models()
                .map(|m| (m.clone(), self.state.histories.len(m)))
                .collect(),
            queued_messages: self.queued.len(),
            drained_triggers_total: self.drained_total,
            cycles_started: self.cycles_started,
        }
    }
}

fn result_summary(result: &Result<ResultPayload, ActionFailure>) -> String {
    match result {
        Ok(payload) => payload.summary(),
        Err(failure) => format!("error: {failure}"),
    }
}
