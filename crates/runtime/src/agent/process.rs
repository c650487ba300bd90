// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent process: run loop, lifecycle, and the decision cycle.
//!
//! One tokio task owns one [`AgentProc`]; every input is fully handled
//! before the next, so no state here needs a lock. Long operations —
//! oracle fan-outs, shells, file and API calls — run in consensus tasks
//! and action routers, keeping this loop responsive to control traffic.

use super::mailbox::{AgentMsg, Mailbox, MessageSender};
use super::state::{AgentState, ExitReason, LifecyclePhase, PendingAction};
use super::timer::{self, WaitTimer};
use crate::bus::{topics, EventBus};
use crate::config::AgentConfig;
use crate::executor::ExecutorSet;
use crate::persist::PersistenceStore;
use crate::registry::Registry;
use crate::router::{self, RouterArgs, RouterCtl, RouterHandle};
use crate::supervisor::HierarchyClient;
use qo_consensus::{
    allowed_actions, ConsensusEngine, Decision, DecisionKind, OracleClient, ProfileContext,
    PromptBuilder, RESPONSE_SCHEMA,
};
use qo_core::{
    ActionKind, ActionRequest, BusEvent, Clock, CommandId, HistoryEntry, HistoryKind, LogLevel,
    RouterId, WaitDirective,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Shared services handed to each agent process.
#[derive(Clone)]
pub(crate) struct ProcDeps<C: Clock> {
    pub oracle: Arc<dyn OracleClient>,
    pub store: Arc<dyn PersistenceStore>,
    pub prompt: Arc<dyn PromptBuilder>,
    pub executors: ExecutorSet,
    pub bus: EventBus,
    pub registry: Registry,
    pub clock: C,
    pub hierarchy: HierarchyClient,
}

/// What a handler wants the run loop to do next.
pub(super) enum Flow {
    Continue,
    Stop(String),
}

pub(crate) struct AgentProc<C: Clock> {
    pub(super) state: AgentState,
    pub(super) config: AgentConfig,
    pub(super) deps: ProcDeps<C>,
    pub(super) mailbox: Mailbox,
    pub(super) self_tx: mpsc::UnboundedSender<AgentMsg>,

    pub(super) wait_timer: Option<WaitTimer>,
    pub(super) active_routers: HashMap<RouterId, RouterHandle>,
    pub(super) shell_routers: HashMap<CommandId, RouterId>,
    /// Messages buffered while a decision cycle is in flight.
    pub(super) queued: VecDeque<(String, MessageSender)>,
    pub(super) cycle_in_flight: bool,
    pub(super) restoration: bool,

    pub(super) drained_total: u64,
    pub(super) cycles_started: u64,
}

impl<C: Clock> AgentProc<C> {
    pub fn new(
        state: AgentState,
        config: AgentConfig,
        deps: ProcDeps<C>,
        mailbox: Mailbox,
        self_tx: mpsc::UnboundedSender<AgentMsg>,
        restoration: bool,
    ) -> Self {
        Self {
            state,
            config,
            deps,
            mailbox,
            self_tx,
            wait_timer: None,
            active_routers: HashMap::new(),
            shell_routers: HashMap::new(),
            queued: VecDeque::new(),
            cycle_in_flight: false,
            restoration,
            drained_total: 0,
            cycles_started: 0,
        }
    }

    pub async fn run(mut self) -> ExitReason {
        self.initialize().await;
        loop {
            let Some(msg) = self.mailbox.next().await else {
                // Every sender is gone; nothing can reach this agent again.
                self.terminate("mailbox_closed").await;
                return ExitReason::Normal;
            };
            if let Flow::Stop(reason) = self.handle(msg).await {
                self.terminate(&reason).await;
                return ExitReason::Normal;
            }
        }
    }

    async fn initialize(&mut self) {
        self.state.phase = LifecyclePhase::Initializing;

        if !self.restoration {
            let snapshot = self.state.to_snapshot(&self.config, self.now());
            if let Err(e) = self.deps.store.save_agent(&snapshot).await {
                tracing::warn!(agent_id = %self.state.agent_id, error = %e, "initial save failed");
            }
        }

        self.deps.bus.publish(
            topics::LIFECYCLE,
            BusEvent::AgentSpawned {
                agent_id: self.state.agent_id,
                task_id: self.state.task_id,
                parent_id: self.state.parent_id,
                timestamp: self.now(),
            },
        );
        tracing::info!(
            agent_id = %self.state.agent_id,
            profile = %self.state.profile_name,
            restored = self.restoration,
            "agent ready"
        );
        self.state.phase = LifecyclePhase::Ready;
    }

    /// Stop every router (unbounded grace), persist, broadcast, return.
    pub(super) async fn terminate(&mut self, reason: &str) {
        self.state.phase = LifecyclePhase::Terminating;
        tracing::info!(agent_id = %self.state.agent_id, reason, "agent terminating");

        if let Some(t) = self.wait_timer.take() {
            t.cancel();
        }

        let routers: Vec<RouterHandle> = self.active_routers.drain().map(|(_, h)| h).collect();
        self.shell_routers.clear();
        for handle in &routers {
            let _ = handle.ctl.send(RouterCtl::Stop);
        }
        for mut handle in routers {
            // Unbounded grace: shells get to finish their cleanup. Queued
            // requests are dropped while waiting so a router blocked on a
            // reply from this (no longer consuming) agent can exit; join
            // errors mean the router is already gone.
            loop {
                self.mailbox.drop_pending();
                tokio::select! {
                    _ = &mut handle.join => break,
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                }
            }
        }

        // Report final spend so the parent can settle escrow.
        if let Some(parent_id) = self.state.parent_id {
            if let Some(parent) = self.deps.registry.get(&parent_id) {
                parent.send(AgentMsg::ChildTerminated {
                    child_id: self.state.agent_id,
                    spent: self.state.spent,
                });
            }
        }

        let snapshot = self.state.to_snapshot(&self.config, self.now());
        if let Err(e) = self.deps.store.persist_ace_state(&snapshot).await {
            tracing::warn!(agent_id = %self.state.agent_id, error = %e, "final persist failed");
        }

        // Defensive: subscribers may already be gone.
        self.deps.bus.publish(
            topics::LIFECYCLE,
            BusEvent::AgentTerminated {
                agent_id: self.state.agent_id,
                reason: reason.to_string(),
                timestamp: self.now(),
            },
        );
    }

    pub(super) fn now(&self) -> u64 {
        self.deps.clock.epoch_ms()
    }

    pub(super) fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        self.deps.bus.publish(
            &topics::agent_logs(&self.state.agent_id),
            BusEvent::LogEntry {
                agent_id: self.state.agent_id,
                level,
                message,
                meta: None,
            },
        );
    }

    /// Mark a continuation wanted and poke the mailbox once.
    pub(super) fn schedule_consensus(&mut self) {
        if !self.state.consensus_scheduled {
            self.state.consensus_scheduled = true;
            let _ = self.self_tx.send(AgentMsg::TriggerConsensus);
        }
    }

    pub(super) fn cancel_wait_timer(&mut self) {
        if let Some(t) = self.wait_timer.take() {
            tracing::debug!(agent_id = %self.state.agent_id, logical_id = %t.logical_id, "cancelling wait timer");
            t.cancel();
        }
    }

    /// Install a new wait timer: the old one is cancelled and the
    /// generation advanced before the new one is armed.
    pub(super) fn arm_wait_timer(&mut self, logical_id: String, duration: Duration) {
        self.cancel_wait_timer();
        self.state.timer_generation += 1;
        let generation = self.state.timer_generation;
        tracing::debug!(
            agent_id = %self.state.agent_id,
            %logical_id,
            generation,
            secs = duration.as_secs(),
            "arming wait timer"
        );
        self.wait_timer = Some(timer::arm(&self.self_tx, logical_id, generation, duration));
    }

    /// Spawn the consensus cycle as its own task so the mailbox stays
    /// responsive; completion comes back as `CycleComplete`.
    pub(super) fn start_cycle(&mut self) {
        self.cycle_in_flight = true;
        self.cycles_started += 1;

        let engine =
            ConsensusEngine::new(Arc::clone(&self.deps.oracle), self.config.consensus.clone());
        let pool = self.config.model_pool.clone();
        let system_prompt = self.deps.prompt.build_system_prompt(
            &ProfileContext {
                profile_name: self.state.profile_name.clone(),
                profile_description: self.state.profile_description.clone(),
            },
            &self.config.capabilities,
            &allowed_actions(&self.config.capabilities),
            &self.config.active_skills,
            RESPONSE_SCHEMA,
        );
        let histories = self.state.histories.clone();
        let tx = self.self_tx.clone();

        tracing::debug!(agent_id = %self.state.agent_id, pool = pool.len(), "starting consensus cycle");
        tokio::spawn(async move {
            let outcome = engine.decide(&pool, &system_prompt, &histories).await;
            let _ = tx.send(AgentMsg::CycleComplete { outcome });
        });
    }

    /// Act on the cycle's chosen action: dispatch a router, arm a timer,
    /// or terminate.
    pub(super) async fn apply_decision(&mut self, decision: Decision) -> Flow {
        if decision.kind == DecisionKind::ForcedDecision {
            self.state.histories.append_all(HistoryEntry::new(
                HistoryKind::Event,
                format!("no consensus after {} rounds; decision was forced", decision.rounds),
                self.now(),
            ));
        }

        let request = decision.action;
        if let Some(ref report) = request.bug_report {
            self.log(LogLevel::Warn, format!("bug report from oracles: {report}"));
        }
        match request.kind {
            ActionKind::TaskComplete => {
                self.log(LogLevel::Info, "task complete");
                Flow::Stop("task_complete".to_string())
            }
            ActionKind::Wait => {
                match request.wait {
                    WaitDirective::Timed(secs) => {
                        self.arm_wait_timer("wait".to_string(), Duration::from_secs(secs));
                    }
                    // A blocking (or degenerate immediate) wait just goes
                    // idle until the next input arrives.
                    WaitDirective::Block | WaitDirective::Continue => {}
                }
                Flow::Continue
            }
            ActionKind::ShellStatus | ActionKind::TerminateShell => {
                self.route_shell_control(request).await;
                Flow::Continue
            }
            _ => {
                self.dispatch_action(request);
                Flow::Continue
            }
        }
    }

    /// Dispatch one routable action to a fresh router.
    pub(super) fn dispatch_action(&mut self, request: ActionRequest) {
        let action_id = self.state.next_action_id();
        let router_id = RouterId::new();
        self.state.pending_actions.insert(
            action_id,
            PendingAction {
                kind: request.kind,
                params: request.params.clone(),
                started_at: self.now(),
                auto_complete_todo: request.auto_complete_todo,
                wait: request.wait,
                router_id,
            },
        );

        self.deps.bus.publish(
            topics::ACTIONS,
            BusEvent::ActionStarted {
                agent_id: self.state.agent_id,
                action_type: request.kind,
                action_id,
                params: request.params.clone(),
            },
        );
        tracing::info!(
            agent_id = %self.state.agent_id,
            action = %request.kind,
            %action_id,
            wait = %request.wait,
            "dispatching action"
        );

        let prepared_child = (request.kind == ActionKind::SpawnChild)
            .then(|| self.child_config_from(&request.params));

        let wait = request.wait;
        let handle = router::spawn(RouterArgs {
            router_id,
            action_id,
            request,
            agent_id: self.state.agent_id,
            agent_tx: self.self_tx.clone(),
            capabilities: self.config.capabilities.clone(),
            executors: self.deps.executors.clone(),
            hierarchy: self.deps.hierarchy.clone(),
            prepared_child,
        });
        self.active_routers.insert(router_id, handle);

        match wait {
            WaitDirective::Continue => self.schedule_consensus(),
            WaitDirective::Timed(secs) => {
                self.arm_wait_timer(format!("action-{action_id}"), Duration::from_secs(secs));
            }
            WaitDirective::Block => {}
        }
    }

    /// shell_status / terminate_shell go through the command's existing
    /// router rather than a fresh one.
    async fn route_shell_control(&mut self, request: ActionRequest) {
        let command_id = request
            .params
            .get("command_id")
            .and_then(|v| v.as_str())
            .map(CommandId::from_string);

        let router = command_id
            .as_ref()
            .and_then(|id| self.shell_routers.get(id))
            .and_then(|rid| self.active_routers.get(rid));

        let summary = match (command_id, router) {
            (Some(command_id), Some(handle)) => match request.kind {
                ActionKind::TerminateShell => {
                    let (reply, rx) = tokio::sync::oneshot::channel();
                    if handle.ctl.send(RouterCtl::TerminateShell { reply }).is_ok() {
                        match rx.await {
                            Ok(Ok(())) => format!("{command_id}: terminated"),
                            Ok(Err(e)) => format!("{command_id}: {e}"),
                            Err(_) => format!("{command_id}: router went away"),
                        }
                    } else {
                        format!("{command_id}: router went away")
                    }
                }
                _ => {
                    let (reply, rx) = tokio::sync::oneshot::channel();
                    if handle.ctl.send(RouterCtl::ShellStatus { reply }).is_ok() {
                        match rx.await {
                            Ok(Ok(status)) => status,
                            Ok(Err(e)) => format!("{command_id}: {e}"),
                            Err(_) => format!("{command_id}: router went away"),
                        }
                    } else {
                        format!("{command_id}: router went away")
                    }
                }
            },
            (Some(command_id), None) => format!("no running shell for {command_id}"),
            (None, _) => "shell control requires 'command_id'".to_string(),
        };

        self.state.histories.append_all(
            HistoryEntry::new(HistoryKind::Result, summary, self.now())
                .with_action_type(request.kind.name()),
        );
        match request.wait {
            WaitDirective::Continue => self.schedule_consensus(),
            WaitDirective::Timed(secs) => {
                self.arm_wait_timer("shell-control".to_string(), Duration::from_secs(secs));
            }
            WaitDirective::Block => {}
        }
    }

    /// Build the child's config from this agent's own plus spawn params.
    pub(super) fn child_config_from(&self, params: &serde_json::Value) -> AgentConfig {
        let profile_name =
            params.get("profile_name").and_then(|v| v.as_str()).unwrap_or("child");
        let profile_description =
            params.get("profile_description").and_then(|v| v.as_str()).unwrap_or("");
        let allocated = params.get("budget_allocated").and_then(|v| v.as_f64());
        self.config.child(profile_name, profile_description, allocated)
    }
}
