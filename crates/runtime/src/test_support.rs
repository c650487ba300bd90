// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes and harness pieces for runtime tests.

use crate::agent::mailbox::AgentMsg;
use crate::agent::state::AgentProbe;
use crate::bus::EventBus;
use crate::config::AgentConfig;
use crate::executor::{
    ActionExecutor, ExecDomain, ExecOutcome, ExecutorSet, MessageExecutor, ShellControl,
    ShellSession,
};
use crate::persist::MemoryStore;
use crate::registry::{AgentHandle, Registry};
use crate::supervisor::{RuntimeDeps, Supervisor};
use async_trait::async_trait;
use parking_lot::Mutex;
use qo_consensus::test_support::ScriptedOracle;
use qo_consensus::{ConsensusConfig, StaticPromptBuilder};
use qo_core::{
    ActionFailure, ActionKind, AgentId, CommandId, FakeClock, ModelId, ResultPayload, TaskId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Executor that records calls and returns scripted (or default) results.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<(ActionKind, serde_json::Value)>>,
    results: Mutex<VecDeque<Result<ResultPayload, ActionFailure>>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&self, result: Result<ResultPayload, ActionFailure>) {
        self.results.lock().push_back(result);
    }

    /// Make every execution take this long (for in-flight assertions).
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<(ActionKind, serde_json::Value)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(
        &self,
        kind: ActionKind,
        params: &serde_json::Value,
        _agent_id: &AgentId,
    ) -> Result<ExecOutcome, ActionFailure> {
        self.calls.lock().push((kind, params.clone()));
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.results.lock().pop_front();
        match scripted {
            Some(Ok(payload)) => Ok(ExecOutcome::Completed(payload)),
            Some(Err(failure)) => Err(failure),
            None => Ok(ExecOutcome::Completed(ResultPayload::Text("ok".to_string()))),
        }
    }
}

type CompletionSlot = Arc<Mutex<Option<oneshot::Sender<Result<ResultPayload, ActionFailure>>>>>;

/// Shell executor whose commands run until the test completes them.
/// `params.sync = true` completes immediately instead.
#[derive(Default)]
pub struct FakeShellExecutor {
    pending: Mutex<HashMap<CommandId, (String, CompletionSlot)>>,
}

impl FakeShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running_commands(&self) -> Vec<CommandId> {
        self.pending.lock().keys().copied().collect()
    }

    /// Look up a running command's id by its command text.
    pub fn command_id_of(&self, command_text: &str) -> Option<CommandId> {
        self.pending
            .lock()
            .iter()
            .find(|(_, (command, _))| command == command_text)
            .map(|(id, _)| *id)
    }

    /// Finish a running command with the given output.
    pub fn complete(&self, command_id: &CommandId, output: &str) -> bool {
        let entry = self.pending.lock().remove(command_id);
        match entry.and_then(|(_, slot)| slot.lock().take()) {
            Some(tx) => tx.send(Ok(ResultPayload::Text(output.to_string()))).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl ActionExecutor for FakeShellExecutor {
    async fn execute(
        &self,
        _kind: ActionKind,
        params: &serde_json::Value,
        _agent_id: &AgentId,
    ) -> Result<ExecOutcome, ActionFailure> {
        let command =
            params.get("command").and_then(|v| v.as_str()).unwrap_or("true").to_string();
        if params.get("sync").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Ok(ExecOutcome::Completed(ResultPayload::Text(format!("ran: {command}"))));
        }

        let command_id = CommandId::new();
        let (done_tx, done_rx) = oneshot::channel();
        let (ctl_tx, mut ctl_rx) = mpsc::unbounded_channel();
        let slot: CompletionSlot = Arc::new(Mutex::new(Some(done_tx)));
        self.pending.lock().insert(command_id, (command.clone(), Arc::clone(&slot)));

        tokio::spawn(async move {
            while let Some(ctl) = ctl_rx.recv().await {
                match ctl {
                    ShellControl::Status { reply } => {
                        let state =
                            if slot.lock().is_some() { "running" } else { "finished" };
                        let _ = reply.send(Ok(format!("{command_id}: {state} ({command})")));
                    }
                    ShellControl::Terminate { reply } => {
                        if let Some(tx) = slot.lock().take() {
                            let _ = tx.send(Ok(ResultPayload::Text("terminated".to_string())));
                        }
                        let _ = reply.send(Ok(()));
                        break;
                    }
                }
            }
        });

        Ok(ExecOutcome::RunningShell(ShellSession {
            command_id,
            completion: done_rx,
            control: ctl_tx,
        }))
    }
}

/// A fully wired runtime over fakes.
pub struct TestRuntime {
    pub supervisor: Supervisor<FakeClock>,
    pub oracle: Arc<ScriptedOracle>,
    pub store: Arc<MemoryStore>,
    pub clock: FakeClock,
    pub bus: EventBus,
    pub registry: Registry,
    pub shell: Arc<FakeShellExecutor>,
    pub recorder: Arc<RecordingExecutor>,
}

impl TestRuntime {
    pub fn new() -> Self {
        let oracle = Arc::new(ScriptedOracle::new());
        let store = Arc::new(MemoryStore::new());
        let clock = FakeClock::new();
        let bus = EventBus::new();
        let registry = Registry::new();
        let shell = Arc::new(FakeShellExecutor::new());
        let recorder = Arc::new(RecordingExecutor::new());

        let executors = ExecutorSet::new()
            .with(ExecDomain::Shell, Arc::clone(&shell) as Arc<dyn ActionExecutor>)
            .with(ExecDomain::File, Arc::clone(&recorder) as Arc<dyn ActionExecutor>)
            .with(ExecDomain::Api, Arc::clone(&recorder) as Arc<dyn ActionExecutor>)
            .with(ExecDomain::Mcp, Arc::clone(&recorder) as Arc<dyn ActionExecutor>)
            .with(ExecDomain::Message, Arc::new(MessageExecutor::new(registry.clone())));

        let supervisor = Supervisor::new(RuntimeDeps {
            oracle: Arc::clone(&oracle) as Arc<dyn qo_consensus::OracleClient>,
            store: Arc::clone(&store) as Arc<dyn crate::persist::PersistenceStore>,
            prompt: Arc::new(StaticPromptBuilder),
            executors,
            bus: bus.clone(),
            registry: registry.clone(),
            clock: clock.clone(),
        });

        Self { supervisor, oracle, store, clock, bus, registry, shell, recorder }
    }

    /// A single-model config with everything enabled, suitable for most
    /// scenarios.
    pub fn config(&self, models: &[&str]) -> AgentConfig {
        let mut consensus = ConsensusConfig::default();
        consensus.cycle_timeout = Duration::from_secs(5);
        AgentConfig::new(TaskId::from_string("tsk-test"))
            .model_pool(models.iter().map(|m| ModelId::new(*m)).collect())
            .capabilities(vec![
                qo_core::CapabilityGroup::Hierarchy,
                qo_core::CapabilityGroup::FileRead,
                qo_core::CapabilityGroup::FileWrite,
                qo_core::CapabilityGroup::ExternalApi,
                qo_core::CapabilityGroup::LocalExecution,
            ])
            .consensus(consensus)
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Ask a live agent for its state snapshot. `None` when it is gone.
pub async fn probe(handle: &AgentHandle) -> Option<AgentProbe> {
    let (reply, rx) = oneshot::channel();
    if !handle.send(AgentMsg::Probe { reply }) {
        return None;
    }
    rx.await.ok()
}

/// Let queued mailbox work settle: yields the scheduler a few times.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
