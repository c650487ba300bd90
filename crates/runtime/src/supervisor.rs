// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-for-one dynamic supervision.
//!
//! The supervisor spawns agent tasks, watches their exits, routes DOWN
//! notifications between related agents, and restarts faulted agents from
//! their last persisted snapshot. Restart policy is transient: normal and
//! requested stops are final. Grace periods are unbounded — termination
//! always waits for final persistence writes.

use crate::agent::mailbox::{AgentMsg, Mailbox};
use crate::agent::process::{AgentProc, ProcDeps};
use crate::agent::state::{AgentState, ExitReason};
use crate::bus::{topics, EventBus};
use crate::config::AgentConfig;
use crate::error::RuntimeError;
use crate::executor::ExecutorSet;
use crate::persist::{AgentSnapshot, PersistenceStore};
use crate::registry::{AgentHandle, Registry};
use qo_consensus::{OracleClient, PromptBuilder};
use qo_core::{AgentId, Budget, BusEvent, Clock};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Shared collaborators for every agent the supervisor starts.
pub struct RuntimeDeps<C: Clock> {
    pub oracle: Arc<dyn OracleClient>,
    pub store: Arc<dyn PersistenceStore>,
    pub prompt: Arc<dyn PromptBuilder>,
    pub executors: ExecutorSet,
    pub bus: EventBus,
    pub registry: Registry,
    pub clock: C,
}

/// Commands serialized through the supervisor's service loop.
pub(crate) enum SupervisorCmd {
    StartChild {
        config: AgentConfig,
        budget_allocated: Option<f64>,
        reply: oneshot::Sender<Result<AgentId, String>>,
    },
    DismissChild {
        parent_id: AgentId,
        child_id: AgentId,
        reply: oneshot::Sender<Result<(), String>>,
    },
    AgentExited {
        agent_id: AgentId,
        reason: ExitReason,
    },
}

/// Routers' window into the supervisor: spawn and dismiss children
/// without holding the supervisor itself.
#[derive(Clone)]
pub struct HierarchyClient {
    cmd_tx: mpsc::UnboundedSender<SupervisorCmd>,
}

impl HierarchyClient {
    pub(crate) async fn spawn_child(&self, config: AgentConfig) -> Result<AgentId, String> {
        let budget_allocated = match config.budget {
            Budget { allocated: Some(amount), .. } => Some(amount),
            _ => None,
        };
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SupervisorCmd::StartChild { config, budget_allocated, reply })
            .map_err(|_| "supervisor is shut down".to_string())?;
        rx.await.map_err(|_| "supervisor dropped the request".to_string())?
    }

    pub(crate) async fn dismiss_child(
        &self,
        parent_id: AgentId,
        child_id: AgentId,
    ) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SupervisorCmd::DismissChild { parent_id, child_id, reply })
            .map_err(|_| "supervisor is shut down".to_string())?;
        rx.await.map_err(|_| "supervisor dropped the request".to_string())?
    }
}

struct Inner<C: Clock> {
    deps: RuntimeDeps<C>,
    cmd_tx: mpsc::UnboundedSender<SupervisorCmd>,
    shutdown: CancellationToken,
}

/// The supervisor. Cheap to clone.
pub struct Supervisor<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for Supervisor<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Clock> Supervisor<C> {
    pub fn new(deps: RuntimeDeps<C>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            inner: Arc::new(Inner { deps, cmd_tx, shutdown: CancellationToken::new() }),
        };
        tokio::spawn(service_loop(supervisor.clone(), cmd_rx));
        supervisor
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.deps.registry
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.deps.bus
    }

    pub fn store(&self) -> &Arc<dyn PersistenceStore> {
        &self.inner.deps.store
    }

    pub(crate) fn hierarchy_client(&self) -> HierarchyClient {
        HierarchyClient { cmd_tx: self.inner.cmd_tx.clone() }
    }

    /// Start a fresh agent.
    pub fn start_agent(&self, config: AgentConfig) -> Result<AgentHandle, RuntimeError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(RuntimeError::SupervisorUnavailable);
        }
        let state = AgentState::from_config(&config);
        Ok(self.spawn_process(state, config, false))
    }

    /// Start an agent from a persisted snapshot, preserving its histories
    /// and skipping the initial persistence write.
    pub fn restore_agent(&self, snapshot: &AgentSnapshot) -> Result<AgentHandle, RuntimeError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(RuntimeError::SupervisorUnavailable);
        }
        let mut config = AgentConfig::new(snapshot.task_id)
            .agent_id(snapshot.agent_id)
            .profile_name(snapshot.profile_name.clone())
            .profile_description(snapshot.profile_description.clone())
            .model_pool(snapshot.model_pool.clone())
            .capabilities(snapshot.capabilities.clone())
            .budget(snapshot.budget);
        config.parent_id = snapshot.parent_id;
        config.parent_ref = snapshot.parent_id;

        let state = AgentState::from_snapshot(snapshot);
        Ok(self.spawn_process(state, config, true))
    }

    /// Request a graceful stop and wait (unbounded) for the agent to
    /// finish its final writes.
    pub async fn stop_agent(&self, agent_id: &AgentId) -> Result<(), RuntimeError> {
        let handle = self
            .inner
            .deps
            .registry
            .get(agent_id)
            .ok_or(RuntimeError::AgentNotFound(*agent_id))?;
        handle.send(AgentMsg::StopRequested);
        handle.wait_done().await;
        Ok(())
    }

    /// Stop every agent and refuse new work. Grace is unbounded.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let agents = self.inner.deps.registry.all();
        for handle in &agents {
            handle.send(AgentMsg::StopRequested);
        }
        for handle in agents {
            handle.wait_done().await;
        }
    }

    fn spawn_process(
        &self,
        state: AgentState,
        config: AgentConfig,
        restoration: bool,
    ) -> AgentHandle {
        let agent_id = state.agent_id;
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(false);

        let handle =
            AgentHandle::new(agent_id, state.parent_id, state.task_id, tx.clone(), done_rx);
        self.inner.deps.registry.register(handle.clone());

        let deps = ProcDeps {
            oracle: Arc::clone(&self.inner.deps.oracle),
            store: Arc::clone(&self.inner.deps.store),
            prompt: Arc::clone(&self.inner.deps.prompt),
            executors: self.inner.deps.executors.clone(),
            bus: self.inner.deps.bus.clone(),
            registry: self.inner.deps.registry.clone(),
            clock: self.inner.deps.clock.clone(),
            hierarchy: self.hierarchy_client(),
        };
        let proc = AgentProc::new(state, config, deps, Mailbox::new(rx), tx, restoration);

        let cmd_tx = self.inner.cmd_tx.clone();
        let join = tokio::spawn(proc.run());
        tokio::spawn(async move {
            let reason = match join.await {
                Ok(reason) => reason,
                Err(e) => ExitReason::Fault(format!("agent task panicked: {e}")),
            };
            let _ = done_tx.send(true);
            let _ = cmd_tx.send(SupervisorCmd::AgentExited { agent_id, reason });
        });

        handle
    }

    /// Exit bookkeeping: route DOWNs, unregister, restart on fault.
    async fn handle_agent_exited(&self, agent_id: AgentId, reason: ExitReason) {
        let deps = &self.inner.deps;
        let exited = deps.registry.get(&agent_id);

        if let ExitReason::Fault(ref error) = reason {
            tracing::error!(%agent_id, error, "agent exited abnormally");
            deps.bus.publish(
                topics::LIFECYCLE,
                BusEvent::AgentTerminated {
                    agent_id,
                    reason: reason.label(),
                    timestamp: deps.clock.epoch_ms(),
                },
            );

            if !self.inner.shutdown.is_cancelled() {
                match deps.store.load_agent(&agent_id).await {
                    Ok(Some(snapshot)) => {
                        deps.registry.unregister(&agent_id);
                        match self.restore_agent(&snapshot) {
                            Ok(_) => {
                                tracing::info!(%agent_id, "agent restarted from snapshot");
                                if let Some(parent_id) = snapshot.parent_id {
                                    if let Some(parent) = deps.registry.get(&parent_id) {
                                        parent.send(AgentMsg::ChildRestored {
                                            child_id: agent_id,
                                            spawned_at: deps.clock.epoch_ms(),
                                            budget_allocated: None,
                                        });
                                    }
                                }
                                return;
                            }
                            Err(e) => {
                                tracing::error!(%agent_id, error = %e, "restart failed");
                            }
                        }
                    }
                    Ok(None) => tracing::warn!(%agent_id, "no snapshot available for restart"),
                    Err(e) => tracing::warn!(%agent_id, error = %e, "snapshot load failed"),
                }
            }
        } else {
            tracing::info!(%agent_id, "agent exited");
        }

        // Not restarted: notify relatives, then drop from the registry.
        for child in deps.registry.children_of(&agent_id) {
            child.send(AgentMsg::PeerDown { agent_id });
        }
        if let Some(parent_id) = exited.and_then(|h| h.parent_id) {
            if let Some(parent) = deps.registry.get(&parent_id) {
                parent.send(AgentMsg::PeerDown { agent_id });
            }
        }
        deps.registry.unregister(&agent_id);
    }
}

async fn service_loop<C: Clock>(
    supervisor: Supervisor<C>,
    mut cmd_rx: mpsc::UnboundedReceiver<SupervisorCmd>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            SupervisorCmd::StartChild { config, budget_allocated, reply } => {
                let parent_id = config.parent_id;
                let child_id = config.agent_id;
                match supervisor.start_agent(config) {
                    Ok(_) => {
                        if let Some(parent_id) = parent_id {
                            if let Some(parent) = supervisor.registry().get(&parent_id) {
                                parent.send(AgentMsg::ChildSpawned {
                                    child_id,
                                    spawned_at: supervisor.inner.deps.clock.epoch_ms(),
                                    budget_allocated,
                                });
                            }
                        }
                        let _ = reply.send(Ok(child_id));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e.to_string()));
                    }
                }
            }
            SupervisorCmd::DismissChild { parent_id, child_id, reply } => {
                match supervisor.registry().get(&child_id) {
                    Some(child) if child.parent_id == Some(parent_id) => {
                        child.send(AgentMsg::StopRequested);
                        // Wait off-loop so dismissals can't stall exits.
                        tokio::spawn(async move {
                            child.wait_done().await;
                            let _ = reply.send(Ok(()));
                        });
                    }
                    Some(_) => {
                        let _ = reply
                            .send(Err(format!("{child_id} is not a child of {parent_id}")));
                    }
                    None => {
                        let _ = reply.send(Err(format!("child not found: {child_id}")));
                    }
                }
            }
            SupervisorCmd::AgentExited { agent_id, reason } => {
                supervisor.handle_agent_exited(agent_id, reason).await;
            }
        }
    }
}
