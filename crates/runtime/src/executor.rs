// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The action-execution boundary.
//!
//! Side-effect plumbing (shell, file, API, MCP) is consumed through one
//! [`ActionExecutor`] per action family. Shell executors may complete
//! synchronously or hand back a running [`ShellSession`] that the action
//! router services until the command finishes.

use crate::agent::mailbox::{AgentMsg, MessageSender};
use crate::registry::Registry;
use async_trait::async_trait;
use qo_core::{ActionFailure, ActionKind, AgentId, CommandId, ResultPayload};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Control messages routed to a running shell command.
#[derive(Debug)]
pub enum ShellControl {
    Status { reply: oneshot::Sender<Result<String, ActionFailure>> },
    Terminate { reply: oneshot::Sender<Result<(), ActionFailure>> },
}

/// A shell command that returned `{command_id, status: running}`.
///
/// The executor keeps running the command; the router owning this session
/// forwards status/terminate calls and waits on `completion`.
pub struct ShellSession {
    pub command_id: CommandId,
    pub completion: oneshot::Receiver<Result<ResultPayload, ActionFailure>>,
    pub control: mpsc::UnboundedSender<ShellControl>,
}

/// Outcome of one executor invocation.
pub enum ExecOutcome {
    Completed(ResultPayload),
    RunningShell(ShellSession),
}

/// One action family's side-effect implementation.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        kind: ActionKind,
        params: &serde_json::Value,
        agent_id: &AgentId,
    ) -> Result<ExecOutcome, ActionFailure>;
}

/// Which executor serves an action. Runtime-internal actions (wait,
/// hierarchy, todos, termination) have no domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecDomain {
    Shell,
    File,
    Api,
    Mcp,
    Message,
}

impl ExecDomain {
    pub fn of(kind: ActionKind) -> Option<ExecDomain> {
        match kind {
            ActionKind::RunShell => Some(ExecDomain::Shell),
            ActionKind::ReadFile | ActionKind::ListDirectory | ActionKind::WriteFile => {
                Some(ExecDomain::File)
            }
            ActionKind::ApiCall => Some(ExecDomain::Api),
            ActionKind::McpTool => Some(ExecDomain::Mcp),
            ActionKind::SendMessage => Some(ExecDomain::Message),
            _ => None,
        }
    }
}

/// Registered executors, one per domain.
#[derive(Clone, Default)]
pub struct ExecutorSet {
    executors: HashMap<ExecDomain, Arc<dyn ActionExecutor>>,
}

impl ExecutorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, domain: ExecDomain, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executors.insert(domain, executor);
        self
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionExecutor>> {
        ExecDomain::of(kind).and_then(|d| self.executors.get(&d).cloned())
    }

    /// Run `kind` through its registered executor.
    pub async fn execute(
        &self,
        kind: ActionKind,
        params: &serde_json::Value,
        agent_id: &AgentId,
    ) -> Result<ExecOutcome, ActionFailure> {
        match self.get(kind) {
            Some(executor) => executor.execute(kind, params, agent_id).await,
            None => Err(ActionFailure::NoExecutor(kind.name())),
        }
    }
}

/// In-tree executor for `send_message`: delivers through the registry.
pub struct MessageExecutor {
    registry: Registry,
}

impl MessageExecutor {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ActionExecutor for MessageExecutor {
    async fn execute(
        &self,
        _kind: ActionKind,
        params: &serde_json::Value,
        agent_id: &AgentId,
    ) -> Result<ExecOutcome, ActionFailure> {
        let to = params
            .get("to")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ActionFailure::Execution("send_message requires 'to'".into()))?;
        let content = params
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ActionFailure::Execution("send_message requires 'content'".into()))?;

        let target = AgentId::from_string(to);
        let Some(handle) = self.registry.get(&target) else {
            return Err(ActionFailure::Execution(format!("agent not found: {to}")));
        };
        if !handle.send(AgentMsg::Message {
            content: content.to_string(),
            sender: MessageSender::Agent(*agent_id),
        }) {
            return Err(ActionFailure::Execution(format!("agent mailbox closed: {to}")));
        }
        Ok(ExecOutcome::Completed(ResultPayload::Text(format!("message delivered to {to}"))))
    }
}
