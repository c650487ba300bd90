// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The action taxonomy oracles choose from.
//!
//! The base set is always allowed; the rest is gated by the owning agent's
//! capability groups. Every action except a pure wait carries a `wait`
//! directive: `false`/`0` continue immediately, `true` block until the
//! result, `N > 0` continue after N seconds even without a result.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Capability groups gating parts of the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityGroup {
    FileRead,
    FileWrite,
    ExternalApi,
    Hierarchy,
    LocalExecution,
}

crate::simple_display! {
    CapabilityGroup {
        FileRead => "file_read",
        FileWrite => "file_write",
        ExternalApi => "external_api",
        Hierarchy => "hierarchy",
        LocalExecution => "local_execution",
    }
}

/// Every action an oracle can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    // base set
    Wait,
    SendMessage,
    SetTodos,
    TaskComplete,
    BatchSync,
    BatchAsync,
    // hierarchy
    SpawnChild,
    DismissChild,
    AdjustChildBudget,
    // file_read / file_write
    ReadFile,
    ListDirectory,
    WriteFile,
    // external_api
    ApiCall,
    McpTool,
    // local_execution
    RunShell,
    ShellStatus,
    TerminateShell,
}

crate::simple_display! {
    ActionKind {
        Wait => "wait",
        SendMessage => "send_message",
        SetTodos => "set_todos",
        TaskComplete => "task_complete",
        BatchSync => "batch_sync",
        BatchAsync => "batch_async",
        SpawnChild => "spawn_child",
        DismissChild => "dismiss_child",
        AdjustChildBudget => "adjust_child_budget",
        ReadFile => "read_file",
        ListDirectory => "list_directory",
        WriteFile => "write_file",
        ApiCall => "api_call",
        McpTool => "mcp_tool",
        RunShell => "run_shell",
        ShellStatus => "shell_status",
        TerminateShell => "terminate_shell",
    }
}

impl ActionKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "wait" => Self::Wait,
            "send_message" => Self::SendMessage,
            "set_todos" => Self::SetTodos,
            "task_complete" => Self::TaskComplete,
            "batch_sync" => Self::BatchSync,
            "batch_async" => Self::BatchAsync,
            "spawn_child" => Self::SpawnChild,
            "dismiss_child" => Self::DismissChild,
            "adjust_child_budget" => Self::AdjustChildBudget,
            "read_file" => Self::ReadFile,
            "list_directory" => Self::ListDirectory,
            "write_file" => Self::WriteFile,
            "api_call" => Self::ApiCall,
            "mcp_tool" => Self::McpTool,
            "run_shell" => Self::RunShell,
            "shell_status" => Self::ShellStatus,
            "terminate_shell" => Self::TerminateShell,
            _ => return None,
        })
    }

    pub fn name(&self) -> String {
        self.to_string()
    }

    /// `None` for the always-allowed base set.
    pub fn capability(&self) -> Option<CapabilityGroup> {
        match self {
            Self::Wait
            | Self::SendMessage
            | Self::SetTodos
            | Self::TaskComplete
            | Self::BatchSync
            | Self::BatchAsync => None,
            Self::SpawnChild | Self::DismissChild | Self::AdjustChildBudget => {
                Some(CapabilityGroup::Hierarchy)
            }
            Self::ReadFile | Self::ListDirectory => Some(CapabilityGroup::FileRead),
            Self::WriteFile => Some(CapabilityGroup::FileWrite),
            Self::ApiCall | Self::McpTool => Some(CapabilityGroup::ExternalApi),
            Self::RunShell | Self::ShellStatus | Self::TerminateShell => {
                Some(CapabilityGroup::LocalExecution)
            }
        }
    }

    /// Tie-break priority class. Terminal actions outrank substantive work;
    /// a pure wait ranks below everything else. Batch clusters take the max
    /// over their sub-actions.
    pub fn priority(&self) -> u8 {
        match self {
            Self::TaskComplete => 3,
            Self::Wait => 1,
            _ => 2,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::BatchSync | Self::BatchAsync)
    }
}

/// The `wait` field of an action response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitDirective {
    /// `false` / `0`: continue to the next cycle immediately.
    #[default]
    Continue,
    /// `true`: block until the action's result arrives.
    Block,
    /// `N > 0`: continue after N seconds even without a result.
    Timed(u64),
}

impl WaitDirective {
    /// Contribution to the conservative wait score: `(count-of-true,
    /// sum-of-finite-seconds)`.
    pub fn score(&self) -> (u32, u64) {
        match self {
            WaitDirective::Continue => (0, 0),
            WaitDirective::Block => (1, 0),
            WaitDirective::Timed(secs) => (0, *secs),
        }
    }
}

impl Serialize for WaitDirective {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WaitDirective::Continue => serializer.serialize_bool(false),
            WaitDirective::Block => serializer.serialize_bool(true),
            WaitDirective::Timed(secs) => serializer.serialize_u64(*secs),
        }
    }
}

impl<'de> Deserialize<'de> for WaitDirective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Bool(true) => Ok(WaitDirective::Block),
            serde_json::Value::Bool(false) => Ok(WaitDirective::Continue),
            serde_json::Value::Number(n) => match n.as_u64() {
                Some(0) => Ok(WaitDirective::Continue),
                Some(secs) => Ok(WaitDirective::Timed(secs)),
                None => Err(D::Error::custom("wait must be a non-negative integer")),
            },
            other => Err(D::Error::custom(format!("wait must be bool or integer, got {other}"))),
        }
    }
}

impl std::fmt::Display for WaitDirective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitDirective::Continue => f.write_str("continue"),
            WaitDirective::Block => f.write_str("block"),
            WaitDirective::Timed(secs) => write!(f, "{secs}s"),
        }
    }
}

/// One fully-parsed oracle response: the chosen action plus its modifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub kind: ActionKind,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub wait: WaitDirective,
    #[serde(default)]
    pub auto_complete_todo: bool,
    #[serde(default)]
    pub condense: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_report: Option<String>,
}

impl ActionRequest {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            params: serde_json::Value::Object(Default::default()),
            reasoning: None,
            wait: WaitDirective::Continue,
            auto_complete_todo: false,
            condense: false,
            bug_report: None,
        }
    }

    crate::setters! {
        set {
            params: serde_json::Value,
            wait: WaitDirective,
            auto_complete_todo: bool,
        }
        option {
            reasoning: String,
        }
    }

    /// Sub-action kinds of a batch request, in declaration order.
    /// Empty for non-batch actions or malformed batch params.
    pub fn sub_kinds(&self) -> Vec<ActionKind> {
        if !self.kind.is_batch() {
            return Vec::new();
        }
        self.params
            .get("actions")
            .and_then(|v| v.as_array())
            .map(|actions| {
                actions
                    .iter()
                    .filter_map(|a| a.get("action"))
                    .filter_map(|v| v.as_str())
                    .filter_map(ActionKind::from_name)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Priority for winner selection; batches take the max over their
    /// sub-actions.
    pub fn priority(&self) -> u8 {
        if self.kind.is_batch() {
            self.sub_kinds().iter().map(|k| k.priority()).max().unwrap_or(self.kind.priority())
        } else {
            self.kind.priority()
        }
    }
}

/// Why an action could not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ActionFailure {
    #[error("action_not_allowed")]
    NotAllowed,
    #[error("no executor registered for {0}")]
    NoExecutor(String),
    #[error("{0}")]
    Execution(String),
}

/// Successful action payload, as routed back to the owning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultPayload {
    Text(String),
    /// Image payloads are appended to history as `image` entries.
    Image { media_type: String, data: Vec<u8> },
    /// Async shell continuation: the command keeps running under its router.
    ShellStarted { command_id: crate::id::CommandId },
}

impl ResultPayload {
    pub fn summary(&self) -> String {
        match self {
            ResultPayload::Text(s) => s.clone(),
            ResultPayload::Image { media_type, .. } => format!("[image {media_type}]"),
            ResultPayload::ShellStarted { command_id } => {
                format!("shell running (command_id: {command_id})")
            }
        }
    }
}

/// Per-sub-action outcome inside a completed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub sub_kind: ActionKind,
    pub result: Result<ResultPayload, ActionFailure>,
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
