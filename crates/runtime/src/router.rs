// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ephemeral per-action workers.
//!
//! Each dispatched action gets its own router task: validate capability,
//! invoke the executor, cast the result back, exit. A router outlives its
//! action only for async shells, where it stays up to service status and
//! terminate calls until the command completes. The owning agent holds a
//! monitor: a drop guard casts `RouterDown` on any exit path, panics
//! included.

use crate::agent::mailbox::AgentMsg;
use crate::config::AgentConfig;
use crate::executor::{ExecOutcome, ExecutorSet, ShellControl, ShellSession};
use crate::supervisor::HierarchyClient;
use qo_core::{
    ActionFailure, ActionId, ActionKind, ActionRequest, AgentId, BatchItemResult,
    CapabilityGroup, ResultPayload, RouterId,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Control channel into one router.
#[derive(Debug)]
pub(crate) enum RouterCtl {
    /// Graceful stop during agent termination.
    Stop,
    ShellStatus { reply: oneshot::Sender<Result<String, ActionFailure>> },
    TerminateShell { reply: oneshot::Sender<Result<(), ActionFailure>> },
}

/// The owning agent's reference to one live router.
pub(crate) struct RouterHandle {
    pub router_id: RouterId,
    pub ctl: mpsc::UnboundedSender<RouterCtl>,
    pub join: JoinHandle<()>,
}

pub(crate) struct RouterArgs {
    pub router_id: RouterId,
    pub action_id: ActionId,
    pub request: ActionRequest,
    pub agent_id: AgentId,
    pub agent_tx: mpsc::UnboundedSender<AgentMsg>,
    pub capabilities: Vec<CapabilityGroup>,
    pub executors: ExecutorSet,
    pub hierarchy: HierarchyClient,
    /// Child config prepared by the agent for `spawn_child`.
    pub prepared_child: Option<AgentConfig>,
}

/// Casts `RouterDown` to the owning agent on every exit path.
struct DownGuard {
    router_id: RouterId,
    agent_tx: mpsc::UnboundedSender<AgentMsg>,
}

impl Drop for DownGuard {
    fn drop(&mut self) {
        let _ = self.agent_tx.send(AgentMsg::RouterDown { router_id: self.router_id });
    }
}

/// Spawn a router for one action instance.
pub(crate) fn spawn(args: RouterArgs) -> RouterHandle {
    let (ctl_tx, ctl_rx) = mpsc::unbounded_channel();
    let router_id = args.router_id;
    let join = tokio::spawn(run(args, ctl_rx));
    RouterHandle { router_id, ctl: ctl_tx, join }
}

async fn run(args: RouterArgs, mut ctl_rx: mpsc::UnboundedReceiver<RouterCtl>) {
    let _down = DownGuard { router_id: args.router_id, agent_tx: args.agent_tx.clone() };

    if let Some(group) = args.request.kind.capability() {
        if !args.capabilities.contains(&group) {
            tracing::warn!(
                agent_id = %args.agent_id,
                action = %args.request.kind,
                "action not allowed for this agent's capabilities"
            );
            send_result(&args, Err(ActionFailure::NotAllowed));
            return;
        }
    }

    match args.request.kind {
        ActionKind::BatchSync => run_batch_sync(&args).await,
        ActionKind::BatchAsync => run_batch_async(&args).await,
        ActionKind::SpawnChild => run_spawn_child(&args).await,
        ActionKind::DismissChild => run_dismiss_child(&args).await,
        ActionKind::AdjustChildBudget => run_adjust_child_budget(&args).await,
        ActionKind::SetTodos => run_set_todos(&args).await,
        kind => {
            match args.executors.execute(kind, &args.request.params, &args.agent_id).await {
                Ok(ExecOutcome::Completed(payload)) => send_result(&args, Ok(payload)),
                Ok(ExecOutcome::RunningShell(session)) => {
                    let command_id = session.command_id;
                    send_result(&args, Ok(ResultPayload::ShellStarted { command_id }));
                    service_shell(&args, session, &mut ctl_rx).await;
                }
                Err(failure) => send_result(&args, Err(failure)),
            }
        }
    }
}

fn send_result(args: &RouterArgs, result: Result<ResultPayload, ActionFailure>) {
    let _ = args
        .agent_tx
        .send(AgentMsg::ActionResult { action_id: args.action_id, result });
}

/// Keep servicing a running shell until it completes or the agent stops us.
async fn service_shell(
    args: &RouterArgs,
    mut session: ShellSession,
    ctl_rx: &mut mpsc::UnboundedReceiver<RouterCtl>,
) {
    loop {
        tokio::select! {
            done = &mut session.completion => {
                let result = done.unwrap_or_else(|_| {
                    Err(ActionFailure::Execution("shell executor dropped".into()))
                });
                let _ = args.agent_tx.send(AgentMsg::ShellCompleted {
                    command_id: session.command_id,
                    result,
                });
                return;
            }
            ctl = ctl_rx.recv() => match ctl {
                Some(RouterCtl::ShellStatus { reply }) => {
                    let (tx, rx) = oneshot::channel();
                    if session.control.send(ShellControl::Status { reply: tx }).is_ok() {
                        let status = rx.await.unwrap_or_else(|_| {
                            Err(ActionFailure::Execution("shell executor dropped".into()))
                        });
                        let _ = reply.send(status);
                    } else {
                        let _ = reply.send(Err(ActionFailure::Execution(
                            "shell control channel closed".into(),
                        )));
                    }
                }
                Some(RouterCtl::TerminateShell { reply }) => {
                    let (tx, rx) = oneshot::channel();
                    if session.control.send(ShellControl::Terminate { reply: tx }).is_ok() {
                        let outcome = rx.await.unwrap_or_else(|_| {
                            Err(ActionFailure::Execution("shell executor dropped".into()))
                        });
                        let _ = reply.send(outcome);
                        // Completion fires next via the executor.
                    } else {
                        let _ = reply.send(Err(ActionFailure::Execution(
                            "shell control channel closed".into(),
                        )));
                    }
                }
                Some(RouterCtl::Stop) | None => {
                    // Agent is terminating: ask the executor to stop, then
                    // wait (unbounded) for completion so cleanup finishes.
                    let (tx, rx) = oneshot::channel();
                    let _ = session.control.send(ShellControl::Terminate { reply: tx });
                    let _ = rx.await;
                    if let Ok(result) = (&mut session.completion).await {
                        let _ = args.agent_tx.send(AgentMsg::ShellCompleted {
                            command_id: session.command_id,
                            result,
                        });
                    }
                    return;
                }
            }
        }
    }
}

/// Parsed batch sub-action.
struct SubAction {
    kind: ActionKind,
    params: serde_json::Value,
}

fn parse_sub_actions(args: &RouterArgs) -> Result<Vec<SubAction>, ActionFailure> {
    let actions = args
        .request
        .params
        .get("actions")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ActionFailure::Execution("batch requires an 'actions' array".into()))?;

    let mut subs = Vec::with_capacity(actions.len());
    for entry in actions {
        let name = entry
            .get("action")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ActionFailure::Execution("batch sub-action missing 'action'".into()))?;
        let kind = ActionKind::from_name(name)
            .ok_or_else(|| ActionFailure::Execution(format!("unknown sub-action: {name}")))?;
        let params = entry.get("params").cloned().unwrap_or_else(|| serde_json::json!({}));
        subs.push(SubAction { kind, params });
    }
    Ok(subs)
}

/// Run one batch sub-action to completion. Async shells inside a batch are
/// awaited rather than left running.
async fn run_sub_action(args: &RouterArgs, sub: &SubAction) -> Result<ResultPayload, ActionFailure> {
    if let Some(group) = sub.kind.capability() {
        if !args.capabilities.contains(&group) {
            return Err(ActionFailure::NotAllowed);
        }
    }
    match args.executors.execute(sub.kind, &sub.params, &args.agent_id).await? {
        ExecOutcome::Completed(payload) => Ok(payload),
        ExecOutcome::RunningShell(session) => session
            .completion
            .await
            .unwrap_or_else(|_| Err(ActionFailure::Execution("shell executor dropped".into()))),
    }
}

/// Sub-actions strictly in order; stop on first error; aggregate.
async fn run_batch_sync(args: &RouterArgs) {
    let subs = match parse_sub_actions(args) {
        Ok(subs) => subs,
        Err(failure) => return send_result(args, Err(failure)),
    };

    let mut results = Vec::with_capacity(subs.len());
    for sub in &subs {
        let result = run_sub_action(args, sub).await;
        let failed = result.is_err();
        let _ = args.agent_tx.send(AgentMsg::BatchActionResult {
            action_id: args.action_id,
            sub_kind: sub.kind,
            result: result.clone(),
        });
        results.push(BatchItemResult { sub_kind: sub.kind, result });
        if failed {
            break;
        }
    }

    let _ = args
        .agent_tx
        .send(AgentMsg::BatchCompleted { batch_id: args.action_id, results });
}

/// Sub-actions concurrently; errors isolated; results delivered as they
/// complete, then the aggregate.
async fn run_batch_async(args: &RouterArgs) {
    let subs = match parse_sub_actions(args) {
        Ok(subs) => subs,
        Err(failure) => return send_result(args, Err(failure)),
    };

    let mut join_set = tokio::task::JoinSet::new();
    for (index, sub) in subs.iter().enumerate() {
        let kind = sub.kind;
        let params = sub.params.clone();
        let executors = args.executors.clone();
        let capabilities = args.capabilities.clone();
        let agent_id = args.agent_id;
        join_set.spawn(async move {
            let result = if let Some(group) = kind.capability() {
                if capabilities.contains(&group) {
                    execute_to_completion(&executors, kind, &params, &agent_id).await
                } else {
                    Err(ActionFailure::NotAllowed)
                }
            } else {
                execute_to_completion(&executors, kind, &params, &agent_id).await
            };
            (index, kind, result)
        });
    }

    let mut results: Vec<Option<BatchItemResult>> = (0..subs.len()).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        let Ok((index, kind, result)) = joined else {
            continue;
        };
        let _ = args.agent_tx.send(AgentMsg::BatchActionResult {
            action_id: args.action_id,
            sub_kind: kind,
            result: result.clone(),
        });
        results[index] = Some(BatchItemResult { sub_kind: kind, result });
    }

    let results: Vec<BatchItemResult> = results
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| BatchItemResult {
                sub_kind: subs[index].kind,
                result: Err(ActionFailure::Execution("sub-action task failed".into())),
            })
        })
        .collect();

    let _ = args
        .agent_tx
        .send(AgentMsg::BatchCompleted { batch_id: args.action_id, results });
}

async fn execute_to_completion(
    executors: &ExecutorSet,
    kind: ActionKind,
    params: &serde_json::Value,
    agent_id: &AgentId,
) -> Result<ResultPayload, ActionFailure> {
    match executors.execute(kind, params, agent_id).await? {
        ExecOutcome::Completed(payload) => Ok(payload),
        ExecOutcome::RunningShell(session) => session
            .completion
            .await
            .unwrap_or_else(|_| Err(ActionFailure::Execution("shell executor dropped".into()))),
    }
}

async fn run_spawn_child(args: &RouterArgs) {
    let Some(config) = args.prepared_child.clone() else {
        return send_result(
            args,
            Err(ActionFailure::Execution("spawn_child missing prepared config".into())),
        );
    };
    let child_id = config.agent_id;
    match args.hierarchy.spawn_child(config).await {
        Ok(spawned) => {
            let _ = args
                .agent_tx
                .send(AgentMsg::SpawnComplete { child_id: spawned, result: Ok(()) });
            send_result(args, Ok(ResultPayload::Text(format!("spawned child {spawned}"))));
        }
        Err(reason) => {
            let _ = args.agent_tx.send(AgentMsg::SpawnComplete {
                child_id,
                result: Err(reason.clone()),
            });
            send_result(args, Err(ActionFailure::Execution(reason)));
        }
    }
}

async fn run_dismiss_child(args: &RouterArgs) {
    let Some(child_id) = args.request.params.get("child_id").and_then(|v| v.as_str()) else {
        return send_result(
            args,
            Err(ActionFailure::Execution("dismiss_child requires 'child_id'".into())),
        );
    };
    let child_id = AgentId::from_string(child_id);
    match args.hierarchy.dismiss_child(args.agent_id, child_id).await {
        Ok(()) => send_result(args, Ok(ResultPayload::Text(format!("dismissed child {child_id}")))),
        Err(reason) => send_result(args, Err(ActionFailure::Execution(reason))),
    }
}

async fn run_adjust_child_budget(args: &RouterArgs) {
    let child_id = args.request.params.get("child_id").and_then(|v| v.as_str());
    let new_allocated = args.request.params.get("new_allocated").and_then(|v| v.as_f64());
    let (Some(child_id), Some(new_allocated)) = (child_id, new_allocated) else {
        return send_result(
            args,
            Err(ActionFailure::Execution(
                "adjust_child_budget requires 'child_id' and 'new_allocated'".into(),
            )),
        );
    };

    let (reply, rx) = oneshot::channel();
    let sent = args.agent_tx.send(AgentMsg::AdjustChildBudget {
        child_id: AgentId::from_string(child_id),
        new_allocated,
        reply,
    });
    if sent.is_err() {
        return send_result(args, Err(ActionFailure::Execution("agent mailbox closed".into())));
    }
    match rx.await {
        Ok(Ok(())) => send_result(
            args,
            Ok(ResultPayload::Text(format!("child {child_id} budget set to {new_allocated}"))),
        ),
        Ok(Err(e)) => send_result(args, Err(ActionFailure::Execution(e.to_string()))),
        Err(_) => send_result(args, Err(ActionFailure::Execution("agent went away".into()))),
    }
}

async fn run_set_todos(args: &RouterArgs) {
    let items = args
        .request
        .params
        .get("todos")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(label) => Some(qo_core::TodoItem::new(label)),
                    serde_json::Value::Object(map) => map
                        .get("label")
                        .and_then(|l| l.as_str())
                        .map(|label| qo_core::TodoItem {
                            label: label.to_string(),
                            done: map.get("done").and_then(|d| d.as_bool()).unwrap_or(false),
                        }),
                    _ => None,
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let count = items.len();
    let (reply, rx) = oneshot::channel();
    if args.agent_tx.send(AgentMsg::SetTodos { items, reply }).is_ok() {
        let _ = rx.await;
        send_result(args, Ok(ResultPayload::Text(format!("todo list replaced ({count} items)"))));
    } else {
        send_result(args, Err(ActionFailure::Execution("agent mailbox closed".into())));
    }
}
