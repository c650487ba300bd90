// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action dispatch, result routing, batches, and long-running shells.

use super::*;
use crate::bus::topics;
use qo_core::{ActionKind, BusEvent, CapabilityGroup, HistoryKind, ModelId, TaskId};

#[tokio::test]
async fn action_result_round_trip_updates_history_and_pending() {
    let rt = TestRuntime::new();
    rt.oracle.reply(
        "m1",
        r#"{"action": "read_file", "params": {"path": "notes.md"}, "wait": true}"#,
    );

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("read the notes"));
    // Dispatch → recorder completes → result lands and pending empties.
    let p = wait_for(&handle, |p| {
        p.cycles_started >= 1 && p.pending_actions.is_empty() && p.active_router_count == 0
    })
    .await
    .unwrap();

    assert_eq!(rt.recorder.calls(), vec![(
        ActionKind::ReadFile,
        serde_json::json!({"path": "notes.md"}),
    )]);
    // Result entry carries the action type; a follow-up cycle was scheduled.
    assert!(p.cycles_started >= 1);

    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    assert!(snapshot.histories.entries(&ModelId::new("m1")).iter().any(|e| {
        e.kind == HistoryKind::Result && e.action_type.as_deref() == Some("read_file")
    }));
}

#[tokio::test]
async fn capability_violations_come_back_as_action_not_allowed() {
    let rt = TestRuntime::new();
    rt.oracle.reply("m1", r#"{"action": "run_shell", "params": {"command": "rm -rf /"}, "wait": true}"#);

    // No local_execution capability.
    let config = rt
        .config(&["m1"])
        .capabilities(vec![CapabilityGroup::FileRead]);
    let handle = rt.supervisor.start_agent(config).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("run it"));
    wait_for(&handle, |p| p.pending_actions.is_empty() && p.cycles_started >= 1).await.unwrap();

    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    assert!(snapshot.histories.entries(&ModelId::new("m1")).iter().any(|e| {
        e.kind == HistoryKind::Result && e.content.as_text().contains("action_not_allowed")
    }));
    // The executor was never consulted.
    assert!(rt.shell.running_commands().is_empty());
}

#[tokio::test]
async fn auto_complete_todo_marks_first_outstanding_and_broadcasts() {
    let rt = TestRuntime::new();
    rt.oracle.reply(
        "m1",
        r#"{"action": "set_todos", "params": {"todos": ["first", "second"]}, "wait": true}"#,
    );
    rt.oracle.reply(
        "m1",
        r#"{"action": "read_file", "params": {"path": "a"}, "wait": true, "auto_complete_todo": true}"#,
    );

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;
    let mut todo_rx = rt.bus.subscribe(&topics::agent_todos(&handle.agent_id));

    handle.send(user_message("plan, then work"));
    let p = wait_for(&handle, |p| {
        p.todos.items().len() == 2 && p.todos.items()[0].done && p.pending_actions.is_empty()
    })
    .await
    .unwrap();
    assert_eq!(p.todos.outstanding(), 1);

    // set_todos broadcast + auto-complete broadcast.
    let first = todo_rx.recv().await.unwrap();
    let second = todo_rx.recv().await.unwrap();
    match (first, second) {
        (
            BusEvent::TodosUpdated { todos: initial, .. },
            BusEvent::TodosUpdated { todos: updated, .. },
        ) => {
            assert!(initial.iter().all(|t| !t.done));
            assert!(updated[0].done);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn batch_async_delivers_results_then_summary_then_one_cycle() {
    let rt = TestRuntime::new();
    rt.oracle.reply(
        "m1",
        r#"{"action": "batch_async", "params": {"actions": [
            {"action": "read_file", "params": {"path": "a"}},
            {"action": "write_file", "params": {"path": "b"}},
            {"action": "api_call", "params": {"url": "http://x"}}
        ]}, "wait": true}"#,
    );

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("do all three"));
    wait_for(&handle, |p| p.pending_actions.is_empty() && p.active_router_count == 0)
        .await
        .unwrap();

    assert_eq!(rt.recorder.call_count(), 3);

    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    let entries = snapshot.histories.entries(&ModelId::new("m1"));

    // Three per-sub results followed by exactly one summary.
    let sub_results = entries
        .iter()
        .filter(|e| e.kind == HistoryKind::Result && !e.content.as_text().contains("total"))
        .count();
    let summaries: Vec<String> = entries
        .iter()
        .filter(|e| e.content.as_text().contains("total"))
        .map(|e| e.content.as_text())
        .collect();
    assert_eq!(sub_results, 3);
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].contains("batch_async: total 3, succeeded 3, failed 0"));
}

#[tokio::test]
async fn batch_sync_stops_at_the_first_error() {
    let rt = TestRuntime::new();
    rt.recorder.push_result(Ok(qo_core::ResultPayload::Text("one ok".into())));
    rt.recorder.push_result(Err(qo_core::ActionFailure::Execution("disk full".into())));

    rt.oracle.reply(
        "m1",
        r#"{"action": "batch_sync", "params": {"actions": [
            {"action": "read_file", "params": {"path": "a"}},
            {"action": "write_file", "params": {"path": "b"}},
            {"action": "read_file", "params": {"path": "c"}}
        ]}, "wait": true}"#,
    );

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("in order"));
    wait_for(&handle, |p| p.pending_actions.is_empty() && p.active_router_count == 0)
        .await
        .unwrap();

    // Third sub-action never ran.
    assert_eq!(rt.recorder.call_count(), 2);

    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    let summary = snapshot
        .histories
        .entries(&ModelId::new("m1"))
        .iter()
        .map(|e| e.content.as_text())
        .find(|t| t.contains("total"))
        .unwrap();
    assert!(summary.contains("batch_sync: total 2, succeeded 1, failed 1"));
}

#[tokio::test]
async fn async_shell_keeps_its_router_until_completion() {
    let rt = TestRuntime::new();
    rt.oracle.reply("m1", r#"{"action": "run_shell", "params": {"command": "sleep 99"}, "wait": true}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("run it"));
    let p = wait_for(&handle, |p| p.shell_commands.len() == 1).await.unwrap();
    let command_id = p.shell_commands[0];

    // Initial async result consumed the pending action but the router
    // stays alive servicing the command.
    assert!(p.pending_actions.is_empty());
    assert_eq!(p.active_router_count, 1);

    // Consensus can now query status through the same router.
    rt.oracle.reply(
        "m1",
        &format!(r#"{{"action": "shell_status", "params": {{"command_id": "{command_id}"}}, "wait": true}}"#),
    );
    handle.send(user_message("how is it going?"));
    wait_for(&handle, |p| p.cycles_started >= 2).await.unwrap();

    // Completing the command routes a ShellCompleted and frees the router.
    assert!(rt.shell.complete(&command_id, "done at last"));
    let p = wait_for(&handle, |p| p.active_router_count == 0 && p.shell_commands.is_empty())
        .await
        .unwrap();
    assert!(p.cycles_started >= 2);

    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    let texts: Vec<String> = snapshot
        .histories
        .entries(&ModelId::new("m1"))
        .iter()
        .map(|e| e.content.as_text())
        .collect();
    assert!(texts.iter().any(|t| t.contains("shell running")));
    assert!(texts.iter().any(|t| t.contains("running (sleep 99)")));
    assert!(texts.iter().any(|t| t.contains("done at last")));
}

#[tokio::test]
async fn terminate_shell_routes_through_the_owning_router() {
    let rt = TestRuntime::new();
    rt.oracle.reply("m1", r#"{"action": "run_shell", "params": {"command": "serve"}, "wait": true}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("start the server"));
    let p = wait_for(&handle, |p| p.shell_commands.len() == 1).await.unwrap();
    let command_id = p.shell_commands[0];

    rt.oracle.reply(
        "m1",
        &format!(r#"{{"action": "terminate_shell", "params": {{"command_id": "{command_id}"}}, "wait": true}}"#),
    );
    handle.send(user_message("stop it"));

    let p = wait_for(&handle, |p| p.shell_commands.is_empty() && p.active_router_count == 0)
        .await
        .unwrap();
    assert!(p.pending_actions.is_empty());

    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    let texts: Vec<String> = snapshot
        .histories
        .entries(&ModelId::new("m1"))
        .iter()
        .map(|e| e.content.as_text())
        .collect();
    assert!(texts.iter().any(|t| t.contains("terminated")));
}

#[tokio::test]
async fn unknown_action_results_are_dropped() {
    let rt = TestRuntime::new();
    let config = rt.config(&["m1"]).suppress_auto_consensus(true);
    let handle = rt.supervisor.start_agent(config).unwrap();
    handle.wait_for_ready().await;

    handle.send(AgentMsg::ActionResult {
        action_id: qo_core::ActionId(999),
        result: Ok(qo_core::ResultPayload::Text("orphan".into())),
    });
    settle().await;

    let p = probe(&handle).await.unwrap();
    // No history entry, no scheduled continuation.
    assert_eq!(p.history_lens, vec![(ModelId::new("m1"), 0)]);
    assert!(!p.consensus_scheduled);
}

#[tokio::test]
async fn image_results_append_image_entries() {
    let rt = TestRuntime::new();
    rt.recorder.push_result(Ok(qo_core::ResultPayload::Image {
        media_type: "image/png".into(),
        data: vec![137, 80, 78, 71],
    }));
    rt.oracle.reply("m1", r#"{"action": "read_file", "params": {"path": "chart.png"}, "wait": true}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("look at the chart"));
    wait_for(&handle, |p| p.pending_actions.is_empty() && p.cycles_started >= 1).await.unwrap();

    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    assert!(snapshot.histories.entries(&ModelId::new("m1")).iter().any(|e| {
        e.kind == HistoryKind::Image && e.action_type.as_deref() == Some("read_file")
    }));
}

#[tokio::test]
async fn send_message_reaches_the_target_agent() {
    let rt = TestRuntime::new();

    let receiver_config = rt.config(&["m2"]);
    let receiver = rt.supervisor.start_agent(receiver_config).unwrap();
    receiver.wait_for_ready().await;

    rt.oracle.reply(
        "m1",
        &format!(
            r#"{{"action": "send_message", "params": {{"to": "{}", "content": "ping"}}, "wait": false}}"#,
            receiver.agent_id
        ),
    );

    let sender = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    sender.wait_for_ready().await;

    let task_id = TaskId::from_string("tsk-test");
    let mut task_rx = rt.bus.subscribe(&topics::task_messages(&task_id));

    sender.send(user_message("tell them"));
    let p = wait_for(&receiver, |p| p.cycles_started >= 1).await.unwrap();
    assert!(p.history_lens[0].1 >= 2);

    // The receiver broadcast the inbound agent message on the task topic.
    let mut saw_ping = false;
    while let Ok(event) = task_rx.try_recv() {
        if matches!(&event, BusEvent::MessageReceived { message, .. } if message == "ping") {
            saw_ping = true;
        }
    }
    assert!(saw_ping);
}
