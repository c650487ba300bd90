// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end runtime specs: each test drives a real supervisor over fake
//! oracles, executors, and storage, and asserts the observable outcome.

use qo_core::{AgentId, Budget, HistoryKind, ModelId};
use qo_runtime::test_support::{probe, settle, TestRuntime};
use qo_runtime::{AgentMsg, MessageSender};
use std::time::Duration;

fn user(content: &str) -> AgentMsg {
    AgentMsg::Message { content: content.into(), sender: MessageSender::User }
}

async fn wait_for(
    handle: &qo_runtime::AgentHandle,
    pred: impl Fn(&qo_runtime::AgentProbe) -> bool,
) -> qo_runtime::AgentProbe {
    for _ in 0..400 {
        if let Some(p) = probe(handle).await {
            if pred(&p) {
                return p;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never held");
}

// A superseded timer's timeout is discarded
// without running a cycle; the current timer stays armed.
#[tokio::test]
async fn timer_staleness_discards_old_generations() {
    let rt = TestRuntime::new();
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": 300}"#);
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": 600}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    // First decision arms generation 1; a new input supersedes it with
    // generation 2.
    handle.send(user("start"));
    let p = wait_for(&handle, |p| {
        p.wait_timer.as_ref().is_some_and(|(_, generation)| *generation == 1)
    })
    .await;
    let (logical_id, old_generation) = p.wait_timer.unwrap();

    handle.send(user("changed my mind"));
    wait_for(&handle, |p| {
        p.wait_timer.as_ref().is_some_and(|(_, generation)| *generation == 2)
    })
    .await;

    // The stale timeout must not run a decision cycle or clear the timer.
    handle.send(AgentMsg::WaitTimeout { logical_id, generation: old_generation });
    settle().await;

    let p = probe(&handle).await.unwrap();
    assert_eq!(p.cycles_started, 2);
    assert_eq!(p.wait_timer.unwrap().1, 2);
}

// Five queued triggers collapse into one
// decision cycle.
#[tokio::test]
async fn queued_triggers_run_exactly_one_cycle() {
    let rt = TestRuntime::new();
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": true}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    // Schedule (consensus_scheduled = true), then flood before the first
    // trigger is handled.
    handle.send(user("go"));
    for _ in 0..5 {
        handle.send(AgentMsg::TriggerConsensus);
    }

    let p = wait_for(&handle, |p| p.cycles_started >= 1 && !p.consensus_scheduled).await;
    assert_eq!(p.cycles_started, 1);
    assert!(p.drained_triggers_total >= 4, "drained {}", p.drained_triggers_total);
    assert_eq!(rt.oracle.call_count(), 1);
}

// A pool answering {wait 5, wait 5, wait true} settles on
// the majority cluster without refinement.
#[tokio::test]
async fn majority_cluster_wins_without_refinement() {
    let rt = TestRuntime::new();
    rt.oracle
        .reply("m1", r#"{"action": "wait", "wait": 5}"#)
        .reply("m2", r#"{"action": "wait", "wait": 5}"#)
        .reply("m3", r#"{"action": "wait", "wait": true}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1", "m2", "m3"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user("decide"));
    let p = wait_for(&handle, |p| p.wait_timer.is_some()).await;

    // Winner {wait: 5} arms a 5s timer; one round, no refinement queries.
    assert_eq!(p.cycles_started, 1);
    assert_eq!(rt.oracle.call_count(), 3);

    // Consensus, not forced: no forced-decision event in history.
    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    assert!(!snapshot
        .histories
        .entries(&ModelId::new("m1"))
        .iter()
        .any(|e| e.content.as_text().contains("forced")));
}

// Equal-size, equal-priority clusters break on
// the conservative wait score; send_message (wait=false) beats spawn_child
// (wait=true).
#[tokio::test]
async fn wait_score_breaks_equal_clusters() {
    let rt = TestRuntime::new();

    let receiver = rt.supervisor.start_agent(rt.config(&["m9"])).unwrap();
    receiver.wait_for_ready().await;

    rt.oracle
        .reply(
            "m1",
            &format!(
                r#"{{"action": "send_message", "params": {{"to": "{}", "content": "hello"}}, "wait": false}}"#,
                receiver.agent_id
            ),
        )
        .reply("m2", r#"{"action": "spawn_child", "params": {"profile_name": "x"}, "wait": true}"#);

    let sender = rt.supervisor.start_agent(rt.config(&["m1", "m2"])).unwrap();
    sender.wait_for_ready().await;

    sender.send(user("pick one"));
    // The message action wins and completes; no child is ever spawned.
    let p = wait_for(&sender, |p| p.pending_actions.is_empty() && p.cycles_started >= 1).await;
    assert!(p.children.is_empty());

    let rp = wait_for(&receiver, |rp| rp.history_lens[0].1 >= 1).await;
    assert!(rp.children.is_empty());
}

// The worked example from the escrow
// design, driven through a live parent's mailbox.
#[tokio::test]
async fn budget_adjustment_applies_and_rejects() {
    let rt = TestRuntime::new();
    // One cycle costs 20 tokens; at $100 per 1k tokens that is $2.00 spent.
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": true}"#);

    let config = rt.config(&["m1"]).budget(Budget::allocated(10.0)).token_rate(100.0);
    let parent = rt.supervisor.start_agent(config).unwrap();
    parent.wait_for_ready().await;

    parent.send(user("spend a little"));
    let p = wait_for(&parent, |p| p.cycles_started == 1 && (p.spent - 2.0).abs() < 1e-9).await;
    assert!((p.spent - 2.0).abs() < 1e-9);

    // committed = 3.00 across two children; the adjusted child holds 1.00.
    let child_a = AgentId::from_string("agt-child-a");
    let child_b = AgentId::from_string("agt-child-b");
    parent.send(AgentMsg::ChildSpawned { child_id: child_a, spawned_at: 1, budget_allocated: Some(1.0) });
    parent.send(AgentMsg::ChildSpawned { child_id: child_b, spawned_at: 2, budget_allocated: Some(2.0) });
    settle().await;

    // new = 2.50: delta 1.50; 2.00 + 3.00 + 1.50 = 6.50 ≤ 10.00 → applied.
    let (reply, rx) = tokio::sync::oneshot::channel();
    parent.send(AgentMsg::AdjustChildBudget { child_id: child_a, new_allocated: 2.5, reply });
    rx.await.unwrap().unwrap();
    let p = probe(&parent).await.unwrap();
    assert_eq!(p.budget.committed, Some(4.5));

    // new = 8.00: delta 5.50; 2.00 + 4.50 + 5.50 = 12.00 > 10.00 → rejected
    // with the parent unchanged.
    let (reply, rx) = tokio::sync::oneshot::channel();
    parent.send(AgentMsg::AdjustChildBudget { child_id: child_a, new_allocated: 8.0, reply });
    assert_eq!(rx.await.unwrap().unwrap_err(), "insufficient_budget");
    let p = probe(&parent).await.unwrap();
    assert_eq!(p.budget.committed, Some(4.5));
}

// Batch-async: sub-results arrive in completion
// order, then one summary, then exactly one more cycle is scheduled.
#[tokio::test]
async fn batch_async_orders_results_by_completion() {
    let rt = TestRuntime::new();
    rt.oracle.reply(
        "m1",
        r#"{"action": "batch_async", "params": {"actions": [
            {"action": "run_shell", "params": {"command": "job-a"}},
            {"action": "run_shell", "params": {"command": "job-b"}},
            {"action": "run_shell", "params": {"command": "job-c"}}
        ]}, "wait": true}"#,
    );

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user("fan out"));
    // All three commands end up running concurrently.
    for _ in 0..400 {
        if rt.shell.running_commands().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Complete out of order: C, A, B.
    for name in ["job-c", "job-a", "job-b"] {
        let id = rt.shell.command_id_of(name).unwrap();
        assert!(rt.shell.complete(&id, &format!("done-{name}")));
    }

    let p = wait_for(&handle, |p| p.pending_actions.is_empty() && p.active_router_count == 0)
        .await;
    assert_eq!(p.cycles_started, 2); // batch summary scheduled exactly one follow-up

    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    let texts: Vec<String> = snapshot
        .histories
        .entries(&ModelId::new("m1"))
        .iter()
        .filter(|e| e.kind == HistoryKind::Result)
        .map(|e| e.content.as_text())
        .collect();

    let pos = |needle: &str| texts.iter().position(|t| t.contains(needle)).unwrap();
    assert!(pos("done-job-c") < pos("done-job-a"));
    assert!(pos("done-job-a") < pos("done-job-b"));

    let summaries: Vec<&String> = texts.iter().filter(|t| t.contains("total")).collect();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].contains("batch_async: total 3, succeeded 3, failed 0"));
    assert!(pos("done-job-b") < pos("total 3"));
}

// Round trip — persist → restore → persist produces equal serialized state
// modulo the write timestamp.
#[tokio::test]
async fn persist_restore_persist_is_stable() {
    let rt = TestRuntime::new();
    rt.oracle.reply("m1", r#"{"action": "set_todos", "params": {"todos": ["a", "b"]}, "wait": true}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;
    handle.send(user("make a plan"));
    wait_for(&handle, |p| p.todos.items().len() == 2 && p.pending_actions.is_empty()).await;

    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let first = rt.store.snapshot(&handle.agent_id).unwrap();

    let restored = rt.supervisor.restore_agent(&first).unwrap();
    restored.wait_for_ready().await;
    rt.supervisor.stop_agent(&restored.agent_id).await.unwrap();

    let mut second = rt.store.snapshot(&handle.agent_id).unwrap();
    second.captured_at = first.captured_at;
    similar_asserts::assert_eq!(first, second);
}
