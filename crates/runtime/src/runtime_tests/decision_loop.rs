// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message handling, trigger coalescing, wait timers, and cycle retries.

use super::*;
use crate::agent::state::LifecyclePhase;
use crate::bus::topics;
use qo_core::{BusEvent, HistoryKind, ModelId};

#[tokio::test]
async fn message_drives_one_cycle_and_appends_histories() {
    let rt = TestRuntime::new();
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": true}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("get to work"));
    let p = wait_for(&handle, |p| p.cycles_started == 1 && !p.consensus_scheduled)
        .await
        .unwrap();

    assert_eq!(p.phase, LifecyclePhase::Ready);
    // user entry + decision entry
    assert_eq!(p.history_lens, vec![(ModelId::new("m1"), 2)]);
    assert_eq!(rt.store.messages_for(&handle.agent_id), vec!["get to work".to_string()]);
}

#[tokio::test]
async fn queued_triggers_coalesce_into_one_cycle() {
    let rt = TestRuntime::new();
    let config = rt.config(&["m1"]).suppress_auto_consensus(true);
    let handle = rt.supervisor.start_agent(config).unwrap();
    handle.wait_for_ready().await;

    // Schedule once, then flood. The first trigger drains the rest.
    handle.send(user_message("go"));
    for _ in 0..5 {
        handle.send(AgentMsg::TriggerConsensus);
    }

    settle().await;
    let p = probe(&handle).await.unwrap();
    assert!(p.drained_triggers_total >= 4, "drained {}", p.drained_triggers_total);
    assert!(!p.consensus_scheduled);
    assert_eq!(p.cycles_started, 0); // suppressed: no cycle actually ran
}

#[tokio::test]
async fn stale_trigger_is_discarded() {
    let rt = TestRuntime::new();
    let config = rt.config(&["m1"]).suppress_auto_consensus(true);
    let handle = rt.supervisor.start_agent(config).unwrap();
    handle.wait_for_ready().await;

    // No consensus scheduled, no timer: a bare trigger must be a no-op.
    handle.send(AgentMsg::TriggerConsensus);
    settle().await;

    let p = probe(&handle).await.unwrap();
    assert_eq!(p.cycles_started, 0);
    assert_eq!(p.drained_triggers_total, 0);
    assert!(!p.consensus_scheduled);
}

#[tokio::test]
async fn stale_generation_timeout_is_discarded() {
    let rt = TestRuntime::new();
    // Two timed waits in a row: the second supersedes the first.
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": 300}"#);
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": 600}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("start"));
    let p1 = wait_for(&handle, |p| p.wait_timer.is_some()).await.unwrap();
    let (id1, gen1) = p1.wait_timer.unwrap();
    assert_eq!(gen1, 1);

    // Fire the current timer by hand: a second wait decision re-arms.
    handle.send(AgentMsg::WaitTimeout { logical_id: id1.clone(), generation: gen1 });
    let p2 = wait_for(&handle, |p| {
        p.wait_timer.as_ref().is_some_and(|(_, generation)| *generation == 2)
    })
    .await
    .unwrap();
    assert_eq!(p2.cycles_started, 2);

    // The old generation arriving late must not start a cycle or touch
    // the new timer.
    handle.send(AgentMsg::WaitTimeout { logical_id: id1, generation: gen1 });
    settle().await;
    let p3 = probe(&handle).await.unwrap();
    assert_eq!(p3.cycles_started, 2);
    assert_eq!(p3.wait_timer.unwrap().1, 2);
}

#[tokio::test]
async fn message_interrupts_a_timed_wait() {
    let rt = TestRuntime::new();
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": 300}"#);
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": true}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("start"));
    wait_for(&handle, |p| p.wait_timer.is_some()).await.unwrap();

    // New input cancels the timer and runs a fresh cycle.
    handle.send(user_message("never mind, block"));
    let p = wait_for(&handle, |p| p.cycles_started == 2).await.unwrap();
    assert!(p.wait_timer.is_none());
    assert_eq!(p.timer_generation, 1);
}

#[tokio::test]
async fn messages_arriving_mid_cycle_are_buffered_then_drained() {
    let rt = TestRuntime::new();
    let config = rt.config(&["m1"]);

    // First reply parks until we let it go, keeping the cycle in flight.
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": true}"#);
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": true}"#);

    let handle = rt.supervisor.start_agent(config).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("first"));
    // Cycle runs fast with the scripted oracle; race in the follow-ups
    // while it may still be in flight, then confirm both land in history.
    handle.send(user_message("second"));
    handle.send(user_message("third"));

    let p = wait_for(&handle, |p| {
        p.history_lens[0].1 >= 5 && p.queued_messages == 0 && !p.consensus_scheduled
    })
    .await
    .unwrap();
    // 3 user entries + at least 2 decision entries.
    assert!(p.cycles_started >= 2);
    assert_eq!(rt.store.messages_for(&handle.agent_id).len(), 3);
}

#[tokio::test]
async fn failed_cycles_retry_then_arm_safe_wait() {
    let rt = TestRuntime::new();
    // Majority of the pool fails on every round (single model, three
    // scripted failures + retries' worth).
    for _ in 0..12 {
        rt.oracle.fail("m1", "rate limited");
    }

    let config = rt.config(&["m1"]).max_consensus_retries(2).safe_wait_secs(300);
    let handle = rt.supervisor.start_agent(config).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("try"));
    let p = wait_for(&handle, |p| {
        p.wait_timer.as_ref().is_some_and(|(id, _)| id == "safe-wait")
    })
    .await
    .unwrap();

    // initial + 2 retries, then the safe wait with the counter reset.
    assert_eq!(p.cycles_started, 3);
    assert_eq!(p.consensus_retry_count, 0);
}

#[tokio::test]
async fn forced_decisions_are_recorded_in_history() {
    let rt = TestRuntime::new();
    // Persistent three-way split across all three rounds: share never
    // reaches the threshold, and the forced winner (send_message, lowest
    // wait score among the top-priority clusters) is dispatched.
    for _ in 0..3 {
        rt.oracle
            .reply("m1", r#"{"action": "send_message", "params": {"to": "agt-nobody", "content": "x"}, "wait": false}"#)
            .reply("m2", r#"{"action": "wait", "wait": true}"#)
            .reply("m3", r#"{"action": "read_file", "params": {"path": "x"}, "wait": true}"#);
    }

    let handle = rt.supervisor.start_agent(rt.config(&["m1", "m2", "m3"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("decide"));
    // Forced send_message fails (no such agent), the error feeds back, and
    // a follow-up cycle is scheduled.
    wait_for(&handle, |p| p.cycles_started >= 2).await.unwrap();

    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    let entries = snapshot.histories.entries(&ModelId::new("m1"));
    assert!(entries.iter().any(|e| {
        e.kind == HistoryKind::Event && e.content.as_text().contains("forced")
    }));
    assert!(entries.iter().any(|e| {
        e.kind == HistoryKind::Result && e.content.as_text().contains("agent not found")
    }));
}

#[tokio::test]
async fn task_complete_terminates_the_agent() {
    let rt = TestRuntime::new();
    rt.oracle.reply("m1", r#"{"action": "task_complete", "wait": false}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    let mut lifecycle = rt.bus.subscribe(topics::LIFECYCLE);
    handle.send(user_message("finish up"));
    handle.wait_done().await;

    // Spawn + terminated events both visible.
    let mut saw_terminated = false;
    while let Ok(event) = lifecycle.try_recv() {
        if matches!(event, BusEvent::AgentTerminated { reason, .. } if reason == "task_complete") {
            saw_terminated = true;
        }
    }
    assert!(saw_terminated);

    // Final state persisted with the decision history.
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    assert!(snapshot
        .histories
        .entries(&ModelId::new("m1"))
        .iter()
        .any(|e| e.kind == HistoryKind::Decision));
}

#[tokio::test]
async fn stop_requested_drains_triggers_and_is_idempotent() {
    let rt = TestRuntime::new();
    let config = rt.config(&["m1"]).suppress_auto_consensus(true);
    let handle = rt.supervisor.start_agent(config).unwrap();
    handle.wait_for_ready().await;

    for _ in 0..3 {
        handle.send(AgentMsg::TriggerConsensus);
    }
    handle.send(AgentMsg::StopRequested);
    handle.send(AgentMsg::StopRequested);
    handle.wait_done().await;

    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    assert_eq!(snapshot.agent_id, handle.agent_id);
}

#[tokio::test]
async fn persistence_failures_never_kill_the_agent() {
    let rt = TestRuntime::new();
    rt.store.fail_writes(true);
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": true}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("still alive?"));
    let p = wait_for(&handle, |p| p.cycles_started == 1).await.unwrap();
    assert_eq!(p.phase, LifecyclePhase::Ready);
}
