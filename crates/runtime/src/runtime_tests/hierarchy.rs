// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parent/child topology: spawning, dismissal, escrow, and DOWN routing.

use super::*;
use qo_core::{AgentId, Budget, HistoryKind, ModelId};

#[tokio::test]
async fn spawn_child_creates_a_tracked_child_with_escrow() {
    let rt = TestRuntime::new();
    rt.oracle.reply(
        "m1",
        r#"{"action": "spawn_child", "params": {"profile_name": "scout", "profile_description": "explores", "budget_allocated": 2.5}, "wait": true}"#,
    );

    let config = rt.config(&["m1"]).budget(Budget::allocated(10.0));
    let parent = rt.supervisor.start_agent(config).unwrap();
    parent.wait_for_ready().await;

    parent.send(user_message("get help"));
    let p = wait_for(&parent, |p| p.children.len() == 1 && p.pending_actions.is_empty())
        .await
        .unwrap();

    assert_eq!(p.budget.committed, Some(2.5));

    // The child is registered, parented, and idle.
    let child_id = p.children[0];
    let child = rt.registry.get(&child_id).unwrap();
    assert_eq!(child.parent_id, Some(parent.agent_id));
    let cp = probe(&child).await.unwrap();
    assert_eq!(cp.budget, Budget::allocated(2.5));
}

#[tokio::test]
async fn duplicate_child_spawned_casts_stay_idempotent() {
    let rt = TestRuntime::new();
    let config = rt.config(&["m1"]).suppress_auto_consensus(true).budget(Budget::allocated(10.0));
    let parent = rt.supervisor.start_agent(config).unwrap();
    parent.wait_for_ready().await;

    let child_id = AgentId::from_string("agt-child");
    for _ in 0..3 {
        parent.send(AgentMsg::ChildSpawned {
            child_id,
            spawned_at: 1,
            budget_allocated: Some(2.0),
        });
    }
    settle().await;

    let p = probe(&parent).await.unwrap();
    assert_eq!(p.children, vec![child_id]);
    // Escrow committed exactly once.
    assert_eq!(p.budget.committed, Some(2.0));
}

#[tokio::test]
async fn dismissing_a_child_releases_unspent_escrow() {
    let rt = TestRuntime::new();
    rt.oracle.reply(
        "m1",
        r#"{"action": "spawn_child", "params": {"profile_name": "scout", "budget_allocated": 2.0}, "wait": true}"#,
    );

    let config = rt.config(&["m1"]).budget(Budget::allocated(10.0));
    let parent = rt.supervisor.start_agent(config).unwrap();
    parent.wait_for_ready().await;

    parent.send(user_message("get help"));
    let p = wait_for(&parent, |p| p.children.len() == 1 && p.pending_actions.is_empty())
        .await
        .unwrap();
    let child_id = p.children[0];
    assert_eq!(p.budget.committed, Some(2.0));

    rt.oracle.reply(
        "m1",
        &format!(r#"{{"action": "dismiss_child", "params": {{"child_id": "{child_id}"}}, "wait": true}}"#),
    );
    parent.send(user_message("wrap it up"));

    // Child terminates; its spend report settles the escrow back to zero.
    let p = wait_for(&parent, |p| p.children.is_empty() && p.pending_actions.is_empty())
        .await
        .unwrap();
    assert_eq!(p.budget.committed, Some(0.0));

    // Eventually consistent: the registry drops the child after exit.
    let child = rt.registry.get(&child_id);
    if let Some(child) = child {
        child.wait_done().await;
    }
}

#[tokio::test]
async fn adjust_child_budget_applies_and_rejects_per_escrow_rules() {
    let rt = TestRuntime::new();
    let config = rt.config(&["m1"]).suppress_auto_consensus(true).budget(Budget::allocated(10.0));
    let parent = rt.supervisor.start_agent(config).unwrap();
    parent.wait_for_ready().await;

    let child_id = AgentId::from_string("agt-child");
    parent.send(AgentMsg::ChildSpawned { child_id, spawned_at: 1, budget_allocated: Some(1.0) });
    settle().await;

    // Raise within the ceiling.
    let (reply, rx) = tokio::sync::oneshot::channel();
    parent.send(AgentMsg::AdjustChildBudget { child_id, new_allocated: 2.5, reply });
    rx.await.unwrap().unwrap();
    let p = probe(&parent).await.unwrap();
    assert_eq!(p.budget.committed, Some(2.5));

    // Past the ceiling: rejected, nothing changes.
    let (reply, rx) = tokio::sync::oneshot::channel();
    parent.send(AgentMsg::AdjustChildBudget { child_id, new_allocated: 50.0, reply });
    let err = rx.await.unwrap().unwrap_err();
    assert_eq!(err, "insufficient_budget");
    let p = probe(&parent).await.unwrap();
    assert_eq!(p.budget.committed, Some(2.5));

    // Unknown children are rejected outright.
    let (reply, rx) = tokio::sync::oneshot::channel();
    parent.send(AgentMsg::AdjustChildBudget {
        child_id: AgentId::from_string("agt-stranger"),
        new_allocated: 0.5,
        reply,
    });
    assert!(rx.await.unwrap().is_err());
}

#[tokio::test]
async fn over_budget_latches_and_never_clears() {
    let rt = TestRuntime::new();
    rt.oracle.reply_each(&["m1"], r#"{"action": "wait", "wait": true}"#);

    let config = rt
        .config(&["m1"])
        .budget(Budget::allocated(0.001))
        .token_rate(1.0); // every token costs real money
    let handle = rt.supervisor.start_agent(config).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("spend"));
    let p = wait_for(&handle, |p| p.over_budget).await.unwrap();
    assert!(p.spent > 0.001);

    // Another quiet cycle cannot clear the latch.
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": true}"#);
    handle.send(user_message("again"));
    let p = wait_for(&handle, |p| p.cycles_started >= 2).await.unwrap();
    assert!(p.over_budget);
}

#[tokio::test]
async fn spawned_children_survive_parent_death() {
    let rt = TestRuntime::new();
    rt.oracle.reply(
        "m1",
        r#"{"action": "spawn_child", "params": {"profile_name": "orphan-to-be"}, "wait": true}"#,
    );
    rt.oracle.reply("m1", r#"{"action": "task_complete", "wait": false}"#);

    let parent = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    parent.wait_for_ready().await;

    parent.send(user_message("spawn then finish"));
    let p = wait_for(&parent, |p| p.children.len() == 1).await.unwrap();
    let child_id = p.children[0];

    parent.send(user_message("all done"));
    parent.wait_done().await;
    settle().await;

    // The spawned child carries a parent_id, so it lives on.
    let child = rt.registry.get(&child_id).unwrap();
    let cp = probe(&child).await.unwrap();
    assert!(cp.history_lens.iter().all(|(_, len)| *len >= 1)); // parent-down event recorded
}

#[tokio::test]
async fn fixture_agents_without_parent_id_stop_on_parent_down() {
    let rt = TestRuntime::new();
    let watched = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    watched.wait_for_ready().await;

    // A fixture: watches `watched` but has no durable parent.
    let mut config = rt.config(&["m1"]).suppress_auto_consensus(true);
    config.parent_ref = Some(watched.agent_id);
    let fixture = rt.supervisor.start_agent(config).unwrap();
    fixture.wait_for_ready().await;

    fixture.send(AgentMsg::PeerDown { agent_id: watched.agent_id });
    fixture.wait_done().await;
    assert!(fixture.is_done());
}

#[tokio::test]
async fn snapshot_restore_round_trips_state() {
    let rt = TestRuntime::new();
    rt.oracle.reply("m1", r#"{"action": "wait", "wait": true}"#);

    let handle = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    handle.wait_for_ready().await;

    handle.send(user_message("remember me"));
    wait_for(&handle, |p| p.cycles_started == 1).await.unwrap();

    rt.supervisor.stop_agent(&handle.agent_id).await.unwrap();
    let snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    assert!(snapshot.histories.entries(&ModelId::new("m1")).iter().any(|e| {
        e.kind == HistoryKind::User
    }));

    let restored = rt.supervisor.restore_agent(&snapshot).unwrap();
    restored.wait_for_ready().await;
    let p = probe(&restored).await.unwrap();
    assert_eq!(p.agent_id, handle.agent_id);
    assert!(p.history_lens[0].1 >= 2); // user + decision preserved

    // Restore skipped the initial save but termination persists again.
    rt.supervisor.stop_agent(&restored.agent_id).await.unwrap();
    let final_snapshot = rt.store.snapshot(&handle.agent_id).unwrap();
    assert_eq!(final_snapshot.histories, snapshot.histories);
}

#[tokio::test]
async fn shutdown_stops_the_whole_tree_with_unbounded_grace() {
    let rt = TestRuntime::new();
    rt.oracle.reply(
        "m1",
        r#"{"action": "spawn_child", "params": {"profile_name": "scout"}, "wait": true}"#,
    );

    let parent = rt.supervisor.start_agent(rt.config(&["m1"])).unwrap();
    parent.wait_for_ready().await;
    parent.send(user_message("spawn"));
    wait_for(&parent, |p| p.children.len() == 1).await.unwrap();

    rt.supervisor.shutdown().await;

    assert!(parent.is_done());
    // Both agents persisted final state.
    assert_eq!(rt.store.snapshot_count(), 2);

    // New work is refused after shutdown.
    assert!(rt.supervisor.start_agent(rt.config(&["m1"])).is_err());
}
