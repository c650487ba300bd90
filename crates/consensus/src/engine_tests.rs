// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::ScriptedOracle;
use qo_core::{ActionKind, HistoryEntry, HistoryKind, WaitDirective};

fn pool(names: &[&str]) -> Vec<ModelId> {
    names.iter().map(|n| ModelId::new(*n)).collect()
}

fn histories(pool: &[ModelId]) -> ModelHistories {
    let mut h = ModelHistories::for_pool(pool);
    h.append_all(HistoryEntry::new(HistoryKind::User, "what next?", 1));
    h
}

fn engine(oracle: ScriptedOracle) -> ConsensusEngine {
    ConsensusEngine::new(Arc::new(oracle), ConsensusConfig::default())
}

#[tokio::test]
async fn unanimous_pool_reaches_consensus_in_one_round() {
    let oracle = ScriptedOracle::new();
    oracle.reply_each(&["gpt-4o", "claude-3", "gemini-pro"], r#"{"action": "wait", "wait": 5}"#);

    let pool = pool(&["gpt-4o", "claude-3", "gemini-pro"]);
    let decision = engine(oracle).decide(&pool, "sys", &histories(&pool)).await.unwrap();

    assert_eq!(decision.kind, DecisionKind::Consensus);
    assert_eq!(decision.action.kind, ActionKind::Wait);
    assert_eq!(decision.action.wait, WaitDirective::Timed(5));
    assert_eq!(decision.rounds, 1);
    assert_eq!(decision.votes.len(), 3);
}

#[tokio::test]
async fn majority_beats_minority_without_refinement() {
    // M1→wait 5, M2→wait 5, M3→wait true: the size-2 cluster wins.
    let oracle = ScriptedOracle::new();
    oracle
        .reply("m1", r#"{"action": "wait", "wait": 5}"#)
        .reply("m2", r#"{"action": "wait", "wait": 5}"#)
        .reply("m3", r#"{"action": "wait", "wait": true}"#);

    let pool = pool(&["m1", "m2", "m3"]);
    let decision = engine(oracle).decide(&pool, "sys", &histories(&pool)).await.unwrap();

    assert_eq!(decision.kind, DecisionKind::Consensus);
    assert_eq!(decision.action.wait, WaitDirective::Timed(5));
    assert_eq!(decision.rounds, 1);
}

#[tokio::test]
async fn split_pool_refines_then_converges() {
    let oracle = ScriptedOracle::new();
    // Round 1: four-way split, winner share 0.25 < 0.5.
    oracle
        .reply("m1", r#"{"action": "send_message", "params": {"to": "a"}, "wait": false}"#)
        .reply("m2", r#"{"action": "send_message", "params": {"to": "b"}, "wait": false}"#)
        .reply("m3", r#"{"action": "run_shell", "params": {"command": "ls"}, "wait": true}"#)
        .reply("m4", r#"{"action": "read_file", "params": {"path": "x"}, "wait": true}"#);
    // Round 2: everyone converges.
    oracle.reply_each(
        &["m1", "m2", "m3", "m4"],
        r#"{"action": "run_shell", "params": {"command": "ls"}, "wait": true}"#,
    );

    let pool = pool(&["m1", "m2", "m3", "m4"]);
    let decision = engine(oracle).decide(&pool, "sys", &histories(&pool)).await.unwrap();

    assert_eq!(decision.kind, DecisionKind::Consensus);
    assert_eq!(decision.action.kind, ActionKind::RunShell);
    assert_eq!(decision.rounds, 2);
}

#[tokio::test]
async fn refinement_prompt_is_unattributed_and_cooler() {
    let oracle = ScriptedOracle::new();
    // Three-way split: winner share 1/3 is below the threshold.
    oracle
        .reply("gpt-4o", r#"{"action": "send_message", "params": {"to": "a"}}"#)
        .reply("gpt-4o-mini", r#"{"action": "run_shell", "params": {"command": "ls"}}"#)
        .reply("gpt-5", r#"{"action": "read_file", "params": {"path": "x"}}"#);
    oracle.reply_each(
        &["gpt-4o", "gpt-4o-mini", "gpt-5"],
        r#"{"action": "run_shell", "params": {"command": "ls"}}"#,
    );

    let pool = pool(&["gpt-4o", "gpt-4o-mini", "gpt-5"]);
    let oracle = Arc::new(oracle);
    let engine = ConsensusEngine::new(oracle.clone(), ConsensusConfig::default());
    engine.decide(&pool, "sys", &histories(&pool)).await.unwrap();

    let calls = oracle.calls();
    assert_eq!(calls.len(), 6);

    // Round 2 calls carry the deliberative context without model names and
    // drop 20% of the ceiling.
    let round2: Vec<_> = calls.iter().skip(3).collect();
    for call in round2 {
        let text: String =
            call.conversation.iter().map(|m| m.text()).collect::<Vec<_>>().join("\n");
        assert!(text.contains("unattributed"));
        assert!(!text.contains("gpt-4o-mini\n"));
        assert!((call.temperature - 0.8).abs() < 1e-6);
    }
}

#[tokio::test]
async fn rounds_exhausted_forces_tie_broken_winner() {
    let oracle = ScriptedOracle::new();
    // Three rounds of the same three-way split: every share stays below
    // the threshold, and send_message wait=false wins the forced decision
    // on wait score.
    for _ in 0..3 {
        oracle
            .reply("m1", r#"{"action": "send_message", "params": {"to": "a"}, "wait": false}"#)
            .reply("m2", r#"{"action": "spawn_child", "params": {"profile": "x"}, "wait": true}"#)
            .reply("m3", r#"{"action": "read_file", "params": {"path": "x"}, "wait": true}"#);
    }

    let pool = pool(&["m1", "m2", "m3"]);
    let decision = engine(oracle).decide(&pool, "sys", &histories(&pool)).await.unwrap();

    assert_eq!(decision.kind, DecisionKind::ForcedDecision);
    assert_eq!(decision.action.kind, ActionKind::SendMessage);
    assert_eq!(decision.rounds, 3);
}

#[tokio::test]
async fn minority_failures_fold_into_the_cycle() {
    let oracle = ScriptedOracle::new();
    oracle
        .reply("m1", r#"{"action": "wait", "wait": 5}"#)
        .reply("m2", r#"{"action": "wait", "wait": 5}"#)
        .fail("m3", "rate limited");

    let pool = pool(&["m1", "m2", "m3"]);
    let decision = engine(oracle).decide(&pool, "sys", &histories(&pool)).await.unwrap();

    assert_eq!(decision.kind, DecisionKind::Consensus);
    assert_eq!(decision.votes.len(), 2);
}

#[tokio::test]
async fn malformed_responses_count_as_no_answer() {
    let oracle = ScriptedOracle::new();
    oracle
        .reply("m1", r#"{"action": "wait", "wait": 5}"#)
        .reply("m2", r#"{"action": "wait", "wait": 5}"#)
        .reply("m3", "I refuse to answer in JSON");

    let pool = pool(&["m1", "m2", "m3"]);
    let decision = engine(oracle).decide(&pool, "sys", &histories(&pool)).await.unwrap();
    assert_eq!(decision.votes.len(), 2);
}

#[tokio::test]
async fn majority_failure_fails_the_cycle() {
    let oracle = ScriptedOracle::new();
    oracle
        .reply("m1", r#"{"action": "wait", "wait": 5}"#)
        .fail("m2", "down")
        .fail_permanently("m3", "bad key");

    let pool = pool(&["m1", "m2", "m3"]);
    let err = engine(oracle).decide(&pool, "sys", &histories(&pool)).await.unwrap_err();
    assert_eq!(err, ConsensusError::MajorityFailed { failed: 2, pool: 3 });
}

#[tokio::test]
async fn empty_pool_is_rejected() {
    let oracle = ScriptedOracle::new();
    let err = engine(oracle).decide(&[], "sys", &ModelHistories::default()).await.unwrap_err();
    assert_eq!(err, ConsensusError::EmptyPool);
}

#[tokio::test]
async fn usage_accumulates_across_rounds() {
    let oracle = ScriptedOracle::new();
    oracle
        .reply("m1", r#"{"action": "send_message", "params": {"to": "a"}}"#)
        .reply("m2", r#"{"action": "run_shell", "params": {"command": "ls"}}"#);
    oracle.reply_each(&["m1", "m2"], r#"{"action": "run_shell", "params": {"command": "ls"}}"#);

    let pool = pool(&["m1", "m2"]);
    let decision = engine(oracle).decide(&pool, "sys", &histories(&pool)).await.unwrap();
    assert_eq!(decision.usage.len(), 4);
    assert!(decision.usage.iter().all(|(_, u)| u.total() == 20));
}
