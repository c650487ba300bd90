// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response clustering and winner selection.
//!
//! The winner is the largest cluster. Ties break lexicographically:
//! highest action priority, then lowest wait score, then lowest
//! auto-complete-todo score, then fingerprint order as the final total
//! ordering — so permuting oracle response order never changes the winner.

use crate::fingerprint::fingerprint;
use indexmap::IndexMap;
use qo_core::{ActionRequest, ModelId};

/// One model's parsed response in a cycle.
#[derive(Debug, Clone)]
pub struct OracleVote {
    pub model: ModelId,
    pub request: ActionRequest,
}

/// The conservative tie-break pair: `(count-of-true, sum-of-finite-secs)`.
/// Lower is more conservative and wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct WaitScore(pub u32, pub u64);

/// A group of votes sharing one action fingerprint.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub fingerprint: String,
    pub votes: Vec<OracleVote>,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.votes.len()
    }

    /// Representative request: the first vote in the cluster.
    pub fn request(&self) -> &ActionRequest {
        &self.votes[0].request
    }

    pub fn priority(&self) -> u8 {
        self.votes.iter().map(|v| v.request.priority()).max().unwrap_or(0)
    }

    pub fn wait_score(&self) -> WaitScore {
        let mut score = WaitScore::default();
        for vote in &self.votes {
            let (blocks, secs) = vote.request.wait.score();
            score.0 += blocks;
            score.1 += secs;
        }
        score
    }

    pub fn todo_score(&self) -> WaitScore {
        let count = self.votes.iter().filter(|v| v.request.auto_complete_todo).count() as u32;
        WaitScore(count, 0)
    }
}

/// Group votes by fingerprint, preserving first-seen order.
pub fn form_clusters(votes: Vec<OracleVote>) -> Vec<Cluster> {
    let mut by_print: IndexMap<String, Vec<OracleVote>> = IndexMap::new();
    for vote in votes {
        let print = fingerprint(&vote.request);
        by_print.entry(print).or_default().push(vote);
    }
    by_print
        .into_iter()
        .map(|(fingerprint, votes)| Cluster { fingerprint, votes })
        .collect()
}

/// Pick the winning cluster under the tie-break chain. Returns `None` only
/// for an empty slate.
pub fn select_winner(clusters: &[Cluster]) -> Option<&Cluster> {
    clusters.iter().min_by(|a, b| {
        b.size()
            .cmp(&a.size())
            .then_with(|| b.priority().cmp(&a.priority()))
            .then_with(|| a.wait_score().cmp(&b.wait_score()))
            .then_with(|| a.todo_score().cmp(&b.todo_score()))
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    })
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;
