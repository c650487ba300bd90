// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The consensus engine: fan-out, clustering, refinement, forced decisions.

use crate::cluster::{form_clusters, select_winner, OracleVote};
use crate::oracle::{OracleClient, OracleError, OracleUsage, QueryOpts};
use crate::parse::parse_response;
use crate::prompt::refinement_context;
use crate::temperature::TemperaturePolicy;
use qo_core::{ActionRequest, ChatMessage, ChatRole, ContentPart, ModelHistories, ModelId};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Tuning for one engine instance.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Minimum winning-cluster share to accept without refinement.
    pub share_threshold: f64,
    /// Total rounds (initial + refinements) before forcing a decision.
    pub max_rounds: u32,
    /// Wall-clock bound on one round's fan-out.
    pub cycle_timeout: Duration,
    pub temperature: TemperaturePolicy,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            share_threshold: 0.5,
            max_rounds: 3,
            cycle_timeout: Duration::from_secs(120),
            temperature: TemperaturePolicy::default(),
        }
    }
}

/// Whether the pool agreed or the tie-break chain had to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    Consensus,
    ForcedDecision,
}

/// Outcome of one decision cycle.
#[derive(Debug, Clone)]
pub struct Decision {
    pub kind: DecisionKind,
    pub action: ActionRequest,
    /// Final-round votes, for per-model history updates.
    pub votes: Vec<OracleVote>,
    /// Token usage summed across all rounds, per model.
    pub usage: Vec<(ModelId, OracleUsage)>,
    /// Rounds actually run (≥ 1).
    pub rounds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("model pool is empty")]
    EmptyPool,
    #[error("majority of oracles failed ({failed}/{pool})")]
    MajorityFailed { failed: usize, pool: usize },
}

/// Multi-oracle decision maker. Cheap to clone per cycle.
#[derive(Clone)]
pub struct ConsensusEngine {
    client: Arc<dyn OracleClient>,
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(client: Arc<dyn OracleClient>, config: ConsensusConfig) -> Self {
        Self { client, config }
    }

    /// Run one full decision cycle over the pool.
    pub async fn decide(
        &self,
        pool: &[ModelId],
        system_prompt: &str,
        histories: &ModelHistories,
    ) -> Result<Decision, ConsensusError> {
        if pool.is_empty() {
            return Err(ConsensusError::EmptyPool);
        }

        let mut usage: Vec<(ModelId, OracleUsage)> = Vec::new();
        let mut deliberation: Vec<String> = Vec::new();

        for round in 0..self.config.max_rounds {
            let replies = self.fan_out(pool, system_prompt, histories, round, &deliberation).await;

            let mut votes = Vec::new();
            let mut raw_responses = Vec::new();
            let mut failed = 0usize;
            for (model, result) in replies {
                match result {
                    Ok(reply) => {
                        usage.push((model.clone(), reply.usage));
                        match parse_response(&reply.content) {
                            Ok(request) => {
                                raw_responses.push(reply.content);
                                votes.push(OracleVote { model, request });
                            }
                            Err(e) => {
                                // Treated as "no answer" from this oracle.
                                tracing::warn!(%model, error = %e, "discarding malformed oracle response");
                                failed += 1;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%model, error = %e, transient = e.is_transient(), "oracle query failed");
                        failed += 1;
                    }
                }
            }

            if failed * 2 > pool.len() {
                return Err(ConsensusError::MajorityFailed { failed, pool: pool.len() });
            }

            let clusters = form_clusters(votes);
            let (winning_action, winner_print, winner_size) = match select_winner(&clusters) {
                Some(winner) => {
                    (winner.request().clone(), winner.fingerprint.clone(), winner.size())
                }
                None => return Err(ConsensusError::MajorityFailed { failed, pool: pool.len() }),
            };
            let total: usize = clusters.iter().map(|c| c.size()).sum();
            let share = winner_size as f64 / total as f64;

            tracing::debug!(
                round,
                clusters = clusters.len(),
                share,
                winner = %winner_print,
                "consensus round complete"
            );

            if share >= self.config.share_threshold {
                return Ok(Decision {
                    kind: DecisionKind::Consensus,
                    action: winning_action,
                    votes: clusters.into_iter().flat_map(|c| c.votes).collect(),
                    usage,
                    rounds: round + 1,
                });
            }

            if round + 1 == self.config.max_rounds {
                tracing::info!(round, winner = %winner_print, "rounds exhausted, forcing decision");
                return Ok(Decision {
                    kind: DecisionKind::ForcedDecision,
                    action: winning_action,
                    votes: clusters.into_iter().flat_map(|c| c.votes).collect(),
                    usage,
                    rounds: round + 1,
                });
            }

            deliberation = raw_responses;
        }

        // max_rounds >= 1 is enforced by construction; the loop always
        // returns before falling through.
        Err(ConsensusError::EmptyPool)
    }

    /// Query every model in parallel, bounded by the cycle timeout.
    /// Models that miss the deadline count as transient failures.
    async fn fan_out(
        &self,
        pool: &[ModelId],
        system_prompt: &str,
        histories: &ModelHistories,
        round: u32,
        deliberation: &[String],
    ) -> Vec<(ModelId, Result<crate::oracle::OracleReply, OracleError>)> {
        let mut join_set = JoinSet::new();

        for model in pool {
            let client = Arc::clone(&self.client);
            let model = model.clone();
            let system_prompt = system_prompt.to_string();
            let mut conversation = histories.conversation(&model);
            if round > 0 {
                append_user_text(&mut conversation, refinement_context(deliberation));
            }
            let opts = QueryOpts::default()
                .temperature(self.config.temperature.for_round(&model, round))
                .timeout(self.config.cycle_timeout);

            join_set.spawn(async move {
                let result = client.query(&model, &system_prompt, &conversation, &opts).await;
                (model, result)
            });
        }

        let deadline = tokio::time::Instant::now() + self.config.cycle_timeout;
        let mut replies = Vec::with_capacity(pool.len());
        loop {
            let next = tokio::time::timeout_at(deadline, join_set.join_next()).await;
            match next {
                Ok(Some(Ok(reply))) => replies.push(reply),
                Ok(Some(Err(join_err))) => {
                    tracing::warn!(error = %join_err, "oracle task panicked");
                }
                Ok(None) => break,
                Err(_) => {
                    // Deadline hit: everything still in flight is a timeout.
                    join_set.abort_all();
                    let missing: Vec<ModelId> = pool
                        .iter()
                        .filter(|m| !replies.iter().any(|(got, _)| got == *m))
                        .cloned()
                        .collect();
                    for model in missing {
                        replies
                            .push((model, Err(OracleError::Timeout(self.config.cycle_timeout))));
                    }
                    break;
                }
            }
        }
        replies
    }
}

fn append_user_text(conversation: &mut Vec<ChatMessage>, text: String) {
    match conversation.last_mut() {
        Some(last) if last.role == ChatRole::User => {
            last.parts.push(ContentPart::Text { text });
        }
        _ => conversation.push(ChatMessage {
            role: ChatRole::User,
            parts: vec![ContentPart::Text { text }],
        }),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
