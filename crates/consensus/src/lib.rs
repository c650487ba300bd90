// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qo-consensus: multi-oracle decision making for the Quoracle runtime.
//!
//! One consensus cycle fans a prompt out to every model in the pool,
//! clusters the parsed responses by action fingerprint, and selects a
//! winner — refining over descending-temperature rounds until a share
//! threshold is met or the decision is forced.

pub mod cluster;
pub mod engine;
pub mod fingerprint;
pub mod oracle;
pub mod parse;
pub mod prompt;
pub mod temperature;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use cluster::{form_clusters, select_winner, Cluster, OracleVote, WaitScore};
pub use engine::{ConsensusConfig, ConsensusEngine, ConsensusError, Decision, DecisionKind};
pub use fingerprint::fingerprint;
pub use oracle::{OracleClient, OracleError, OracleReply, OracleUsage, QueryOpts};
pub use parse::{parse_response, ParseError};
pub use prompt::{
    allowed_actions, refinement_context, ProfileContext, PromptBuilder, StaticPromptBuilder,
    RESPONSE_SCHEMA,
};
pub use temperature::TemperaturePolicy;
