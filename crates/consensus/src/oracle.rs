// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The oracle boundary.
//!
//! One [`OracleClient`] fronts the whole vendor surface: the runtime hands
//! it a merged conversation and gets raw model output back. Implementations
//! must be callable concurrently and enforce their own rate limiting.

use async_trait::async_trait;
use qo_core::{ChatMessage, ModelId};
use std::time::Duration;

/// Token usage reported for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OracleUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl OracleUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Raw reply from one model: the unparsed response body plus usage.
#[derive(Debug, Clone)]
pub struct OracleReply {
    pub content: String,
    pub usage: OracleUsage,
}

/// Query failure classes. Transient errors (including timeouts) fold into
/// the cycle; permanent errors count as "no answer" from that oracle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("transient oracle error: {0}")]
    Transient(String),
    #[error("permanent oracle error: {0}")]
    Permanent(String),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

impl OracleError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OracleError::Transient(_) | OracleError::Timeout(_))
    }
}

/// Per-query options.
#[derive(Debug, Clone)]
pub struct QueryOpts {
    pub temperature: f32,
    pub timeout: Duration,
    pub tools: Option<Vec<String>>,
    pub force_condense: bool,
    /// Test hook: implementations may fail this query on purpose.
    pub simulate_failure: bool,
}

impl Default for QueryOpts {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            timeout: Duration::from_secs(60),
            tools: None,
            force_condense: false,
            simulate_failure: false,
        }
    }
}

impl QueryOpts {
    qo_core::setters! {
        set {
            temperature: f32,
            timeout: Duration,
            force_condense: bool,
            simulate_failure: bool,
        }
        option {
            tools: Vec<String>,
        }
    }
}

/// One LLM vendor adapter.
///
/// `conversation` alternates user/assistant after the leading system prompt;
/// the caller pre-merges consecutive user entries.
#[async_trait]
pub trait OracleClient: Send + Sync {
    async fn query(
        &self,
        model: &ModelId,
        system_prompt: &str,
        conversation: &[ChatMessage],
        opts: &QueryOpts,
    ) -> Result<OracleReply, OracleError>;
}
