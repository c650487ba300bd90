// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime error types.

use crate::persist::PersistError;
use qo_core::{AgentId, BudgetError};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("budget error: {0}")]
    Budget(#[from] BudgetError),

    #[error("supervisor is shut down")]
    SupervisorUnavailable,
}
