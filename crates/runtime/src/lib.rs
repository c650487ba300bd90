// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qo-runtime: the supervised agent runtime.
//!
//! One tokio task per agent consumes that agent's mailbox serially; action
//! routers are ephemeral per-action tasks; the supervisor owns lifecycle,
//! one-for-one restarts, and DOWN routing between related agents.

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod executor;
pub mod persist;
pub mod registry;
pub mod restorer;
pub mod router;
pub mod supervisor;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use agent::mailbox::{AgentMsg, MessageSender};
pub use agent::state::{ExitReason, LifecyclePhase};
pub use bus::{topics, EventBus};
pub use config::AgentConfig;
pub use error::RuntimeError;
pub use executor::{ActionExecutor, ExecOutcome, ExecutorSet, ShellControl, ShellSession};
pub use persist::{AgentSnapshot, ChildEntry, PersistError, PersistenceStore};
pub use registry::{AgentHandle, Registry};
pub use restorer::Restorer;
pub use supervisor::{RuntimeDeps, Supervisor};

#[cfg(any(test, feature = "test-support"))]
pub use agent::state::AgentProbe;
#[cfg(any(test, feature = "test-support"))]
pub use persist::MemoryStore;
