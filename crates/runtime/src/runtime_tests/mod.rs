// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime tests: the decision loop, action routing, and the hierarchy.

mod actions;
mod decision_loop;
mod hierarchy;

use crate::agent::mailbox::{AgentMsg, MessageSender};
use crate::test_support::{probe, settle, TestRuntime};
use crate::agent::state::AgentProbe;
use crate::registry::AgentHandle;
use std::time::Duration;

/// Poll the agent until `pred` holds (or ~2s passes). `None` on timeout or
/// a dead agent.
async fn wait_for(
    handle: &AgentHandle,
    pred: impl Fn(&AgentProbe) -> bool,
) -> Option<AgentProbe> {
    for _ in 0..400 {
        match probe(handle).await {
            Some(p) if pred(&p) => return Some(p),
            Some(_) => {}
            None => return None,
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    None
}

fn user_message(content: &str) -> AgentMsg {
    AgentMsg::Message { content: content.into(), sender: MessageSender::User }
}
