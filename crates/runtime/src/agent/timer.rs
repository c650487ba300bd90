// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wait timers with stale-race-defeating generations.
//!
//! Each armed timer carries the generation current at arming time; the
//! firing message echoes it back. Handlers compare `(logical_id,
//! generation)` against the live timer, so a cancelled timer's message can
//! never be mistaken for the current one.

use super::mailbox::AgentMsg;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub(crate) struct WaitTimer {
    pub logical_id: String,
    pub generation: u64,
    handle: JoinHandle<()>,
}

impl WaitTimer {
    pub fn matches(&self, logical_id: &str, generation: u64) -> bool {
        self.logical_id == logical_id && self.generation == generation
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

/// Arm a timer that posts `WaitTimeout` back to the owning agent.
pub(crate) fn arm(
    tx: &mpsc::UnboundedSender<AgentMsg>,
    logical_id: String,
    generation: u64,
    duration: Duration,
) -> WaitTimer {
    let tx = tx.clone();
    let fire_id = logical_id.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        let _ = tx.send(AgentMsg::WaitTimeout { logical_id: fire_id, generation });
    });
    WaitTimer { logical_id, generation, handle }
}
