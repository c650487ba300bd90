// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tree restoration after a runtime restart.
//!
//! Snapshots come back in arbitrary order; parents must be live before
//! their children so registry lookups and DOWN routing reconnect
//! correctly. Orphans (parent snapshot missing) are restored as roots.

use crate::agent::mailbox::AgentMsg;
use crate::error::RuntimeError;
use crate::persist::AgentSnapshot;
use crate::supervisor::Supervisor;
use qo_core::{AgentId, Clock};
use std::collections::HashSet;

pub struct Restorer;

impl Restorer {
    /// Restore every persisted agent, parents first. Returns the restored
    /// ids in spawn order.
    pub async fn restore_all<C: Clock>(
        supervisor: &Supervisor<C>,
    ) -> Result<Vec<AgentId>, RuntimeError> {
        let snapshots = supervisor.store().load_agents_for_restore().await?;
        let ordered = topo_order(snapshots);

        let mut restored = Vec::with_capacity(ordered.len());
        for snapshot in &ordered {
            match supervisor.restore_agent(snapshot) {
                Ok(handle) => {
                    handle.wait_for_ready().await;
                    restored.push(snapshot.agent_id);
                }
                Err(e) => {
                    tracing::error!(agent_id = %snapshot.agent_id, error = %e, "restore failed");
                }
            }
        }

        // Reconnect parent bookkeeping (idempotent on the parent side).
        for snapshot in &ordered {
            let Some(parent_id) = snapshot.parent_id else { continue };
            let Some(parent) = supervisor.registry().get(&parent_id) else { continue };
            parent.send(AgentMsg::ChildRestored {
                child_id: snapshot.agent_id,
                spawned_at: snapshot.captured_at,
                budget_allocated: None,
            });
        }

        tracing::info!(count = restored.len(), "tree restored");
        Ok(restored)
    }
}

/// Order snapshots so every parent precedes its children. Snapshots whose
/// parent is absent from the set count as roots.
fn topo_order(mut snapshots: Vec<AgentSnapshot>) -> Vec<AgentSnapshot> {
    let known: HashSet<AgentId> = snapshots.iter().map(|s| s.agent_id).collect();
    let mut placed: HashSet<AgentId> = HashSet::new();
    let mut ordered = Vec::with_capacity(snapshots.len());

    while !snapshots.is_empty() {
        let before = snapshots.len();
        let (ready, rest): (Vec<_>, Vec<_>) = snapshots.into_iter().partition(|s| {
            match s.parent_id {
                Some(parent) => !known.contains(&parent) || placed.contains(&parent),
                None => true,
            }
        });
        for snapshot in ready {
            placed.insert(snapshot.agent_id);
            ordered.push(snapshot);
        }
        snapshots = rest;
        if snapshots.len() == before {
            // Parent cycle in stored data; restore the remainder anyway.
            tracing::warn!(remaining = snapshots.len(), "parent cycle in snapshots");
            ordered.append(&mut snapshots);
            break;
        }
    }
    ordered
}

#[cfg(test)]
#[path = "restorer_tests.rs"]
mod tests;
