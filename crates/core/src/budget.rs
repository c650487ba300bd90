// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure escrow arithmetic over `{allocated, committed}`.
//!
//! `committed` is the slice of an agent's budget pledged to live children
//! but not yet spent. All arithmetic clamps at zero and copies the input;
//! mutation is serialized through the owning agent's mailbox. Amounts are
//! dollars as `f64`.

use serde::{Deserialize, Serialize};

/// How an agent's spending is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMode {
    /// Spending agent with no parent cap.
    Root,
    /// A parent set a hard ceiling.
    Allocated,
    /// Untracked; every operation is a no-op.
    Na,
}

crate::simple_display! {
    BudgetMode {
        Root => "root",
        Allocated => "allocated",
        Na => "na",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BudgetError {
    #[error("insufficient_budget")]
    Insufficient,
}

/// One agent's escrow state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub mode: BudgetMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocated: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed: Option<f64>,
}

impl Budget {
    pub fn root() -> Self {
        Self { mode: BudgetMode::Root, allocated: None, committed: Some(0.0) }
    }

    pub fn allocated(ceiling: f64) -> Self {
        Self { mode: BudgetMode::Allocated, allocated: Some(ceiling), committed: Some(0.0) }
    }

    pub fn untracked() -> Self {
        Self { mode: BudgetMode::Na, allocated: None, committed: None }
    }

    pub fn committed_or_zero(&self) -> f64 {
        self.committed.unwrap_or(0.0)
    }

    /// Pledge `amount` to a child. No-op in untracked mode.
    #[must_use]
    pub fn commit(&self, amount: f64) -> Budget {
        let Some(committed) = self.committed else { return *self };
        Budget { committed: Some(committed + amount), ..*self }
    }

    /// Release `amount` of pledged budget, clamped at zero.
    #[must_use]
    pub fn release(&self, amount: f64) -> Budget {
        let Some(committed) = self.committed else { return *self };
        Budget { committed: Some((committed - amount).max(0.0)), ..*self }
    }

    /// Release a dismissed child's unspent allocation:
    /// `max(child_allocated − child_spent, 0)` returns to the free pool.
    #[must_use]
    pub fn release_child(&self, child_allocated: f64, child_spent: f64) -> Budget {
        self.release((child_allocated - child_spent).max(0.0))
    }

    /// Re-pledge a child's allocation from `current_allocated` to
    /// `new_allocated`. Fails without mutating when the delta would push
    /// `spent + committed` past this agent's own ceiling.
    pub fn adjust_child(
        &self,
        current_allocated: f64,
        new_allocated: f64,
        own_spent: f64,
    ) -> Result<Budget, BudgetError> {
        let Some(committed) = self.committed else { return Ok(*self) };
        let delta = new_allocated - current_allocated;
        if self.mode == BudgetMode::Allocated {
            let ceiling = self.allocated.unwrap_or(0.0);
            if own_spent + committed + delta > ceiling {
                return Err(BudgetError::Insufficient);
            }
        }
        Ok(Budget { committed: Some((committed + delta).max(0.0)), ..*self })
    }

    /// True iff a ceiling exists and spend exceeded it. Callers latch the
    /// result: once an agent is over budget it stays over budget.
    pub fn is_over_budget(&self, spent: f64) -> bool {
        self.mode == BudgetMode::Allocated && spent > self.allocated.unwrap_or(0.0)
    }
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
