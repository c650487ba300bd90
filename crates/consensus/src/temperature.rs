// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-family temperature schedule for refinement rounds.
//!
//! Round 0 queries at the family ceiling; each refinement round drops by
//! 20% of that ceiling, floored, so late rounds converge instead of
//! re-rolling the disagreement.

use qo_core::ModelId;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct TemperaturePolicy {
    ceilings: HashMap<String, f32>,
    default_ceiling: f32,
    floor: f32,
}

impl Default for TemperaturePolicy {
    fn default() -> Self {
        let mut ceilings = HashMap::new();
        // Permissive families sample hot; restricted ones start lower.
        ceilings.insert("gpt".to_string(), 1.0);
        ceilings.insert("claude".to_string(), 1.0);
        ceilings.insert("gemini".to_string(), 0.7);
        Self { ceilings, default_ceiling: 0.8, floor: 0.1 }
    }
}

impl TemperaturePolicy {
    pub fn with_family(mut self, family: impl Into<String>, ceiling: f32) -> Self {
        self.ceilings.insert(family.into(), ceiling);
        self
    }

    pub fn ceiling(&self, model: &ModelId) -> f32 {
        self.ceilings.get(model.family()).copied().unwrap_or(self.default_ceiling)
    }

    /// Temperature for `model` in refinement round `round` (0-based):
    /// `max(ceiling − 0.2·ceiling·round, floor)`.
    pub fn for_round(&self, model: &ModelId, round: u32) -> f32 {
        let max = self.ceiling(model);
        (max - 0.2 * max * round as f32).max(self.floor)
    }
}

#[cfg(test)]
#[path = "temperature_tests.rs"]
mod tests;
