// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn round_zero_uses_the_family_ceiling() {
    let policy = TemperaturePolicy::default();
    assert_eq!(policy.for_round(&ModelId::new("gpt-4o"), 0), 1.0);
    assert_eq!(policy.for_round(&ModelId::new("gemini-pro"), 0), 0.7);
}

#[test]
fn each_round_drops_twenty_percent_of_ceiling() {
    let policy = TemperaturePolicy::default();
    let model = ModelId::new("claude-3-opus");
    assert!((policy.for_round(&model, 1) - 0.8).abs() < 1e-6);
    assert!((policy.for_round(&model, 2) - 0.6).abs() < 1e-6);
}

#[test]
fn schedule_floors_instead_of_going_negative() {
    let policy = TemperaturePolicy::default();
    let model = ModelId::new("gpt-4o");
    assert_eq!(policy.for_round(&model, 50), 0.1);
}

#[test]
fn unknown_family_uses_default_ceiling() {
    let policy = TemperaturePolicy::default();
    assert_eq!(policy.ceiling(&ModelId::new("mystery-1")), 0.8);
}

#[test]
fn with_family_overrides_ceiling() {
    let policy = TemperaturePolicy::default().with_family("mystery", 0.5);
    assert_eq!(policy.ceiling(&ModelId::new("mystery-1")), 0.5);
}
