// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

#[test]
fn commit_increases_committed() {
    let b = Budget::allocated(10.0).commit(3.0);
    assert_eq!(b.committed, Some(3.0));
}

#[test]
fn commit_is_noop_when_untracked() {
    let b = Budget::untracked().commit(3.0);
    assert_eq!(b.committed, None);
}

#[test]
fn release_clamps_at_zero() {
    let b = Budget::allocated(10.0).commit(2.0).release(5.0);
    assert_eq!(b.committed, Some(0.0));
}

#[test]
fn release_child_returns_unspent_allocation() {
    let b = Budget::allocated(10.0).commit(4.0).release_child(4.0, 1.5);
    assert_eq!(b.committed, Some(1.5));
}

#[test]
fn release_child_with_overspent_child_releases_nothing() {
    let b = Budget::allocated(10.0).commit(4.0).release_child(4.0, 9.0);
    assert_eq!(b.committed, Some(4.0));
}

// Worked example from the escrow design: parent allocated 10.00 with 3.00
// committed and 2.00 spent; raising a child from 1.00 to 2.50 fits, raising
// it to 8.00 does not.
#[test]
fn adjust_child_within_ceiling_applies_delta() {
    let parent = Budget::allocated(10.0).commit(3.0);
    let adjusted = parent.adjust_child(1.0, 2.5, 2.0).unwrap();
    assert_eq!(adjusted.committed, Some(4.5));
}

#[test]
fn adjust_child_past_ceiling_fails_without_mutation() {
    let parent = Budget::allocated(10.0).commit(3.0);
    let err = parent.adjust_child(1.0, 8.0, 2.0).unwrap_err();
    assert_eq!(err, BudgetError::Insufficient);
    assert_eq!(parent.committed, Some(3.0));
}

#[test]
fn adjust_child_downward_always_succeeds() {
    let parent = Budget::allocated(10.0).commit(3.0);
    let adjusted = parent.adjust_child(2.5, 0.5, 9.0).unwrap();
    assert_eq!(adjusted.committed, Some(1.0));
}

#[test]
fn adjust_child_on_root_has_no_ceiling() {
    let parent = Budget::root();
    let adjusted = parent.adjust_child(0.0, 1_000.0, 999.0).unwrap();
    assert_eq!(adjusted.committed, Some(1_000.0));
}

#[test]
fn over_budget_only_in_allocated_mode() {
    assert!(Budget::allocated(5.0).is_over_budget(5.01));
    assert!(!Budget::allocated(5.0).is_over_budget(5.0));
    assert!(!Budget::root().is_over_budget(1e9));
    assert!(!Budget::untracked().is_over_budget(1e9));
}

proptest! {
    /// Committed never goes negative, whatever release amounts arrive.
    #[test]
    fn committed_stays_non_negative(
        commits in proptest::collection::vec(0.0f64..100.0, 0..8),
        releases in proptest::collection::vec(0.0f64..200.0, 0..8),
    ) {
        let mut b = Budget::allocated(1_000.0);
        for c in commits {
            b = b.commit(c);
        }
        for r in releases {
            b = b.release(r);
            prop_assert!(b.committed_or_zero() >= 0.0);
        }
    }

    /// Commit-then-release-child restores the pre-addition escrow when the
    /// child spent nothing.
    #[test]
    fn add_then_dismiss_is_neutral(alloc in 0.0f64..50.0) {
        let before = Budget::allocated(100.0).commit(7.0);
        let after = before.commit(alloc).release_child(alloc, 0.0);
        prop_assert!((after.committed_or_zero() - before.committed_or_zero()).abs() < 1e-9);
    }

    /// A failed adjustment never mutates; a successful one moves committed
    /// by exactly the delta (clamped at zero).
    #[test]
    fn adjust_child_is_exact_or_rejected(
        current in 0.0f64..20.0,
        new in 0.0f64..20.0,
        spent in 0.0f64..20.0,
    ) {
        let parent = Budget::allocated(25.0).commit(5.0);
        match parent.adjust_child(current, new, spent) {
            Ok(adjusted) => {
                let expected = (5.0 + (new - current)).max(0.0);
                prop_assert!((adjusted.committed_or_zero() - expected).abs() < 1e-9);
            }
            Err(BudgetError::Insufficient) => {
                prop_assert!(spent + 5.0 + (new - current) > 25.0);
            }
        }
    }
}
