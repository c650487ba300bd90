// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn complete_first_outstanding_marks_in_order() {
    let mut todos = TodoList::default();
    todos.set(vec![TodoItem::new("first"), TodoItem::new("second")]);

    assert!(todos.complete_first_outstanding());
    assert!(todos.items()[0].done);
    assert!(!todos.items()[1].done);

    assert!(todos.complete_first_outstanding());
    assert_eq!(todos.outstanding(), 0);

    assert!(!todos.complete_first_outstanding());
}

#[test]
fn set_replaces_the_list() {
    let mut todos = TodoList::default();
    todos.set(vec![TodoItem::new("a")]);
    todos.set(vec![TodoItem::new("b"), TodoItem::new("c")]);
    assert_eq!(todos.items().len(), 2);
    assert_eq!(todos.items()[0].label, "b");
}

#[test]
fn empty_list_has_nothing_outstanding() {
    let mut todos = TodoList::default();
    assert!(todos.is_empty());
    assert!(!todos.complete_first_outstanding());
}
