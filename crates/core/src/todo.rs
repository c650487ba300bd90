// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent todo tracking.

use serde::{Deserialize, Serialize};

/// One todo line as shown to oracles and dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub label: String,
    #[serde(default)]
    pub done: bool,
}

impl TodoItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), done: false }
    }
}

/// Ordered todo list owned by one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoList(Vec<TodoItem>);

impl TodoList {
    pub fn items(&self) -> &[TodoItem] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace the whole list.
    pub fn set(&mut self, items: Vec<TodoItem>) {
        self.0 = items;
    }

    /// Mark the first outstanding item done. Returns false when every item
    /// was already done (or the list is empty).
    pub fn complete_first_outstanding(&mut self) -> bool {
        match self.0.iter_mut().find(|t| !t.done) {
            Some(item) => {
                item.done = true;
                true
            }
            None => false,
        }
    }

    pub fn outstanding(&self) -> usize {
        self.0.iter().filter(|t| !t.done).count()
    }
}

#[cfg(test)]
#[path = "todo_tests.rs"]
mod tests;
