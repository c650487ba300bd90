// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-model conversation histories.
//!
//! Every agent keeps one append-only history per oracle model so the models
//! can diverge (each sees its own past decisions). Appends happen only in
//! the owning agent's handling context; ordering is the agent's own input
//! order. The oracle-facing view merges consecutive user-role entries —
//! oracle interfaces require strict user/assistant alternation after an
//! optional leading system message.

use crate::id::ModelId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// The model's own chosen action for a cycle.
    Decision,
    /// Runtime observation (timer fired, child spawned, parent died).
    Event,
    /// Outcome of a dispatched action.
    Result,
    /// Message from the human user.
    User,
    /// Message from another agent.
    Agent,
    /// Message injected by the system.
    System,
    /// Multimodal action result carrying binary parts.
    Image,
}

crate::simple_display! {
    HistoryKind {
        Decision => "decision",
        Event => "event",
        Result => "result",
        User => "user",
        Agent => "agent",
        System => "system",
        Image => "image",
    }
}

/// One part of a multimodal payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { media_type: String, data: Vec<u8> },
}

/// Entry content: plain text or a multimodal sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryContent {
    Text(String),
    Multimodal(Vec<ContentPart>),
}

impl EntryContent {
    /// Flatten to displayable text; image parts render as placeholders.
    pub fn as_text(&self) -> String {
        match self {
            EntryContent::Text(s) => s.clone(),
            EntryContent::Multimodal(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::Image { media_type, .. } => format!("[image {media_type}]"),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    fn into_parts(self) -> Vec<ContentPart> {
        match self {
            EntryContent::Text(text) => vec![ContentPart::Text { text }],
            EntryContent::Multimodal(parts) => parts,
        }
    }
}

impl From<&str> for EntryContent {
    fn from(s: &str) -> Self {
        EntryContent::Text(s.to_string())
    }
}

impl From<String> for EntryContent {
    fn from(s: String) -> Self {
        EntryContent::Text(s)
    }
}

/// One record in a model's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub content: EntryContent,
    /// Epoch milliseconds from the agent's clock.
    pub timestamp: u64,
    /// Originating action type for `result` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
}

impl HistoryEntry {
    pub fn new(kind: HistoryKind, content: impl Into<EntryContent>, timestamp: u64) -> Self {
        Self { kind, content: content.into(), timestamp, action_type: None }
    }

    pub fn with_action_type(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = Some(action_type.into());
        self
    }
}

/// Role in an oracle-facing conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One oracle-facing message. Consecutive user messages are merged before
/// this shape reaches an `OracleClient`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub parts: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => text.clone(),
                ContentPart::Image { media_type, .. } => format!("[image {media_type}]"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn role_of(kind: HistoryKind) -> ChatRole {
    match kind {
        HistoryKind::Decision => ChatRole::Assistant,
        _ => ChatRole::User,
    }
}

/// The full per-model history map for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelHistories {
    histories: IndexMap<ModelId, Vec<HistoryEntry>>,
}

impl ModelHistories {
    /// Initialize empty histories for every model in the pool.
    pub fn for_pool(pool: &[ModelId]) -> Self {
        let mut histories = IndexMap::new();
        for model in pool {
            histories.insert(model.clone(), Vec::new());
        }
        Self { histories }
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelId> {
        self.histories.keys()
    }

    pub fn entries(&self, model: &ModelId) -> &[HistoryEntry] {
        self.histories.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Append to one model's history, creating it on first use.
    pub fn append(&mut self, model: &ModelId, entry: HistoryEntry) {
        self.histories.entry(model.clone()).or_default().push(entry);
    }

    /// Append the same entry to every model's history.
    pub fn append_all(&mut self, entry: HistoryEntry) {
        for log in self.histories.values_mut() {
            log.push(entry.clone());
        }
    }

    pub fn len(&self, model: &ModelId) -> usize {
        self.entries(model).len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.values().all(Vec::is_empty)
    }

    /// Build the oracle-facing conversation for one model: entries mapped
    /// to roles, then consecutive user-role messages merged so the result
    /// alternates user/assistant.
    pub fn conversation(&self, model: &ModelId) -> Vec<ChatMessage> {
        let mut merged: Vec<ChatMessage> = Vec::new();
        for entry in self.entries(model) {
            let role = role_of(entry.kind);
            let mut parts = entry.content.clone().into_parts();
            if entry.kind == HistoryKind::Result {
                if let Some(ref action_type) = entry.action_type {
                    if let Some(ContentPart::Text { text }) = parts.first_mut() {
                        *text = format!("[{action_type}] {text}");
                    }
                }
            }
            match merged.last_mut() {
                Some(last) if last.role == role && role == ChatRole::User => {
                    merge_parts(&mut last.parts, parts);
                }
                _ => merged.push(ChatMessage { role, parts }),
            }
        }
        merged
    }
}

/// Join two part sequences; adjacent text parts collapse with a blank line.
fn merge_parts(into: &mut Vec<ContentPart>, from: Vec<ContentPart>) {
    for part in from {
        match (into.last_mut(), &part) {
            (Some(ContentPart::Text { text: prev }), ContentPart::Text { text: next }) => {
                prev.push_str("\n\n");
                prev.push_str(next);
            }
            _ => into.push(part),
        }
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
