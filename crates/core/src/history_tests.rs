// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn m(id: &str) -> ModelId {
    ModelId::new(id)
}

#[test]
fn for_pool_creates_one_history_per_model() {
    let h = ModelHistories::for_pool(&[m("a"), m("b")]);
    assert_eq!(h.models().count(), 2);
    assert!(h.is_empty());
}

#[test]
fn append_all_fans_out_to_every_model() {
    let mut h = ModelHistories::for_pool(&[m("a"), m("b")]);
    h.append_all(HistoryEntry::new(HistoryKind::User, "hello", 1));
    assert_eq!(h.len(&m("a")), 1);
    assert_eq!(h.len(&m("b")), 1);
}

#[test]
fn per_model_append_preserves_divergence() {
    let mut h = ModelHistories::for_pool(&[m("a"), m("b")]);
    h.append(&m("a"), HistoryEntry::new(HistoryKind::Decision, "wait", 1));
    assert_eq!(h.len(&m("a")), 1);
    assert_eq!(h.len(&m("b")), 0);
}

#[test]
fn conversation_maps_decisions_to_assistant_and_rest_to_user() {
    let mut h = ModelHistories::for_pool(&[m("a")]);
    h.append(&m("a"), HistoryEntry::new(HistoryKind::User, "do x", 1));
    h.append(&m("a"), HistoryEntry::new(HistoryKind::Decision, "{\"action\":\"wait\"}", 2));
    h.append(&m("a"), HistoryEntry::new(HistoryKind::Event, "timer fired", 3));

    let conv = h.conversation(&m("a"));
    assert_eq!(conv.len(), 3);
    assert_eq!(conv[0].role, ChatRole::User);
    assert_eq!(conv[1].role, ChatRole::Assistant);
    assert_eq!(conv[2].role, ChatRole::User);
}

#[test]
fn consecutive_user_entries_merge_into_one_message() {
    let mut h = ModelHistories::for_pool(&[m("a")]);
    h.append(&m("a"), HistoryEntry::new(HistoryKind::User, "first", 1));
    h.append(&m("a"), HistoryEntry::new(HistoryKind::Agent, "second", 2));
    h.append(&m("a"), HistoryEntry::new(HistoryKind::Event, "third", 3));

    let conv = h.conversation(&m("a"));
    assert_eq!(conv.len(), 1);
    assert_eq!(conv[0].text(), "first\n\nsecond\n\nthird");
}

#[test]
fn consecutive_assistant_entries_are_not_merged() {
    let mut h = ModelHistories::for_pool(&[m("a")]);
    h.append(&m("a"), HistoryEntry::new(HistoryKind::Decision, "one", 1));
    h.append(&m("a"), HistoryEntry::new(HistoryKind::Decision, "two", 2));

    let conv = h.conversation(&m("a"));
    assert_eq!(conv.len(), 2);
}

#[test]
fn result_entries_are_prefixed_with_action_type() {
    let mut h = ModelHistories::for_pool(&[m("a")]);
    h.append(
        &m("a"),
        HistoryEntry::new(HistoryKind::Result, "ok", 1).with_action_type("run_shell"),
    );
    let conv = h.conversation(&m("a"));
    assert_eq!(conv[0].text(), "[run_shell] ok");
}

#[test]
fn image_entries_keep_binary_parts_through_merge() {
    let mut h = ModelHistories::for_pool(&[m("a")]);
    h.append(&m("a"), HistoryEntry::new(HistoryKind::User, "look", 1));
    h.append(
        &m("a"),
        HistoryEntry::new(
            HistoryKind::Image,
            EntryContent::Multimodal(vec![
                ContentPart::Text { text: "screenshot".into() },
                ContentPart::Image { media_type: "image/png".into(), data: vec![1, 2, 3] },
            ]),
            2,
        ),
    );

    let conv = h.conversation(&m("a"));
    assert_eq!(conv.len(), 1);
    assert_eq!(conv[0].parts.len(), 2);
    assert!(matches!(conv[0].parts[1], ContentPart::Image { .. }));
}

#[test]
fn entry_serde_round_trips() {
    let entry = HistoryEntry::new(HistoryKind::Result, "done", 9).with_action_type("api_call");
    let json = serde_json::to_string(&entry).unwrap();
    let back: HistoryEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(back, entry);
}
