// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn generated_ids_carry_prefix_and_fill_capacity() {
    let id = AgentId::new();
    assert!(id.as_str().starts_with("agt-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
    assert_eq!(id.suffix().len(), 19);
}

#[test]
fn generated_ids_are_unique() {
    let a = AgentId::new();
    let b = AgentId::new();
    assert_ne!(a, b);
}

#[test]
fn from_string_round_trips() {
    let id = AgentId::from_string("agt-fixed");
    assert_eq!(id.as_str(), "agt-fixed");
    assert_eq!(id.suffix(), "fixed");
    assert_eq!(id, "agt-fixed");
}

#[test]
fn idbuf_hash_matches_str_for_map_lookup() {
    let id = CommandId::from_string("cmd-abc");
    let mut map: HashMap<CommandId, u32> = HashMap::new();
    map.insert(id, 7);
    assert_eq!(map.get("cmd-abc"), Some(&7));
}

#[test]
fn serde_round_trip_is_transparent() {
    let id = TaskId::from_string("tsk-t1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"tsk-t1\"");
    let back: TaskId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn action_id_displays_with_counter() {
    assert_eq!(ActionId(12).to_string(), "act-12");
}

#[test]
fn model_family_splits_on_dash_and_slash() {
    assert_eq!(ModelId::new("claude-3-opus").family(), "claude");
    assert_eq!(ModelId::new("meta/llama-3").family(), "meta");
    assert_eq!(ModelId::new("solo").family(), "solo");
}

#[test]
fn short_truncates_only_long_input() {
    assert_eq!(short("abcdef", 4), "abcd");
    assert_eq!(short("ab", 4), "ab");
}
