// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{probe, TestRuntime};
use qo_core::{ModelHistories, ModelId};

fn snapshot(id: &str, parent: Option<&str>) -> AgentSnapshot {
    AgentSnapshot::builder()
        .agent_id(AgentId::from_string(id))
        .parent_id(parent.map(AgentId::from_string))
        .model_pool(vec![ModelId::new("m1")])
        .histories(ModelHistories::for_pool(&[ModelId::new("m1")]))
        .build()
}

#[test]
fn topo_order_places_parents_before_children() {
    let input = vec![
        snapshot("agt-grandchild", Some("agt-child")),
        snapshot("agt-root", None),
        snapshot("agt-child", Some("agt-root")),
    ];
    let ordered: Vec<String> =
        topo_order(input).iter().map(|s| s.agent_id.to_string()).collect();
    assert_eq!(ordered, vec!["agt-root", "agt-child", "agt-grandchild"]);
}

#[test]
fn missing_parents_restore_as_roots() {
    let input = vec![snapshot("agt-orphan", Some("agt-gone")), snapshot("agt-root", None)];
    let ordered = topo_order(input);
    assert_eq!(ordered.len(), 2);
}

#[test]
fn parent_cycles_do_not_hang_ordering() {
    let input = vec![snapshot("agt-a", Some("agt-b")), snapshot("agt-b", Some("agt-a"))];
    let ordered = topo_order(input);
    assert_eq!(ordered.len(), 2);
}

#[tokio::test]
async fn restore_all_rebuilds_the_registered_tree() {
    let rt = TestRuntime::new();
    rt.store.seed(snapshot("agt-root", None));
    rt.store.seed(snapshot("agt-child", Some("agt-root")));

    let restored = Restorer::restore_all(&rt.supervisor).await.unwrap();
    assert_eq!(restored.len(), 2);

    let root = rt.registry.get(&AgentId::from_string("agt-root")).unwrap();
    let child = rt.registry.get(&AgentId::from_string("agt-child")).unwrap();
    assert_eq!(child.parent_id, Some(root.agent_id));

    // Restoration mode: no fresh initial write clobbered the snapshots
    // (the store still holds exactly the two seeds).
    assert_eq!(rt.store.snapshot_count(), 2);

    // The root saw a child_restored cast for observability.
    let p = probe(&root).await.unwrap();
    assert_eq!(p.children, vec![AgentId::from_string("agt-child")]);
}
