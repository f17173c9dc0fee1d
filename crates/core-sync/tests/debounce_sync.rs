//! End-to-end engine behavior on a paused tokio clock.

use core_model::{
    BlockId, BlockKind, BlockPayload, CaseConfig, ConfigBlock, NodeRef, OrderedConfigList,
    PreviewDocument, SimpleDocConfig, SubItem,
};
use core_state::DragEnd;
use core_sync::{
    BlockEditor, DebouncedPropagator, DispatchOutcome, PreviewStore, RecommendError,
    SharedPreviewStore, StaticRecommendSource, SyncError, SyncOptions, VersionGate,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const QUIET_MS: u64 = 300;

fn options() -> SyncOptions {
    SyncOptions {
        debounce: Duration::from_millis(QUIET_MS),
        append_on_missing: true,
        reject_stale: true,
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn case(title: &str, ids: &[&str]) -> BlockPayload {
    BlockPayload::Case(CaseConfig {
        title: title.into(),
        list: ids
            .iter()
            .map(|id| SubItem {
                id: id.to_string(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    })
}

fn doc(title: &str) -> BlockPayload {
    BlockPayload::SimpleDoc(SimpleDocConfig {
        title: title.into(),
        ..Default::default()
    })
}

fn store_with(blocks: Vec<ConfigBlock>) -> Arc<SharedPreviewStore> {
    let list = OrderedConfigList::from_blocks(blocks).unwrap();
    Arc::new(SharedPreviewStore::new(PreviewDocument::new(list)))
}

fn payload_of(store: &SharedPreviewStore, id: &str) -> Option<BlockPayload> {
    store
        .current()
        .blocks()
        .find(&BlockId::new(id))
        .map(|b| b.payload.clone())
}

#[tokio::test(start_paused = true)]
async fn title_edit_dispatches_after_quiet_interval() {
    let store = store_with(vec![ConfigBlock::new("1", case("A", &[]))]);
    let mut editor = BlockEditor::new(store.clone(), options());
    editor.open(BlockId::new("1"), BlockKind::Case).unwrap();

    editor.set_field("title", json!("B")).unwrap();
    assert_eq!(store.dispatch_count(), 0, "notify must not dispatch synchronously");

    sleep(ms(QUIET_MS + 1)).await;
    let expected = OrderedConfigList::from_blocks(vec![ConfigBlock::new("1", case("B", &[]))]).unwrap();
    assert_eq!(store.current().blocks(), &expected);
    assert_eq!(store.dispatch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn sibling_config_keys_survive_dispatch() {
    let sibling = json!({
        "id": "2",
        "type": "simple_doc",
        "config": {
            "title": "D",
            "layout": "grid",
            "nodes": [{"id": "n", "name": "x", "type": 2, "parent_id": "p"}]
        }
    });
    let document: PreviewDocument = serde_json::from_value(json!({
        "settings": {"web_app_landing_configs": [
            {"id": "1", "type": "case", "config": {"title": "A", "list": []}},
            sibling.clone()
        ]}
    }))
    .unwrap();
    let store = Arc::new(SharedPreviewStore::new(document));
    let mut editor = BlockEditor::new(store.clone(), options());
    editor.open(BlockId::new("1"), BlockKind::Case).unwrap();
    editor.set_field("title", json!("B")).unwrap();

    sleep(ms(QUIET_MS + 1)).await;
    assert_eq!(store.dispatch_count(), 1);
    let blocks = serde_json::to_value(store.current().blocks()).unwrap();
    assert_eq!(blocks[1], sibling);
    assert_eq!(blocks[0]["config"]["title"], json!("B"));
}

#[tokio::test(start_paused = true)]
async fn burst_ending_at_stored_value_still_dispatches() {
    let store = store_with(vec![ConfigBlock::new("1", case("A", &[]))]);
    let mut editor = BlockEditor::new(store.clone(), options());
    editor.open(BlockId::new("1"), BlockKind::Case).unwrap();
    editor.set_field("title", json!("AB")).unwrap();
    editor.set_field("title", json!("A")).unwrap();

    sleep(ms(QUIET_MS + 1)).await;
    assert_eq!(store.dispatch_count(), 1);
    assert_eq!(payload_of(&store, "1"), Some(case("A", &[])));
    let metrics = editor.metrics().unwrap();
    assert_eq!(metrics.dispatched, 1);
    assert_eq!(metrics.unchanged, 1);
}

#[tokio::test(start_paused = true)]
async fn burst_of_five_notifies_coalesces_into_one_dispatch() {
    let store = store_with(vec![ConfigBlock::new("1", case("A", &[]))]);
    let propagator = DebouncedPropagator::new(
        BlockId::new("1"),
        store.clone(),
        Arc::new(VersionGate::new()),
        options(),
    )
    .unwrap();

    for i in 1..=5 {
        propagator.notify(case(&format!("t{i}"), &[]));
        sleep(ms(50)).await;
    }
    // last notify was 50ms ago
    sleep(ms(QUIET_MS - 100)).await;
    assert_eq!(store.dispatch_count(), 0);

    sleep(ms(100)).await;
    assert_eq!(store.dispatch_count(), 1);
    assert_eq!(payload_of(&store, "1"), Some(case("t5", &[])));

    let metrics = propagator.metrics();
    assert_eq!(metrics.notifies, 5);
    assert_eq!(metrics.coalesced, 4);
    assert_eq!(metrics.dispatched, 1);
    assert!(propagator.is_idle());
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_pending_dispatch() {
    let store = store_with(vec![ConfigBlock::new("1", case("A", &[]))]);
    let propagator = DebouncedPropagator::new(
        BlockId::new("1"),
        store.clone(),
        Arc::new(VersionGate::new()),
        options(),
    )
    .unwrap();

    propagator.notify(case("B", &[]));
    assert!(propagator.dispose());
    assert!(!propagator.dispose());
    propagator.notify(case("C", &[]));

    sleep(ms(QUIET_MS * 3)).await;
    assert_eq!(store.dispatch_count(), 0);
    assert_eq!(payload_of(&store, "1"), Some(case("A", &[])));
    assert_eq!(propagator.metrics().cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn switching_blocks_cancels_pending_edit() {
    let store = store_with(vec![
        ConfigBlock::new("1", case("A", &[])),
        ConfigBlock::new("2", doc("Docs")),
    ]);
    let mut editor = BlockEditor::new(store.clone(), options());
    editor.open(BlockId::new("1"), BlockKind::Case).unwrap();
    editor.set_field("title", json!("lost")).unwrap();
    editor.open(BlockId::new("2"), BlockKind::SimpleDoc).unwrap();

    sleep(ms(QUIET_MS * 2)).await;
    assert_eq!(store.dispatch_count(), 0);
    assert_eq!(editor.session().unwrap().working(), &doc("Docs"));
}

#[tokio::test(start_paused = true)]
async fn drag_reorder_reaches_store_and_keeps_siblings() {
    let store = store_with(vec![
        ConfigBlock::new("0", doc("Before")),
        ConfigBlock::new("1", case("Cases", &["a", "b", "c"])),
        ConfigBlock::new("2", doc("After")),
    ]);
    let before = store.current();
    let mut editor = BlockEditor::new(store.clone(), options());
    editor.open(BlockId::new("1"), BlockKind::Case).unwrap();
    assert!(editor.apply_drag(&DragEnd::new("a", Some("c".into()))).unwrap());

    sleep(ms(QUIET_MS + 1)).await;
    let after = store.current();
    assert_eq!(after.blocks().blocks()[1].payload.entry_ids(), ["b", "c", "a"]);
    assert_eq!(after.blocks().blocks()[0], before.blocks().blocks()[0]);
    assert_eq!(after.blocks().blocks()[2], before.blocks().blocks()[2]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_editors_of_different_blocks_do_not_clobber() {
    let store = store_with(vec![
        ConfigBlock::new("1", case("A", &[])),
        ConfigBlock::new("2", doc("D")),
    ]);
    let gate = Arc::new(VersionGate::new());
    let mut first = BlockEditor::with_gate(store.clone(), gate.clone(), options());
    let mut second = BlockEditor::with_gate(store.clone(), gate, options());
    first.open(BlockId::new("1"), BlockKind::Case).unwrap();
    second.open(BlockId::new("2"), BlockKind::SimpleDoc).unwrap();

    first.set_field("title", json!("A2")).unwrap();
    sleep(ms(10)).await;
    second.set_field("title", json!("D2")).unwrap();

    sleep(ms(QUIET_MS * 2)).await;
    assert_eq!(payload_of(&store, "1"), Some(case("A2", &[])));
    assert_eq!(payload_of(&store, "2"), Some(doc("D2")));
    assert_eq!(store.dispatch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_dispatch_for_same_block_is_rejected() {
    let store = store_with(vec![ConfigBlock::new("1", case("A", &[]))]);
    let gate = Arc::new(VersionGate::new());
    let slow = DebouncedPropagator::new(
        BlockId::new("1"),
        store.clone(),
        gate.clone(),
        SyncOptions {
            debounce: ms(500),
            ..options()
        },
    )
    .unwrap();
    let fast = DebouncedPropagator::new(
        BlockId::new("1"),
        store.clone(),
        gate,
        SyncOptions {
            debounce: ms(100),
            ..options()
        },
    )
    .unwrap();

    slow.notify(case("older", &[]));
    fast.notify(case("newer", &[]));
    sleep(ms(600)).await;

    assert_eq!(payload_of(&store, "1"), Some(case("newer", &[])));
    assert_eq!(slow.metrics().stale_rejected, 1);
    assert_eq!(fast.metrics().dispatched, 1);
}

#[tokio::test(start_paused = true)]
async fn stale_gate_can_be_disabled() {
    let store = store_with(vec![ConfigBlock::new("1", case("A", &[]))]);
    let gate = Arc::new(VersionGate::new());
    let lenient = SyncOptions {
        reject_stale: false,
        ..options()
    };
    let slow = DebouncedPropagator::new(
        BlockId::new("1"),
        store.clone(),
        gate.clone(),
        SyncOptions {
            debounce: ms(500),
            ..lenient
        },
    )
    .unwrap();
    let fast = DebouncedPropagator::new(
        BlockId::new("1"),
        store.clone(),
        gate,
        SyncOptions {
            debounce: ms(100),
            ..lenient
        },
    )
    .unwrap();

    slow.notify(case("older", &[]));
    fast.notify(case("newer", &[]));
    sleep(ms(600)).await;
    // last writer wins
    assert_eq!(payload_of(&store, "1"), Some(case("older", &[])));
}

#[tokio::test(start_paused = true)]
async fn missing_block_is_appended_or_dropped_per_policy() {
    let store = store_with(vec![ConfigBlock::new("1", case("A", &[]))]);
    let mut editor = BlockEditor::new(store.clone(), options());
    editor.open(BlockId::new("new"), BlockKind::Case).unwrap();
    editor.set_field("title", json!("Fresh")).unwrap();
    sleep(ms(QUIET_MS + 1)).await;
    let ids: Vec<String> = store.current().blocks().ids().iter().map(|id| id.to_string()).collect();
    assert_eq!(ids, ["1", "new"]);
    assert_eq!(payload_of(&store, "new"), Some(case("Fresh", &[])));

    let strict_store = store_with(vec![ConfigBlock::new("1", case("A", &[]))]);
    let mut strict = BlockEditor::new(
        strict_store.clone(),
        SyncOptions {
            append_on_missing: false,
            ..options()
        },
    );
    strict.open(BlockId::new("new"), BlockKind::Case).unwrap();
    strict.set_field("title", json!("Dropped")).unwrap();
    sleep(ms(QUIET_MS + 1)).await;
    assert_eq!(strict_store.dispatch_count(), 0);
    assert_eq!(strict.metrics().unwrap().missing_target, 1);
}

#[tokio::test(start_paused = true)]
async fn flush_dispatches_immediately() {
    let store = store_with(vec![ConfigBlock::new("1", case("A", &[]))]);
    let mut editor = BlockEditor::new(store.clone(), options());
    editor.open(BlockId::new("1"), BlockKind::Case).unwrap();
    assert_eq!(editor.flush(), None);

    editor.set_field("title", json!("now")).unwrap();
    assert!(!editor.is_idle());
    assert_eq!(editor.flush(), Some(DispatchOutcome::Dispatched));
    assert!(editor.is_idle());
    assert_eq!(payload_of(&store, "1"), Some(case("now", &[])));

    // the cancelled timer must not dispatch a second time
    sleep(ms(QUIET_MS * 2)).await;
    assert_eq!(store.dispatch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn store_changes_reset_session_without_dispatching() {
    let store = store_with(vec![ConfigBlock::new("1", case("A", &[]))]);
    let mut editor = BlockEditor::new(store.clone(), options());
    editor.open(BlockId::new("1"), BlockKind::Case).unwrap();

    // external writer replaces the block
    let external = core_model::merge(store.current().blocks(), &BlockId::new("1"), case("ext", &[]));
    store.dispatch(store.current().with_blocks(external));
    assert!(editor.sync_from_store().unwrap());
    assert_eq!(editor.session().unwrap().working(), &case("ext", &[]));
    assert!(!editor.sync_from_store().unwrap());

    sleep(ms(QUIET_MS * 2)).await;
    assert_eq!(store.dispatch_count(), 1, "reset must not echo back to the store");

    // pending local edit defers the reset
    editor.set_field("title", json!("local")).unwrap();
    let external = core_model::merge(store.current().blocks(), &BlockId::new("1"), case("ext2", &[]));
    store.dispatch(store.current().with_blocks(external));
    assert!(!editor.sync_from_store().unwrap());
    assert_eq!(editor.session().unwrap().working(), &case("local", &[]));
}

fn node(id: &str) -> NodeRef {
    NodeRef {
        id: id.into(),
        name: format!("Doc {id}"),
        node_type: NodeRef::DOCUMENT,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn recommended_nodes_flow_through_debounce() {
    let store = store_with(vec![ConfigBlock::new("2", doc("Docs"))]);
    let source = StaticRecommendSource::new([node("n1"), node("n2")]);
    let mut editor = BlockEditor::new(store.clone(), options());
    editor.open(BlockId::new("2"), BlockKind::SimpleDoc).unwrap();

    let applied = editor
        .apply_recommendations(&source, vec!["n2".into(), "n1".into()])
        .await
        .unwrap();
    assert!(applied);
    assert_eq!(store.dispatch_count(), 0);

    sleep(ms(QUIET_MS + 1)).await;
    let stored = payload_of(&store, "2").unwrap();
    assert_eq!(stored.entry_ids(), ["n2", "n1"]);
}

#[tokio::test(start_paused = true)]
async fn failed_lookup_keeps_working_copy() {
    let store = store_with(vec![ConfigBlock::new("2", doc("Docs"))]);
    let mut editor = BlockEditor::new(store.clone(), options());
    editor.open(BlockId::new("2"), BlockKind::SimpleDoc).unwrap();

    let ticket = editor.begin_recommend(vec!["n1".into()]).unwrap();
    let err = editor
        .finish_recommend(ticket, Err(RecommendError::Unavailable("timeout".into())))
        .unwrap_err();
    assert!(matches!(err, SyncError::Recommend(_)));
    assert_eq!(editor.session().unwrap().working(), &doc("Docs"));

    sleep(ms(QUIET_MS * 2)).await;
    assert_eq!(store.dispatch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_lookup_result_is_discarded_after_switch() {
    let store = store_with(vec![
        ConfigBlock::new("1", case("A", &[])),
        ConfigBlock::new("2", doc("Docs")),
    ]);
    let mut editor = BlockEditor::new(store.clone(), options());
    editor.open(BlockId::new("2"), BlockKind::SimpleDoc).unwrap();
    let ticket = editor.begin_recommend(vec!["n1".into()]).unwrap();

    editor.open(BlockId::new("1"), BlockKind::Case).unwrap();
    assert!(!editor.finish_recommend(ticket, Ok(vec![node("n1")])).unwrap());

    sleep(ms(QUIET_MS * 2)).await;
    assert_eq!(store.dispatch_count(), 0);
    assert!(matches!(
        editor.begin_recommend(vec![]),
        Err(SyncError::RecommendUnsupported("case"))
    ));
}

#[test]
fn propagator_requires_runtime() {
    let store = store_with(vec![]);
    let result = DebouncedPropagator::new(
        BlockId::new("1"),
        store,
        Arc::new(VersionGate::new()),
        options(),
    );
    assert!(matches!(result, Err(SyncError::NoRuntime)));
}

#[test]
fn editing_without_open_block_is_an_error() {
    let store = store_with(vec![]);
    let mut editor = BlockEditor::new(store, options());
    assert!(matches!(
        editor.set_field("title", json!("x")),
        Err(SyncError::NoActiveBlock)
    ));
    assert!(editor.is_idle());
    assert!(!editor.close());
}
