use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use flow_canvas::clipboard::document::{self, PortableDocument};
use flow_canvas::graph_utils::graph::{Connection, Edge, EdgeDataPatch, Node, NodeDataPatch, NodeKind, Position};
use flow_canvas::history::snapshot::Snapshot;
use flow_canvas::persistence::persist;
use flow_canvas::persistence::settings::EditorSettings;
use flow_canvas::session::shortcuts::{Key, ShortcutAction, ShortcutEvent};
use flow_canvas::session::{Clock, EditorSession, NodeChange};
use flow_canvas::viewport::{
    CanvasHandle, DeviceType, PollOutcome, RestoreOutcome, Viewport, ViewportClient, ViewportKey, ViewportRecord,
};
use serde_json::json;

struct FakeCanvas {
    current: Viewport,
    layout: DeviceType,
    applied: Vec<Viewport>,
}

impl FakeCanvas {
    fn new(layout: DeviceType) -> Self {
        Self { current: Viewport::default(), layout, applied: Vec::new() }
    }
}

impl CanvasHandle for FakeCanvas {
    fn viewport(&self) -> Viewport { self.current }
    fn set_viewport(&mut self, viewport: Viewport) {
        self.applied.push(viewport);
        self.current = viewport;
    }
    fn layout(&self) -> DeviceType { self.layout }
}

fn clocked_session(settings: EditorSettings) -> (EditorSession, Rc<Cell<Instant>>) {
    let now = Rc::new(Cell::new(Instant::now()));
    let handle = now.clone();
    let clock: Clock = Rc::new(move || handle.get());
    (EditorSession::new(settings, None, Some(clock)), now)
}

fn advance(now: &Rc<Cell<Instant>>, ms: u64) {
    now.set(now.get() + Duration::from_millis(ms));
}

fn node(id: &str, kind: NodeKind, x: f64, y: f64) -> Node {
    Node::with_id(id, kind, Position::new(x, y))
}

fn edge(id: &str, source: &str, target: &str) -> Edge {
    let mut e = Edge::new(source, target);
    e.id = id.to_string();
    e
}

/// `{nodes: [A, B], edges: [A -> B]}` loaded as workflow 1, version 5.
fn session_ab() -> (EditorSession, Rc<Cell<Instant>>) {
    let (mut s, now) = clocked_session(EditorSettings::default());
    let mut a = node("A", NodeKind::Trigger, 0.0, 0.0);
    a.data.parameters = json!({"schedule": "hourly"});
    let mut b = node("B", NodeKind::Agent, 200.0, 50.0);
    b.data.agent_key = Some("triage".into());
    let mut ab = edge("A-B", "A", "B");
    ab.data.condition = Some("approved".into());
    s.load_workflow("1", Some(5), document::serialize(&[a, b], &[ab]));
    (s, now)
}

#[test]
fn serialization_round_trip_preserves_graph() {
    let (s, _) = session_ab();
    let doc = document::serialize(s.graph().nodes(), s.graph().edges());
    let text = doc.to_json().unwrap();
    let (nodes, edges) = document::deserialize(&text).unwrap();
    assert_eq!(nodes.len(), 2);
    for (orig, back) in s.graph().nodes().iter().zip(&nodes) {
        assert_eq!(orig.id, back.id);
        assert_eq!(orig.position, back.position);
        assert_eq!(orig.data, back.data);
    }
    assert_eq!(edges, s.graph().edges().to_vec());
}

#[test]
fn import_drops_unknown_kinds_and_grids_missing_layout() {
    let text = json!({
        "nodes": [
            {"id": "a", "kind": "trigger"},
            {"id": "x", "kind": "quantum_step"},
            {"id": "c", "kind": "output"}
        ],
        "edges": [{"source": "a", "target": "x"}, {"source": "a", "target": "c"}]
    })
    .to_string();
    let (nodes, edges) = document::deserialize(&text).unwrap();
    let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(nodes[0].position, Position::new(0.0, 0.0));
    assert_eq!(nodes[1].position, Position::new(300.0, 240.0));
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target, "c");
}

#[test]
fn malformed_input_is_rejected() {
    assert!(document::deserialize("not json").is_err());
    assert!(document::deserialize("[1, 2]").is_err());
    assert!(document::deserialize(r#"{"nodes": {}}"#).is_err());
}

#[test]
fn undo_redo_inverse_law() {
    let (mut s, _) = session_ab();
    let s0 = s.graph().snapshot();

    let c = s.add_node(NodeKind::Tool, Some("Lookup".into()), Position::new(400.0, 0.0));
    s.connect(Connection::new("B", c.clone())).unwrap();
    s.update_node_data("A", NodeDataPatch { display_name: Some("Kickoff".into()), ..Default::default() });
    s.update_edge_data("A-B", EdgeDataPatch { condition: Some(None), ..Default::default() });
    s.remove_node("B");
    let n = 5;
    let sn = s.graph().snapshot();

    for _ in 0..n {
        assert!(s.undo());
    }
    assert!(!s.undo());
    assert_eq!(s.graph().snapshot(), s0);

    for _ in 0..n {
        assert!(s.redo());
    }
    assert!(!s.redo());
    assert_eq!(s.graph().snapshot(), sn);
}

#[test]
fn no_op_edit_does_not_create_history() {
    let (mut s, _) = session_ab();
    s.update_node_data("A", NodeDataPatch { display_name: Some("Kickoff".into()), ..Default::default() });
    let past = s.history().past_len();
    s.update_node_data("A", NodeDataPatch { display_name: Some("Kickoff".into()), ..Default::default() });
    assert_eq!(s.history().past_len(), past);
}

#[test]
fn history_is_bounded_and_evicts_oldest_first() {
    let (mut s, _) = clocked_session(EditorSettings::default());
    s.load_workflow("1", None, PortableDocument::default());
    let mut snaps: Vec<Snapshot> = vec![s.graph().snapshot()];
    for i in 0..60 {
        s.add_node(NodeKind::Delay, None, Position::new(i as f64, 0.0));
        snaps.push(s.graph().snapshot());
    }
    assert_eq!(s.history().past_len(), 50);
    // baseline and the first nine edits fell off the front
    assert_eq!(s.history().past().next(), Some(&snaps[10]));
    assert_eq!(s.history().past().last(), Some(&snaps[59]));
}

#[test]
fn drag_gesture_is_one_history_entry() {
    let (mut s, _) = session_ab();
    let before = s.history().past_len();
    s.on_node_drag_start("A");
    for i in 1..=5 {
        s.on_node_drag("A", Position::new(10.0 * i as f64, 5.0 * i as f64));
    }
    assert_eq!(s.history().past_len(), before);
    assert!(s.on_node_drag_stop("A"));
    assert_eq!(s.history().past_len(), before + 1);
}

#[test]
fn drag_without_movement_adds_nothing() {
    let (mut s, _) = session_ab();
    let before = s.history().past_len();
    s.on_node_drag_start("A");
    assert!(!s.on_node_drag_stop("A"));
    assert_eq!(s.history().past_len(), before);
}

#[test]
fn cascade_deletion_leaves_no_orphans() {
    let (mut s, _) = session_ab();
    s.connect(Connection::new("B", "A")).unwrap();
    assert!(s.remove_node("A"));
    let payload = s.build_payload();
    assert!(payload.edges.iter().all(|e| e.source != "A" && e.target != "A"));
    assert!(payload.edges.is_empty());
}

#[test]
fn selection_is_node_or_edge() {
    let (mut s, _) = session_ab();
    s.select_edge(Some("A-B".into()));
    s.select_node(Some("A".into()));
    assert!(s.selection().selected_edge_ids().is_empty());
    assert!(s.graph().node("A").unwrap().selected);
    s.select_edge(Some("A-B".into()));
    assert!(s.selection().selected_node_ids().is_empty());
    assert!(!s.graph().node("A").unwrap().selected);
}

#[test]
fn delete_b_then_undo_restores_node_and_edge() {
    let (mut s, _) = session_ab();
    let b_before = s.graph().node("B").cloned().unwrap();
    let edge_before = s.graph().edge("A-B").cloned().unwrap();

    assert!(s.remove_node("B"));
    assert!(!s.graph().contains_edge("A-B"));
    assert!(s.graph().edges().is_empty());

    assert!(s.undo());
    let b = s.graph().node("B").unwrap();
    assert_eq!(b.position, b_before.position);
    assert_eq!(b.data, b_before.data);
    assert_eq!(s.graph().edge("A-B"), Some(&edge_before));
}

#[test]
fn drag_through_five_positions_then_undo_once() {
    let (mut s, _) = session_ab();
    let start = s.graph().node("A").unwrap().position;
    s.on_node_drag_start("A");
    for i in 1..=5 {
        s.on_node_drag("A", Position::new(start.x + 30.0 * i as f64, start.y + 15.0 * i as f64));
    }
    s.on_node_drag_stop("A");
    assert_eq!(s.graph().node("A").unwrap().position, Position::new(150.0, 75.0));

    assert!(s.undo());
    assert_eq!(s.graph().node("A").unwrap().position, start);
    assert!(!s.can_undo());
}

#[test]
fn undo_during_drag_reverts_only_the_gesture() {
    let (mut s, _) = session_ab();
    let tool = s.add_node(NodeKind::Tool, None, Position::default());
    let before = s.history().past_len();
    s.on_node_drag_start("A");
    s.on_node_drag("A", Position::new(99.0, 99.0));
    assert!(s.undo());
    assert!(!s.history().is_dragging());
    assert_eq!(s.graph().node("A").unwrap().position, Position::new(0.0, 0.0));
    assert!(s.graph().node(&tool).is_some());
    assert_eq!(s.history().past_len(), before);
    assert!(s.can_redo());

    // the rest of the gesture neither moves the node nor records history
    for i in 1..=5 {
        assert!(!s.on_node_drag("A", Position::new(10.0 * i as f64, 0.0)));
    }
    assert!(!s.on_node_drag_stop("A"));
    assert_eq!(s.history().past_len(), before);
    assert_eq!(s.graph().node("A").unwrap().position, Position::new(0.0, 0.0));

    // the drag itself can be redone
    assert!(s.redo());
    assert_eq!(s.graph().node("A").unwrap().position, Position::new(99.0, 99.0));
    assert!(s.graph().node(&tool).is_some());
}

#[test]
fn undo_keeps_selection_only_when_it_survives() {
    let (mut s, _) = session_ab();
    let c = s.add_node(NodeKind::Output, None, Position::new(500.0, 0.0));
    assert_eq!(s.selection().primary_node_id(), Some(c.as_str()));
    assert!(s.undo());
    assert!(s.selection().is_empty());

    s.select_node(Some("A".into()));
    s.update_node_data("A", NodeDataPatch { is_enabled: Some(false), ..Default::default() });
    assert!(s.undo());
    assert_eq!(s.selection().primary_node_id(), Some("A"));
    assert!(s.graph().node("A").unwrap().selected);
}

#[test]
fn corrupt_snapshot_leaves_history_untouched() {
    let mut history = flow_canvas::history::HistoryEngine::new(50);
    history.reset(Snapshot::from_raw("{}"));
    history.record(Snapshot::from_raw(r#"{"nodes":[],"edges":[]}"#));
    let acted = history.undo(|snap| snap.restore().map(|_| ()));
    assert!(!acted);
    assert_eq!(history.past_len(), 1);
    assert_eq!(history.future_len(), 0);
}

#[test]
fn canvas_echo_while_hydrating_is_not_an_edit() {
    let (mut s, now) = session_ab();
    assert!(!s.has_pending_changes());
    let echo = [NodeChange::Position { id: "A".into(), position: Position::new(1.0, 1.0) }];
    assert!(!s.on_nodes_changed(&echo));
    assert!(!s.has_pending_changes());

    advance(&now, 150);
    assert!(s.on_nodes_changed(&echo));
    assert!(s.has_pending_changes());
    assert!(s.can_undo());
}

#[test]
fn mark_saved_resets_pending_changes() {
    let (mut s, _) = session_ab();
    s.remove_edge("A-B");
    assert!(s.has_pending_changes());
    s.mark_saved();
    assert!(!s.has_pending_changes());
    // undoing past the save point is a change again
    assert!(s.undo());
    assert!(s.has_pending_changes());
}

#[test]
fn delete_selection_is_single_step() {
    let (mut s, _) = session_ab();
    let before = s.history().past_len();
    s.select_all();
    assert!(s.delete_selection());
    assert_eq!(s.graph().node_count(), 0);
    assert_eq!(s.history().past_len(), before + 1);
    assert!(s.undo());
    assert_eq!(s.graph().node_count(), 2);
}

#[test]
fn copy_paste_creates_offset_copies() {
    let (mut s, _) = session_ab();
    s.select_multiple_nodes(vec!["A".into(), "B".into()]);
    let text = s.copy_selection().unwrap();
    let before = s.history().past_len();
    let pasted = s.paste(&text).unwrap();

    assert_eq!(pasted.len(), 2);
    assert_eq!(s.graph().node_count(), 4);
    assert_eq!(s.graph().edge_count(), 2);
    assert_eq!(s.history().past_len(), before + 1);
    assert_eq!(s.selection().selected_node_ids().len(), 2);
    assert!(pasted.iter().all(|id| s.selection().is_node_selected(id)));

    let copy_of_b = s.graph().nodes().iter().find(|n| pasted.contains(&n.id) && n.data.kind == NodeKind::Agent).unwrap();
    assert_eq!(copy_of_b.position, Position::new(240.0, 90.0));
    assert_eq!(copy_of_b.data.agent_key.as_deref(), Some("triage"));

    assert!(s.undo());
    assert_eq!(s.graph().node_count(), 2);
}

#[test]
fn keyboard_double_copy_takes_whole_graph() {
    let (mut s, _) = session_ab();
    s.select_node(Some("A".into()));
    let t = Instant::now();
    let first = s.handle_shortcut(&ShortcutEvent::ctrl('c', t));
    assert_eq!(first.action, ShortcutAction::CopySelection);
    assert_eq!(document::parse(first.clipboard.as_deref().unwrap()).unwrap().nodes.len(), 1);

    let second = s.handle_shortcut(&ShortcutEvent::ctrl('c', t + Duration::from_millis(250)).in_text_field());
    assert_eq!(second.action, ShortcutAction::CopyAll);
    assert_eq!(document::parse(second.clipboard.as_deref().unwrap()).unwrap().nodes.len(), 2);

    let paste = s.handle_shortcut(&ShortcutEvent::ctrl('v', t + Duration::from_secs(2)));
    assert!(paste.acted);
    assert_eq!(s.graph().node_count(), 4);

    let undo = s.handle_shortcut(&ShortcutEvent::ctrl('z', t + Duration::from_secs(3)));
    assert!(undo.acted);
    assert_eq!(s.graph().node_count(), 2);
}

#[test]
fn keyboard_is_ignored_in_text_fields() {
    let (mut s, _) = session_ab();
    s.select_node(Some("B".into()));
    let out = s.handle_shortcut(&ShortcutEvent::new(Key::Delete, Instant::now()).in_text_field());
    assert!(!out.acted);
    assert!(s.graph().contains_node("B"));
    let out = s.handle_shortcut(&ShortcutEvent::new(Key::Delete, Instant::now()));
    assert!(out.acted);
    assert!(!s.graph().contains_node("B"));
}

#[test]
fn viewport_key_isolation_between_versions() {
    let (mut s, _) = session_ab();
    let mut canvas = FakeCanvas::new(DeviceType::Desktop);
    assert_eq!(s.attach_canvas(&mut canvas), RestoreOutcome::NothingCached);
    assert!(s.on_camera_moved(Viewport::new(50.0, 60.0, 1.5), true));

    s.load_workflow("1", Some(6), PortableDocument::default());
    assert_eq!(s.viewports().active_key().map(|k| k.to_string()), Some("desktop:1:6".to_string()));
    assert_eq!(s.poll(&mut canvas), PollOutcome::Idle);
    assert!(canvas.applied.is_empty());

    s.load_workflow("1", Some(5), PortableDocument::default());
    s.poll(&mut canvas);
    assert_eq!(canvas.applied.first(), Some(&Viewport::new(50.0, 60.0, 1.5)));
}

#[test]
fn restore_retries_then_reconciles() {
    let (mut s, now) = session_ab();
    let mut canvas = FakeCanvas::new(DeviceType::Desktop);
    s.attach_canvas(&mut canvas);

    let ticket = s.begin_viewport_fetch();
    let key = ViewportKey::new(DeviceType::Desktop, "1", Some(5));
    let fetched = vec![ViewportRecord::from_entry(&key, Viewport::new(100.0, 200.0, 0.3))];
    assert_eq!(s.finish_viewport_fetch(&ticket, Ok(fetched)), Some(Viewport::new(100.0, 200.0, 0.3)));

    assert_eq!(s.poll(&mut canvas), PollOutcome::Waiting);
    // desktop minimum zoom applies
    assert_eq!(canvas.applied, vec![Viewport::new(100.0, 200.0, 0.5)]);

    advance(&now, 200);
    let target = Viewport::new(100.0, 200.0, 0.5);
    assert_eq!(s.poll(&mut canvas), PollOutcome::Finished { reconciled: Some(target) });
    assert_eq!(canvas.applied.len(), 4);
    assert_eq!(s.viewports().active_viewport(), Some(target));
}

#[test]
fn restore_is_deferred_until_canvas_attaches() {
    let (mut s, _) = session_ab();
    let key = ViewportKey::new(DeviceType::Mobile, "1", Some(5));
    let ticket = s.begin_viewport_fetch();
    s.apply_fetched_viewports(&ticket, vec![ViewportRecord::from_entry(&key, Viewport::new(5.0, 5.0, 0.1))]);

    let mut phone = FakeCanvas::new(DeviceType::Mobile);
    match s.attach_canvas(&mut phone) {
        RestoreOutcome::Applying(v) => assert_eq!(v, Viewport::new(5.0, 5.0, 0.2)),
        other => panic!("expected Applying, got {other:?}"),
    }
    assert_eq!(s.device(), DeviceType::Mobile);
}

#[test]
fn programmatic_camera_moves_during_restore_are_ignored() {
    let (mut s, _) = session_ab();
    assert!(s.viewports().is_restore_pending());
    assert!(!s.on_camera_moved(Viewport::new(7.0, 7.0, 1.0), false));
    assert!(s.viewports().is_empty());
}

#[test]
fn remote_values_do_not_override_local_moves() {
    let (mut s, _) = session_ab();
    let ticket = s.begin_viewport_fetch();
    s.on_camera_moved(Viewport::new(1.0, 2.0, 1.0), true);
    let key = ViewportKey::new(DeviceType::Desktop, "1", Some(5));
    let fetched = vec![ViewportRecord::from_entry(&key, Viewport::new(300.0, 300.0, 1.0))];
    assert_eq!(s.apply_fetched_viewports(&ticket, fetched), None);
    assert_eq!(s.viewports().active_viewport(), Some(Viewport::new(1.0, 2.0, 1.0)));
}

#[tokio::test]
async fn remote_fetch_feeds_the_session() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/workflows/viewports"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "viewports": [
                {"workflowId": "1", "versionId": 5, "deviceType": "desktop", "x": -40.0, "y": 12.5, "zoom": 1.25},
                {"workflowId": "1", "versionId": 6, "deviceType": "desktop", "x": 8.0, "y": 8.0, "zoom": 1.0}
            ]
        })))
        .mount(&server)
        .await;

    let client = ViewportClient::new(&[format!("{}/api", server.uri())]).unwrap();
    let (mut s, _) = session_ab();
    let ticket = s.begin_viewport_fetch();
    let result = client.fetch(&ticket.token).await;
    assert_eq!(s.finish_viewport_fetch(&ticket, result), Some(Viewport::new(-40.0, 12.5, 1.25)));
    assert_eq!(s.viewports().len(), 2);
}

#[tokio::test]
async fn remote_failure_keeps_local_camera() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

    let client = ViewportClient::new(&[server.uri()]).unwrap();
    let (mut s, _) = session_ab();
    s.on_camera_moved(Viewport::new(3.0, 4.0, 1.0), true);
    let ticket = s.begin_viewport_fetch();
    let result = client.fetch(&ticket.token).await;
    assert!(result.is_err());
    assert_eq!(s.finish_viewport_fetch(&ticket, result), None);
    assert_eq!(s.viewports().active_viewport(), Some(Viewport::new(3.0, 4.0, 1.0)));
}

#[test]
fn autosave_round_trip_restores_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.ron");

    let (mut s, _) = session_ab();
    s.on_camera_moved(Viewport::new(11.0, 22.0, 0.9), true);
    let file = s.session_file().unwrap();
    persist::save_to_path(&file, &path).unwrap();

    let (mut restored, _) = clocked_session(EditorSettings::default());
    restored.restore_session(persist::load_from_path(&path).unwrap());
    assert_eq!(restored.graph().snapshot(), s.graph().snapshot());
    assert_eq!(restored.workflow_id(), Some("1"));
    assert_eq!(restored.version_id(), Some(5));
    assert_eq!(restored.viewports().active_viewport(), Some(Viewport::new(11.0, 22.0, 0.9)));
    assert!(!restored.has_pending_changes());
}
