//! One open workflow view: graph, selection, history and camera memory wired
//! to the canvas events and keyboard shortcuts of the host UI.
//!
//! Everything here is synchronous and single-writer. Time comes from an
//! injectable clock so hydration settling, debounced flushes and restore
//! retries can be driven deterministically.

pub mod shortcuts;

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::clipboard::document::{self, PortableDocument};
use crate::clipboard::paste;
use crate::error::{DocumentError, RemoteError};
use crate::graph_utils::graph::{
    Connection, Decorator, EdgeDataPatch, EdgeId, GraphPayload, Node, NodeDataPatch, NodeId, NodeKind, Position,
    WorkflowGraph,
};
use crate::graph_utils::selection::Selection;
use crate::history::engine::HistoryEngine;
use crate::persistence::persist::SessionFile;
use crate::persistence::settings::EditorSettings;
use crate::viewport::cache::ViewportCache;
use crate::viewport::key::{DeviceType, Viewport, ViewportKey, ViewportRecord};
use crate::viewport::restore::{CanvasHandle, PollOutcome, RestoreOutcome};

use shortcuts::{ShortcutAction, ShortcutEvent, ShortcutOutcome, ShortcutResolver};

pub type Clock = Rc<dyn Fn() -> Instant>;

/// Change events the canvas emits on its own (keyboard nudges, built-in
/// delete, trailing events after a programmatic replacement).
#[derive(Clone, Debug, PartialEq)]
pub enum NodeChange {
    Position { id: NodeId, position: Position },
    Remove { id: NodeId },
}

/// Handle for one remote viewport fetch. Starting another fetch or switching
/// workflow cancels the token and makes the ticket stale.
#[derive(Clone, Debug)]
pub struct FetchTicket {
    pub generation: u64,
    pub token: CancellationToken,
}

pub struct EditorSession {
    settings: EditorSettings,
    graph: WorkflowGraph,
    selection: Selection,
    history: HistoryEngine,
    viewports: ViewportCache,
    shortcuts: ShortcutResolver,
    clipboard: Option<String>,
    clock: Clock,
    hydrating_until: Option<Instant>,
    workflow_id: Option<String>,
    version_id: Option<i64>,
    device: DeviceType,
    fetch_generation: u64,
    fetch_token: Option<CancellationToken>,
}

impl fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorSession")
            .field("workflow_id", &self.workflow_id)
            .field("version_id", &self.version_id)
            .field("device", &self.device)
            .field("graph", &self.graph)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

impl Default for EditorSession {
    fn default() -> Self { Self::new(EditorSettings::default(), None, None) }
}

impl EditorSession {
    pub fn new(settings: EditorSettings, decorate: Option<Decorator>, clock: Option<Clock>) -> Self {
        let graph = match decorate {
            Some(d) => WorkflowGraph::with_decorator(d),
            None => WorkflowGraph::new(),
        };
        let mut history = HistoryEngine::new(settings.history_limit);
        history.reset(graph.snapshot());
        Self {
            graph,
            selection: Selection::new(),
            history,
            viewports: ViewportCache::new(settings.restore_policy()),
            shortcuts: ShortcutResolver::new(settings.copy_all_window()),
            clipboard: None,
            clock: clock.unwrap_or_else(|| Rc::new(Instant::now)),
            hydrating_until: None,
            workflow_id: None,
            version_id: None,
            device: DeviceType::default(),
            fetch_generation: 0,
            fetch_token: None,
            settings,
        }
    }

    fn now(&self) -> Instant { (self.clock)() }

    pub fn settings(&self) -> &EditorSettings { &self.settings }
    pub fn graph(&self) -> &WorkflowGraph { &self.graph }
    pub fn selection(&self) -> &Selection { &self.selection }
    pub fn history(&self) -> &HistoryEngine { &self.history }
    pub fn viewports(&self) -> &ViewportCache { &self.viewports }
    pub fn workflow_id(&self) -> Option<&str> { self.workflow_id.as_deref() }
    pub fn version_id(&self) -> Option<i64> { self.version_id }
    pub fn device(&self) -> DeviceType { self.device }
    pub fn clipboard(&self) -> Option<&str> { self.clipboard.as_deref() }

    pub fn is_hydrating(&self) -> bool {
        self.hydrating_until.is_some_and(|t| self.now() < t)
    }

    fn begin_hydration(&mut self) {
        self.hydrating_until = Some(self.now() + self.settings.hydration_settle());
    }

    fn active_key(&self) -> Option<ViewportKey> {
        let workflow_id = self.workflow_id.clone()?;
        Some(ViewportKey::new(self.device, workflow_id, self.version_id))
    }

    fn sync_selection_flags(&mut self) {
        let ids: HashSet<NodeId> = self.selection.selected_node_ids().iter().cloned().collect();
        self.graph.sync_selected(&ids);
    }

    // Commit the current graph as one history step (or the pending drag state)
    fn commit(&mut self) -> bool {
        self.history.record(self.graph.snapshot())
    }

    // ---- loading ----

    /// Replace the graph with a freshly loaded workflow version. The loaded
    /// content becomes the undo baseline and the saved state.
    pub fn load_workflow(&mut self, workflow_id: impl Into<String>, version_id: Option<i64>, document: PortableDocument) {
        let (nodes, edges) = document::from_document(document);
        self.begin_hydration();
        self.graph.load(nodes, edges);
        self.history.reset(self.graph.snapshot());
        self.selection.clear();
        self.sync_selection_flags();
        self.workflow_id = Some(workflow_id.into());
        self.version_id = version_id;
        self.cancel_viewport_fetch();
        if let Some(key) = self.active_key() {
            let cached = self.viewports.activate(key);
            log::info!(
                "loaded workflow {:?} version {:?}: {} nodes, {} edges, cached viewport: {cached}",
                self.workflow_id,
                self.version_id,
                self.graph.node_count(),
                self.graph.edge_count()
            );
        }
    }

    pub fn load_workflow_json(&mut self, workflow_id: impl Into<String>, version_id: Option<i64>, text: &str) -> Result<(), DocumentError> {
        let doc = document::parse(text)?;
        self.load_workflow(workflow_id, version_id, doc);
        Ok(())
    }

    /// Resume from an autosave: load its document and seed remembered cameras.
    pub fn restore_session(&mut self, file: SessionFile) {
        self.viewports.seed(&file.viewports);
        self.load_workflow(file.workflow_id, file.version_id, file.document);
    }

    pub fn session_file(&self) -> Option<SessionFile> {
        Some(SessionFile {
            workflow_id: self.workflow_id.clone()?,
            version_id: self.version_id,
            document: document::serialize(self.graph.nodes(), self.graph.edges()),
            viewports: self.viewports.to_records(),
        })
    }

    // ---- graph edits ----

    pub fn add_node(&mut self, kind: NodeKind, display_name: Option<String>, position: Position) -> NodeId {
        let mut node = Node::new(kind, position);
        if let Some(name) = display_name {
            node.data.display_name = name;
        }
        let id = node.id.clone();
        self.graph.add_node(node);
        self.selection.select_node(Some(id.clone()));
        self.sync_selection_flags();
        self.commit();
        id
    }

    pub fn update_node_data(&mut self, id: &str, patch: NodeDataPatch) -> bool {
        if !self.graph.update_node_data(id, patch) {
            return false;
        }
        self.sync_selection_flags();
        self.commit();
        true
    }

    pub fn remove_node(&mut self, id: &str) -> bool {
        if !self.graph.remove_node(id) {
            return false;
        }
        self.selection.retain_existing(&self.graph);
        self.commit();
        true
    }

    pub fn connect(&mut self, connection: Connection) -> Option<EdgeId> {
        let id = self.graph.add_edge(connection)?;
        self.commit();
        Some(id)
    }

    pub fn update_edge_data(&mut self, id: &str, patch: EdgeDataPatch) -> bool {
        if !self.graph.update_edge_data(id, patch) {
            return false;
        }
        self.commit();
        true
    }

    pub fn remove_edge(&mut self, id: &str) -> bool {
        if !self.graph.remove_edge(id) {
            return false;
        }
        self.selection.retain_existing(&self.graph);
        self.commit();
        true
    }

    /// Remove every selected node (with its edges) and every selected edge as a
    /// single undo step.
    pub fn delete_selection(&mut self) -> bool {
        let nodes: Vec<NodeId> = self.selection.selected_node_ids().iter().cloned().collect();
        let edges: Vec<EdgeId> = self.selection.selected_edge_ids().iter().cloned().collect();
        let mut changed = false;
        for id in &edges {
            changed |= self.graph.remove_edge(id);
        }
        for id in &nodes {
            changed |= self.graph.remove_node(id);
        }
        self.selection.clear();
        self.sync_selection_flags();
        if changed {
            self.commit();
        }
        changed
    }

    // ---- selection ----

    pub fn select_node(&mut self, id: Option<NodeId>) {
        self.selection.select_node(id);
        self.sync_selection_flags();
    }

    pub fn select_edge(&mut self, id: Option<EdgeId>) {
        self.selection.select_edge(id);
        self.sync_selection_flags();
    }

    pub fn select_multiple_nodes(&mut self, ids: Vec<NodeId>) {
        self.selection.select_multiple_nodes(ids);
        self.sync_selection_flags();
    }

    pub fn select_multiple_edges(&mut self, ids: Vec<EdgeId>) {
        self.selection.select_multiple_edges(ids);
        self.sync_selection_flags();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.sync_selection_flags();
    }

    pub fn select_all(&mut self) {
        let ids: Vec<NodeId> = self.graph.nodes().iter().map(|n| n.id.clone()).collect();
        self.select_multiple_nodes(ids);
    }

    // ---- canvas events ----

    pub fn on_selection_change(&mut self, node_ids: &[NodeId], edge_ids: &[EdgeId]) {
        self.selection.handle_selection_change(node_ids, edge_ids);
        self.sync_selection_flags();
    }

    pub fn on_node_drag_start(&mut self, id: &str) {
        if self.graph.set_node_dragging(id, true) {
            self.history.begin_drag();
        }
    }

    /// Moves after an undo/redo interrupted the gesture are dropped until the
    /// drag stops.
    pub fn on_node_drag(&mut self, id: &str, position: Position) -> bool {
        if self.history.is_interrupted() || !self.graph.set_node_position(id, position) {
            return false;
        }
        self.commit();
        true
    }

    /// Returns whether the gesture produced an undo step.
    pub fn on_node_drag_stop(&mut self, id: &str) -> bool {
        self.graph.set_node_dragging(id, false);
        self.history.end_drag()
    }

    /// Apply canvas-originated node changes. Ignored while hydrating: those are
    /// echoes of a replacement that is already in the store.
    pub fn on_nodes_changed(&mut self, changes: &[NodeChange]) -> bool {
        if self.is_hydrating() {
            log::debug!("ignoring {} node changes while hydrating", changes.len());
            return false;
        }
        let mut changed = false;
        for change in changes {
            changed |= match change {
                NodeChange::Position { id, position } => self.graph.set_node_position(id, *position),
                NodeChange::Remove { id } => self.graph.remove_node(id),
            };
        }
        if changed {
            self.selection.retain_existing(&self.graph);
            self.commit();
        }
        changed
    }

    // ---- history ----

    pub fn can_undo(&self) -> bool { self.history.can_undo() }
    pub fn can_redo(&self) -> bool { self.history.can_redo() }

    pub fn undo(&mut self) -> bool {
        let graph = &mut self.graph;
        let acted = self.history.undo(|snap| -> Result<(), DocumentError> {
            let (nodes, edges) = snap.restore()?;
            graph.hydrate(nodes, edges);
            Ok(())
        });
        if acted {
            self.after_restore();
        }
        acted
    }

    pub fn redo(&mut self) -> bool {
        let graph = &mut self.graph;
        let acted = self.history.redo(|snap| -> Result<(), DocumentError> {
            let (nodes, edges) = snap.restore()?;
            graph.hydrate(nodes, edges);
            Ok(())
        });
        if acted {
            self.after_restore();
        }
        acted
    }

    fn after_restore(&mut self) {
        self.begin_hydration();
        self.selection.retain_existing(&self.graph);
        self.sync_selection_flags();
    }

    // ---- persistence ----

    pub fn has_pending_changes(&self) -> bool { self.graph.has_pending_changes() }
    pub fn mark_saved(&mut self) { self.graph.mark_saved() }
    pub fn build_payload(&self) -> GraphPayload { self.graph.build_payload() }

    // ---- clipboard ----

    fn store_clipboard(&mut self, doc: PortableDocument) -> Option<String> {
        if doc.is_empty() {
            return None;
        }
        match doc.to_json() {
            Ok(text) => {
                self.clipboard = Some(text.clone());
                Some(text)
            }
            Err(e) => {
                log::warn!("copy failed: {e}");
                None
            }
        }
    }

    pub fn copy_selection(&mut self) -> Option<String> {
        let doc = paste::copy_subset(&self.graph, self.selection.selected_node_ids(), self.selection.selected_edge_ids());
        self.store_clipboard(doc)
    }

    pub fn copy_all(&mut self) -> Option<String> {
        let doc = paste::copy_all(&self.graph);
        self.store_clipboard(doc)
    }

    /// Paste a document with fresh ids, offset from the originals, as one undo
    /// step. Malformed text leaves the graph untouched. Returns the new node ids.
    pub fn paste(&mut self, text: &str) -> Result<Vec<NodeId>, DocumentError> {
        let doc = document::parse(text)?;
        let (nodes, edges) = paste::remap_for_paste(doc, self.settings.paste_offset);
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
        for node in nodes {
            self.graph.add_node(node);
        }
        for edge in edges {
            self.graph.insert_edge(edge);
        }
        self.selection.select_multiple_nodes(ids.clone());
        self.sync_selection_flags();
        self.commit();
        Ok(ids)
    }

    pub fn paste_clipboard(&mut self) -> Result<Vec<NodeId>, DocumentError> {
        match self.clipboard.clone() {
            Some(text) => self.paste(&text),
            None => Ok(Vec::new()),
        }
    }

    // ---- keyboard ----

    pub fn handle_shortcut(&mut self, ev: &ShortcutEvent) -> ShortcutOutcome {
        let action = self.shortcuts.resolve(ev);
        let mut clipboard = None;
        let acted = match action {
            ShortcutAction::Undo => self.undo(),
            ShortcutAction::Redo => self.redo(),
            ShortcutAction::SelectAll => {
                self.select_all();
                self.graph.node_count() > 0
            }
            ShortcutAction::CopySelection => {
                clipboard = self.copy_selection();
                clipboard.is_some()
            }
            ShortcutAction::CopyAll => {
                clipboard = self.copy_all();
                clipboard.is_some()
            }
            ShortcutAction::Paste => match self.paste_clipboard() {
                Ok(ids) => !ids.is_empty(),
                Err(e) => {
                    log::warn!("paste failed: {e}");
                    false
                }
            },
            ShortcutAction::DeleteSelection => self.delete_selection(),
            ShortcutAction::None => false,
        };
        ShortcutOutcome { action, acted, clipboard }
    }

    // ---- viewport ----

    /// Switch the device class; the camera memory moves to the matching key.
    pub fn set_device(&mut self, device: DeviceType) {
        self.device = device;
        if let Some(key) = self.active_key() {
            self.viewports.activate(key);
        }
    }

    /// The canvas instance is available. Adopts its layout and applies the
    /// remembered camera, or records that one is still owed.
    pub fn attach_canvas(&mut self, canvas: &mut dyn CanvasHandle) -> RestoreOutcome {
        self.set_device(canvas.layout());
        let now = self.now();
        self.viewports.restore_viewport(Some(canvas), now)
    }

    /// Drive pending restores. Call from the host's frame loop.
    pub fn poll(&mut self, canvas: &mut dyn CanvasHandle) -> PollOutcome {
        let now = self.now();
        if self.viewports.is_restore_pending() && self.viewports.active_viewport().is_some() {
            self.viewports.restore_viewport(Some(&mut *canvas), now);
        }
        self.viewports.poll_restore(now, canvas)
    }

    pub fn on_camera_moved(&mut self, viewport: Viewport, user_initiated: bool) -> bool {
        let now = self.now();
        self.viewports.on_camera_moved(viewport, user_initiated, now)
    }

    fn cancel_viewport_fetch(&mut self) {
        self.fetch_generation += 1;
        if let Some(token) = self.fetch_token.take() {
            token.cancel();
        }
    }

    pub fn begin_viewport_fetch(&mut self) -> FetchTicket {
        self.cancel_viewport_fetch();
        let token = CancellationToken::new();
        self.fetch_token = Some(token.clone());
        FetchTicket { generation: self.fetch_generation, token }
    }

    /// Merge a completed fetch. Results for a superseded ticket are dropped.
    /// Returns the camera fetched for the active key, if any.
    pub fn apply_fetched_viewports(&mut self, ticket: &FetchTicket, records: Vec<ViewportRecord>) -> Option<Viewport> {
        if ticket.generation != self.fetch_generation || ticket.token.is_cancelled() {
            log::debug!("discarding stale viewport fetch #{}", ticket.generation);
            return None;
        }
        self.fetch_token = None;
        self.viewports.apply_remote(records)
    }

    /// Like [`Self::apply_fetched_viewports`] but takes the raw client result;
    /// failures are logged and the in-memory cameras stay as they are.
    pub fn finish_viewport_fetch(&mut self, ticket: &FetchTicket, result: Result<Vec<ViewportRecord>, RemoteError>) -> Option<Viewport> {
        match result {
            Ok(records) => self.apply_fetched_viewports(ticket, records),
            Err(RemoteError::Cancelled) => None,
            Err(e) => {
                log::warn!("viewport fetch failed: {e}");
                None
            }
        }
    }

    pub fn viewport_flush_due(&self) -> bool {
        self.viewports.flush_due(self.now(), self.settings.viewport_flush_debounce())
    }

    pub fn take_viewport_payload(&mut self) -> Vec<ViewportRecord> {
        self.viewports.take_flush_payload()
    }
}
