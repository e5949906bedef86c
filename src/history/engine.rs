//! Undo/redo over canonical graph snapshots.
//!
//! Discrete edits advance history immediately. Edits arriving between
//! [`HistoryEngine::begin_drag`] and [`HistoryEngine::end_drag`] only replace the
//! pending snapshot, so a whole drag gesture becomes one undo step.

use std::collections::VecDeque;
use std::fmt;

use super::snapshot::Snapshot;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryPhase {
    Idle,
    Dragging,
    /// Undo/redo arrived mid-gesture. The drag was committed before stepping and
    /// the rest of the gesture is ignored until it ends.
    Interrupted,
}

#[derive(Clone, Debug)]
pub struct HistoryEngine {
    past: VecDeque<Snapshot>,
    // most recently undone entry sits at the back
    future: VecDeque<Snapshot>,
    last: Option<Snapshot>,
    pending: Option<Snapshot>,
    phase: HistoryPhase,
    limit: usize,
}

impl Default for HistoryEngine {
    fn default() -> Self { Self::new(DEFAULT_HISTORY_LIMIT) }
}

fn push_bounded(stack: &mut VecDeque<Snapshot>, snap: Snapshot, limit: usize) {
    stack.push_back(snap);
    while stack.len() > limit {
        stack.pop_front();
        log::debug!("history limit {limit} reached, evicted oldest entry");
    }
}

impl HistoryEngine {
    pub fn new(limit: usize) -> Self {
        Self {
            past: VecDeque::new(),
            future: VecDeque::new(),
            last: None,
            pending: None,
            phase: HistoryPhase::Idle,
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize { self.limit }
    pub fn phase(&self) -> HistoryPhase { self.phase }
    pub fn is_dragging(&self) -> bool { self.phase == HistoryPhase::Dragging }
    pub fn is_interrupted(&self) -> bool { self.phase == HistoryPhase::Interrupted }
    pub fn can_undo(&self) -> bool { !self.past.is_empty() }
    pub fn can_redo(&self) -> bool { !self.future.is_empty() }
    pub fn past_len(&self) -> usize { self.past.len() }
    pub fn future_len(&self) -> usize { self.future.len() }
    pub fn last(&self) -> Option<&Snapshot> { self.last.as_ref() }
    pub fn pending(&self) -> Option<&Snapshot> { self.pending.as_ref() }

    /// Oldest first.
    pub fn past(&self) -> impl Iterator<Item = &Snapshot> { self.past.iter() }

    /// Start over from freshly loaded content. The baseline itself is never undoable.
    pub fn reset(&mut self, baseline: Snapshot) {
        self.past.clear();
        self.future.clear();
        self.pending = None;
        self.phase = HistoryPhase::Idle;
        self.last = Some(baseline);
    }

    /// Record the graph state after a mutation. Returns true when a new undo
    /// step was created; while dragging only the pending snapshot moves.
    pub fn record(&mut self, snapshot: Snapshot) -> bool {
        match self.phase {
            HistoryPhase::Dragging => {
                self.pending = Some(snapshot);
                false
            }
            HistoryPhase::Idle | HistoryPhase::Interrupted => self.advance(snapshot),
        }
    }

    fn advance(&mut self, snapshot: Snapshot) -> bool {
        if self.last.as_ref() == Some(&snapshot) {
            return false;
        }
        if let Some(prev) = self.last.take() {
            push_bounded(&mut self.past, prev, self.limit);
        }
        self.future.clear();
        self.last = Some(snapshot);
        log::debug!("history commit: past={} future=0", self.past.len());
        true
    }

    pub fn begin_drag(&mut self) {
        self.phase = HistoryPhase::Dragging;
    }

    /// Close the drag gesture, committing its final state if it changed anything.
    pub fn end_drag(&mut self) -> bool {
        let was = std::mem::replace(&mut self.phase, HistoryPhase::Idle);
        match self.pending.take() {
            Some(snap) if was == HistoryPhase::Dragging => self.advance(snap),
            _ => false,
        }
    }

    // Undo/redo steps from the drag's final state, so the gesture is committed first
    fn interrupt_drag(&mut self) {
        if self.phase != HistoryPhase::Dragging {
            return;
        }
        log::debug!("undo/redo during drag, committing the gesture so far");
        if let Some(snap) = self.pending.take() {
            self.advance(snap);
        }
        self.phase = HistoryPhase::Interrupted;
    }

    /// Step back one entry. `restore` must apply the snapshot to the graph; if it
    /// fails nothing changes and false is returned.
    pub fn undo<F, E>(&mut self, restore: F) -> bool
    where
        F: FnOnce(&Snapshot) -> Result<(), E>,
        E: fmt::Display,
    {
        self.interrupt_drag();
        let Some(target) = self.past.back() else { return false };
        if let Err(e) = restore(target) {
            log::warn!("undo aborted, snapshot could not be restored: {e}");
            return false;
        }
        let Some(target) = self.past.pop_back() else { return false };
        if let Some(current) = self.last.take() {
            push_bounded(&mut self.future, current, self.limit);
        }
        self.last = Some(target);
        true
    }

    pub fn redo<F, E>(&mut self, restore: F) -> bool
    where
        F: FnOnce(&Snapshot) -> Result<(), E>,
        E: fmt::Display,
    {
        self.interrupt_drag();
        let Some(target) = self.future.back() else { return false };
        if let Err(e) = restore(target) {
            log::warn!("redo aborted, snapshot could not be restored: {e}");
            return false;
        }
        let Some(target) = self.future.pop_back() else { return false };
        if let Some(current) = self.last.take() {
            push_bounded(&mut self.past, current, self.limit);
        }
        self.last = Some(target);
        true
    }
}
