//! Per-(device, workflow, version) camera memory.
//!
//! Lookups only ever happen for the active key. Switching any part of the key
//! leaves the old entry cached for when the user comes back, but it is never
//! read while another key is active. Restores are applied over several frames
//! via [`ViewportCache::poll_restore`] and every attempt re-checks that its key
//! is still the active one.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use super::key::{Viewport, ViewportKey, ViewportRecord};
use super::restore::{CanvasHandle, PendingApply, PollOutcome, RestoreOutcome, RestorePolicy};

#[derive(Debug, Default)]
pub struct ViewportCache {
    entries: HashMap<ViewportKey, Viewport>,
    active: Option<ViewportKey>,
    pending_restore: bool,
    pending_apply: Option<PendingApply>,
    // keys the user moved locally; remote values never overwrite these
    user_overrides: HashSet<ViewportKey>,
    dirty_since: Option<Instant>,
    policy: RestorePolicy,
}

impl ViewportCache {
    pub fn new(policy: RestorePolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    pub fn policy(&self) -> &RestorePolicy { &self.policy }
    pub fn active_key(&self) -> Option<&ViewportKey> { self.active.as_ref() }
    pub fn is_restore_pending(&self) -> bool { self.pending_restore }
    pub fn is_applying(&self) -> bool { self.pending_apply.is_some() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Cached camera for the active key only.
    pub fn active_viewport(&self) -> Option<Viewport> {
        self.active.as_ref().and_then(|k| self.entries.get(k).copied())
    }

    /// Switch to another (device, workflow, version). Any in-flight restore for
    /// the previous key is abandoned and a restore is marked pending. Returns
    /// whether a camera is cached for the new key.
    pub fn activate(&mut self, key: ViewportKey) -> bool {
        if self.active.as_ref() != Some(&key) {
            log::debug!("viewport key -> {key}");
            self.pending_apply = None;
            self.pending_restore = true;
            self.active = Some(key);
        }
        self.active_viewport().is_some()
    }

    pub fn save_viewport(&mut self, key: ViewportKey, viewport: Viewport, now: Instant) {
        self.entries.insert(key.clone(), viewport);
        self.active = Some(key);
        self.dirty_since = Some(now);
    }

    /// Camera moved on the canvas. Non-user moves while a restore is pending are
    /// the previous camera carried over and are ignored. Returns whether the
    /// move was stored.
    pub fn on_camera_moved(&mut self, viewport: Viewport, user_initiated: bool, now: Instant) -> bool {
        let Some(key) = self.active.clone() else { return false };
        if !viewport.is_finite() {
            return false;
        }
        if !user_initiated && (self.pending_restore || self.pending_apply.is_some()) {
            log::debug!("ignoring programmatic camera move while restore pending for {key}");
            return false;
        }
        if user_initiated {
            // the user takes over; stop fighting them with retries
            self.pending_apply = None;
            self.pending_restore = false;
            self.user_overrides.insert(key.clone());
        }
        self.save_viewport(key, viewport, now);
        true
    }

    /// Apply the cached camera for the active key to `canvas`, or remember to do
    /// so once a canvas exists.
    pub fn restore_viewport(&mut self, canvas: Option<&mut dyn CanvasHandle>, now: Instant) -> RestoreOutcome {
        let Some(canvas) = canvas else {
            self.pending_restore = true;
            return RestoreOutcome::Deferred;
        };
        let Some(key) = self.active.clone() else { return RestoreOutcome::NoActiveKey };
        let Some(stored) = self.entries.get(&key).copied() else {
            return RestoreOutcome::NothingCached;
        };
        let target = self.policy.clamp(stored, canvas.layout());
        log::debug!("restoring {key} to {target:?}");
        self.pending_restore = false;
        self.pending_apply = Some(PendingApply { key, target, started_at: now, next_attempt: 0 });
        self.poll_restore(now, canvas);
        RestoreOutcome::Applying(target)
    }

    /// Drive the retry schedule. Call from the host's frame loop.
    pub fn poll_restore(&mut self, now: Instant, canvas: &mut dyn CanvasHandle) -> PollOutcome {
        let Some(mut pending) = self.pending_apply.take() else { return PollOutcome::Idle };
        if self.active.as_ref() != Some(&pending.key) {
            log::debug!("dropping stale restore for {}", pending.key);
            return PollOutcome::Stale;
        }
        let delays = self.policy.schedule();
        let elapsed = now.saturating_duration_since(pending.started_at);
        while pending.next_attempt < delays.len() && delays[pending.next_attempt] <= elapsed {
            canvas.set_viewport(pending.target);
            pending.next_attempt += 1;
        }
        if pending.next_attempt < delays.len() {
            self.pending_apply = Some(pending);
            return PollOutcome::Waiting;
        }
        let actual = canvas.viewport();
        if actual.approx_eq(&pending.target, self.policy.tolerance_px) {
            self.entries.insert(pending.key, actual);
            PollOutcome::Finished { reconciled: Some(actual) }
        } else {
            log::debug!("canvas settled at {actual:?}, expected {:?}", pending.target);
            PollOutcome::Finished { reconciled: None }
        }
    }

    /// Flat list for remote persistence, without non-finite or default cameras.
    pub fn to_records(&self) -> Vec<ViewportRecord> {
        let mut records: Vec<ViewportRecord> = self
            .entries
            .iter()
            .filter(|(_, vp)| vp.is_persistable())
            .map(|(k, vp)| ViewportRecord::from_entry(k, *vp))
            .collect();
        records.sort_by_key(|r| r.key());
        records
    }

    /// Merge records fetched from the backend. Keys the user already moved
    /// locally are left alone. Returns the camera to use for the active key when
    /// the fetch supplied one.
    pub fn apply_remote(&mut self, records: Vec<ViewportRecord>) -> Option<Viewport> {
        let mut initial = None;
        for record in records {
            let viewport = record.viewport();
            if !viewport.is_persistable() {
                continue;
            }
            let key = record.key();
            if self.user_overrides.contains(&key) {
                continue;
            }
            if self.active.as_ref() == Some(&key) {
                initial = Some(viewport);
                self.pending_restore = true;
            }
            self.entries.insert(key, viewport);
        }
        initial
    }

    pub fn flush_due(&self, now: Instant, debounce: Duration) -> bool {
        self.dirty_since.is_some_and(|t| now.saturating_duration_since(t) >= debounce)
    }

    /// Records to PUT; clears the dirty mark.
    pub fn take_flush_payload(&mut self) -> Vec<ViewportRecord> {
        self.dirty_since = None;
        self.to_records()
    }

    /// Seed from persisted records (autosave) without marking user overrides.
    pub fn seed(&mut self, records: &[ViewportRecord]) {
        for r in records {
            if r.viewport().is_persistable() {
                self.entries.insert(r.key(), r.viewport());
            }
        }
    }
}
