use std::time::{Duration, Instant};

use super::key::{DeviceType, Viewport, ViewportKey};

/// The host's live canvas instance.
pub trait CanvasHandle {
    fn viewport(&self) -> Viewport;
    fn set_viewport(&mut self, viewport: Viewport);
    fn layout(&self) -> DeviceType;
}

/// How a restore is applied: the canvas may drop a transform set before its
/// layout settles, so the same target is re-applied on a short schedule.
#[derive(Clone, Debug, PartialEq)]
pub struct RestorePolicy {
    pub retry_delays: Vec<Duration>,
    pub tolerance_px: f64,
    pub desktop_min_zoom: f64,
    pub mobile_min_zoom: f64,
}

impl Default for RestorePolicy {
    fn default() -> Self {
        Self {
            retry_delays: [0, 10, 50, 100].into_iter().map(Duration::from_millis).collect(),
            tolerance_px: 1.0,
            desktop_min_zoom: 0.5,
            mobile_min_zoom: 0.2,
        }
    }
}

impl RestorePolicy {
    pub fn min_zoom(&self, layout: DeviceType) -> f64 {
        match layout {
            DeviceType::Mobile => self.mobile_min_zoom,
            DeviceType::Desktop => self.desktop_min_zoom,
        }
    }

    /// Attempt offsets from the start of a restore. Always has an immediate attempt.
    pub fn schedule(&self) -> &[Duration] {
        const IMMEDIATE: &[Duration] = &[Duration::ZERO];
        if self.retry_delays.is_empty() { IMMEDIATE } else { &self.retry_delays }
    }

    pub fn clamp(&self, target: Viewport, layout: DeviceType) -> Viewport {
        Viewport { zoom: target.zoom.max(self.min_zoom(layout)), ..target }
    }
}

/// A restore in flight, keyed to the camera it was started for.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingApply {
    pub key: ViewportKey,
    pub target: Viewport,
    pub started_at: Instant,
    pub next_attempt: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RestoreOutcome {
    /// No canvas yet; retried when one attaches.
    Deferred,
    NoActiveKey,
    NothingCached,
    Applying(Viewport),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    Idle,
    /// More attempts are scheduled.
    Waiting,
    /// The active key changed since the restore started; nothing was applied.
    Stale,
    /// Schedule finished. `reconciled` is the transform the canvas actually
    /// reported when it matched the target.
    Finished { reconciled: Option<Viewport> },
}
