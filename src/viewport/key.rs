use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    #[default]
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Desktop => "desktop",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Identifies one remembered camera: `deviceType:workflowId:versionId` with
/// `latest` standing in for an unversioned workflow.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewportKey {
    pub device: DeviceType,
    pub workflow_id: String,
    pub version_id: Option<i64>,
}

impl ViewportKey {
    pub fn new(device: DeviceType, workflow_id: impl Into<String>, version_id: Option<i64>) -> Self {
        Self { device, workflow_id: workflow_id.into(), version_id }
    }
}

impl fmt::Display for ViewportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version_id {
            Some(v) => write!(f, "{}:{}:{}", self.device, self.workflow_id, v),
            None => write!(f, "{}:{}:latest", self.device, self.workflow_id),
        }
    }
}

/// Camera transform over the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self { Self { x: 0.0, y: 0.0, zoom: 1.0 } }
}

impl Viewport {
    pub fn new(x: f64, y: f64, zoom: f64) -> Self { Self { x, y, zoom } }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.zoom.is_finite()
    }

    // All-zero and identity transforms come from render-before-layout, not the user
    pub fn is_default(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && (self.zoom == 0.0 || self.zoom == 1.0)
    }

    pub fn is_persistable(&self) -> bool { self.is_finite() && !self.is_default() }

    pub fn approx_eq(&self, other: &Viewport, tolerance_px: f64) -> bool {
        (self.x - other.x).abs() <= tolerance_px
            && (self.y - other.y).abs() <= tolerance_px
            && (self.zoom - other.zoom).abs() <= 1e-3
    }
}

/// Wire shape of one remembered camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportRecord {
    pub workflow_id: String,
    #[serde(default)]
    pub version_id: Option<i64>,
    pub device_type: DeviceType,
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl ViewportRecord {
    pub fn from_entry(key: &ViewportKey, vp: Viewport) -> Self {
        Self {
            workflow_id: key.workflow_id.clone(),
            version_id: key.version_id,
            device_type: key.device,
            x: vp.x,
            y: vp.y,
            zoom: vp.zoom,
        }
    }

    pub fn key(&self) -> ViewportKey {
        ViewportKey::new(self.device_type, self.workflow_id.clone(), self.version_id)
    }

    pub fn viewport(&self) -> Viewport { Viewport::new(self.x, self.y, self.zoom) }
}
