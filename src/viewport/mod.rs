pub mod cache;
pub mod key;
pub mod remote;
pub mod restore;

pub use cache::ViewportCache;
pub use key::{DeviceType, Viewport, ViewportKey, ViewportRecord};
pub use remote::ViewportClient;
pub use restore::{CanvasHandle, PollOutcome, RestoreOutcome, RestorePolicy};
