//! Graph-editing state engine for visual workflow editors.
//!
//! [`session::EditorSession`] is the entry point for hosts; the modules below
//! can also be used on their own.

pub mod clipboard;
pub mod error;
pub mod graph_utils;
pub mod history;
pub mod persistence;
pub mod session;
pub mod viewport;

pub use error::{DocumentError, RemoteError, UnknownKind};
pub use session::EditorSession;
