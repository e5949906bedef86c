pub mod document;
pub mod paste;

pub use document::{deserialize, serialize, PortableDocument};
