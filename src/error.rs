use thiserror::Error;

/// Failures while turning a portable document or history snapshot back into a graph.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document is missing a `nodes` array")]
    MissingNodes,
    #[error("document root must be an object")]
    NotAnObject,
}

/// Failures talking to the remote viewport endpoints.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no viewport endpoints configured")]
    NoCandidates,
    #[error("invalid endpoint url '{url}': {source}")]
    InvalidUrl { url: String, source: url::ParseError },
    #[error("request cancelled")]
    Cancelled,
    #[error("all {attempts} viewport endpoints failed, last error: {last}")]
    Exhausted { attempts: usize, last: String },
}

/// A node kind name outside the fixed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown node kind '{0}'")]
pub struct UnknownKind(pub String);
