use crate::tree::NodeId;

/// Failure to obtain a chapter or the book metadata from the content source.
///
/// Cloneable so a single settled fetch can be handed to every caller that
/// joined it while it was in flight.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("failed to load {resource}: status {status}")]
    NotFoundOrServerError { resource: String, status: u16 },
    #[error("invalid payload for {resource}: {reason}")]
    MalformedPayload { resource: String, reason: String },
    #[error("transport error loading {resource}: {message}")]
    Transport { resource: String, message: String },
    #[error("load of {resource} was aborted: {reason}")]
    Aborted { resource: String, reason: String },
}

impl FetchError {
    pub fn resource(&self) -> &str {
        match self {
            FetchError::NotFoundOrServerError { resource, .. }
            | FetchError::MalformedPayload { resource, .. }
            | FetchError::Transport { resource, .. }
            | FetchError::Aborted { resource, .. } => resource,
        }
    }
}

/// A selection that cannot become a note.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidSelection {
    #[error("selection is collapsed")]
    Collapsed,
    #[error("selection text is too short ({length} characters)")]
    TooShort { length: usize },
    #[error("selection is outside the content area")]
    OutsideContentRoot,
    #[error("anchor range {start}..{end} is empty or reversed")]
    InvalidRange { start: usize, end: usize },
    #[error("selection refers to a node that is not in the content tree")]
    UnknownNode,
}

#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(#[from] opendal::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
#[error("could not parse imported data: {0}")]
pub struct ImportParseError(#[from] pub serde_json::Error);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),
    #[error("node {child:?} is not a child of node {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },
    #[error("node {0:?} is not a text node")]
    NotText(NodeId),
    #[error("node {0:?} is not an element")]
    NotElement(NodeId),
    #[error("node {0:?} is already attached")]
    AlreadyAttached(NodeId),
    #[error("split point {offset} is outside text node {node:?}")]
    SplitOutOfRange { node: NodeId, offset: usize },
}
