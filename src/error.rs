//! Error types.

use thiserror::Error;

use crate::node::NodeId;

/// Contract violations raised synchronously by graph, scheduling and
/// observation calls.
///
/// None of these are transient: they abort the offending call before any
/// graph mutation or message is issued.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The node is unknown to this context or cannot play the requested role
    /// (e.g. a param used as a connection source).
    #[error("{node} cannot be used as {role}")]
    InvalidEndpoint { node: NodeId, role: &'static str },

    /// The destination has no input slot.
    #[error("Cannot connect to audio source {0}")]
    CannotConnectSource(NodeId),

    /// The source has no output slot.
    #[error("Cannot connect from audio sink {0}")]
    CannotConnectSink(NodeId),

    #[error("Node {src} (channel {output}) is not connected to node {dest} (channel {input})")]
    EdgeNotFound {
        src: NodeId,
        dest: NodeId,
        output: usize,
        input: usize,
    },

    /// `fan` / `chain` asked to connect a node to itself.
    #[error("Cannot connect node {0} to itself")]
    SelfConnection(NodeId),

    #[error("invalid observable trait name, should be one of {expected:?}, found {name:?}")]
    InvalidObservableTrait { name: String, expected: Vec<String> },

    #[error("this handler is already used for {0}, call `unobserve` first")]
    HandlerAlreadyRegistered(NodeId),

    #[error("no such handler registered for {0}")]
    HandlerNotRegistered(NodeId),

    #[error("Scheduled event ID not found: {0}")]
    UnknownEventId(u64),

    /// A capture placeholder was accessed after its session ended.
    #[error("Callback argument placeholder {0:?} is used outside of its context")]
    InvalidCaptureUse(String),

    #[error("{name:?} is not a synced trait of {node}")]
    UnknownTrait { node: NodeId, name: String },

    #[error("value {value} is out of bounds [{min}, {max}]")]
    ValueOutOfBounds { value: f64, min: f64, max: f64 },

    #[error("link {0} is not active")]
    UnknownLink(NodeId),
}

pub type Result<T> = std::result::Result<T, Error>;
