//! Tonegraph - host-side audio graph for a remote Web Audio engine
//!
//! Design principles:
//! - The engine renders audio; the host only describes it, over a one-way channel
//! - Nodes live in an arena owned by one explicit [`AudioContext`], referenced by id
//! - Graph mutations can be batched in a hold-state scope and commit once
//! - Time-dependent calls are captured as symbolic expressions, never run host-side
//! - Engine state flows back only through sampled observers

mod capture;
mod comm;
mod context;
mod error;
mod graph;
mod message;
mod node;
mod observe;
mod transport;
pub mod nodes;

pub use capture::{Arg, Capture, Deferred, Dispatch, Dispatched, Invocation, TIME};
pub use comm::{Channel, Comm, Envelope, RingChannel, TraitChange};
pub use context::{AudioContext, ContextConfig};
pub use error::{Error, Result};
pub use graph::{AudioGraph, Edge, HoldState};
pub use message::{ArgValue, Message, MethodCall, ScheduleOp, SyncOp, Time};
pub use node::{AudioNode, NodeArena, NodeBuilder, NodeEntry, NodeId, NodeKind, ParamState, Units};
pub use observe::{Change, Handler, LinkHandle, Observable, ObservationBridge, ObserveOptions};
pub use transport::{PlaybackState, ScheduledEvent, Transport, TransportState};
