//! Built-in nodes.
//!
//! A small catalog assembled from the graph primitives:
//!
//! ## Params ([`param`])
//! - [`Param`] - automatable scalar, connection destination only
//! - [`Signal`] - param that also outputs its value
//!
//! ## Building blocks ([`basic`])
//! - [`Gain`], [`Volume`] - amplitude stages
//! - [`Destination`] - master output, one per context
//! - [`InternalNode`], [`NativeNode`], [`NativeParam`] - engine-owned nodes
//!
//! ## Sources and mixing
//! - [`Oscillator`] - periodic waveform source
//! - [`ChannelStrip`] - mixer channel with bus sends
//!
//! ## Timeline
//! - [`Event`] - transport event with a captured callback

pub mod basic;
pub mod event;
pub mod param;
pub mod source;
pub mod strip;

// Re-export common types at the top level for convenience
pub use basic::{Destination, Gain, InternalNode, NativeNode, NativeParam, Volume};
pub use event::Event;
pub use param::{Automatable, Param, Signal};
pub use source::Oscillator;
pub use strip::{BusRegistry, ChannelStrip};
