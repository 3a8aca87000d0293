//! Message channel between the host and the external audio engine.
//!
//! The host never waits on the engine: every outbound [`Envelope`] is pushed
//! into a [`Channel`] and forgotten. [`RingChannel`] backs this with a
//! lock-free `rtrb` ring buffer whose consumer end is handed to whatever
//! drives the engine (a websocket pump, a wasm bridge, a test).
//!
//! Model ids are assigned here, when a model is opened on the channel.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::message::Message;
use crate::node::NodeId;

/// One unit of host → engine traffic.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    /// A new model with its full synced state.
    Open {
        model: NodeId,
        model_name: String,
        state: Map<String, Value>,
    },
    /// Partial synced-state update.
    Update {
        model: NodeId,
        state: Map<String, Value>,
    },
    /// A custom message addressed to a model.
    Custom { model: NodeId, content: Message },
    Close { model: NodeId },
}

impl Envelope {
    pub fn model(&self) -> NodeId {
        match self {
            Envelope::Open { model, .. }
            | Envelope::Update { model, .. }
            | Envelope::Custom { model, .. }
            | Envelope::Close { model } => *model,
        }
    }
}

/// A synced trait changed on the engine side (engine → host).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraitChange {
    pub model: NodeId,
    pub name: String,
    pub value: Value,
}

/// Outbound half of the channel.
///
/// Implementations must not block; delivery failures are the channel's
/// business and are not reported back to callers.
pub trait Channel {
    fn send(&mut self, envelope: Envelope);
}

impl<F: FnMut(Envelope)> Channel for F {
    fn send(&mut self, envelope: Envelope) {
        self(envelope)
    }
}

/// Channel writing into an `rtrb` ring buffer.
pub struct RingChannel {
    producer: Producer<Envelope>,
}

impl RingChannel {
    /// Create a channel with room for `capacity` pending envelopes, returning
    /// the consumer end for the engine side.
    pub fn new(capacity: usize) -> (Self, Consumer<Envelope>) {
        let (producer, consumer) = RingBuffer::new(capacity.max(1));
        (Self { producer }, consumer)
    }

    /// Free slots left in the ring.
    #[inline]
    pub fn available(&self) -> usize {
        self.producer.slots()
    }
}

impl Channel for RingChannel {
    fn send(&mut self, envelope: Envelope) {
        if let Err(rtrb::PushError::Full(env)) = self.producer.push(envelope) {
            warn!(model = %env.model(), "message queue full, envelope dropped");
        }
    }
}

struct CommInner {
    channel: RefCell<Box<dyn Channel>>,
    next_model: Cell<u32>,
}

/// Shared, single-threaded handle to the channel.
///
/// Cloned into every component that talks to the engine.
#[derive(Clone)]
pub struct Comm {
    inner: Rc<CommInner>,
}

impl Comm {
    pub fn new<C: Channel + 'static>(channel: C) -> Self {
        Self {
            inner: Rc::new(CommInner {
                channel: RefCell::new(Box::new(channel)),
                next_model: Cell::new(0),
            }),
        }
    }

    /// Open a new model on the engine side and return its id.
    pub fn open(&self, model_name: &str, state: Map<String, Value>) -> NodeId {
        let id = NodeId(self.inner.next_model.get());
        self.inner.next_model.set(id.0 + 1);
        self.push(Envelope::Open {
            model: id,
            model_name: model_name.to_owned(),
            state,
        });
        id
    }

    pub fn update(&self, model: NodeId, state: Map<String, Value>) {
        self.push(Envelope::Update { model, state });
    }

    /// Convenience for a single-key state update.
    pub fn update_one(&self, model: NodeId, key: &str, value: Value) {
        let mut state = Map::new();
        state.insert(key.to_owned(), value);
        self.update(model, state);
    }

    pub fn send(&self, model: NodeId, content: Message) {
        self.push(Envelope::Custom { model, content });
    }

    pub fn close(&self, model: NodeId) {
        self.push(Envelope::Close { model });
    }

    fn push(&self, envelope: Envelope) {
        self.inner.channel.borrow_mut().send(envelope);
    }
}

impl fmt::Debug for Comm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comm")
            .field("next_model", &self.inner.next_model.get())
            .finish()
    }
}
