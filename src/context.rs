//! High-level audio context API

use rtrb::Consumer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::capture::{Capture, Deferred};
use crate::comm::{Channel, Comm, Envelope, RingChannel, TraitChange};
use crate::error::{Error, Result};
use crate::graph::{AudioGraph, Edge, HoldState};
use crate::message::{MethodCall, Time};
use crate::node::{AudioNode, NodeBuilder, NodeId, NodeKind};
use crate::nodes::{BusRegistry, Destination, Gain};
use crate::observe::{Handler, LinkHandle, ObservationBridge, ObserveOptions, Routed};
use crate::transport::{Transport, TransportState};

/// Settings of an [`AudioContext`]. Every field has a default, so a partial
/// JSON/TOML document deserializes fine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Capacity of the outbound ring buffer (ring-backed contexts only).
    pub queue_size: usize,
    /// Initial transport tempo.
    pub bpm: f64,
    /// Initial destination volume, in decibels.
    pub destination_volume: f64,
    pub destination_mute: bool,
    /// Default sampling interval of `observe` and `link`.
    pub update_interval: Time,
    /// Default sampling interval of `js_link`.
    pub js_update_interval: Time,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            queue_size: 1024,
            bpm: 120.0,
            destination_volume: -16.0,
            destination_mute: false,
            update_interval: Time::Seconds(1.0),
            js_update_interval: Time::Seconds(0.08),
        }
    }
}

impl ContextConfig {
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_bpm(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }
}

/// One audio context: the graph store, the transport, the observation
/// bridge, the bus registry and the destination node, all talking to the
/// engine through one channel.
///
/// # Creating a context
///
/// Any [`Channel`] works, including a closure:
///
/// ```ignore
/// let mut ctx = AudioContext::new(|env: Envelope| websocket.send(env))?;
/// ```
///
/// [`with_ring_buffer`](Self::with_ring_buffer) gives back the consumer end
/// of a lock-free queue instead, to be drained by whatever drives the engine:
///
/// ```ignore
/// let (mut ctx, mut rx) = AudioContext::with_ring_buffer(ContextConfig::default())?;
/// let osc = Oscillator::new(&mut ctx, 440.0, "sine")?;
/// osc.to_destination(&mut ctx)?;
///
/// while let Ok(envelope) = rx.pop() {
///     engine.apply(envelope);
/// }
/// ```
///
/// # Batching
///
/// [`hold_state`](Self::hold_state) returns a guard that derefs to the
/// context; connections made through it are committed once, when it drops.
pub struct AudioContext {
    comm: Comm,
    graph: AudioGraph,
    transport: TransportState,
    observers: ObservationBridge,
    buses: BusRegistry,
    destination: Destination,
    config: ContextConfig,
}

impl AsMut<AudioGraph> for AudioContext {
    fn as_mut(&mut self) -> &mut AudioGraph {
        &mut self.graph
    }
}

impl AudioContext {
    /// Create a context over `channel` with default settings.
    pub fn new<C: Channel + 'static>(channel: C) -> Result<Self> {
        Self::with_config(channel, ContextConfig::default())
    }

    pub fn with_config<C: Channel + 'static>(channel: C, config: ContextConfig) -> Result<Self> {
        let comm = Comm::new(channel);
        let mut graph = AudioGraph::new(comm.clone());
        let transport = TransportState::build(&mut graph, config.bpm)?;
        let destination =
            Destination::build(&mut graph, config.destination_volume, config.destination_mute)?;

        debug!(graph = %graph.id(), transport = %transport.id(), "audio context created");
        Ok(Self {
            comm,
            graph,
            transport,
            observers: ObservationBridge::default(),
            buses: BusRegistry::default(),
            destination,
            config,
        })
    }

    /// Create a context writing into a ring buffer of `config.queue_size`
    /// envelopes, returning the consumer end.
    pub fn with_ring_buffer(config: ContextConfig) -> Result<(Self, Consumer<Envelope>)> {
        let (channel, consumer) = RingChannel::new(config.queue_size);
        Ok((Self::with_config(channel, config)?, consumer))
    }

    pub fn comm(&self) -> &Comm {
        &self.comm
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut AudioGraph {
        &mut self.graph
    }

    pub fn observers(&self) -> &ObservationBridge {
        &self.observers
    }

    pub(crate) fn transport_state(&self) -> &TransportState {
        &self.transport
    }

    pub(crate) fn transport_state_mut(&mut self) -> &mut TransportState {
        &mut self.transport
    }

    /// The master output every node can be sent to with `to_destination`.
    pub fn destination(&self) -> Destination {
        self.destination
    }

    /// Add a node described by `builder`.
    pub fn add(&mut self, builder: NodeBuilder) -> Result<NodeId> {
        self.graph.add(builder)
    }

    /// Start a batched-mutation scope; see [`AudioGraph::hold_state`].
    pub fn hold_state(&mut self) -> HoldState<'_, Self> {
        HoldState::new(self)
    }

    pub fn connect(
        &mut self,
        source: &dyn AudioNode,
        destination: &dyn AudioNode,
        output: usize,
        input: usize,
    ) -> Result<()> {
        self.graph
            .connect(source.id(), destination.id(), output, input)
    }

    pub fn disconnect(
        &mut self,
        source: &dyn AudioNode,
        destination: &dyn AudioNode,
        output: usize,
        input: usize,
    ) -> Result<()> {
        self.graph
            .disconnect(source.id(), destination.id(), output, input)
    }

    pub fn fan(&mut self, source: &dyn AudioNode, destinations: &[&dyn AudioNode]) -> Result<()> {
        let destinations: Vec<NodeId> = destinations.iter().map(|d| d.id()).collect();
        self.graph.fan(source.id(), &destinations)
    }

    pub fn chain(&mut self, first: &dyn AudioNode, rest: &[&dyn AudioNode]) -> Result<()> {
        let nodes: Vec<NodeId> = std::iter::once(first.id())
            .chain(rest.iter().map(|n| n.id()))
            .collect();
        self.graph.chain(&nodes)
    }

    pub fn dispose(&mut self, node: &dyn AudioNode) -> Result<()> {
        self.graph.dispose(node.id())
    }

    pub fn clean(&mut self) {
        self.graph.clean();
    }

    /// Snapshot of the committed connections.
    pub fn connections(&self) -> Vec<Edge> {
        self.graph.connections()
    }

    pub fn transport(&mut self) -> Transport<'_> {
        Transport::new(self)
    }

    /// Run `callback` in a capture session bound to `caller` and return the
    /// calls it recorded against the `time` placeholder.
    pub fn capture<F>(&mut self, caller: &dyn AudioNode, callback: F) -> Result<Vec<MethodCall>>
    where
        F: FnOnce(&mut AudioContext, &Deferred) -> Result<()>,
    {
        let capture = Capture::begin(caller.id());
        let time = capture.time();
        callback(self, &time)?;
        Ok(capture.end())
    }

    /// Call `handler` whenever the sampled trait of `source` changes.
    ///
    /// Returns the id of the observer model.
    pub fn observe(
        &mut self,
        source: &dyn AudioNode,
        handler: Handler,
        options: ObserveOptions,
    ) -> Result<NodeId> {
        let interval = options
            .update_interval
            .clone()
            .unwrap_or_else(|| self.config.update_interval.clone());
        self.observers.observe(
            &self.comm,
            self.graph.nodes(),
            source.id(),
            handler,
            &options,
            interval,
        )
    }

    pub fn unobserve(&mut self, source: &dyn AudioNode, handler: &Handler) -> Result<()> {
        self.observers.unobserve(&self.comm, source.id(), handler)
    }

    /// Mirror the sampled value of `source` into `target`, host-side.
    pub fn link(
        &mut self,
        source: &dyn AudioNode,
        target: (&dyn AudioNode, &str),
        options: ObserveOptions,
    ) -> Result<LinkHandle> {
        let interval = options
            .update_interval
            .clone()
            .unwrap_or_else(|| self.config.update_interval.clone());
        self.observers.link(
            &self.comm,
            self.graph.nodes(),
            source.id(),
            (target.0.id(), target.1),
            &options,
            interval,
            false,
        )
    }

    /// Like [`link`](Self::link), but the mirroring happens inside the engine.
    pub fn js_link(
        &mut self,
        source: &dyn AudioNode,
        target: (&dyn AudioNode, &str),
        options: ObserveOptions,
    ) -> Result<LinkHandle> {
        let interval = options
            .update_interval
            .clone()
            .unwrap_or_else(|| self.config.js_update_interval.clone());
        self.observers.link(
            &self.comm,
            self.graph.nodes(),
            source.id(),
            (target.0.id(), target.1),
            &options,
            interval,
            true,
        )
    }

    pub fn unlink(&mut self, link: &LinkHandle) -> Result<()> {
        self.observers.unlink(&self.comm, link)
    }

    /// Apply a trait change reported by the engine.
    ///
    /// Changes addressed to unknown models are logged and ignored.
    pub fn receive(&mut self, change: TraitChange) -> Result<()> {
        match self.observers.route(&change) {
            Routed::NotObserver => {}
            Routed::Mirrored => return Ok(()),
            Routed::Forward {
                target,
                name,
                value,
            } => return self.set_trait(&target, &name, value),
        }

        let TraitChange { model, name, value } = change;
        let entry = match self.graph.nodes_mut().get_mut(model) {
            Ok(entry) => entry,
            Err(_) => {
                warn!(%model, name = %name, "trait change for unknown model ignored");
                return Ok(());
            }
        };

        if model == self.transport.id() && name == "state" {
            if let Ok(state) = serde_json::from_value(value.clone()) {
                self.transport.set_state(state);
            }
        }
        match &mut entry.kind {
            NodeKind::Param(p) if name == "value" => p.value = value,
            _ => {
                entry.traits.insert(name, value);
            }
        }
        Ok(())
    }

    /// Set a synced trait of `node` and push it to the engine.
    ///
    /// Assigning the value of a param driven by a connection is allowed but
    /// has no audible effect.
    pub fn set_trait(&mut self, node: &dyn AudioNode, name: &str, value: Value) -> Result<()> {
        let id = node.id();
        let overridden = self.graph.is_overridden(id);
        let entry = self.graph.nodes_mut().get_mut(id)?;

        match &mut entry.kind {
            NodeKind::Param(p) if name == "value" => {
                if overridden {
                    warn!(node = %id, "param value is overridden by a connection");
                }
                p.value = value.clone();
            }
            _ => {
                if !entry.traits.contains_key(name) {
                    return Err(Error::UnknownTrait {
                        node: id,
                        name: name.to_owned(),
                    });
                }
                entry.traits.insert(name.to_owned(), value.clone());
            }
        }

        self.comm.update_one(id, name, value);
        Ok(())
    }

    pub fn get_trait(&self, node: &dyn AudioNode, name: &str) -> Result<Value> {
        let id = node.id();
        self.graph
            .nodes()
            .get(id)?
            .get_trait(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTrait {
                node: id,
                name: name.to_owned(),
            })
    }

    /// Named bus shared by every channel strip of this context, created on
    /// first use.
    pub fn bus(&mut self, name: &str) -> Result<Gain> {
        if let Some(bus) = self.buses.get(name) {
            return Ok(bus);
        }
        let bus = Gain::new(self, 1.0)?;
        self.buses.insert(name, bus);
        debug!(name, bus = %bus.id(), "bus created");
        Ok(bus)
    }

    pub fn buses(&self) -> &BusRegistry {
        &self.buses
    }
}
