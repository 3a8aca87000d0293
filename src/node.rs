//! Graph vertices: ids, kinds, params and the node arena.

use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::comm::Comm;
use crate::context::AudioContext;
use crate::error::{Error, Result};
use crate::observe::Observable;

/// Opaque handle of a model, assigned by the channel when the model is opened.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Get the raw ID value (for serialization)
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declared unit of a param value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Units {
    AudioRange,
    Bpm,
    Cents,
    Decibels,
    Degrees,
    Frequency,
    Gain,
    Hertz,
    NormalRange,
    Number,
    Positive,
    Radians,
    Samples,
    Seconds,
    Ticks,
    Time,
    TransportTime,
}

impl Units {
    /// Bounds applied by the engine when none are declared.
    pub fn default_bounds(self) -> (f64, f64) {
        match self {
            Units::AudioRange => (-1.0, 1.0),
            Units::NormalRange => (0.0, 1.0),
            Units::Time
            | Units::Frequency
            | Units::Positive
            | Units::TransportTime
            | Units::Ticks
            | Units::Bpm
            | Units::Hertz
            | Units::Samples
            | Units::Seconds => (0.0, f64::INFINITY),
            _ => (f64::NEG_INFINITY, f64::INFINITY),
        }
    }
}

/// State of an automatable scalar.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamState {
    pub units: Units,
    pub(crate) value: Value,
    min_value: Option<f64>,
    max_value: Option<f64>,
}

impl ParamState {
    pub fn new(value: impl Into<Value>, units: Units) -> Self {
        Self {
            units,
            value: value.into(),
            min_value: None,
            max_value: None,
        }
    }

    /// Declare explicit bounds, overriding the unit defaults.
    pub fn with_bounds(mut self, min_value: Option<f64>, max_value: Option<f64>) -> Self {
        self.min_value = min_value;
        self.max_value = max_value;
        self
    }

    /// Check the initial value against the explicitly declared bounds.
    ///
    /// Unit-default bounds are enforced by the engine, not here.
    pub fn validate(&self) -> Result<()> {
        let value = match self.value.as_f64() {
            Some(v) => v,
            None => return Ok(()),
        };
        let min = self.min_value.unwrap_or(f64::NEG_INFINITY);
        let max = self.max_value.unwrap_or(f64::INFINITY);
        if value < min || value > max {
            return Err(Error::ValueOutOfBounds { value, min, max });
        }
        Ok(())
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn min_value(&self) -> f64 {
        self.min_value
            .unwrap_or_else(|| self.units.default_bounds().0)
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
            .unwrap_or_else(|| self.units.default_bounds().1)
    }

    fn to_state(&self) -> Map<String, Value> {
        let mut state = Map::new();
        state.insert("value".into(), self.value.clone());
        state.insert("units".into(), serde_json::to_value(self.units).unwrap_or(Value::Null));
        state.insert("min_value".into(), self.min_value.into());
        state.insert("max_value".into(), self.max_value.into());
        state
    }
}

/// What a vertex is, resolved exhaustively by graph operations.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// A node made of an input and an output sub-node (either may be absent).
    Composite {
        input: Option<NodeId>,
        output: Option<NodeId>,
    },
    /// A node with no decomposable structure on the host side. Native nodes
    /// belong to the engine and are never disposed from the host.
    Opaque {
        inputs: usize,
        outputs: usize,
        native: bool,
    },
    Param(ParamState),
    /// A param owned by a native node.
    NativeParam,
    /// A tone object that is not part of the audio graph (transport, events).
    Object,
}

/// A vertex stored in the arena.
#[derive(Clone, Debug)]
pub struct NodeEntry {
    pub(crate) model_name: String,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) disposed: bool,
    pub(crate) owned: Vec<NodeId>,
    pub(crate) traits: Map<String, Value>,
    pub(crate) observable: Option<Observable>,
}

impl NodeEntry {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn disposed(&self) -> bool {
        self.disposed
    }

    pub fn is_native(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Opaque { native: true, .. } | NodeKind::NativeParam
        )
    }

    pub fn is_param(&self) -> bool {
        matches!(self.kind, NodeKind::Param(_) | NodeKind::NativeParam)
    }

    /// Value of a synced trait.
    pub fn get_trait(&self, name: &str) -> Option<&Value> {
        match (&self.kind, name) {
            (NodeKind::Param(p), "value") => Some(&p.value),
            _ => self.traits.get(name),
        }
    }

    pub fn has_trait(&self, name: &str) -> bool {
        self.get_trait(name).is_some()
    }

    pub fn observable(&self) -> Option<&Observable> {
        self.observable.as_ref()
    }
}

/// Describes a node before it is opened on the channel.
///
/// ```ignore
/// let id = ctx.add(
///     NodeBuilder::composite("GainModel")
///         .input(inner)
///         .output(inner)
///         .owns(gain_param),
/// )?;
/// ```
#[derive(Clone, Debug)]
pub struct NodeBuilder {
    model_name: String,
    name: String,
    kind: NodeKind,
    owned: Vec<NodeId>,
    traits: Map<String, Value>,
    observable: Option<Observable>,
}

impl NodeBuilder {
    fn new(model_name: &str, kind: NodeKind) -> Self {
        Self {
            model_name: model_name.to_owned(),
            name: String::new(),
            kind,
            owned: Vec::new(),
            traits: Map::new(),
            observable: None,
        }
    }

    pub fn composite(model_name: &str) -> Self {
        Self::new(
            model_name,
            NodeKind::Composite {
                input: None,
                output: None,
            },
        )
    }

    /// Engine-created tone node exposing nothing but its arity.
    pub fn internal(tone_class: &str, inputs: usize, outputs: usize) -> Self {
        Self::new(
            "InternalAudioNodeModel",
            NodeKind::Opaque {
                inputs,
                outputs,
                native: false,
            },
        )
        .with_trait("tone_class", tone_class)
    }

    /// Raw Web Audio node owned by the engine.
    pub fn native(type_name: &str, inputs: usize, outputs: usize) -> Self {
        Self::new(
            "NativeAudioNodeModel",
            NodeKind::Opaque {
                inputs,
                outputs,
                native: true,
            },
        )
        .with_trait("type", type_name)
    }

    pub fn param(state: ParamState) -> Self {
        Self::new("ParamModel", NodeKind::Param(state))
    }

    pub fn native_param(type_name: &str) -> Self {
        Self::new("NativeAudioParamModel", NodeKind::NativeParam).with_trait("type", type_name)
    }

    pub fn object(model_name: &str) -> Self {
        Self::new(model_name, NodeKind::Object)
    }

    pub fn input(mut self, node: NodeId) -> Self {
        if let NodeKind::Composite { input, .. } = &mut self.kind {
            *input = Some(node);
        }
        self
    }

    pub fn output(mut self, node: NodeId) -> Self {
        if let NodeKind::Composite { output, .. } = &mut self.kind {
            *output = Some(node);
        }
        self
    }

    /// Side node disposed together with this one.
    pub fn owns(mut self, node: NodeId) -> Self {
        self.owned.push(node);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    pub fn with_trait(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.traits.insert(name.to_owned(), value.into());
        self
    }

    pub fn observable(mut self, observable: Observable) -> Self {
        self.observable = Some(observable);
        self
    }
}

/// Storage for every node of one audio context, keyed by id.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: HashMap<NodeId, NodeEntry>,
}

impl NodeArena {
    /// Open the node on the channel and store it.
    pub(crate) fn add(&mut self, comm: &Comm, builder: NodeBuilder) -> Result<NodeId> {
        if let NodeKind::Param(p) = &builder.kind {
            p.validate()?;
        }
        let NodeBuilder {
            model_name,
            name,
            kind,
            owned,
            traits,
            observable,
        } = builder;

        let mut state = traits.clone();
        state.insert("name".into(), Value::String(name.clone()));
        state.insert("_disposed".into(), Value::Bool(false));
        match &kind {
            NodeKind::Composite { input, output } => {
                state.insert("_input".into(), serde_json::to_value(input).unwrap_or(Value::Null));
                state.insert("_output".into(), serde_json::to_value(output).unwrap_or(Value::Null));
            }
            NodeKind::Opaque { inputs, outputs, .. } => {
                state.insert("_n_inputs".into(), (*inputs).into());
                state.insert("_n_outputs".into(), (*outputs).into());
            }
            NodeKind::Param(p) => state.extend(p.to_state()),
            NodeKind::NativeParam | NodeKind::Object => {}
        }

        let id = comm.open(&model_name, state);
        self.nodes.insert(
            id,
            NodeEntry {
                model_name,
                name,
                kind,
                disposed: false,
                owned,
                traits,
                observable,
            },
        );
        Ok(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Result<&NodeEntry> {
        self.nodes.get(&id).ok_or(Error::InvalidEndpoint {
            node: id,
            role: "a node of this audio context",
        })
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeEntry> {
        self.nodes.get_mut(&id).ok_or(Error::InvalidEndpoint {
            node: id,
            role: "a node of this audio context",
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Native nodes and unknown ids are never considered disposed.
    pub fn is_disposed(&self, id: NodeId) -> bool {
        self.nodes
            .get(&id)
            .map(|n| !n.is_native() && n.disposed)
            .unwrap_or(false)
    }

    /// Number of input slots (0 for sources). A param always has one.
    pub fn number_of_inputs(&self, id: NodeId) -> Result<usize> {
        let entry = self.get(id)?;
        Ok(match &entry.kind {
            NodeKind::Composite { input: None, .. } => 0,
            NodeKind::Composite {
                input: Some(inner), ..
            } => {
                if self.get(*inner)?.is_param() {
                    1
                } else {
                    self.number_of_inputs(*inner)?
                }
            }
            NodeKind::Opaque { inputs, .. } => *inputs,
            NodeKind::Param(_) | NodeKind::NativeParam => 1,
            NodeKind::Object => 0,
        })
    }

    /// Number of output slots (0 for sinks).
    pub fn number_of_outputs(&self, id: NodeId) -> Result<usize> {
        let entry = self.get(id)?;
        Ok(match &entry.kind {
            NodeKind::Composite { output: None, .. } => 0,
            NodeKind::Composite {
                output: Some(inner),
                ..
            } => self.number_of_outputs(*inner)?,
            NodeKind::Opaque { outputs, .. } => *outputs,
            NodeKind::Param(_) | NodeKind::NativeParam | NodeKind::Object => 0,
        })
    }

    pub fn param(&self, id: NodeId) -> Result<&ParamState> {
        match &self.get(id)?.kind {
            NodeKind::Param(p) => Ok(p),
            _ => Err(Error::InvalidEndpoint {
                node: id,
                role: "a param",
            }),
        }
    }
}

/// A handle to a node of an [`AudioContext`].
///
/// Only [`id`](Self::id) is required; the provided methods forward to the
/// context's graph and return `self` so calls can be chained:
///
/// ```ignore
/// osc.connect(&mut ctx, &filter)?.connect(&mut ctx, &meter)?;
/// ```
pub trait AudioNode {
    fn id(&self) -> NodeId;

    /// Connect output 0 of this node to input 0 of `destination`.
    fn connect(&self, ctx: &mut AudioContext, destination: &dyn AudioNode) -> Result<&Self>
    where
        Self: Sized,
    {
        ctx.connect(self, destination, 0, 0)?;
        Ok(self)
    }

    fn connect_channels(
        &self,
        ctx: &mut AudioContext,
        destination: &dyn AudioNode,
        output: usize,
        input: usize,
    ) -> Result<&Self>
    where
        Self: Sized,
    {
        ctx.connect(self, destination, output, input)?;
        Ok(self)
    }

    fn disconnect(&self, ctx: &mut AudioContext, destination: &dyn AudioNode) -> Result<&Self>
    where
        Self: Sized,
    {
        ctx.disconnect(self, destination, 0, 0)?;
        Ok(self)
    }

    fn disconnect_channels(
        &self,
        ctx: &mut AudioContext,
        destination: &dyn AudioNode,
        output: usize,
        input: usize,
    ) -> Result<&Self>
    where
        Self: Sized,
    {
        ctx.disconnect(self, destination, output, input)?;
        Ok(self)
    }

    /// Connect this node to every destination in parallel.
    fn fan(&self, ctx: &mut AudioContext, destinations: &[&dyn AudioNode]) -> Result<&Self>
    where
        Self: Sized,
    {
        ctx.fan(self, destinations)?;
        Ok(self)
    }

    /// Connect this node and `nodes` in series.
    fn chain(&self, ctx: &mut AudioContext, nodes: &[&dyn AudioNode]) -> Result<&Self>
    where
        Self: Sized,
    {
        ctx.chain(self, nodes)?;
        Ok(self)
    }

    fn to_destination(&self, ctx: &mut AudioContext) -> Result<&Self>
    where
        Self: Sized,
    {
        let destination = ctx.destination();
        ctx.connect(self, &destination, 0, 0)?;
        Ok(self)
    }

    /// Dispose this node and its owned sub-nodes, then drop dangling edges.
    fn dispose(&self, ctx: &mut AudioContext) -> Result<&Self>
    where
        Self: Sized,
    {
        ctx.dispose(self)?;
        Ok(self)
    }

    fn disposed(&self, ctx: &AudioContext) -> bool {
        ctx.graph().nodes().is_disposed(self.id())
    }

    fn number_of_inputs(&self, ctx: &AudioContext) -> Result<usize> {
        ctx.graph().nodes().number_of_inputs(self.id())
    }

    fn number_of_outputs(&self, ctx: &AudioContext) -> Result<usize> {
        ctx.graph().nodes().number_of_outputs(self.id())
    }
}

impl AudioNode for NodeId {
    fn id(&self) -> NodeId {
        *self
    }
}

impl<T: AudioNode + ?Sized> AudioNode for &T {
    fn id(&self) -> NodeId {
        (**self).id()
    }
}
