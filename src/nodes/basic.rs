//! Building blocks: gain stages, the destination and engine-owned nodes.

use crate::context::AudioContext;
use crate::error::Result;
use crate::graph::AudioGraph;
use crate::node::{AudioNode, NodeBuilder, NodeId, ParamState, Units};
use crate::nodes::Param;

/// An engine-created node with nothing but an arity on the host side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InternalNode {
    id: NodeId,
}

impl InternalNode {
    pub fn new(ctx: &mut AudioContext, tone_class: &str, inputs: usize, outputs: usize) -> Result<Self> {
        Self::build(ctx.graph_mut(), tone_class, inputs, outputs)
    }

    pub(crate) fn build(
        graph: &mut AudioGraph,
        tone_class: &str,
        inputs: usize,
        outputs: usize,
    ) -> Result<Self> {
        let id = graph.add(NodeBuilder::internal(tone_class, inputs, outputs))?;
        Ok(Self { id })
    }
}

impl AudioNode for InternalNode {
    fn id(&self) -> NodeId {
        self.id
    }
}

/// A raw Web Audio node. It belongs to the engine: disposing it, or any
/// node wrapping it, leaves it alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeNode {
    id: NodeId,
}

impl NativeNode {
    pub fn new(ctx: &mut AudioContext, type_name: &str, inputs: usize, outputs: usize) -> Result<Self> {
        Self::build(ctx.graph_mut(), type_name, inputs, outputs)
    }

    pub(crate) fn build(
        graph: &mut AudioGraph,
        type_name: &str,
        inputs: usize,
        outputs: usize,
    ) -> Result<Self> {
        let id = graph.add(NodeBuilder::native(type_name, inputs, outputs))?;
        Ok(Self { id })
    }
}

impl AudioNode for NativeNode {
    fn id(&self) -> NodeId {
        self.id
    }
}

/// A raw Web Audio param (`AudioParam`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeParam {
    id: NodeId,
}

impl NativeParam {
    pub fn new(ctx: &mut AudioContext, type_name: &str) -> Result<Self> {
        let id = ctx.add(NodeBuilder::native_param(type_name))?;
        Ok(Self { id })
    }
}

impl AudioNode for NativeParam {
    fn id(&self) -> NodeId {
        self.id
    }
}

/// Amplitude stage around a native `GainNode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Gain {
    id: NodeId,
    gain: Param,
}

impl Gain {
    pub fn new(ctx: &mut AudioContext, gain: f64) -> Result<Self> {
        Self::build(ctx.graph_mut(), gain, Units::Gain)
    }

    /// Gain whose param is expressed in `units` (e.g. decibels for sends).
    pub fn with_units(ctx: &mut AudioContext, gain: f64, units: Units) -> Result<Self> {
        Self::build(ctx.graph_mut(), gain, units)
    }

    pub(crate) fn build(graph: &mut AudioGraph, gain: f64, units: Units) -> Result<Self> {
        let native = NativeNode::build(graph, "GainNode", 1, 1)?;
        let gain = Param::build(graph, ParamState::new(gain, units))?;
        let id = graph.add(
            NodeBuilder::composite("GainModel")
                .input(native.id())
                .output(native.id())
                .owns(gain.id())
                .with_trait("_gain", gain.id().raw()),
        )?;
        Ok(Self { id, gain })
    }

    pub fn gain(&self) -> Param {
        self.gain
    }
}

impl AudioNode for Gain {
    fn id(&self) -> NodeId {
        self.id
    }
}

/// Volume stage in decibels, with a mute switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Volume {
    id: NodeId,
    volume: Param,
}

impl Volume {
    pub fn new(ctx: &mut AudioContext, volume: f64, mute: bool) -> Result<Self> {
        Self::build(ctx.graph_mut(), volume, mute)
    }

    pub(crate) fn build(graph: &mut AudioGraph, volume: f64, mute: bool) -> Result<Self> {
        let inner = Gain::build(graph, volume, Units::Decibels)?;
        let id = graph.add(
            NodeBuilder::composite("VolumeModel")
                .input(inner.id())
                .output(inner.id())
                .with_trait("mute", mute)
                .with_trait("_volume", inner.gain().id().raw()),
        )?;
        Ok(Self {
            id,
            volume: inner.gain(),
        })
    }

    pub fn volume(&self) -> Param {
        self.volume
    }

    pub fn mute(&self, ctx: &AudioContext) -> Result<bool> {
        Ok(ctx.get_trait(self, "mute")?.as_bool().unwrap_or(false))
    }

    pub fn set_mute(&self, ctx: &mut AudioContext, mute: bool) -> Result<()> {
        ctx.set_trait(self, "mute", mute.into())
    }
}

impl AudioNode for Volume {
    fn id(&self) -> NodeId {
        self.id
    }
}

/// Master output of a context: a gain input followed by a volume stage
/// feeding the engine's audio destination. It has no outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    id: NodeId,
    output: Volume,
}

impl Destination {
    pub(crate) fn build(graph: &mut AudioGraph, volume: f64, mute: bool) -> Result<Self> {
        let input = Gain::build(graph, 1.0, Units::Gain)?;
        let output = Volume::build(graph, volume, mute)?;
        let id = graph.add(
            NodeBuilder::composite("DestinationModel")
                .input(input.id())
                .owns(output.id())
                .with_trait("mute", mute)
                .with_trait("_volume", output.volume().id().raw()),
        )?;
        Ok(Self { id, output })
    }

    pub fn volume(&self) -> Param {
        self.output.volume()
    }

    pub fn mute(&self, ctx: &AudioContext) -> Result<bool> {
        Ok(ctx.get_trait(self, "mute")?.as_bool().unwrap_or(false))
    }

    pub fn set_mute(&self, ctx: &mut AudioContext, mute: bool) -> Result<()> {
        ctx.set_trait(self, "mute", mute.into())?;
        self.output.set_mute(ctx, mute)
    }
}

impl AudioNode for Destination {
    fn id(&self) -> NodeId {
        self.id
    }
}
