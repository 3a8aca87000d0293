//! Params and signals: automatable scalars.

use delegate::delegate;
use serde_json::Value;

use crate::capture::{Arg, Dispatch, Dispatched, Invocation};
use crate::context::AudioContext;
use crate::error::Result;
use crate::graph::AudioGraph;
use crate::node::{AudioNode, NodeBuilder, NodeId, ParamState, Units};
use crate::observe::Observable;

/// A single automatable value. Only ever a connection destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Param {
    id: NodeId,
}

impl Param {
    /// Create a param with unit-default bounds.
    pub fn new(ctx: &mut AudioContext, value: f64, units: Units) -> Result<Self> {
        Self::build(ctx.graph_mut(), ParamState::new(value, units))
    }

    /// Create a param with explicit bounds, which `value` must respect.
    pub fn bounded(
        ctx: &mut AudioContext,
        value: f64,
        units: Units,
        min_value: Option<f64>,
        max_value: Option<f64>,
    ) -> Result<Self> {
        let state = ParamState::new(value, units).with_bounds(min_value, max_value);
        Self::build(ctx.graph_mut(), state)
    }

    pub(crate) fn build(graph: &mut AudioGraph, state: ParamState) -> Result<Self> {
        let id = graph.add(NodeBuilder::param(state).observable(Observable::VALUE))?;
        Ok(Self { id })
    }

    /// Last value set by the host or reported by the engine.
    pub fn value(&self, ctx: &AudioContext) -> Result<Value> {
        Ok(ctx.graph().nodes().param(self.id)?.value().clone())
    }

    pub fn set_value(&self, ctx: &mut AudioContext, value: Value) -> Result<()> {
        ctx.set_trait(self, "value", value)
    }

    pub fn units(&self, ctx: &AudioContext) -> Result<Units> {
        Ok(ctx.graph().nodes().param(self.id)?.units)
    }

    pub fn min_value(&self, ctx: &AudioContext) -> Result<f64> {
        Ok(ctx.graph().nodes().param(self.id)?.min_value())
    }

    pub fn max_value(&self, ctx: &AudioContext) -> Result<f64> {
        Ok(ctx.graph().nodes().param(self.id)?.max_value())
    }

    /// True while a committed connection drives this param.
    pub fn overridden(&self, ctx: &AudioContext) -> bool {
        ctx.graph().is_overridden(self.id)
    }
}

impl AudioNode for Param {
    fn id(&self) -> NodeId {
        self.id
    }
}

/// Value automation, dispatched immediately or captured when any argument
/// is a placeholder.
pub trait Automatable: AudioNode {
    fn set_value_at_time(
        &self,
        ctx: &mut AudioContext,
        value: impl Into<Arg>,
        time: impl Into<Arg>,
    ) -> Result<Dispatched>
    where
        Self: Sized,
    {
        Invocation::new("setValueAtTime")
            .arg("value", value)
            .arg("time", time)
            .dispatch(ctx.comm(), self.id(), Dispatch::Trigger)
    }

    fn linear_ramp_to(
        &self,
        ctx: &mut AudioContext,
        value: impl Into<Arg>,
        ramp_time: impl Into<Arg>,
        start_time: impl Into<Arg>,
    ) -> Result<Dispatched>
    where
        Self: Sized,
    {
        Invocation::new("linearRampTo")
            .arg("value", value)
            .arg("ramp_time", ramp_time)
            .arg("start_time", start_time)
            .dispatch(ctx.comm(), self.id(), Dispatch::Trigger)
    }

    fn exponential_ramp_to(
        &self,
        ctx: &mut AudioContext,
        value: impl Into<Arg>,
        ramp_time: impl Into<Arg>,
        start_time: impl Into<Arg>,
    ) -> Result<Dispatched>
    where
        Self: Sized,
    {
        Invocation::new("exponentialRampTo")
            .arg("value", value)
            .arg("ramp_time", ramp_time)
            .arg("start_time", start_time)
            .dispatch(ctx.comm(), self.id(), Dispatch::Trigger)
    }

    fn target_ramp_to(
        &self,
        ctx: &mut AudioContext,
        value: impl Into<Arg>,
        ramp_time: impl Into<Arg>,
        start_time: impl Into<Arg>,
    ) -> Result<Dispatched>
    where
        Self: Sized,
    {
        Invocation::new("targetRampTo")
            .arg("value", value)
            .arg("ramp_time", ramp_time)
            .arg("start_time", start_time)
            .dispatch(ctx.comm(), self.id(), Dispatch::Trigger)
    }

    fn cancel_scheduled_values(&self, ctx: &mut AudioContext, time: impl Into<Arg>) -> Result<Dispatched>
    where
        Self: Sized,
    {
        Invocation::new("cancelScheduledValues")
            .arg("time", time)
            .dispatch(ctx.comm(), self.id(), Dispatch::Trigger)
    }
}

impl Automatable for Param {}

/// A param that also produces audio: its value can drive other params.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Signal {
    id: NodeId,
    param: Param,
}

impl Signal {
    pub fn new(ctx: &mut AudioContext, value: f64, units: Units) -> Result<Self> {
        let param = Param::new(ctx, value, units)?;
        let output = ctx.add(NodeBuilder::internal("ToneConstantSource", 0, 1))?;
        let id = ctx.add(
            NodeBuilder::composite("SignalModel")
                .input(param.id())
                .output(output)
                .with_trait("units", serde_json::to_value(units).unwrap_or(Value::Null))
                .observable(Observable::VALUE),
        )?;
        Ok(Self { id, param })
    }

    pub fn param(&self) -> Param {
        self.param
    }

    delegate! {
        to self.param {
            pub fn value(&self, ctx: &AudioContext) -> Result<Value>;
            pub fn set_value(&self, ctx: &mut AudioContext, value: Value) -> Result<()>;
            pub fn units(&self, ctx: &AudioContext) -> Result<Units>;
            pub fn min_value(&self, ctx: &AudioContext) -> Result<f64>;
            pub fn max_value(&self, ctx: &AudioContext) -> Result<f64>;
            pub fn overridden(&self, ctx: &AudioContext) -> bool;
        }
    }
}

impl AudioNode for Signal {
    fn id(&self) -> NodeId {
        self.id
    }
}

impl Automatable for Signal {}
