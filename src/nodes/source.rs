//! Sources: nodes with no inputs.

use serde_json::Value;

use crate::capture::{Arg, Dispatch, Dispatched, Invocation};
use crate::context::AudioContext;
use crate::error::Result;
use crate::node::{AudioNode, NodeBuilder, NodeId, Units};
use crate::nodes::{Signal, Volume};
use crate::observe::Observable;
use crate::transport::PlaybackState;

/// Periodic waveform source. No inputs; one output through a volume stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Oscillator {
    id: NodeId,
    frequency: Signal,
    detune: Signal,
    volume: Volume,
}

impl Oscillator {
    pub fn new(ctx: &mut AudioContext, frequency: f64, waveform: &str) -> Result<Self> {
        let frequency = Signal::new(ctx, frequency, Units::Frequency)?;
        let detune = Signal::new(ctx, 0.0, Units::Cents)?;
        let volume = Volume::new(ctx, 0.0, false)?;
        let id = ctx.add(
            NodeBuilder::composite("OscillatorModel")
                .output(volume.id())
                .owns(frequency.id())
                .owns(detune.id())
                .with_trait("type", waveform)
                .with_trait("state", PlaybackState::Stopped.as_value())
                .with_trait("_frequency", frequency.id().raw())
                .with_trait("_detune", detune.id().raw())
                .observable(Observable::STATE),
        )?;

        Ok(Self {
            id,
            frequency,
            detune,
            volume,
        })
    }

    pub fn frequency(&self) -> Signal {
        self.frequency
    }

    pub fn detune(&self) -> Signal {
        self.detune
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn state(&self, ctx: &AudioContext) -> Result<PlaybackState> {
        let state = ctx.get_trait(self, "state")?;
        Ok(serde_json::from_value(state).unwrap_or_default())
    }

    /// Start playback at `time`; captured if `time` is a placeholder.
    pub fn start(&self, ctx: &mut AudioContext, time: impl Into<Arg>) -> Result<&Self> {
        let dispatched = Invocation::new("start")
            .arg("time", time)
            .arg("offset", Value::Null)
            .arg("duration", Value::Null)
            .dispatch(ctx.comm(), self.id, Dispatch::Trigger)?;
        self.mirror_state(ctx, dispatched, PlaybackState::Started)?;
        Ok(self)
    }

    pub fn stop(&self, ctx: &mut AudioContext, time: impl Into<Arg>) -> Result<&Self> {
        let dispatched = Invocation::new("stop")
            .arg("time", time)
            .dispatch(ctx.comm(), self.id, Dispatch::Trigger)?;
        self.mirror_state(ctx, dispatched, PlaybackState::Stopped)?;
        Ok(self)
    }

    fn mirror_state(
        &self,
        ctx: &mut AudioContext,
        dispatched: Dispatched,
        state: PlaybackState,
    ) -> Result<()> {
        if dispatched == Dispatched::Sent {
            ctx.set_trait(self, "state", state.as_value())?;
        }
        Ok(())
    }
}

impl AudioNode for Oscillator {
    fn id(&self) -> NodeId {
        self.id
    }
}
