//! Mixer channels and the named bus registry.

use hashbrown::HashMap;

use crate::context::AudioContext;
use crate::error::Result;
use crate::node::{AudioNode, NodeBuilder, NodeId, Units};
use crate::nodes::{Gain, Param, Volume};

/// Named buses of one context, created on first use.
#[derive(Debug, Default)]
pub struct BusRegistry {
    buses: HashMap<String, Gain>,
}

impl BusRegistry {
    pub fn get(&self, name: &str) -> Option<Gain> {
        self.buses.get(name).copied()
    }

    pub(crate) fn insert(&mut self, name: &str, bus: Gain) {
        self.buses.insert(name.to_owned(), bus);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.buses.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buses.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Mixer channel: input gain, volume and mute, with bus sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelStrip {
    id: NodeId,
    volume: Volume,
}

impl ChannelStrip {
    pub fn new(ctx: &mut AudioContext, volume: f64, mute: bool) -> Result<Self> {
        let input = Gain::new(ctx, 1.0)?;
        let output = Volume::new(ctx, volume, mute)?;
        let id = ctx.add(
            NodeBuilder::composite("ChannelModel")
                .input(input.id())
                .output(output.id())
                .with_trait("_volume", output.volume().id().raw()),
        )?;
        ctx.connect(&input, &output, 0, 0)?;
        Ok(Self { id, volume: output })
    }

    pub fn volume(&self) -> Param {
        self.volume.volume()
    }

    pub fn mute(&self, ctx: &AudioContext) -> Result<bool> {
        self.volume.mute(ctx)
    }

    pub fn set_mute(&self, ctx: &mut AudioContext, mute: bool) -> Result<()> {
        self.volume.set_mute(ctx, mute)
    }

    /// Send this channel to bus `name` through a new gain knob of `volume`
    /// decibels. Returns the knob.
    pub fn send(&self, ctx: &mut AudioContext, name: &str, volume: f64) -> Result<Gain> {
        let bus = ctx.bus(name)?;
        let knob = Gain::with_units(ctx, volume, Units::Decibels)?;
        ctx.chain(self, &[&knob, &bus])?;
        Ok(knob)
    }

    /// Receive everything sent to bus `name`.
    pub fn receive(&self, ctx: &mut AudioContext, name: &str) -> Result<&Self> {
        let bus = ctx.bus(name)?;
        ctx.connect(&bus, self, 0, 0)?;
        Ok(self)
    }
}

impl AudioNode for ChannelStrip {
    fn id(&self) -> NodeId {
        self.id
    }
}
