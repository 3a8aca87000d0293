//! Timeline events with a captured callback.

use serde_json::Value;
use tracing::debug;

use crate::capture::{Capture, Deferred, Dispatch, Invocation};
use crate::context::AudioContext;
use crate::error::Result;
use crate::message::{Message, MethodCall, ScheduleOp, Time};
use crate::node::{AudioNode, NodeBuilder, NodeId};
use crate::observe::Observable;
use crate::transport::PlaybackState;

/// An engine-side event invoking its callback along the transport timeline.
///
/// The callback receives two placeholders: the dispatch `time` and the
/// event's `value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Event {
    id: NodeId,
}

impl Event {
    pub fn new<F>(ctx: &mut AudioContext, callback: F, value: Value) -> Result<Self>
    where
        F: FnOnce(&mut AudioContext, &Deferred, &Deferred) -> Result<()>,
    {
        let id = ctx.add(
            NodeBuilder::object("EventModel")
                .with_trait("value", value)
                .with_trait("state", PlaybackState::Stopped.as_value())
                .with_trait("humanize", false)
                .with_trait("probability", 1.0)
                .with_trait("mute", false)
                .with_trait("start_offset", 0)
                .with_trait("playback_rate", 1.0)
                .with_trait("loop", false)
                .with_trait("loop_start", 0)
                .with_trait("loop_end", "1m")
                .observable(Observable::STATE),
        )?;
        let event = Self { id };
        if let Err(err) = event.set_callback(ctx, callback) {
            ctx.dispose(&event)?;
            return Err(err);
        }
        Ok(event)
    }

    /// Replace the callback. Calls made on `time` or `value` are captured,
    /// in issue order, and sent as one `set_callback` message.
    pub fn set_callback<F>(&self, ctx: &mut AudioContext, callback: F) -> Result<Vec<MethodCall>>
    where
        F: FnOnce(&mut AudioContext, &Deferred, &Deferred) -> Result<()>,
    {
        let capture = Capture::begin(self.id);
        let time = capture.time();
        let value = capture.placeholder("value");
        callback(ctx, &time, &value)?;
        let items = capture.end();

        debug!(event = %self.id, items = items.len(), "event callback set");
        ctx.comm().send(
            self.id,
            Message::SetCallback {
                op: ScheduleOp::At,
                items: items.clone(),
            },
        );
        Ok(items)
    }

    pub fn start(&self, ctx: &mut AudioContext, time: impl Into<Time>) -> Result<&Self> {
        self.play(ctx, "start", time.into(), PlaybackState::Started)?;
        Ok(self)
    }

    pub fn stop(&self, ctx: &mut AudioContext, time: impl Into<Time>) -> Result<&Self> {
        self.play(ctx, "stop", time.into(), PlaybackState::Stopped)?;
        Ok(self)
    }

    /// Drop every scheduled occurrence at or after `after`.
    pub fn cancel(&self, ctx: &mut AudioContext, after: impl Into<Time>) -> Result<&Self> {
        ctx.comm().send(
            self.id,
            Message::Cancel {
                after: after.into(),
            },
        );
        Ok(self)
    }

    /// Cancel every scheduled occurrence, then dispose the event.
    pub fn dispose(&self, ctx: &mut AudioContext) -> Result<&Self> {
        if ctx.graph().nodes().is_disposed(self.id) {
            return Ok(self);
        }
        self.cancel(ctx, Time::default())?;
        ctx.dispose(self)?;
        Ok(self)
    }

    pub fn mute(&self, ctx: &AudioContext) -> Result<bool> {
        Ok(ctx.get_trait(self, "mute")?.as_bool().unwrap_or(false))
    }

    pub fn set_mute(&self, ctx: &mut AudioContext, mute: bool) -> Result<()> {
        ctx.set_trait(self, "mute", mute.into())
    }

    pub fn state(&self, ctx: &AudioContext) -> Result<PlaybackState> {
        let state = ctx.get_trait(self, "state")?;
        Ok(serde_json::from_value(state).unwrap_or_default())
    }

    fn play(&self, ctx: &mut AudioContext, method: &str, time: Time, state: PlaybackState) -> Result<()> {
        Invocation::new(method)
            .arg("time", time)
            .dispatch(ctx.comm(), self.id, Dispatch::Play)?;
        ctx.set_trait(self, "state", state.as_value())
    }
}

impl AudioNode for Event {
    fn id(&self) -> NodeId {
        self.id
    }
}
