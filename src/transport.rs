//! Transport: the engine's master timeline, and host-side event scheduling.
//!
//! Scheduling never runs anything on the host at the scheduled time. The
//! callback is invoked once, immediately, inside a capture session; the
//! calls it makes on nodes are recorded against the `time` placeholder and
//! shipped as a single `schedule` message which the engine replays at the
//! right instants.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::capture::{Capture, Deferred, Dispatch, Invocation};
use crate::context::AudioContext;
use crate::error::{Error, Result};
use crate::graph::AudioGraph;
use crate::message::{Message, MethodCall, ScheduleOp, SyncOp, Time};
use crate::node::{AudioNode, NodeBuilder, NodeId, ParamState, Units};
use crate::nodes::Param;
use crate::observe::Observable;

/// Playback state mirrored from the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Started,
    #[default]
    Stopped,
    Paused,
}

impl PlaybackState {
    pub(crate) fn as_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Record of a `schedule` message issued by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledEvent {
    pub id: u64,
    pub op: ScheduleOp,
    pub items: Vec<MethodCall>,
}

/// Host-side transport bookkeeping, owned by the context.
#[derive(Debug)]
pub struct TransportState {
    id: NodeId,
    bpm: Param,
    next_event_id: u64,
    live: BTreeSet<u64>,
    state: PlaybackState,
    synced: Vec<NodeId>,
}

impl TransportState {
    pub(crate) fn build(graph: &mut AudioGraph, bpm: f64) -> Result<Self> {
        let bpm = Param::build(graph, ParamState::new(bpm, Units::Bpm))?;
        let id = graph.add(
            NodeBuilder::object("TransportModel")
                .with_trait("state", PlaybackState::Stopped.as_value())
                .with_trait("_bpm", bpm.id().raw())
                .owns(bpm.id())
                .observable(Observable::STATE),
        )?;

        Ok(Self {
            id,
            bpm,
            next_event_id: 0,
            live: BTreeSet::new(),
            state: PlaybackState::Stopped,
            synced: Vec::new(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
    }
}

/// Scheduling and playback API, borrowed from [`AudioContext::transport`].
///
/// ```ignore
/// let id = ctx.transport().schedule_repeat(
///     |ctx, time| {
///         osc.start(ctx, time)?;
///         osc.stop(ctx, time + 0.1)?;
///         Ok(())
///     },
///     "4n",
///     0.0,
///     None,
/// )?;
/// ctx.transport().start(0.0)?;
/// ctx.transport().clear(id)?;
/// ```
pub struct Transport<'a> {
    ctx: &'a mut AudioContext,
}

impl<'a> Transport<'a> {
    pub(crate) fn new(ctx: &'a mut AudioContext) -> Self {
        Self { ctx }
    }

    fn inner(&self) -> &TransportState {
        self.ctx.transport_state()
    }

    fn inner_mut(&mut self) -> &mut TransportState {
        self.ctx.transport_state_mut()
    }

    pub fn id(&self) -> NodeId {
        self.inner().id
    }

    /// Tempo param.
    pub fn bpm(&self) -> Param {
        self.inner().bpm
    }

    pub fn state(&self) -> PlaybackState {
        self.inner().state
    }

    /// Ids that can still be cleared, in ascending order.
    pub fn live_events(&self) -> Vec<u64> {
        self.inner().live.iter().copied().collect()
    }

    fn capture<F>(&mut self, callback: F) -> Result<Vec<MethodCall>>
    where
        F: FnOnce(&mut AudioContext, &Deferred) -> Result<()>,
    {
        let capture = Capture::begin(self.id());
        let time = capture.time();
        callback(&mut *self.ctx, &time)?;
        Ok(capture.end())
    }

    fn issue(&mut self, op: ScheduleOp, items: Vec<MethodCall>, timing: Timing) -> ScheduledEvent {
        let state = self.inner_mut();
        let id = state.next_event_id;
        state.next_event_id += 1;
        if op != ScheduleOp::Once {
            state.live.insert(id);
        }
        let transport = state.id;

        self.ctx.comm().send(
            transport,
            Message::Schedule {
                op,
                id,
                items: items.clone(),
                time: timing.time,
                interval: timing.interval,
                start_time: timing.start_time,
                duration: timing.duration,
            },
        );
        debug!(id, ?op, items = items.len(), "event scheduled");
        ScheduledEvent { id, op, items }
    }

    /// Schedule the captured calls once at `time` along the timeline.
    ///
    /// The event stays clearable until it is cleared.
    pub fn schedule_once<F>(&mut self, callback: F, time: impl Into<Time>) -> Result<u64>
    where
        F: FnOnce(&mut AudioContext, &Deferred) -> Result<()>,
    {
        let items = self.capture(callback)?;
        let timing = Timing {
            time: Some(time.into()),
            ..Timing::default()
        };
        Ok(self.issue(ScheduleOp::At, items, timing).id)
    }

    /// Schedule the captured calls every `interval`, starting at
    /// `start_time`, for `duration` (forever when `None`).
    pub fn schedule_repeat<F>(
        &mut self,
        callback: F,
        interval: impl Into<Time>,
        start_time: impl Into<Time>,
        duration: Option<Time>,
    ) -> Result<u64>
    where
        F: FnOnce(&mut AudioContext, &Deferred) -> Result<()>,
    {
        let items = self.capture(callback)?;
        let timing = Timing {
            interval: Some(interval.into()),
            start_time: Some(start_time.into()),
            duration,
            ..Timing::default()
        };
        Ok(self.issue(ScheduleOp::Repeat, items, timing).id)
    }

    /// Schedule the captured calls once at `time`. The engine removes the
    /// event after it fires; it can never be cleared from the host.
    pub fn schedule_one_shot<F>(&mut self, callback: F, time: impl Into<Time>) -> Result<u64>
    where
        F: FnOnce(&mut AudioContext, &Deferred) -> Result<()>,
    {
        let items = self.capture(callback)?;
        let timing = Timing {
            time: Some(time.into()),
            ..Timing::default()
        };
        Ok(self.issue(ScheduleOp::Once, items, timing).id)
    }

    pub fn clear(&mut self, event_id: u64) -> Result<()> {
        let state = self.inner_mut();
        if !state.live.remove(&event_id) {
            return Err(Error::UnknownEventId(event_id));
        }
        let transport = state.id;
        self.ctx
            .comm()
            .send(transport, Message::Clear { id: event_id });
        debug!(id = event_id, "event cleared");
        Ok(())
    }

    /// Ask the engine to drop every event starting at or after `after`.
    ///
    /// The host cannot tell which ids are affected, so the live set is kept.
    pub fn cancel(&mut self, after: impl Into<Time>) {
        let after = after.into();
        debug!(%after, "events cancelled");
        self.ctx.comm().send(self.id(), Message::Cancel { after });
    }

    fn play(&mut self, method: &str, time: Time, next: PlaybackState) -> Result<()> {
        Invocation::new(method)
            .arg("time", time)
            .dispatch(self.ctx.comm(), self.id(), Dispatch::Play)?;
        self.inner_mut().state = next;
        let id = self.id();
        self.ctx
            .graph_mut()
            .nodes_mut()
            .get_mut(id)?
            .traits
            .insert("state".into(), next.as_value());
        Ok(())
    }

    pub fn start(&mut self, time: impl Into<Time>) -> Result<()> {
        self.play("start", time.into(), PlaybackState::Started)
    }

    pub fn stop(&mut self, time: impl Into<Time>) -> Result<()> {
        self.play("stop", time.into(), PlaybackState::Stopped)
    }

    pub fn pause(&mut self, time: impl Into<Time>) -> Result<()> {
        self.play("pause", time.into(), PlaybackState::Paused)
    }

    pub fn toggle(&mut self, time: impl Into<Time>) -> Result<()> {
        let next = match self.state() {
            PlaybackState::Started => PlaybackState::Stopped,
            PlaybackState::Stopped | PlaybackState::Paused => PlaybackState::Started,
        };
        self.play("toggle", time.into(), next)
    }

    /// Make `signal` follow the tempo, scaled by `ratio`.
    pub fn sync_signal(&mut self, signal: &dyn AudioNode, ratio: Option<f64>) -> Result<()> {
        let signal = signal.id();
        self.ctx.graph().nodes().get(signal)?;
        self.ctx.comm().send(
            self.id(),
            Message::SyncSignal {
                op: SyncOp::Sync,
                signal,
                ratio,
            },
        );
        let synced = &mut self.inner_mut().synced;
        if !synced.contains(&signal) {
            synced.push(signal);
        }
        Ok(())
    }

    pub fn unsync_signal(&mut self, signal: &dyn AudioNode) -> Result<()> {
        let signal = signal.id();
        self.ctx.graph().nodes().get(signal)?;
        self.ctx.comm().send(
            self.id(),
            Message::SyncSignal {
                op: SyncOp::Unsync,
                signal,
                ratio: None,
            },
        );
        self.inner_mut().synced.retain(|s| *s != signal);
        Ok(())
    }

    pub fn synced_signals(&self) -> Vec<NodeId> {
        self.inner().synced.clone()
    }
}

#[derive(Default)]
struct Timing {
    time: Option<Time>,
    interval: Option<Time>,
    start_time: Option<Time>,
    duration: Option<Time>,
}
