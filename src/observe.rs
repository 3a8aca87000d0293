//! Observation bridge: periodic sampling of engine-side state into the host.
//!
//! Each `observe` or `link` call opens a dedicated observer model on the
//! engine side. The engine samples the observed trait every
//! `update_interval` (seconds, or transport time when `transport` is set) and
//! reports it back as a [`TraitChange`] addressed to the observer, which
//! [`AudioContext::receive`](crate::AudioContext::receive) routes here.

use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::comm::{Comm, TraitChange};
use crate::error::{Error, Result};
use crate::message::{Message, Time};
use crate::node::{NodeArena, NodeId};

/// Callback receiving mirrored changes. Identity is the `Rc` allocation.
pub type Handler = Rc<dyn Fn(&Change)>;

fn same_handler(a: &Handler, b: &Handler) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

/// A sampled trait changed.
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    /// The observed node.
    pub source: NodeId,
    pub name: String,
    pub old: Value,
    pub new: Value,
}

/// Traits a node allows to be observed. `"time"` is always accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observable {
    pub traits: &'static [&'static str],
    pub default: &'static str,
}

impl Observable {
    pub const VALUE: Observable = Observable {
        traits: &["value"],
        default: "value",
    };

    pub const STATE: Observable = Observable {
        traits: &["state"],
        default: "state",
    };

    /// Validate a requested trait name, falling back to the default.
    pub fn resolve(&self, name: Option<&str>) -> Result<&'static str> {
        let name = match name {
            None => return Ok(self.default),
            Some(name) => name,
        };
        if name == "time" {
            return Ok("time");
        }
        self.traits
            .iter()
            .copied()
            .find(|t| *t == name)
            .ok_or_else(|| Error::InvalidObservableTrait {
                name: name.to_owned(),
                expected: self.traits.iter().map(|t| t.to_string()).collect(),
            })
    }
}

/// Options of `observe` / `link`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObserveOptions {
    /// Sampling interval; the context default when `None`.
    pub update_interval: Option<Time>,
    /// Sample along the transport timeline instead of the audio context clock.
    pub transport: bool,
    /// Observed trait; the node's default when `None`.
    pub name: Option<String>,
    /// Report `(time, value)` pairs instead of the bare trait.
    pub observe_time: bool,
}

impl ObserveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update_interval(mut self, interval: impl Into<Time>) -> Self {
        self.update_interval = Some(interval.into());
        self
    }

    pub fn on_transport(mut self) -> Self {
        self.transport = true;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn with_time(mut self) -> Self {
        self.observe_time = true;
        self
    }
}

/// A one-way link created by `link`/`js_link`.
///
/// Unlinking severs the value mirroring and cancels the sampling request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkHandle {
    pub(crate) observer: NodeId,
    pub(crate) js: bool,
}

impl LinkHandle {
    /// The observer model sampling the source.
    pub fn observer(&self) -> NodeId {
        self.observer
    }

    pub fn is_js(&self) -> bool {
        self.js
    }

    pub fn unlink(&self, ctx: &mut crate::AudioContext) -> Result<()> {
        ctx.unlink(self)
    }
}

struct LinkTarget {
    target: NodeId,
    target_trait: String,
    js_model: Option<NodeId>,
}

struct Observer {
    source: NodeId,
    observed: &'static str,
    observe_time: bool,
    handler: Option<Handler>,
    link: Option<LinkTarget>,
    mirror: Map<String, Value>,
}

impl Observer {
    /// Name of the mirrored trait handlers are notified for.
    fn watched(&self) -> &str {
        if self.observe_time {
            "time_value"
        } else {
            self.observed
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("source", &self.source)
            .field("observed", &self.observed)
            .field("observe_time", &self.observe_time)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Outcome of routing an inbound change.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Routed {
    NotObserver,
    Mirrored,
    /// A host-side link asks for this trait write.
    Forward {
        target: NodeId,
        name: String,
        value: Value,
    },
}

/// Every active observer of one audio context, keyed by observer model.
#[derive(Debug, Default)]
pub struct ObservationBridge {
    observers: HashMap<NodeId, Observer>,
}

impl ObservationBridge {
    fn open_observer(
        &mut self,
        comm: &Comm,
        source: NodeId,
        observed: &'static str,
        observe_time: bool,
    ) -> NodeId {
        let mut mirror = Map::new();
        mirror.insert("time".into(), json!(0.0));
        mirror.insert("value".into(), Value::Null);
        mirror.insert("state".into(), json!("stopped"));
        mirror.insert("time_value".into(), Value::Null);

        let mut state = mirror.clone();
        state.insert("observed_widget".into(), json!(source));
        state.insert("observed_trait".into(), json!(observed));
        state.insert("observe_time".into(), json!(observe_time));

        let id = comm.open("ScheduleObserverModel", state);
        self.observers.insert(
            id,
            Observer {
                source,
                observed,
                observe_time,
                handler: None,
                link: None,
                mirror,
            },
        );
        id
    }

    fn resolve(nodes: &NodeArena, source: NodeId, name: Option<&str>) -> Result<&'static str> {
        let observable = nodes
            .get(source)?
            .observable()
            .ok_or(Error::InvalidEndpoint {
                node: source,
                role: "an observable node",
            })?;
        observable.resolve(name)
    }

    pub(crate) fn observe(
        &mut self,
        comm: &Comm,
        nodes: &NodeArena,
        source: NodeId,
        handler: Handler,
        options: &ObserveOptions,
        update_interval: Time,
    ) -> Result<NodeId> {
        let observed = Self::resolve(nodes, source, options.name.as_deref())?;

        let duplicate = self.observers.values().any(|o| {
            o.source == source
                && o.handler
                    .as_ref()
                    .map(|h| same_handler(h, &handler))
                    .unwrap_or(false)
        });
        if duplicate {
            return Err(Error::HandlerAlreadyRegistered(source));
        }

        let id = self.open_observer(comm, source, observed, options.observe_time);
        comm.send(
            id,
            Message::ScheduleRepeat {
                update_interval,
                transport: options.transport,
                draw: false,
            },
        );
        if let Some(observer) = self.observers.get_mut(&id) {
            observer.handler = Some(handler);
        }
        debug!(%source, observer = %id, observed, "observer scheduled");
        Ok(id)
    }

    pub(crate) fn unobserve(&mut self, comm: &Comm, source: NodeId, handler: &Handler) -> Result<()> {
        let id = self
            .observers
            .iter()
            .find(|(_, o)| {
                o.source == source
                    && o.handler
                        .as_ref()
                        .map(|h| same_handler(h, handler))
                        .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .ok_or(Error::HandlerNotRegistered(source))?;

        self.observers.remove(&id);
        comm.send(id, Message::ScheduleCancel);
        debug!(%source, observer = %id, "observer cancelled");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn link(
        &mut self,
        comm: &Comm,
        nodes: &NodeArena,
        source: NodeId,
        target: (NodeId, &str),
        options: &ObserveOptions,
        update_interval: Time,
        js: bool,
    ) -> Result<LinkHandle> {
        let (target, target_trait) = target;
        if !nodes.get(target)?.has_trait(target_trait) {
            return Err(Error::UnknownTrait {
                node: target,
                name: target_trait.to_owned(),
            });
        }
        let observed = Self::resolve(nodes, source, options.name.as_deref())?;

        let id = self.open_observer(comm, source, observed, false);
        comm.send(
            id,
            Message::ScheduleRepeat {
                update_interval,
                transport: options.transport,
                draw: js && options.transport,
            },
        );

        let js_model = js.then(|| {
            let mut state = Map::new();
            state.insert("source".into(), json!([id, observed]));
            state.insert("target".into(), json!([target, target_trait]));
            comm.open("DirectionalLinkModel", state)
        });

        if let Some(observer) = self.observers.get_mut(&id) {
            observer.link = Some(LinkTarget {
                target,
                target_trait: target_trait.to_owned(),
                js_model,
            });
        }
        debug!(%source, %target, target_trait, js, "link created");
        Ok(LinkHandle { observer: id, js })
    }

    pub(crate) fn unlink(&mut self, comm: &Comm, handle: &LinkHandle) -> Result<()> {
        let link = self
            .observers
            .get(&handle.observer)
            .and_then(|o| o.link.as_ref())
            .ok_or(Error::UnknownLink(handle.observer))?;

        if let Some(model) = link.js_model {
            comm.close(model);
        }
        comm.send(handle.observer, Message::ScheduleCancel);
        self.observers.remove(&handle.observer);
        debug!(observer = %handle.observer, "link removed");
        Ok(())
    }

    /// Update the mirror of an observer and run its handler or link.
    pub(crate) fn route(&mut self, change: &TraitChange) -> Routed {
        let observer = match self.observers.get_mut(&change.model) {
            Some(o) => o,
            None => return Routed::NotObserver,
        };

        let old = observer
            .mirror
            .insert(change.name.clone(), change.value.clone())
            .unwrap_or(Value::Null);

        if change.name == observer.watched() {
            if let Some(handler) = &observer.handler {
                handler(&Change {
                    source: observer.source,
                    name: change.name.clone(),
                    old,
                    new: change.value.clone(),
                });
            }
        }

        match &observer.link {
            Some(link) if link.js_model.is_none() && change.name == observer.observed => {
                Routed::Forward {
                    target: link.target,
                    name: link.target_trait.clone(),
                    value: change.value.clone(),
                }
            }
            _ => Routed::Mirrored,
        }
    }

    /// Mirrored state of an observer model (`time`, `value`, `state`,
    /// `time_value`).
    pub fn state(&self, observer: NodeId) -> Option<&Map<String, Value>> {
        self.observers.get(&observer).map(|o| &o.mirror)
    }

    /// Active observer models sampling `source`.
    pub fn observers_of(&self, source: NodeId) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .observers
            .iter()
            .filter(|(_, o)| o.source == source)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_is_always_observable() {
        assert_eq!(Observable::STATE.resolve(Some("time")), Ok("time"));
        assert_eq!(Observable::VALUE.resolve(None), Ok("value"));
    }

    #[test]
    fn unknown_trait_lists_expected_names() {
        let err = Observable::VALUE.resolve(Some("state")).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidObservableTrait {
                name: "state".into(),
                expected: vec!["value".into()],
            }
        );
    }
}
