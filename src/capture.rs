//! Deferred expressions and capture sessions.
//!
//! A capture session records method calls whose arguments depend on values
//! only known when the engine dispatches them (the scheduling time, an event
//! value). Nothing is evaluated host-side: placeholders carry a symbolic
//! expression string and calls touching them are appended to the session's
//! item list instead of being sent.
//!
//! ```ignore
//! let capture = Capture::begin(transport_id);
//! let time = capture.time();
//! osc.start(&mut ctx, &time)?;
//! osc.stop(&mut ctx, &time + 1)?;
//! let items = capture.end();
//! assert_eq!(items[1].args["time"].value, "time + 1");
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use crate::comm::Comm;
use crate::error::{Error, Result};
use crate::message::{ArgValue, Message, MethodCall, Time};
use crate::node::NodeId;

/// Symbol of the dispatch-time placeholder.
pub const TIME: &str = "time";

struct Session {
    caller: NodeId,
    items: RefCell<Vec<MethodCall>>,
    closed: Cell<bool>,
}

/// Symbolic stand-in for a value known only at dispatch.
///
/// Every placeholder derived from a root shares the root's session, so the
/// session's state is checked at each access rather than copied at
/// derivation.
#[derive(Clone)]
pub struct Deferred {
    value: String,
    session: Rc<Session>,
}

impl Deferred {
    fn root(session: Rc<Session>, value: &str) -> Self {
        Self {
            value: value.to_owned(),
            session,
        }
    }

    fn check(&self) -> Result<()> {
        if self.session.closed.get() {
            return Err(Error::InvalidCaptureUse(self.value.clone()));
        }
        Ok(())
    }

    /// Symbolic expression of this placeholder.
    pub fn value(&self) -> Result<&str> {
        self.check()?;
        Ok(&self.value)
    }

    /// The node the session is bound to.
    pub fn caller(&self) -> Result<NodeId> {
        self.check()?;
        Ok(self.session.caller)
    }

    /// Calls recorded so far in this placeholder's session.
    pub fn items(&self) -> Result<Vec<MethodCall>> {
        self.check()?;
        Ok(self.session.items.borrow().clone())
    }

    /// A new placeholder of the same session with another expression.
    pub fn derive(&self, value: impl Into<String>) -> Result<Deferred> {
        self.check()?;
        Ok(Deferred {
            value: value.into(),
            session: Rc::clone(&self.session),
        })
    }

    pub fn is_active(&self) -> bool {
        !self.session.closed.get()
    }

    pub(crate) fn record(&self, call: MethodCall) -> Result<()> {
        self.check()?;
        trace!(method = %call.method, callee = %call.callee, "call captured");
        self.session.items.borrow_mut().push(call);
        Ok(())
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("value", &self.value)
            .field("active", &self.is_active())
            .finish()
    }
}

impl fmt::Display for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: fmt::Display> Add<T> for Deferred {
    type Output = Deferred;

    fn add(self, rhs: T) -> Deferred {
        &self + rhs
    }
}

/// Composition never fails: adding to a placeholder whose session has ended
/// yields another inactive placeholder, rejected at its first access.
impl<T: fmt::Display> Add<T> for &Deferred {
    type Output = Deferred;

    fn add(self, rhs: T) -> Deferred {
        Deferred {
            value: format!("{} + {}", self.value, rhs),
            session: Rc::clone(&self.session),
        }
    }
}

/// A capture session. Placeholders taken from it become unusable once it
/// ends or is dropped.
pub struct Capture {
    root: Deferred,
}

impl Capture {
    pub fn begin(caller: NodeId) -> Self {
        let session = Rc::new(Session {
            caller,
            items: RefCell::new(Vec::new()),
            closed: Cell::new(false),
        });
        Self {
            root: Deferred::root(session, TIME),
        }
    }

    /// The dispatch-time root placeholder.
    pub fn time(&self) -> Deferred {
        self.root.clone()
    }

    /// An additional root of the same session (e.g. `"value"` for event
    /// callbacks). Its calls land in the same ordered item list.
    pub fn placeholder(&self, value: &str) -> Deferred {
        Deferred::root(Rc::clone(&self.root.session), value)
    }

    pub fn caller(&self) -> NodeId {
        self.root.session.caller
    }

    /// Close the session and return the recorded calls in issue order.
    pub fn end(self) -> Vec<MethodCall> {
        let items = std::mem::take(&mut *self.root.session.items.borrow_mut());
        items
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.root.session.closed.set(true);
    }
}

/// A method argument: either a concrete value or a placeholder.
#[derive(Clone, Debug)]
pub enum Arg {
    Literal(Value),
    Deferred(Deferred),
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Literal(v)
    }
}

impl From<Deferred> for Arg {
    fn from(d: Deferred) -> Self {
        Arg::Deferred(d)
    }
}

impl From<&Deferred> for Arg {
    fn from(d: &Deferred) -> Self {
        Arg::Deferred(d.clone())
    }
}

impl From<Time> for Arg {
    fn from(t: Time) -> Self {
        Arg::Literal(t.into())
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Literal(Value::String(s.to_owned()))
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Literal(Value::String(s))
    }
}

impl From<NodeId> for Arg {
    fn from(id: NodeId) -> Self {
        Arg::Literal(id.raw().into())
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Arg::Literal(Value::Null))
    }
}

macro_rules! literal_arg {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg {
            fn from(v: $t) -> Self {
                Arg::Literal(v.into())
            }
        })*
    };
}

literal_arg!(f64, f32, i32, i64, u32, u64, usize, bool);

/// How a concrete call reaches the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// `{event: "trigger"}`: node methods.
    Trigger,
    /// `{event: "play"}`: playback control of transport and events.
    Play,
}

/// What happened to an [`Invocation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatched {
    Sent,
    Captured,
}

/// A method call on an engine-side object, built argument by argument.
///
/// Dispatching it either sends it right away, or records it in the session of
/// its first placeholder argument.
#[derive(Clone, Debug)]
pub struct Invocation {
    method: String,
    args: Vec<(String, Arg)>,
}

impl Invocation {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_owned(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, name: &str, value: impl Into<Arg>) -> Self {
        self.args.push((name.to_owned(), value.into()));
        self
    }

    pub fn dispatch(self, comm: &Comm, callee: NodeId, kind: Dispatch) -> Result<Dispatched> {
        let mut args = BTreeMap::new();
        let mut arg_keys = Vec::with_capacity(self.args.len());
        let mut root: Option<Deferred> = None;

        for (name, arg) in self.args {
            let value = match arg {
                Arg::Literal(v) => ArgValue::literal(v),
                Arg::Deferred(d) => {
                    let expr = ArgValue::expression(d.value()?);
                    if root.is_none() {
                        root = Some(d);
                    }
                    expr
                }
            };
            arg_keys.push(name.clone());
            args.insert(name, value);
        }

        if let Some(root) = root {
            root.record(MethodCall {
                method: self.method,
                callee,
                args,
                arg_keys,
            })?;
            return Ok(Dispatched::Captured);
        }

        let method = self.method;
        let message = match kind {
            Dispatch::Trigger => Message::Trigger {
                method,
                args,
                arg_keys,
            },
            Dispatch::Play => Message::Play {
                method,
                args,
                arg_keys,
            },
        };
        comm.send(callee, message);
        Ok(Dispatched::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_composes_strings() {
        let capture = Capture::begin(NodeId(0));
        let t = capture.time() + 5 + 2;
        assert_eq!(t.value().unwrap(), "time + 5 + 2");

        let notation = &capture.time() + "4n";
        assert_eq!(notation.value().unwrap(), "time + 4n");
    }

    #[test]
    fn derived_placeholders_share_items() {
        let capture = Capture::begin(NodeId(1));
        let time = capture.time();
        let later = time.derive("time + 1").unwrap();

        let call = MethodCall {
            method: "start".into(),
            callee: NodeId(2),
            args: BTreeMap::new(),
            arg_keys: vec![],
        };
        later.record(call.clone()).unwrap();

        assert_eq!(time.items().unwrap(), vec![call.clone()]);
        assert_eq!(capture.end(), vec![call]);
    }

    #[test]
    fn placeholders_fail_after_session_ends() {
        let capture = Capture::begin(NodeId(0));
        let time = capture.time();
        let derived = &time + 0.5;
        drop(capture);

        assert_eq!(
            time.value(),
            Err(Error::InvalidCaptureUse("time".into()))
        );
        assert!(derived.items().is_err());
        assert!(derived.derive("x").is_err());
        assert!(!derived.is_active());
    }

    #[test]
    fn composing_after_session_end_stays_inactive() {
        let capture = Capture::begin(NodeId(0));
        let time = capture.time();
        drop(capture);

        let later = &time + 1;
        assert!(!later.is_active());
        assert_eq!(
            later.value(),
            Err(Error::InvalidCaptureUse("time + 1".into()))
        );
    }
}
