//! Structured payloads sent to the external engine.
//!
//! Every custom message is one JSON object tagged by its `event` key. Method
//! arguments are always shipped as `{value, eval}` pairs together with
//! `arg_keys`, which preserves the declared argument order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::NodeId;

/// A point or span on a timeline, either in seconds or in Tone.js time
/// notation (`"4n"`, `"1m"`, `"+0.5"`...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Time {
    Seconds(f64),
    Notation(String),
}

impl Default for Time {
    fn default() -> Self {
        Time::Seconds(0.0)
    }
}

impl From<f64> for Time {
    fn from(seconds: f64) -> Self {
        Time::Seconds(seconds)
    }
}

impl From<i32> for Time {
    fn from(seconds: i32) -> Self {
        Time::Seconds(seconds as f64)
    }
}

impl From<&str> for Time {
    fn from(notation: &str) -> Self {
        Time::Notation(notation.to_owned())
    }
}

impl From<String> for Time {
    fn from(notation: String) -> Self {
        Time::Notation(notation)
    }
}

impl From<Time> for Value {
    fn from(time: Time) -> Self {
        match time {
            Time::Seconds(s) => Value::from(s),
            Time::Notation(n) => Value::String(n),
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Time::Seconds(s) => write!(f, "{}", s),
            Time::Notation(n) => f.write_str(n),
        }
    }
}

/// One serialized method argument.
///
/// `eval: true` marks a symbolic expression (e.g. `"time + 0.5"`) that the
/// engine evaluates against its real-time clock at dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArgValue {
    pub value: Value,
    pub eval: bool,
}

impl ArgValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            eval: false,
        }
    }

    pub fn expression(expr: impl Into<String>) -> Self {
        Self {
            value: Value::String(expr.into()),
            eval: true,
        }
    }
}

/// A method call recorded during a capture session, to be replayed by the
/// engine on `callee` at dispatch time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    pub callee: NodeId,
    pub args: BTreeMap<String, ArgValue>,
    pub arg_keys: Vec<String>,
}

impl MethodCall {
    /// Argument by name.
    pub fn arg(&self, name: &str) -> Option<&ArgValue> {
        self.args.get(name)
    }
}

/// Scheduling flavour of a `schedule` message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleOp {
    /// Fire once at a given time; clearable until it fires.
    #[serde(rename = "")]
    At,
    #[serde(rename = "repeat")]
    Repeat,
    /// Fire once; owned by the engine, never clearable from the host.
    #[serde(rename = "once")]
    Once,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOp {
    Sync,
    Unsync,
}

/// Custom messages (host → engine).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum Message {
    /// Immediate, concrete method invocation.
    #[serde(rename = "trigger")]
    Trigger {
        method: String,
        args: BTreeMap<String, ArgValue>,
        arg_keys: Vec<String>,
    },
    /// Immediate playback control (transport, events).
    #[serde(rename = "play")]
    Play {
        method: String,
        args: BTreeMap<String, ArgValue>,
        arg_keys: Vec<String>,
    },
    #[serde(rename = "schedule")]
    Schedule {
        op: ScheduleOp,
        id: u64,
        items: Vec<MethodCall>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time: Option<Time>,
        #[serde(skip_serializing_if = "Option::is_none")]
        interval: Option<Time>,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time: Option<Time>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<Time>,
    },
    /// Replace the callback of a timeline event.
    #[serde(rename = "set_callback")]
    SetCallback { op: ScheduleOp, items: Vec<MethodCall> },
    #[serde(rename = "clear")]
    Clear { id: u64 },
    #[serde(rename = "cancel")]
    Cancel { after: Time },
    #[serde(rename = "scheduleRepeat")]
    ScheduleRepeat {
        update_interval: Time,
        transport: bool,
        draw: bool,
    },
    #[serde(rename = "scheduleCancel")]
    ScheduleCancel,
    #[serde(rename = "sync_signal")]
    SyncSignal {
        op: SyncOp,
        signal: NodeId,
        #[serde(skip_serializing_if = "Option::is_none")]
        ratio: Option<f64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schedule_op_serializes_to_engine_names() {
        assert_eq!(serde_json::to_value(ScheduleOp::At).unwrap(), json!(""));
        assert_eq!(serde_json::to_value(ScheduleOp::Repeat).unwrap(), json!("repeat"));
        assert_eq!(serde_json::to_value(ScheduleOp::Once).unwrap(), json!("once"));
    }

    #[test]
    fn unit_message_carries_only_its_tag() {
        let v = serde_json::to_value(Message::ScheduleCancel).unwrap();
        assert_eq!(v, json!({"event": "scheduleCancel"}));
    }

    #[test]
    fn repeat_schedule_omits_unset_timing() {
        let msg = Message::Schedule {
            op: ScheduleOp::Repeat,
            id: 3,
            items: vec![],
            time: None,
            interval: Some("8n".into()),
            start_time: Some(Time::Seconds(0.0)),
            duration: None,
        };
        assert_eq!(
            serde_json::to_value(msg).unwrap(),
            json!({"event": "schedule", "op": "repeat", "id": 3, "items": [], "interval": "8n", "start_time": 0.0})
        );
    }

    #[test]
    fn time_displays_without_quotes() {
        assert_eq!(Time::from("1m").to_string(), "1m");
        assert_eq!(Time::from(0.5).to_string(), "0.5");
    }
}
