//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

use rtrb::Consumer;
use serde_json::Value;
use tonegraph::{AudioContext, ContextConfig, Envelope, NodeId};

/// Install a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// A ring-backed context with the setup envelopes already drained.
pub fn context() -> (AudioContext, Consumer<Envelope>) {
    init_tracing();
    let (ctx, mut rx) = AudioContext::with_ring_buffer(ContextConfig::default()).unwrap();
    drain(&mut rx);
    (ctx, rx)
}

/// Every pending envelope, as JSON.
pub fn drain(rx: &mut Consumer<Envelope>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(envelope) = rx.pop() {
        out.push(serde_json::to_value(envelope).unwrap());
    }
    out
}

/// Contents of the pending custom messages, skipping state sync traffic.
pub fn custom(rx: &mut Consumer<Envelope>) -> Vec<Value> {
    drain(rx)
        .into_iter()
        .filter(|e| e["kind"] == "custom")
        .map(|e| e["content"].clone())
        .collect()
}

/// Pending custom message contents addressed to `model`.
pub fn custom_for(rx: &mut Consumer<Envelope>, model: NodeId) -> Vec<Value> {
    drain(rx)
        .into_iter()
        .filter(|e| e["kind"] == "custom" && e["model"] == model.raw())
        .map(|e| e["content"].clone())
        .collect()
}

/// Models opened since the last drain, as `(model, model_name, state)`.
pub fn opened(envelopes: &[Value]) -> Vec<(u64, String, Value)> {
    envelopes
        .iter()
        .filter(|e| e["kind"] == "open")
        .map(|e| {
            (
                e["model"].as_u64().unwrap(),
                e["model_name"].as_str().unwrap().to_owned(),
                e["state"].clone(),
            )
        })
        .collect()
}
