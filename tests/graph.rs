//! Graph store: validation, batching, cleanup and disposal

mod common;

use serde_json::json;
use tonegraph::nodes::{Gain, InternalNode, NativeNode, Param};
use tonegraph::{AudioNode, Edge, Error, NodeKind, Result, Units};

#[test]
fn connect_is_idempotent() {
    let (mut ctx, _rx) = common::context();
    let a = InternalNode::new(&mut ctx, "Source", 0, 1).unwrap();
    let b = InternalNode::new(&mut ctx, "Sink", 1, 0).unwrap();

    a.connect(&mut ctx, &b).unwrap();
    a.connect(&mut ctx, &b).unwrap();

    assert_eq!(ctx.connections(), vec![Edge::new(a.id(), b.id(), 0, 0)]);
}

#[test]
fn edges_on_distinct_channels_are_distinct() {
    let (mut ctx, _rx) = common::context();
    let split = InternalNode::new(&mut ctx, "Split", 1, 2).unwrap();
    let merge = InternalNode::new(&mut ctx, "Merge", 2, 1).unwrap();

    split.connect_channels(&mut ctx, &merge, 0, 0).unwrap();
    split.connect_channels(&mut ctx, &merge, 1, 1).unwrap();

    assert_eq!(
        ctx.connections(),
        vec![
            Edge::new(split.id(), merge.id(), 0, 0),
            Edge::new(split.id(), merge.id(), 1, 1),
        ]
    );
}

#[test]
fn arity_is_enforced() {
    let (mut ctx, _rx) = common::context();
    let source = InternalNode::new(&mut ctx, "Source", 0, 1).unwrap();
    let sink = InternalNode::new(&mut ctx, "Sink", 1, 0).unwrap();
    let effect = InternalNode::new(&mut ctx, "Effect", 1, 1).unwrap();

    assert_eq!(
        ctx.connect(&effect, &source, 0, 0),
        Err(Error::CannotConnectSource(source.id()))
    );
    assert_eq!(
        ctx.connect(&sink, &effect, 0, 0),
        Err(Error::CannotConnectSink(sink.id()))
    );
    assert!(ctx.connections().is_empty());
}

#[test]
fn params_are_destinations_only() {
    let (mut ctx, _rx) = common::context();
    let lfo = InternalNode::new(&mut ctx, "LFO", 0, 1).unwrap();
    let param = Param::new(&mut ctx, 440.0, Units::Frequency).unwrap();

    assert_eq!(param.number_of_inputs(&ctx), Ok(1));
    assert_eq!(param.number_of_outputs(&ctx), Ok(0));

    lfo.connect(&mut ctx, &param).unwrap();
    assert!(matches!(
        ctx.connect(&param, &lfo, 0, 0),
        Err(Error::InvalidEndpoint { node, .. }) if node == param.id()
    ));
}

#[test]
fn transport_is_not_a_graph_node() {
    let (mut ctx, _rx) = common::context();
    let effect = InternalNode::new(&mut ctx, "Effect", 1, 1).unwrap();
    let transport = ctx.transport().id();

    assert!(matches!(
        ctx.connect(&effect, &transport, 0, 0),
        Err(Error::InvalidEndpoint { .. })
    ));
}

#[test]
fn disconnect_requires_an_existing_edge() {
    let (mut ctx, _rx) = common::context();
    let a = InternalNode::new(&mut ctx, "A", 1, 1).unwrap();
    let b = InternalNode::new(&mut ctx, "B", 1, 1).unwrap();

    assert_eq!(
        b.disconnect(&mut ctx, &a).err(),
        Some(Error::EdgeNotFound {
            src: b.id(),
            dest: a.id(),
            output: 0,
            input: 0,
        })
    );

    a.connect(&mut ctx, &b).unwrap();
    a.disconnect(&mut ctx, &b).unwrap();
    assert!(ctx.connections().is_empty());
}

#[test]
fn hold_state_commits_once_at_outermost_exit() {
    let (mut ctx, mut rx) = common::context();
    let a = InternalNode::new(&mut ctx, "A", 1, 1).unwrap();
    let b = InternalNode::new(&mut ctx, "B", 1, 1).unwrap();
    let c = InternalNode::new(&mut ctx, "C", 1, 1).unwrap();
    common::drain(&mut rx);

    {
        let mut held = ctx.hold_state();
        a.connect(&mut held, &b).unwrap();
        {
            let mut inner = held.hold_state();
            b.connect(&mut inner, &c).unwrap();
            a.connect(&mut inner, &c).unwrap();
            a.disconnect(&mut inner, &c).unwrap();
        }
        assert!(held.connections().is_empty());
        assert!(common::drain(&mut rx).is_empty());
    }

    assert_eq!(
        ctx.connections(),
        vec![
            Edge::new(a.id(), b.id(), 0, 0),
            Edge::new(b.id(), c.id(), 0, 0),
        ]
    );

    let graph = ctx.graph().id();
    let updates = common::drain(&mut rx);
    assert_eq!(
        updates,
        vec![json!({
            "kind": "update",
            "model": graph.raw(),
            "state": {"_connections": [[a.id().raw(), b.id().raw(), 0, 0], [b.id().raw(), c.id().raw(), 0, 0]]},
        })]
    );
}

#[test]
fn hold_state_commits_when_body_fails() {
    let (mut ctx, _rx) = common::context();
    let a = InternalNode::new(&mut ctx, "A", 1, 1).unwrap();
    let b = InternalNode::new(&mut ctx, "B", 1, 1).unwrap();
    let source = InternalNode::new(&mut ctx, "Source", 0, 1).unwrap();

    let result: Result<()> = (|| {
        let mut held = ctx.hold_state();
        a.connect(&mut held, &b)?;
        b.connect(&mut held, &source)?;
        Ok(())
    })();

    assert_eq!(result, Err(Error::CannotConnectSource(source.id())));
    assert_eq!(ctx.connections(), vec![Edge::new(a.id(), b.id(), 0, 0)]);
    assert!(!ctx.graph().is_held());
}

#[test]
fn dispose_removes_exactly_the_touching_edges() {
    let (mut ctx, _rx) = common::context();
    let a = InternalNode::new(&mut ctx, "A", 1, 1).unwrap();
    let b = InternalNode::new(&mut ctx, "B", 1, 1).unwrap();
    let c = InternalNode::new(&mut ctx, "C", 1, 1).unwrap();
    let d = InternalNode::new(&mut ctx, "D", 1, 1).unwrap();

    ctx.chain(&a, &[&b, &c, &d]).unwrap();
    a.connect(&mut ctx, &c).unwrap();

    b.dispose(&mut ctx).unwrap();

    assert!(b.disposed(&ctx));
    assert_eq!(
        ctx.connections(),
        vec![
            Edge::new(c.id(), d.id(), 0, 0),
            Edge::new(a.id(), c.id(), 0, 0),
        ]
    );
}

#[test]
fn dispose_cascades_but_spares_native_nodes() {
    let (mut ctx, mut rx) = common::context();
    let gain = Gain::new(&mut ctx, 0.5).unwrap();
    let native = match ctx.graph().nodes().get(gain.id()).unwrap().kind() {
        NodeKind::Composite { input: Some(n), .. } => *n,
        other => panic!("unexpected kind {:?}", other),
    };
    common::drain(&mut rx);

    gain.dispose(&mut ctx).unwrap();

    assert!(gain.disposed(&ctx));
    assert!(gain.gain().disposed(&ctx));
    assert!(!native.disposed(&ctx));

    let disposed: Vec<_> = common::drain(&mut rx)
        .into_iter()
        .filter(|e| e["state"]["_disposed"] == true)
        .map(|e| e["model"].as_u64().unwrap())
        .collect();
    assert_eq!(
        disposed,
        vec![gain.id().raw() as u64, gain.gain().id().raw() as u64]
    );

    // a second dispose is a no-op
    gain.dispose(&mut ctx).unwrap();
    assert!(common::drain(&mut rx).is_empty());
}

#[test]
fn disposing_a_native_node_does_nothing() {
    let (mut ctx, _rx) = common::context();
    let osc = NativeNode::new(&mut ctx, "OscillatorNode", 0, 1).unwrap();
    let out = InternalNode::new(&mut ctx, "Out", 1, 0).unwrap();
    osc.connect(&mut ctx, &out).unwrap();

    osc.dispose(&mut ctx).unwrap();

    assert!(!osc.disposed(&ctx));
    assert_eq!(ctx.connections().len(), 1);
}

#[test]
fn fan_validates_before_connecting() {
    let (mut ctx, _rx) = common::context();
    let a = InternalNode::new(&mut ctx, "A", 1, 1).unwrap();
    let b = InternalNode::new(&mut ctx, "B", 1, 1).unwrap();
    let source = InternalNode::new(&mut ctx, "Source", 0, 1).unwrap();

    assert_eq!(
        a.fan(&mut ctx, &[&b, &a]).err(),
        Some(Error::SelfConnection(a.id()))
    );
    assert_eq!(
        a.fan(&mut ctx, &[&b, &source]).err(),
        Some(Error::CannotConnectSource(source.id()))
    );
    assert!(ctx.connections().is_empty());

    let c = InternalNode::new(&mut ctx, "C", 1, 1).unwrap();
    a.fan(&mut ctx, &[&b, &c]).unwrap();
    assert_eq!(
        ctx.connections(),
        vec![
            Edge::new(a.id(), b.id(), 0, 0),
            Edge::new(a.id(), c.id(), 0, 0),
        ]
    );
    assert_eq!(ctx.graph().connected_nodes(), vec![a.id(), b.id(), c.id()]);
}

#[test]
fn chain_rejects_consecutive_duplicates() {
    let (mut ctx, _rx) = common::context();
    let a = InternalNode::new(&mut ctx, "A", 1, 1).unwrap();
    let b = InternalNode::new(&mut ctx, "B", 1, 1).unwrap();

    assert_eq!(
        a.chain(&mut ctx, &[&b, &b]).err(),
        Some(Error::SelfConnection(b.id()))
    );
    assert!(ctx.connections().is_empty());
}

#[test]
fn downstream_follows_committed_edges() {
    let (mut ctx, _rx) = common::context();
    let a = InternalNode::new(&mut ctx, "A", 1, 1).unwrap();
    let b = InternalNode::new(&mut ctx, "B", 1, 1).unwrap();
    let c = InternalNode::new(&mut ctx, "C", 1, 1).unwrap();
    let lone = InternalNode::new(&mut ctx, "Lone", 1, 1).unwrap();

    ctx.chain(&a, &[&b, &c]).unwrap();

    let mut reached = ctx.graph().downstream(a.id());
    reached.sort();
    assert_eq!(reached, vec![b.id(), c.id()]);
    assert!(ctx.graph().downstream(lone.id()).is_empty());

    let (topology, _) = ctx.graph().topology();
    assert_eq!(topology.node_count(), 3);
    assert_eq!(topology.edge_count(), 2);
}
