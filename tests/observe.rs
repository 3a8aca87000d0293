//! Observation bridge: observers, handlers and links

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use tonegraph::nodes::{Gain, Oscillator, Param, Signal};
use tonegraph::{AudioNode, Change, Error, Handler, ObserveOptions, TraitChange, Units};

fn recorder() -> (Handler, Rc<RefCell<Vec<Change>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let handler: Handler = Rc::new(move |change: &Change| sink.borrow_mut().push(change.clone()));
    (handler, seen)
}

#[test]
fn observe_opens_an_observer_and_schedules_sampling() {
    let (mut ctx, mut rx) = common::context();
    let signal = Signal::new(&mut ctx, 1.0, Units::Number).unwrap();
    common::drain(&mut rx);

    let (handler, _) = recorder();
    let observer = ctx
        .observe(&signal, handler, ObserveOptions::new().with_update_interval("8n").on_transport())
        .unwrap();

    let envelopes = common::drain(&mut rx);
    let opened = common::opened(&envelopes);
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0, observer.raw() as u64);
    assert_eq!(opened[0].1, "ScheduleObserverModel");
    assert_eq!(opened[0].2["observed_widget"], signal.id().raw());
    assert_eq!(opened[0].2["observed_trait"], "value");
    assert_eq!(opened[0].2["observe_time"], false);

    assert_eq!(
        envelopes[1],
        json!({
            "kind": "custom",
            "model": observer.raw(),
            "content": {"event": "scheduleRepeat", "update_interval": "8n", "transport": true, "draw": false},
        })
    );
}

#[test]
fn duplicate_handlers_are_rejected_until_unobserved() {
    let (mut ctx, mut rx) = common::context();
    let param = Param::new(&mut ctx, 0.0, Units::Number).unwrap();
    let (handler, _) = recorder();
    let (other, _) = recorder();

    ctx.observe(&param, handler.clone(), ObserveOptions::new()).unwrap();
    assert_eq!(
        ctx.observe(&param, handler.clone(), ObserveOptions::new().with_name("time")),
        Err(Error::HandlerAlreadyRegistered(param.id()))
    );
    ctx.observe(&param, other.clone(), ObserveOptions::new()).unwrap();
    assert_eq!(ctx.observers().observers_of(param.id()).len(), 2);

    common::drain(&mut rx);
    ctx.unobserve(&param, &handler).unwrap();
    assert_eq!(
        common::custom(&mut rx),
        vec![json!({"event": "scheduleCancel"})]
    );
    assert_eq!(
        ctx.unobserve(&param, &handler),
        Err(Error::HandlerNotRegistered(param.id()))
    );

    ctx.observe(&param, handler, ObserveOptions::new()).unwrap();
}

#[test]
fn observable_traits_are_validated() {
    let (mut ctx, _rx) = common::context();
    let osc = Oscillator::new(&mut ctx, 440.0, "sine").unwrap();
    let gain = Gain::new(&mut ctx, 1.0).unwrap();
    let (handler, _) = recorder();

    assert_eq!(
        ctx.observe(&osc, handler.clone(), ObserveOptions::new().with_name("value")),
        Err(Error::InvalidObservableTrait {
            name: "value".into(),
            expected: vec!["state".into()],
        })
    );
    assert!(matches!(
        ctx.observe(&gain, handler.clone(), ObserveOptions::new()),
        Err(Error::InvalidEndpoint { .. })
    ));

    ctx.observe(&osc, handler, ObserveOptions::new().with_name("time"))
        .unwrap();
}

#[test]
fn handlers_receive_mirrored_changes() {
    let (mut ctx, _rx) = common::context();
    let param = Param::new(&mut ctx, 0.0, Units::Number).unwrap();
    let (handler, seen) = recorder();
    let observer = ctx.observe(&param, handler, ObserveOptions::new()).unwrap();

    for value in [0.25, 0.5] {
        ctx.receive(TraitChange {
            model: observer,
            name: "value".into(),
            value: json!(value),
        })
        .unwrap();
    }
    // not the watched trait
    ctx.receive(TraitChange {
        model: observer,
        name: "time".into(),
        value: json!(3.5),
    })
    .unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].source, param.id());
    assert_eq!(seen[0].old, json!(null));
    assert_eq!(seen[1].old, json!(0.25));
    assert_eq!(seen[1].new, json!(0.5));

    let state = ctx.observers().state(observer).unwrap();
    assert_eq!(state["time"], json!(3.5));
    assert_eq!(state["value"], json!(0.5));
}

#[test]
fn observe_time_watches_time_value_pairs() {
    let (mut ctx, mut rx) = common::context();
    let signal = Signal::new(&mut ctx, 1.0, Units::Number).unwrap();
    common::drain(&mut rx);
    let (handler, seen) = recorder();

    let observer = ctx
        .observe(&signal, handler, ObserveOptions::new().with_time())
        .unwrap();
    let opened = common::opened(&common::drain(&mut rx));
    assert_eq!(opened[0].2["observe_time"], true);

    ctx.receive(TraitChange {
        model: observer,
        name: "value".into(),
        value: json!(2.0),
    })
    .unwrap();
    ctx.receive(TraitChange {
        model: observer,
        name: "time_value".into(),
        value: json!([1.5, 2.0]),
    })
    .unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].name, "time_value");
    assert_eq!(seen[0].new, json!([1.5, 2.0]));
}

#[test]
fn host_links_forward_samples_until_unlinked() {
    let (mut ctx, mut rx) = common::context();
    let source = Signal::new(&mut ctx, 0.0, Units::Number).unwrap();
    let target = Param::new(&mut ctx, 0.0, Units::Number).unwrap();

    let link = ctx
        .link(&source, (&target, "value"), ObserveOptions::new().on_transport())
        .unwrap();
    assert!(!link.is_js());
    common::drain(&mut rx);

    ctx.receive(TraitChange {
        model: link.observer(),
        name: "value".into(),
        value: json!(0.75),
    })
    .unwrap();
    assert_eq!(target.value(&ctx), Ok(json!(0.75)));
    assert_eq!(
        common::drain(&mut rx),
        vec![json!({"kind": "update", "model": target.id().raw(), "state": {"value": 0.75}})]
    );

    link.unlink(&mut ctx).unwrap();
    assert_eq!(
        common::custom_for(&mut rx, link.observer()),
        vec![json!({"event": "scheduleCancel"})]
    );
    assert_eq!(link.unlink(&mut ctx), Err(Error::UnknownLink(link.observer())));

    // samples arriving after unlink no longer reach the target
    ctx.receive(TraitChange {
        model: link.observer(),
        name: "value".into(),
        value: json!(0.1),
    })
    .unwrap();
    assert_eq!(target.value(&ctx), Ok(json!(0.75)));
}

#[test]
fn js_links_live_in_the_engine() {
    let (mut ctx, mut rx) = common::context();
    let source = Signal::new(&mut ctx, 0.0, Units::Number).unwrap();
    let target = Param::new(&mut ctx, 0.0, Units::Number).unwrap();
    common::drain(&mut rx);

    let link = ctx
        .js_link(&source, (&target, "value"), ObserveOptions::new().on_transport())
        .unwrap();
    assert!(link.is_js());

    let envelopes = common::drain(&mut rx);
    let opened = common::opened(&envelopes);
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[1].1, "DirectionalLinkModel");
    assert_eq!(
        opened[1].2["target"],
        json!([target.id().raw(), "value"])
    );
    assert_eq!(
        envelopes[1]["content"],
        json!({"event": "scheduleRepeat", "update_interval": 0.08, "transport": true, "draw": true})
    );

    link.unlink(&mut ctx).unwrap();
    let envelopes = common::drain(&mut rx);
    assert_eq!(envelopes[0], json!({"kind": "close", "model": opened[1].0}));
    assert_eq!(envelopes[1]["content"], json!({"event": "scheduleCancel"}));
}

#[test]
fn link_targets_must_sync_the_trait() {
    let (mut ctx, _rx) = common::context();
    let source = Signal::new(&mut ctx, 0.0, Units::Number).unwrap();
    let target = Gain::new(&mut ctx, 1.0).unwrap();

    assert_eq!(
        ctx.link(&source, (&target, "frequency"), ObserveOptions::new()),
        Err(Error::UnknownTrait {
            node: target.id(),
            name: "frequency".into(),
        })
    );
    assert!(ctx.observers().is_empty());
}
