//! Request correlation, both as caller and as callee.

use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future::block_on;
use peerlink::rpc::message::{Message, Outcome};
use peerlink::{Capabilities, CapabilityTree, Error, RemoteError, method, sync_method, typed_method};
use serde_json::{Value, json};

use crate::mock_transport::Harness;

// ── Caller side ──────────────────────────────────────────────

#[test]
fn response_resolves_matching_call() {
    let h = Harness::empty().ready();
    let pending = h.session.call("add", vec![json!(3), json!(4)]);

    let (id, name, args) = h.transport.requests().remove(0);
    assert_eq!(name, "add");
    assert_eq!(args, vec![json!(3), json!(4)]);

    h.transport
        .inject(Message::response(id, "add", Outcome::Success { value: json!(7) }));
    assert_eq!(block_on(pending), Ok(json!(7)));
    assert_eq!(h.session.diagnostics().outstanding_requests, 0);
}

#[test]
fn failure_keeps_remote_payload() {
    let h = Harness::empty().ready();
    let pending = h.session.call("foo", vec![]);
    let id = h.transport.requests()[0].0;

    let error = RemoteError::new("errored: 4").with_data(json!({ "code": 4 }));
    h.transport.inject(Message::response(
        id,
        "foo",
        Outcome::Failure {
            error: error.clone(),
        },
    ));
    assert_eq!(block_on(pending), Err(Error::Remote(error)));
}

#[test]
fn responses_pair_by_id_not_order() {
    let h = Harness::empty().ready();
    let first = h.session.call("a", vec![]);
    let second = h.session.call("b", vec![]);
    let ids: Vec<u32> = h.transport.requests().iter().map(|r| r.0).collect();
    assert_ne!(ids[0], ids[1]);

    h.transport
        .inject(Message::response(ids[1], "b", Outcome::Success { value: json!("b") }));
    h.transport
        .inject(Message::response(ids[0], "a", Outcome::Success { value: json!("a") }));
    assert_eq!(block_on(first), Ok(json!("a")));
    assert_eq!(block_on(second), Ok(json!("b")));
}

#[test]
fn unknown_and_duplicate_ids_are_ignored() {
    let h = Harness::empty().ready();
    let pending = h.session.call("x", vec![]);
    let id = h.transport.requests()[0].0;

    h.transport.inject(Message::response(
        id.wrapping_add(1),
        "x",
        Outcome::Success { value: json!("stray") },
    ));
    h.transport
        .inject(Message::response(id, "x", Outcome::Success { value: json!(1) }));
    h.transport
        .inject(Message::response(id, "x", Outcome::Success { value: json!(2) }));
    assert_eq!(block_on(pending), Ok(json!(1)));
}

#[test]
fn unanswered_call_stays_outstanding() {
    let h = Harness::empty().ready();
    let _pending = h.session.call("slow", vec![]);
    let _other = h.session.call("slower", vec![]);
    assert_eq!(h.session.diagnostics().outstanding_requests, 2);
}

// ── Callee side ──────────────────────────────────────────────

fn worker_methods() -> CapabilityTree<peerlink::Method> {
    CapabilityTree::new()
        .with(
            "foo",
            sync_method(|args| {
                let n = args.first().and_then(Value::as_i64).unwrap_or_default();
                Err(anyhow::anyhow!("errored: {n}"))
            }),
        )
        .and_then(|t| {
            t.with(
                "nested.bar",
                method(|args| async move { Ok(args.into_iter().next().unwrap_or_default()) }),
            )
        })
        .and_then(|t| {
            t.with(
                "add",
                typed_method(|(a, b): (i64, i64)| async move { Ok(a + b) }),
            )
        })
        .and_then(|t| t.with("explode", sync_method(|_| panic!("exploded"))))
        .unwrap()
}

fn worker() -> Harness {
    Harness::new(Capabilities {
        methods: worker_methods(),
        ..Capabilities::new()
    })
    .ready()
}

#[test]
fn request_runs_method_and_responds() {
    let h = worker();
    h.transport
        .inject(Message::request(11, "nested.bar", vec![json!(2)]));
    h.transport
        .inject(Message::request(12, "add", vec![json!(3), json!(4)]));
    h.spawner.run_until_stalled();

    assert_eq!(
        h.transport.responses(),
        vec![
            (11, Outcome::Success { value: json!(2) }),
            (12, Outcome::Success { value: json!(7) }),
        ]
    );
}

#[test]
fn method_error_becomes_failure() {
    let h = worker();
    h.transport.inject(Message::request(1, "foo", vec![json!(4)]));
    h.spawner.run_until_stalled();
    let (_, outcome) = h.transport.responses().remove(0);
    assert_eq!(outcome.into_result(), Err(RemoteError::new("errored: 4")));
}

#[test]
fn missing_method_is_reported_by_path() {
    let h = worker();
    h.transport.inject(Message::request(1, "nested.baz", vec![]));
    h.transport.inject(Message::request(2, "nested", vec![]));
    h.spawner.run_until_stalled();

    let messages: Vec<String> = h
        .transport
        .responses()
        .into_iter()
        .map(|(_, o)| o.into_result().unwrap_err().message)
        .collect();
    assert_eq!(
        messages,
        vec!["Method \"nested.baz\" not found", "Method \"nested\" not found"]
    );
}

#[test]
fn panicking_method_does_not_take_session_down() {
    let h = worker();
    h.transport.inject(Message::request(1, "explode", vec![]));
    h.transport.inject(Message::request(2, "nested.bar", vec![json!(5)]));
    h.spawner.run_until_stalled();

    let responses = h.transport.responses();
    assert_eq!(
        responses[0].1.clone().into_result(),
        Err(RemoteError::new("exploded"))
    );
    assert_eq!(responses[1], (2, Outcome::Success { value: json!(5) }));
}

#[test]
fn bad_typed_arguments_fail_the_call() {
    let h = worker();
    h.transport
        .inject(Message::request(1, "add", vec![json!("three"), json!(4)]));
    h.spawner.run_until_stalled();
    assert!(h.transport.responses()[0].1.clone().into_result().is_err());
}

#[test]
fn requests_are_served_while_pending_but_answers_wait() {
    let h = Harness::new(Capabilities {
        methods: worker_methods(),
        ..Capabilities::new()
    });
    h.transport
        .inject(Message::request(3, "nested.bar", vec![json!(1)]));
    h.spawner.run_until_stalled();
    assert!(h.transport.responses().is_empty());
    assert_eq!(h.session.diagnostics().queued_messages, 1);

    h.transport.inject(Message::ack());
    assert_eq!(
        h.transport.responses(),
        vec![(3, Outcome::Success { value: json!(1) })]
    );
}

#[test]
fn slow_method_does_not_block_later_requests() {
    let gate: Arc<Signal<CriticalSectionRawMutex, ()>> = Arc::new(Signal::new());
    let g = gate.clone();
    let methods = CapabilityTree::new()
        .with(
            "slow",
            method(move |_| {
                let g = g.clone();
                async move {
                    g.wait().await;
                    Ok(json!("slow"))
                }
            }),
        )
        .and_then(|t| t.with("fast", sync_method(|_| Ok(json!("fast")))))
        .unwrap();
    let h = Harness::new(Capabilities {
        methods,
        ..Capabilities::new()
    })
    .ready();

    h.transport.inject(Message::request(1, "slow", vec![]));
    h.transport.inject(Message::request(2, "fast", vec![]));
    h.spawner.run_until_stalled();
    let ids: Vec<u32> = h.transport.responses().iter().map(|r| r.0).collect();
    assert_eq!(ids, vec![2]);

    gate.signal(());
    h.spawner.run_until_stalled();
    let ids: Vec<u32> = h.transport.responses().iter().map(|r| r.0).collect();
    assert_eq!(ids, vec![2, 1], "completion order, each with its own id");
}
