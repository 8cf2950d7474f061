//! Handshake state machine and send gating.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_io_mini::Timer;
use edge_executor::Executor;
use futures_lite::future::block_on;
use peerlink::ports::Task;
use peerlink::rpc::message::{HandshakeStatus, Message};
use peerlink::rpc::transport::Transport;
use peerlink::{
    BackoffConfig, Capabilities, Error, ExecutorSpawner, HandshakeState, Session, SessionConfig,
    Spawner,
};
use serde_json::{Value, json};

use crate::mock_transport::{Harness, RecordingTransport};

#[test]
fn pending_session_holds_all_traffic() {
    let h = Harness::empty();
    let _call = h.session.call("add", vec![json!(3), json!(4)]);
    h.session.emit("progress", json!(0.5));
    let _watch = h.session.watch("time", |_| {});

    assert!(h.transport.sent().is_empty(), "nothing leaves before Ack");
    let d = h.session.diagnostics();
    assert_eq!(d.state, HandshakeState::Pending);
    assert_eq!(d.queued_messages, 3);
}

#[test]
fn ack_flushes_queue_in_enqueue_order() {
    let h = Harness::empty();
    let _a = h.session.call("first", vec![]);
    h.session.emit("second", Value::Null);
    let _b = h.session.call("third", vec![]);

    h.transport.inject(Message::ack());

    assert_eq!(h.transport.kinds(), vec!["request", "event", "request"]);
    let names: Vec<String> = h.transport.requests().into_iter().map(|r| r.1).collect();
    assert_eq!(names, vec!["first", "third"]);
    assert_eq!(h.session.diagnostics().queued_messages, 0);
}

#[test]
fn every_hello_gets_exactly_one_ack() {
    let h = Harness::empty();
    h.transport.inject(Message::hello());
    h.transport.inject(Message::hello());
    assert_eq!(h.transport.count("ack"), 2);
    assert!(!h.session.is_ready(), "a Hello alone does not complete the handshake");

    let h = h.ready();
    h.transport.inject(Message::hello());
    assert_eq!(h.transport.count("ack"), 3, "answered after Ready too");
}

#[test]
fn ack_is_forced_past_the_gate() {
    let h = Harness::empty();
    let _call = h.session.call("queued", vec![]);
    h.transport.inject(Message::hello());
    assert_eq!(h.transport.kinds(), vec!["ack"]);
}

#[test]
fn duplicate_ack_is_harmless() {
    let h = Harness::empty().ready();
    h.session.emit("once", Value::Null);
    h.transport.inject(Message::ack());
    assert_eq!(h.transport.kinds(), vec!["event"]);
}

#[test]
fn ready_future_completes_on_ack() {
    let h = Harness::empty();
    let ready = h.session.ready();
    h.transport.inject(Message::Handshake {
        status: HandshakeStatus::Ack,
        timestamp: 0,
    });
    assert_eq!(block_on(ready), Ok(()));
}

#[test]
fn ready_future_fails_after_destroy() {
    let h = Harness::empty();
    h.session.destroy();
    assert_eq!(block_on(h.session.ready()), Err(Error::Closed));
}

#[test]
fn destroy_leaves_transport_and_silences_session() {
    let h = Harness::empty();
    assert_eq!(h.transport.subscriber_count(), 1);
    let _call = h.session.call("never", vec![]);

    h.session.destroy();
    assert_eq!(h.transport.subscriber_count(), 0);
    assert_eq!(h.session.diagnostics().state, HandshakeState::Destroyed);

    h.session.emit("after", Value::Null);
    assert!(h.transport.sent().is_empty());
}

#[test]
fn drop_destroys() {
    let transport = RecordingTransport::new();
    let session = Session::with_config(
        transport.clone(),
        crate::mock_transport::ManualSpawner::new(),
        Capabilities::new(),
        crate::mock_transport::quiet_config(),
    )
    .unwrap();
    assert_eq!(transport.subscriber_count(), 1);
    drop(session);
    assert_eq!(transport.subscriber_count(), 0);
}

/// Peer that answers each Hello with an Ack once `answer` is set.
struct AckingPeer {
    inner: Arc<RecordingTransport>,
    hellos: AtomicUsize,
    answer: std::sync::atomic::AtomicBool,
}

impl Transport for AckingPeer {
    fn send(&self, message: Message) -> Result<(), peerlink::TransportError> {
        if matches!(
            message,
            Message::Handshake {
                status: HandshakeStatus::Hello,
                ..
            }
        ) {
            self.hellos.fetch_add(1, Ordering::SeqCst);
            if self.answer.load(Ordering::SeqCst) {
                self.inner.inject(Message::ack());
            }
        }
        self.inner.send(message)
    }

    fn subscribe(
        &self,
        handler: peerlink::rpc::transport::MessageHandler,
    ) -> peerlink::Unsubscribe {
        self.inner.subscribe(handler)
    }
}

#[test]
fn hello_retransmits_with_backoff_until_ack() {
    let executor = Arc::new(Executor::new());
    let spawner = Arc::new(ExecutorSpawner::new(executor.clone()));
    let peer = Arc::new(AckingPeer {
        inner: RecordingTransport::new(),
        hellos: AtomicUsize::new(0),
        answer: std::sync::atomic::AtomicBool::new(false),
    });
    let config = SessionConfig {
        label: "retry".into(),
        handshake: BackoffConfig {
            initial_delay_ms: 5,
            max_delay_ms: 20,
            growth_factor: 2,
        },
    };
    let session = Arc::new(
        Session::with_config(peer.clone(), spawner, Capabilities::new(), config).unwrap(),
    );

    block_on(executor.run(async move {
        // 5 + 10 + 20 = 35ms for the first three.
        Timer::after(Duration::from_millis(60)).await;
        assert!(peer.hellos.load(Ordering::SeqCst) >= 3);
        assert!(!session.is_ready());

        peer.answer.store(true, Ordering::SeqCst);
        session.ready().await.unwrap();
        let settled = peer.hellos.load(Ordering::SeqCst);

        Timer::after(Duration::from_millis(60)).await;
        assert_eq!(
            peer.hellos.load(Ordering::SeqCst),
            settled,
            "timer cancelled once Ready"
        );
    }));
}

/// Delivers the peer's Ack from inside `spawn`, i.e. while the session is
/// still starting its Hello timer.
struct AckWhileStarting {
    transport: Arc<RecordingTransport>,
    tasks: Arc<crate::mock_transport::ManualSpawner>,
}

impl Spawner for AckWhileStarting {
    fn spawn(&self, task: Task) {
        self.transport.inject(Message::ack());
        self.tasks.spawn(task);
    }
}

#[test]
fn ack_during_timer_start_still_cancels_timer() {
    let transport = RecordingTransport::new();
    let tasks = crate::mock_transport::ManualSpawner::new();
    let spawner = Arc::new(AckWhileStarting {
        transport: transport.clone(),
        tasks: tasks.clone(),
    });
    let session = Session::with_config(
        transport.clone(),
        spawner,
        Capabilities::new(),
        crate::mock_transport::quiet_config(),
    )
    .unwrap();
    assert!(session.is_ready());

    assert_eq!(tasks.run_until_stalled(), 1, "timer task ends on its first poll");
    assert_eq!(tasks.held(), 0);
    assert_eq!(transport.count("hello"), 0);
}
