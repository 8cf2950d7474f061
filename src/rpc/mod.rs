//! Transport-agnostic RPC subsystem.
//!
//! Method calls, fire-and-forget events and reference-counted observables
//! between two peers joined by any [`Transport`](transport::Transport).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Session                               │
//! │                                                             │
//! │  ┌────────────┐  Command   ┌────────────┐  Request ┌───────┐ │
//! │  │ Transport  │──────────▶│ Correlator │─────────▶│methods│ │
//! │  │ (trait)    │  Event     ├────────────┤          └───────┘ │
//! │  │            │──────────▶│  Events    │                    │
//! │  │            │  Watch     ├────────────┤ Subscribe┌───────┐ │
//! │  │            │──────────▶│  Observe   │─────────▶│provid.│ │
//! │  └────────────┘            └────────────┘          └───────┘ │
//! │       ▲                          │                          │
//! │       │       ┌──────────────────┘                          │
//! │       │       ▼                                             │
//! │  ┌────────────────┐                                         │
//! │  │   Send gate    │  (queues until Handshake/Ack)           │
//! │  └────────────────┘                                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod capability;
pub mod channels;
pub mod codec;
pub mod correlator;
pub mod framed;
pub mod gate;
pub mod message;
pub mod observe;
pub mod path;
pub mod session;
pub mod transport;

use message::Message;

/// Outbound sink shared by the protocol components.
///
/// `enqueue` only queues; `flush` sends whatever the handshake state
/// allows. Components enqueue inside their own critical section so wire
/// order follows the order of state changes, then flush outside it.
pub trait Outbox: Send + Sync {
    fn enqueue(&self, message: Message);
    fn flush(&self);
}
