//! Request correlation.
//!
//! ```text
//!  call("add", [3,4])                                   peer
//!    │ register() ─▶ id 17, PendingCall ──┐
//!    │ Request{id:17} ────────────────────┼──────────▶ invoke()
//!    │                                    │                │
//!    │ resolve(17, Success{7}) ◀──────────┼──── Response{id:17}
//!    ▼                                    ▼
//!   PendingCall ── Ready(Ok(7))
//! ```
//!
//! Ids come from a per-session counter seeded at a random point in
//! `[0, 2^31 - 1)`. The counter wraps to 0 and skips ids that are still
//! outstanding. Each pending entry is removed by the first response
//! carrying its id; later duplicates find nothing and are ignored.

use core::future::Future;
use core::panic::AssertUnwindSafe;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::collections::HashMap;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::SystemTime;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::FutureExt;
use serde_json::Value;

use super::capability::Method;
use super::message::{CorrelationId, Outcome};
use super::path::CapabilityTree;
use crate::error::{Error, RemoteError, Result};
use crate::sync::Shared;

/// Ids stay below this bound; reaching it wraps the counter to 0.
pub const MAX_ID: CorrelationId = (1 << 31) - 1;

type Answer = core::result::Result<Value, RemoteError>;
type Completion = Arc<Signal<CriticalSectionRawMutex, Answer>>;

struct State {
    next_id: CorrelationId,
    pending: HashMap<CorrelationId, Completion>,
}

impl State {
    fn allocate(&mut self) -> CorrelationId {
        loop {
            if self.next_id >= MAX_ID {
                self.next_id = 0;
            }
            let id = self.next_id;
            self.next_id += 1;
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Client-side table of outstanding requests.
pub struct Correlator {
    state: Shared<State>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    /// Counter starts at a random point.
    pub fn new() -> Self {
        Self::with_seed(random_seed())
    }

    /// Counter starts at `seed` (reduced into range).
    pub fn with_seed(seed: CorrelationId) -> Self {
        Self {
            state: Shared::new(State {
                next_id: seed % MAX_ID,
                pending: HashMap::new(),
            }),
        }
    }

    /// Allocate an id and register its completion.
    pub fn register(&self) -> (CorrelationId, PendingCall) {
        let completion: Completion = Arc::new(Signal::new());
        let id = self.state.with(|s| {
            let id = s.allocate();
            s.pending.insert(id, completion.clone());
            id
        });
        (id, PendingCall::waiting(completion))
    }

    /// Complete the request `id`. Returns `false` for unknown or already
    /// completed ids.
    pub fn resolve(&self, id: CorrelationId, outcome: Outcome) -> bool {
        let Some(completion) = self.state.with(|s| s.pending.remove(&id)) else {
            return false;
        };
        completion.signal(outcome.into_result());
        true
    }

    /// Number of requests still waiting for a response.
    pub fn outstanding(&self) -> usize {
        self.state.with(|s| s.pending.len())
    }
}

/// Non-cryptographic start point from the std hasher's per-process keys.
fn random_seed() -> CorrelationId {
    let mut hasher = RandomState::new().build_hasher();
    SystemTime::now().hash(&mut hasher);
    (hasher.finish() % u64::from(MAX_ID)) as CorrelationId
}

// ── Pending call future ──────────────────────────────────────

enum CallState {
    Waiting(Pin<Box<dyn Future<Output = Answer> + Send>>),
    Failed(Option<Error>),
}

/// Resolves once with the peer's answer to one request.
///
/// There is no timeout: if the peer never answers, the future never
/// completes.
pub struct PendingCall {
    state: CallState,
}

impl PendingCall {
    fn waiting(completion: Completion) -> Self {
        Self {
            state: CallState::Waiting(Box::pin(async move { completion.wait().await })),
        }
    }

    /// A call that fails without reaching the wire.
    pub(crate) fn failed(error: Error) -> Self {
        Self {
            state: CallState::Failed(Some(error)),
        }
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            CallState::Waiting(wait) => {
                Future::poll(wait.as_mut(), cx).map(|result| result.map_err(Error::Remote))
            }
            CallState::Failed(error) => Poll::Ready(Err(error.take().unwrap_or(Error::Closed))),
        }
    }
}

// ── Server side ──────────────────────────────────────────────

/// Run the method at `name` with `args` and package the outcome.
///
/// Resolution happens immediately; the returned future owns everything it
/// needs and can be spawned. Errors and panics inside the method both
/// become `Failure`.
pub fn invoke(
    methods: &CapabilityTree<Method>,
    name: &str,
    args: Vec<Value>,
) -> impl Future<Output = Outcome> + Send + 'static {
    let method = methods.resolve(name).cloned();
    let name = name.to_owned();
    async move {
        let Some(method) = method else {
            return Outcome::from(Err(RemoteError::method_not_found(&name)));
        };
        let run = AssertUnwindSafe(async move { method(args).await }).catch_unwind();
        match run.await {
            Ok(Ok(value)) => Outcome::Success { value },
            Ok(Err(err)) => Outcome::Failure {
                error: RemoteError::from(err),
            },
            Err(panic) => Outcome::Failure {
                error: RemoteError::new(panic_message(panic.as_ref())),
            },
        }
    }
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("method panicked")
    }
}
