//! Port traits: the boundary between the protocol core and the host runtime.
//!
//! ```text
//!   Session ──▶ Spawner port ──▶ host executor (edge-executor, ...)
//! ```
//!
//! The core never owns an executor. Method invocations and the handshake
//! timer are handed to the embedding application's executor through
//! [`Spawner`]; [`ExecutorSpawner`] is the adapter for `edge-executor`.

use core::future::Future;
use core::pin::Pin;
use std::sync::Arc;

use edge_executor::Executor;

/// A detached unit of work.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Spawns detached tasks on the host executor.
pub trait Spawner: Send + Sync {
    fn spawn(&self, task: Task);
}

/// Boxes and spawns `fut` on `spawner`.
pub fn spawn_detached<F>(spawner: &dyn Spawner, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    spawner.spawn(Box::pin(fut));
}

// ───────────────────────────────────────────────────────────────
// edge-executor adapter
// ───────────────────────────────────────────────────────────────

/// Spawns onto a shared `edge_executor::Executor`.
///
/// The executor still has to be driven by the host, e.g.
/// `futures_lite::future::block_on(executor.run(main_future))`.
#[derive(Clone)]
pub struct ExecutorSpawner {
    executor: Arc<Executor<'static>>,
}

impl ExecutorSpawner {
    pub fn new(executor: Arc<Executor<'static>>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<Executor<'static>> {
        &self.executor
    }
}

impl Spawner for ExecutorSpawner {
    fn spawn(&self, task: Task) {
        self.executor.spawn(task).detach();
    }
}
