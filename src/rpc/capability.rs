//! Leaf capability types: callable methods and observable providers.
//!
//! A [`Method`] takes the request's argument array and returns a future of
//! `anyhow::Result<Value>`; errors become `Failure` results on the wire. A
//! [`Provider`] takes an [`Emitter`] and returns the [`Unsubscribe`] that
//! stops the underlying source.

use core::future::Future;
use core::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::path::CapabilityTree;
use crate::sync::Unsubscribe;

pub type MethodFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'static>>;

/// A callable exposed to the remote peer.
pub type Method = Arc<dyn Fn(Vec<Value>) -> MethodFuture + Send + Sync>;

/// Pushes one observed value to the remote subscriber.
pub type Emitter = Arc<dyn Fn(Value) + Send + Sync>;

/// Starts an observable source; the returned handle stops it.
pub type Provider = Arc<dyn Fn(Emitter) -> Unsubscribe + Send + Sync>;

/// Everything a session exposes to its peer.
#[derive(Default)]
pub struct Capabilities {
    pub methods: CapabilityTree<Method>,
    pub observables: CapabilityTree<Provider>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Wrap an async function as a [`Method`].
pub fn method<F, Fut>(f: F) -> Method
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |args: Vec<Value>| -> MethodFuture { Box::pin(f(args)) })
}

/// Wrap a synchronous function as a [`Method`].
pub fn sync_method<F>(f: F) -> Method
where
    F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(move |args: Vec<Value>| -> MethodFuture {
        let result = f(args);
        Box::pin(async move { result })
    })
}

/// Wrap a typed async function. The argument array is deserialized into
/// `A` (usually a tuple, `()` for no arguments) and the result serialized
/// back to a `Value`.
pub fn typed_method<A, R, F, Fut>(f: F) -> Method
where
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |args: Vec<Value>| -> MethodFuture {
        let f = f.clone();
        Box::pin(async move {
            let parsed: A = decode_args(args)?;
            let out = f(parsed).await?;
            Ok::<_, anyhow::Error>(serde_json::to_value(out)?)
        })
    })
}

/// An empty argument array also decodes as `null`, which unit-like `A`
/// (`()`, unit structs) requires.
fn decode_args<A: DeserializeOwned>(args: Vec<Value>) -> serde_json::Result<A> {
    let empty = args.is_empty();
    match serde_json::from_value(Value::Array(args)) {
        Err(_) if empty => serde_json::from_value(Value::Null),
        parsed => parsed,
    }
}

/// Wrap a closure as an observable [`Provider`].
pub fn provider<F>(f: F) -> Provider
where
    F: Fn(Emitter) -> Unsubscribe + Send + Sync + 'static,
{
    Arc::new(f)
}
