//! Handler types for events and requests

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::error::BoxError;

/// Identifies one event subscription, stable across `change_adapter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

/// Event subscriber. Errors are logged by the bus and never reach the sender.
pub type EventHandler = Arc<dyn Fn(&Value) -> Result<(), BoxError> + Send + Sync>;

/// Request handler, at most one per name
pub type RequestHandler = Arc<dyn Fn(Value) -> Reply + Send + Sync>;

pub type ReplyFuture = BoxFuture<'static, Result<Value, String>>;

/// What a request handler produced
///
/// The two completion paths are separate variants so the bus never has
/// to guess whether a return value is still running.
pub enum Reply {
    /// Answer is available now
    Ready(Result<Value, String>),
    /// Answer arrives later; driven on the Tokio runtime
    Deferred(ReplyFuture),
}

impl Reply {
    pub fn ok(value: Value) -> Self {
        Reply::Ready(Ok(value))
    }

    pub fn err(reason: impl Display) -> Self {
        Reply::Ready(Err(reason.to_string()))
    }

    pub fn ready<E: Display>(result: Result<Value, E>) -> Self {
        Reply::Ready(result.map_err(|e| e.to_string()))
    }

    pub fn deferred<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<Value, E>> + Send + 'static,
        E: Display,
    {
        Reply::Deferred(future.map(|result| result.map_err(|e| e.to_string())).boxed())
    }
}

impl<E: Display> From<Result<Value, E>> for Reply {
    fn from(result: Result<Value, E>) -> Self {
        Reply::ready(result)
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Reply::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Clone)]
pub(crate) struct Subscription {
    pub id: HandlerId,
    pub handler: EventHandler,
    pub once: bool,
}
