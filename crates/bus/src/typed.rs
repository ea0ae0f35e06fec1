//! Typed façade over the JSON bus
//!
//! Pairs each event or request name with its payload types at compile
//! time. Everything still crosses the wire as JSON, so a peer that sends
//! the wrong shape is reported as a handler error, not a panic.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::bus::Bus;
use crate::config::Timeout;
use crate::error::{BoxError, Result};
use crate::handler::{HandlerId, Reply};

/// An event name bound to its payload type
pub trait TypedEvent {
    const NAME: &'static str;
    type Payload: Serialize + DeserializeOwned;
}

/// A request name bound to its parameter and result types
pub trait TypedRequest {
    const NAME: &'static str;
    type Params: Serialize + DeserializeOwned;
    type Output: Serialize + DeserializeOwned;
}

impl Bus {
    pub fn emit<E: TypedEvent>(&self, payload: &E::Payload) -> Result<()> {
        self.dispatch_event(E::NAME, Some(serde_json::to_value(payload)?))
    }

    pub fn subscribe<E, F>(&self, handler: F) -> Result<HandlerId>
    where
        E: TypedEvent + 'static,
        F: Fn(E::Payload) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add_event_handler(E::NAME, Arc::new(decode_event::<E, F>(handler)), false)
    }

    pub fn subscribe_once<E, F>(&self, handler: F) -> Result<HandlerId>
    where
        E: TypedEvent + 'static,
        F: Fn(E::Payload) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add_event_handler(E::NAME, Arc::new(decode_event::<E, F>(handler)), true)
    }

    pub async fn call<R: TypedRequest>(&self, params: &R::Params) -> Result<R::Output> {
        let value = self.request(R::NAME, Some(serde_json::to_value(params)?)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn call_with_timeout<R: TypedRequest>(
        &self,
        params: &R::Params,
        timeout: Timeout,
    ) -> Result<R::Output> {
        let value = self
            .request_with_timeout(R::NAME, Some(serde_json::to_value(params)?), timeout)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Register a synchronous typed handler
    pub fn serve<R, F, E>(&self, handler: F) -> Result<()>
    where
        R: TypedRequest + 'static,
        F: Fn(R::Params) -> std::result::Result<R::Output, E> + Send + Sync + 'static,
        E: Display + 'static,
    {
        self.insert_request_handler(
            R::NAME,
            Arc::new(move |data: Value| match serde_json::from_value::<R::Params>(data) {
                Ok(params) => {
                    Reply::ready(handler(params).map_err(|e| e.to_string()).and_then(encode))
                }
                Err(e) => Reply::err(e),
            }),
        )
    }

    /// Register an asynchronous typed handler
    pub fn serve_async<R, F, Fut, E>(&self, handler: F) -> Result<()>
    where
        R: TypedRequest + 'static,
        R::Output: Send,
        F: Fn(R::Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R::Output, E>> + Send + 'static,
        E: Display + 'static,
    {
        self.insert_request_handler(
            R::NAME,
            Arc::new(move |data: Value| match serde_json::from_value::<R::Params>(data) {
                Ok(params) => {
                    let pending = handler(params);
                    Reply::deferred(async move {
                        pending.await.map_err(|e| e.to_string()).and_then(encode)
                    })
                }
                Err(e) => Reply::err(e),
            }),
        )
    }
}

fn decode_event<E, F>(
    handler: F,
) -> impl Fn(&Value) -> std::result::Result<(), BoxError> + Send + Sync + 'static
where
    E: TypedEvent + 'static,
    F: Fn(E::Payload) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
{
    move |data: &Value| {
        let payload = <E::Payload as Deserialize>::deserialize(data)?;
        handler(payload)
    }
}

fn encode<T: Serialize>(output: T) -> std::result::Result<Value, String> {
    serde_json::to_value(output).map_err(|e| e.to_string())
}
