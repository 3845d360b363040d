//! The unit of business logic behind one operation.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;

use crate::backend::MachineApi;
use crate::error::MachineError;
use crate::params::RequestContext;

/// Result of one handler invocation.
pub type HandlerResult = Result<serde_json::Value, MachineError>;

/// Business logic for one operation.
///
/// Handlers are stateless capabilities: the dispatcher hands them a backend
/// handle that lives for exactly one invocation, plus the request's named
/// and form parameters. Struct handlers implement this trait directly; plain
/// functions of shape
/// `fn(&dyn MachineApi, &RequestContext) -> BoxFuture<'_, HandlerResult>`
/// get it through the blanket implementation below.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Run the operation against `api`.
    async fn handle(&self, api: &dyn MachineApi, ctx: &RequestContext) -> HandlerResult;
}

#[async_trait]
impl<F> Handler for F
where
    F: for<'a> Fn(&'a dyn MachineApi, &'a RequestContext) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync,
{
    async fn handle(&self, api: &dyn MachineApi, ctx: &RequestContext) -> HandlerResult {
        self(api, ctx).await
    }
}

/// Serialize a handler's domain value.
pub fn reply<T: Serialize>(value: &T) -> HandlerResult {
    Ok(serde_json::to_value(value)?)
}
