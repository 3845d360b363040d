//! Dispatch pipeline: run one handler under the backend access guard.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::backend::BackendFactory;
use crate::error::DispatchError;
use crate::handler::Handler;
use crate::operation::{OperationTable, Verb};
use crate::params::{FormParams, RequestContext};

/// Process-wide gate around the backend.
///
/// The backend store tolerates a single writer only, so every dispatch from
/// every transport enters this one critical section. It is passed to the
/// [`Dispatcher`] explicitly rather than living in a global.
#[derive(Debug, Default)]
pub struct AccessGuard {
    gate: Mutex<()>,
}

/// Proof of being inside the [`AccessGuard`]; dropping it leaves.
#[derive(Debug)]
pub struct AccessPermit<'a> {
    _held: MutexGuard<'a, ()>,
}

impl AccessGuard {
    /// A new, open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access.
    pub async fn enter(&self) -> AccessPermit<'_> {
        AccessPermit {
            _held: self.gate.lock().await,
        }
    }
}

/// Runs handlers against fresh backend handles, one at a time.
#[derive(Clone)]
pub struct Dispatcher {
    guard: Arc<AccessGuard>,
    backend: Arc<dyn BackendFactory>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// A dispatcher sharing `guard` and opening handles from `backend`.
    pub fn new(guard: Arc<AccessGuard>, backend: Arc<dyn BackendFactory>) -> Self {
        Self { guard, backend }
    }

    /// Run `handler` and serialize its result as JSON.
    ///
    /// Inside the guard the backend handle is opened, the handler runs, and
    /// the handle is dropped before anything else happens, whether the
    /// handler succeeded, failed, or panicked.
    pub async fn dispatch(
        &self,
        handler: &dyn Handler,
        ctx: &RequestContext,
    ) -> Result<Vec<u8>, DispatchError> {
        let outcome = {
            let _permit = self.guard.enter().await;
            let api = self.backend.open().await.map_err(DispatchError::Backend)?;
            debug!("backend handle opened");
            let outcome = AssertUnwindSafe(handler.handle(api.as_ref(), ctx))
                .catch_unwind()
                .await;
            drop(api);
            debug!("backend handle released");
            outcome
        };

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return Err(DispatchError::Handler(e)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(error = %message, "handler panicked");
                return Err(DispatchError::Panicked(message));
            }
        };
        serde_json::to_vec(&value).map_err(DispatchError::Encode)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The operation table and dispatcher both transports share.
#[derive(Debug, Clone)]
pub struct Service {
    table: Arc<OperationTable>,
    dispatcher: Dispatcher,
}

impl Service {
    /// Bundle a table with its dispatcher.
    pub fn new(table: Arc<OperationTable>, dispatcher: Dispatcher) -> Self {
        Self { table, dispatcher }
    }

    /// The shared operation table.
    pub fn table(&self) -> &OperationTable {
        &self.table
    }

    /// The shared dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Resolve an HTTP-style request and dispatch it.
    pub async fn call_route(
        &self,
        verb: Verb,
        path: &str,
        form: FormParams,
    ) -> Result<Vec<u8>, DispatchError> {
        let (operation, named) = self
            .table
            .resolve_route(verb, path)
            .ok_or_else(|| DispatchError::NotFound(format!("{verb} {path}")))?;
        let ctx = RequestContext::new(named, form);
        self.dispatcher.dispatch(operation.handler(), &ctx).await
    }

    /// Resolve an SSH-style command and dispatch it with positional `args`.
    pub async fn call_command(
        &self,
        command: &str,
        args: &[String],
    ) -> Result<Vec<u8>, DispatchError> {
        let operation = self
            .table
            .resolve_command(command)
            .ok_or_else(|| DispatchError::NotFound(command.to_string()))?;
        let ctx = RequestContext::from_args(&operation.pattern().placeholders(), args);
        self.dispatcher.dispatch(operation.handler(), &ctx).await
    }
}
