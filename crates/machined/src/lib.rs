//! Machined: one operation table, two wire transports.
//!
//! Machined exposes a fixed set of named operations on managed machines
//! (list, start, stop, restart, create, remove) so that the HTTP and SSH
//! surfaces share a single [`OperationTable`], a single [`Dispatcher`] and a
//! single backend. A request that arrives on either transport yields the
//! same JSON for the same logical operation.
//!
//! # Architecture
//!
//! ```text
//!  HTTP request ─┐                                  ┌─ Status Fan-Out
//!                ├─> OperationTable ─> Dispatcher ──┤   (ls only)
//!  SSH subsystem ┘      (resolve)     (AccessGuard, └─ MachineApi
//!                                      open/handle/     (fresh handle
//!                                      release/JSON)     per dispatch)
//! ```
//!
//! The table is built once at startup and never mutated afterwards, so both
//! listeners read it without locking. Every dispatch, whichever transport
//! admitted it, runs inside the process-wide [`AccessGuard`]: the backend
//! store is not safe for uncoordinated concurrent use.

pub mod backend;
mod dispatch;
mod error;
mod handler;
pub mod handlers;
mod operation;
mod params;
pub mod status;
mod tokenize;

pub use dispatch::{AccessGuard, AccessPermit, Dispatcher, Service};
pub use error::{DispatchError, MachineError};
pub use handler::{Handler, HandlerResult, reply};
pub use operation::{Operation, OperationTable, OperationTableBuilder, PathPattern, Verb};
pub use params::{FormParams, NamedParams, RequestContext};
pub use tokenize::tokenize;
