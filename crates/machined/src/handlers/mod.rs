//! The machine operations served by both listeners.
//!
//! | Verb | Path | Handler |
//! |---|---|---|
//! | GET | `/machine`, `/machine/ls` | [`List`] |
//! | POST | `/machine/{name}/start` | [`Lifecycle`] |
//! | POST | `/machine/{name}/stop` | [`Lifecycle`] |
//! | POST | `/machine/{name}/restart` | [`Lifecycle`] |
//! | PUT | `/machine/{name}` | [`create`] |
//! | POST | `/machine/{name}/remove` | [`remove`] |

mod create;
mod lifecycle;
mod ls;
mod remove;

use serde::{Deserialize, Serialize};

use crate::error::MachineError;
use crate::operation::{OperationTable, Verb};
use crate::params::RequestContext;
use crate::status::StatusSettings;

pub use create::{create, shared_create_flags};
pub use lifecycle::{Action, Lifecycle};
pub use ls::List;
pub use remove::remove;

/// Envelope returned by every mutating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Success {
    /// Past-tense verb, e.g. `started`.
    pub action: String,
    /// Machine the action applied to.
    pub name: String,
}

impl Success {
    /// A success envelope for `action` on `name`.
    pub fn new(action: &str, name: &str) -> Self {
        Self {
            action: action.to_string(),
            name: name.to_string(),
        }
    }
}

fn machine_name(ctx: &RequestContext) -> Result<&str, MachineError> {
    ctx.name().ok_or(MachineError::RequireMachineName)
}

/// The full operation table.
pub fn operations(settings: StatusSettings) -> OperationTable {
    let list = List::new(settings);
    OperationTable::builder()
        .register(Verb::Get, "/machine", list.clone())
        .register(Verb::Get, "/machine/ls", list)
        .register(Verb::Post, "/machine/{name}/start", Lifecycle::new(Action::Start))
        .register(Verb::Post, "/machine/{name}/stop", Lifecycle::new(Action::Stop))
        .register(Verb::Post, "/machine/{name}/restart", Lifecycle::new(Action::Restart))
        .register(Verb::Put, "/machine/{name}", create)
        .register(Verb::Post, "/machine/{name}/remove", remove)
        .build()
}
