//! Error types shared by handlers and the dispatch pipeline.

use thiserror::Error;

/// Domain errors raised by handlers and the machine backend.
///
/// Transports never look inside these: the HTTP listener maps any of them
/// to a 500 and the SSH listener writes `ERROR: <message>`.
#[derive(Debug, Error)]
pub enum MachineError {
    /// The operation needs a machine name and none was bound.
    #[error("Requires one machine name")]
    RequireMachineName,
    /// `create` needs exactly one `driver` form value.
    #[error("Requires a driver name")]
    RequireDriverName,
    /// The requested machine name is not a valid host name.
    #[error("Error creating machine: Invalid hostname specified. Allowed hostname chars are: 0-9a-zA-Z . -")]
    InvalidHostName(String),
    /// A machine with this name already exists.
    #[error("Machine {0} already exists")]
    HostAlreadyExists(String),
    /// No machine with this name exists.
    #[error("Host does not exist: \"{0}\"")]
    HostDoesNotExist(String),
    /// No driver is registered under this name.
    #[error("Driver \"{0}\" not found")]
    UnknownDriver(String),
    /// The driver cannot perform the requested action.
    #[error("{0}")]
    Unsupported(String),
    /// A driver flag value could not be parsed.
    #[error("Invalid value {value:?} for flag {flag}")]
    InvalidFlag {
        /// Flag name.
        flag: String,
        /// Offending value.
        value: String,
    },
    /// Failure reported by a driver.
    #[error("{0}")]
    Driver(String),
    /// I/O error on the machine record directory.
    #[error("Error accessing machine store: {0}")]
    Store(#[from] std::io::Error),
    /// A machine record could not be encoded or decoded.
    #[error("Error reading machine record: {0}")]
    Record(#[from] serde_json::Error),
}

/// Failures of the dispatch pipeline itself.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No operation matched the request.
    #[error("no operation matches {0}")]
    NotFound(String),
    /// A backend handle could not be opened.
    #[error("{0}")]
    Backend(#[source] MachineError),
    /// The handler returned an error.
    #[error("{0}")]
    Handler(#[source] MachineError),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
    /// The handler result could not be serialized.
    #[error("failed to encode result: {0}")]
    Encode(#[source] serde_json::Error),
}
