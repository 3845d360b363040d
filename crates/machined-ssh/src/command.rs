//! One subsystem command line in, one response payload out.

use machined::{DispatchError, Service, tokenize};
use tracing::{debug, error};

/// Payload written when the command names no operation.
pub const UNKNOWN: &[u8] = b"UNKNOWN";

/// Answer a raw subsystem command line.
///
/// The first token names the operation and the rest are its arguments.
/// The answer is the operation's JSON, `ERROR: <message>` when it failed,
/// or [`UNKNOWN`] when no operation has that name.
pub async fn answer(service: &Service, command_line: &str) -> Vec<u8> {
    let tokens = tokenize(command_line);
    let Some((command, args)) = tokens.split_first() else {
        debug!("empty subsystem command");
        return UNKNOWN.to_vec();
    };

    match service.call_command(command, args).await {
        Ok(json) => json,
        Err(DispatchError::NotFound(_)) => {
            debug!(%command, "unknown subsystem command");
            UNKNOWN.to_vec()
        }
        Err(e) => {
            error!(%command, error = %e, "subsystem command failed");
            format!("ERROR: {e}").into_bytes()
        }
    }
}
