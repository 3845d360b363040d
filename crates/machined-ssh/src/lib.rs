//! SSH listener for machined.
//!
//! Each operation is reachable as an SSH subsystem named after its path
//! without the leading slash:
//!
//! ```text
//! ssh localhost -p 2200 -s machine/ls
//! ssh localhost -p 2200 -s 'machine/{name}/start dev'
//! ```
//!
//! One subsystem request carries one command line. Positional arguments
//! bind to the operation's placeholders in order; leftover `--key value`,
//! `--key=value` and bare `--flag` tokens become form parameters. The
//! channel receives the JSON result, `ERROR: <message>`, or `UNKNOWN`, and
//! is then closed.

mod command;
mod error;
mod key;
mod server;
mod session;

pub use command::{UNKNOWN, answer};
pub use error::SshError;
pub use key::load_host_key;
pub use server::SshServer;
