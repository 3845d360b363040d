use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that prevent the SSH listener from starting.
#[derive(Debug, Error)]
pub enum SshError {
    /// The host key file could not be read.
    #[error(
        "Failed to load private key ({}). You can generate a keypair with 'ssh-keygen -t rsa -f {}'",
        path.display(),
        path.display()
    )]
    NoPrivateKey {
        /// Key file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The host key file is not a usable private key.
    #[error("Failed to parse private key ({})", path.display())]
    ParsePrivateKey {
        /// Key file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: russh_keys::Error,
    },
    /// The listen address could not be bound.
    #[error("Failed to listen on {addr} ({source})")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}
