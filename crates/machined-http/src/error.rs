use std::net::SocketAddr;

use thiserror::Error;

/// Errors from running the HTTP listener.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The listen address could not be bound.
    #[error("Failed to listen on {addr} ({source})")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The server stopped with an I/O error.
    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),
}
