//! Accept loop: one task per connection, failures stay per connection.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use machined::Service;
use russh::MethodSet;
use russh::server::{self, Config};
use russh_keys::key::KeyPair;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::SshError;
use crate::session::SessionHandler;

/// A bound SSH listener over the shared operation table.
///
/// Clients are not authenticated; the server identifies itself with its
/// host key.
pub struct SshServer {
    listener: TcpListener,
    config: Arc<Config>,
    service: Arc<Service>,
}

impl fmt::Debug for SshServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshServer")
            .field("listener", &self.listener)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl SshServer {
    /// Bind `addr` with `host_key`. Nothing is served yet.
    pub async fn bind(
        addr: SocketAddr,
        host_key: KeyPair,
        service: Arc<Service>,
    ) -> Result<Self, SshError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SshError::Bind { addr, source })?;
        let config = Config {
            methods: MethodSet::NONE,
            keys: vec![host_key],
            ..Default::default()
        };
        Ok(Self {
            listener,
            config: Arc::new(config),
            service,
        })
    }

    /// The address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        match self.local_addr() {
            Ok(addr) => info!("SSH listening on {addr}"),
            Err(e) => warn!(error = %e, "SSH listening on unknown address"),
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted TCP connection");
                        tokio::spawn(serve_connection(
                            self.config.clone(),
                            stream,
                            peer,
                            self.service.clone(),
                        ));
                    }
                    Err(e) => warn!("Failed to accept incoming connection ({e})"),
                },
            }
        }
        info!("SSH listener shut down");
    }
}

async fn serve_connection(
    config: Arc<Config>,
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<Service>,
) {
    let handler = SessionHandler::new(service, peer);
    let session = match server::run_stream(config, stream, handler).await {
        Ok(session) => session,
        Err(e) => {
            warn!(%peer, "Failed to handshake ({e})");
            return;
        }
    };
    match session.await {
        Ok(()) => debug!(%peer, "SSH connection closed"),
        Err(e) => warn!(%peer, "SSH connection ended ({e})"),
    }
}
