//! Per-connection SSH protocol handling.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use machined::Service;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId};
use tracing::{debug, info, warn};

use crate::command::answer;

/// Serves subsystem requests on one connection.
///
/// Only `session` channels are accepted. Each subsystem request is
/// acknowledged at once, answered on its own task, and the channel is
/// closed after the single response.
pub(crate) struct SessionHandler {
    service: Arc<Service>,
    peer: SocketAddr,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl SessionHandler {
    pub(crate) fn new(service: Arc<Service>, peer: SocketAddr) -> Self {
        Self {
            service,
            peer,
            channels: HashMap::new(),
        }
    }

    fn reject(&self, kind: &str) {
        warn!(peer = %self.peer, "unknown channel type: {kind}");
    }
}

#[async_trait]
impl Handler for SessionHandler {
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        info!(peer = %self.peer, %user, "New SSH connection");
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!(peer = %self.peer, channel = ?channel.id(), "session channel opened");
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.reject("direct-tcpip");
        Ok(false)
    }

    async fn channel_open_x11(
        &mut self,
        _channel: Channel<Msg>,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.reject("x11");
        Ok(false)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.channel_success(channel_id);

        let Some(channel) = self.channels.remove(&channel_id) else {
            warn!(peer = %self.peer, channel = ?channel_id, "subsystem request on unknown channel");
            return Ok(());
        };

        let service = self.service.clone();
        let peer = self.peer;
        let command_line = name.to_string();
        tokio::spawn(async move {
            debug!(%peer, %command_line, "subsystem request");
            let output = answer(&service, &command_line).await;
            if let Err(e) = channel.data(output.as_slice()).await {
                warn!(%peer, error = %e, "failed to write subsystem response");
            }
            if let Err(e) = channel.close().await {
                debug!(%peer, error = %e, "failed to close channel");
            }
        });
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.channels.remove(&channel);
        Ok(())
    }
}
