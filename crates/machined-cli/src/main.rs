//! Machined daemon
//!
//! Serves the Docker machine operations over HTTP and over SSH subsystem
//! requests. Both listeners share one operation table, one access guard and
//! one machine store.

mod config;

use std::sync::Arc;

use clap::Parser;
use machined::backend::{DriverRegistry, FileStoreFactory, HttpEngineClient};
use machined::handlers::operations;
use machined::status::StatusSettings;
use machined::{AccessGuard, Dispatcher, Service};
use machined_http::HttpServer;
use machined_ssh::{SshServer, load_host_key};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(args.log_level.into()))
        .init();

    run(args).await.inspect_err(|e| {
        tracing::error!("{e:#}");
    })
}

async fn run(args: Args) -> anyhow::Result<()> {
    let storage_path = args.storage_path();
    tracing::info!("Using machine store at {}", storage_path.display());

    let settings = StatusSettings {
        timeout: args.ls_timeout(),
        active_host: args.docker_host.clone(),
        engine: Arc::new(HttpEngineClient::new(args.ls_timeout())?),
    };
    let backend = FileStoreFactory::new(storage_path, DriverRegistry::with_builtin());
    let dispatcher = Dispatcher::new(Arc::new(AccessGuard::new()), Arc::new(backend));
    let service = Arc::new(Service::new(Arc::new(operations(settings)), dispatcher));

    // Everything that can fail at startup happens before anything is served.
    let host_key = load_host_key(&args.host_key).await?;
    let http = HttpServer::bind(args.http_addr, service.clone()).await?;
    let ssh = SshServer::bind(args.ssh_addr, host_key, service).await?;

    let http_port = http.local_addr()?.port();
    let ssh_port = ssh.local_addr()?.port();
    tracing::info!(" - List the Docker Machines with: http GET http://localhost:{http_port}/machine/ls");
    tracing::info!(" - List the Docker Machines with: ssh localhost -p {ssh_port} -s machine/ls");

    let (stop, stopped) = watch::channel(false);
    let mut http_task = tokio::spawn(http.serve(wait_for_stop(stopped.clone())));
    let ssh_task = tokio::spawn(ssh.serve(wait_for_stop(stopped)));

    let finished_early = tokio::select! {
        () = shutdown_signal() => None,
        result = &mut http_task => Some(result),
    };
    // Receivers may already be gone if a listener stopped on its own.
    let _ = stop.send(true);

    let http_result = match finished_early {
        Some(result) => result,
        None => http_task.await,
    };
    ssh_task.await?;
    http_result??;

    tracing::info!("machined shut down");
    Ok(())
}

async fn wait_for_stop(mut stopped: watch::Receiver<bool>) {
    let _ = stopped.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
