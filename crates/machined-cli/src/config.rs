//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Docker machine daemon: list, start, stop, restart, create and remove
/// machines over HTTP and SSH.
#[derive(Parser, Debug)]
#[command(name = "machined")]
#[command(about = "Serve Docker machine operations over HTTP and SSH")]
pub struct Args {
    /// HTTP listen address
    #[arg(long, env = "MACHINED_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub http_addr: SocketAddr,

    /// SSH listen address
    #[arg(long, env = "MACHINED_SSH_ADDR", default_value = "0.0.0.0:2200")]
    pub ssh_addr: SocketAddr,

    /// Private host key for the SSH listener
    #[arg(long, env = "MACHINED_HOST_KEY", default_value = "id_rsa")]
    pub host_key: PathBuf,

    /// Machine store root [default: ~/.docker/machine]
    #[arg(long, env = "MACHINE_STORAGE_PATH")]
    pub storage_path: Option<PathBuf>,

    /// Engine URL of the currently selected machine, for the active markers
    #[arg(long, env = "DOCKER_HOST")]
    pub docker_host: Option<String>,

    /// Seconds to wait for each machine's status when listing
    #[arg(long, env = "MACHINED_LS_TIMEOUT", default_value_t = 10)]
    pub ls_timeout: u64,

    /// Default log level, overridden per target by RUST_LOG
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,
}

impl Args {
    /// Where machine records live.
    pub fn storage_path(&self) -> PathBuf {
        match &self.storage_path {
            Some(path) => path.clone(),
            None => dirs::home_dir()
                .unwrap_or_default()
                .join(".docker")
                .join("machine"),
        }
    }

    /// Per-probe status timeout.
    pub fn ls_timeout(&self) -> Duration {
        Duration::from_secs(self.ls_timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_explicit_flags() {
        let args = Args::try_parse_from([
            "machined",
            "--http-addr",
            "127.0.0.1:9090",
            "--ssh-addr",
            "127.0.0.1:2222",
            "--host-key",
            "/etc/machined/host_key",
            "--storage-path",
            "/var/lib/machine",
            "--ls-timeout",
            "3",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.http_addr, "127.0.0.1:9090".parse().unwrap());
        assert_eq!(args.ssh_addr.port(), 2222);
        assert_eq!(args.host_key, PathBuf::from("/etc/machined/host_key"));
        assert_eq!(args.storage_path(), PathBuf::from("/var/lib/machine"));
        assert_eq!(args.ls_timeout(), Duration::from_secs(3));
        assert_eq!(args.log_level, tracing::Level::DEBUG);
    }

    #[test]
    fn test_storage_path_defaults_under_home() {
        let args = Args::try_parse_from(["machined"]).unwrap();
        if args.storage_path.is_none() {
            assert!(args.storage_path().ends_with(".docker/machine"));
        }
    }

    #[test]
    fn test_rejects_bad_address() {
        assert!(Args::try_parse_from(["machined", "--http-addr", "nowhere"]).is_err());
    }
}
