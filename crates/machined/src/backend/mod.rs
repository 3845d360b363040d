//! Machine backend: the external collaborator every handler talks to.
//!
//! The dispatcher obtains a fresh [`MachineApi`] handle from a
//! [`BackendFactory`] for each dispatch and drops it when the handler
//! returns. [`FileStore`] is the on-disk reference implementation; drivers
//! registered in a [`DriverRegistry`] do the actual machine work.

mod driver;
mod engine;
mod store;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MachineError;

pub use driver::{Driver, DriverFlag, DriverOptions, DriverRegistry, FlagValue, NoneDriver};
pub use engine::{EngineClient, HttpEngineClient};
pub use store::{FileStore, FileStoreFactory, is_valid_host_name};

/// Error text drivers report when a machine is simply not running.
pub const HOST_NOT_RUNNING: &str = "Host is not running";

/// Machine state as reported by a driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    /// Unknown or not yet determined.
    #[default]
    None,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Saved to disk.
    Saved,
    /// Stopped.
    Stopped,
    /// Stopping.
    Stopping,
    /// Starting.
    Starting,
    /// The machine could not be loaded or queried.
    Error,
    /// The status probe did not answer in time.
    Timeout,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            State::None => "",
            State::Running => "Running",
            State::Paused => "Paused",
            State::Saved => "Saved",
            State::Stopped => "Stopped",
            State::Stopping => "Stopping",
            State::Starting => "Starting",
            State::Error => "Error",
            State::Timeout => "Timeout",
        };
        f.write_str(text)
    }
}

/// Docker engine options recorded at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineOptions {
    /// Extra `--key=value` engine flags.
    pub arbitrary_flags: Vec<String>,
    /// Engine environment variables.
    pub env: Vec<String>,
    /// Insecure registries.
    pub insecure_registry: Vec<String>,
    /// Engine labels.
    pub labels: Vec<String>,
    /// Registry mirrors.
    pub registry_mirror: Vec<String>,
    /// Storage driver.
    pub storage_driver: String,
    /// Whether the engine requires TLS.
    #[serde(rename = "TlsVerify")]
    pub tls_verify: bool,
    /// Engine install script URL.
    #[serde(rename = "InstallURL")]
    pub install_url: String,
    /// Extra subject alternative names for the server certificate.
    #[serde(rename = "ServerCertSANs")]
    pub server_cert_sans: Vec<String>,
}

/// Swarm options recorded at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmOptions {
    /// Whether the machine is part of a swarm.
    pub is_swarm: bool,
    /// Whether the machine is the swarm master.
    pub master: bool,
    /// Swarm image.
    pub image: String,
    /// Discovery service.
    pub discovery: String,
    /// Advertised address.
    pub address: String,
    /// Swarm master listen URL, e.g. `tcp://0.0.0.0:3376`.
    pub host: String,
    /// Scheduling strategy.
    pub strategy: String,
    /// Extra swarm flags.
    pub arbitrary_flags: Vec<String>,
    /// Experimental features.
    pub is_experimental: bool,
}

/// Options that are not driver specific.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostOptions {
    /// Engine options.
    pub engine_options: EngineOptions,
    /// Swarm options.
    pub swarm_options: SwarmOptions,
}

/// A loaded machine.
#[derive(Clone)]
pub struct Host {
    /// Machine name.
    pub name: String,
    /// The driver operating this machine.
    pub driver: Arc<dyn Driver>,
    /// Non-driver options, when recorded.
    pub options: Option<HostOptions>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("name", &self.name)
            .field("driver", &self.driver.driver_name())
            .field("options", &self.options)
            .finish()
    }
}

impl Host {
    /// Name of this machine's driver.
    pub fn driver_name(&self) -> &str {
        self.driver.driver_name()
    }

    /// Endpoint URL, e.g. `tcp://192.168.99.100:2376`.
    pub async fn url(&self) -> Result<String, MachineError> {
        self.driver.url().await
    }

    /// Current state.
    pub async fn state(&self) -> Result<State, MachineError> {
        self.driver.state().await
    }

    /// Start the machine.
    pub async fn start(&self) -> Result<(), MachineError> {
        self.driver.start().await
    }

    /// Stop the machine.
    pub async fn stop(&self) -> Result<(), MachineError> {
        self.driver.stop().await
    }

    /// Restart the machine.
    pub async fn restart(&self) -> Result<(), MachineError> {
        self.driver.restart().await
    }
}

/// A machine that has been configured but not yet created.
pub struct NewHost {
    /// Machine name.
    pub name: String,
    /// Driver to configure before creation.
    pub driver: Box<dyn Driver>,
    /// Non-driver options.
    pub options: HostOptions,
}

impl fmt::Debug for NewHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewHost")
            .field("name", &self.name)
            .field("driver", &self.driver.driver_name())
            .finish_non_exhaustive()
    }
}

/// Result of loading every known machine.
#[derive(Debug, Default)]
pub struct LoadedHosts {
    /// Machines that loaded.
    pub hosts: Vec<Host>,
    /// Machines that failed to load, by name.
    pub errors: BTreeMap<String, String>,
}

/// Machine-management API backing every operation.
///
/// Handles are not safe for uncoordinated concurrent use; the dispatcher
/// serializes them behind its access guard.
#[async_trait]
pub trait MachineApi: Send + Sync {
    /// Whether a machine named `name` exists.
    async fn exists(&self, name: &str) -> Result<bool, MachineError>;

    /// Load one machine.
    async fn load(&self, name: &str) -> Result<Host, MachineError>;

    /// Load every machine, separating the ones that failed to load.
    async fn load_all(&self) -> Result<LoadedHosts, MachineError>;

    /// Prepare a machine using the named driver.
    async fn new_host(&self, name: &str, driver: &str) -> Result<NewHost, MachineError>;

    /// Create the machine through its driver and persist it.
    async fn create(&self, host: NewHost) -> Result<Host, MachineError>;

    /// Persist a machine's current configuration.
    async fn save(&self, host: &Host) -> Result<(), MachineError>;

    /// Forget a machine. The driver-side removal is the caller's job.
    async fn remove(&self, name: &str) -> Result<(), MachineError>;
}

/// Produces one fresh backend handle per dispatch.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Open a handle. Dropping the handle releases it.
    async fn open(&self) -> Result<Box<dyn MachineApi>, MachineError>;
}
