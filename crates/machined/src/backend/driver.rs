//! Drivers do the machine-specific work behind a [`Host`](super::Host).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::State;
use crate::error::MachineError;

/// A configuration flag a driver accepts at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverFlag {
    /// Single string value.
    String {
        /// Flag name.
        name: String,
        /// Default value.
        default: String,
    },
    /// Repeatable string value.
    StringSlice {
        /// Flag name.
        name: String,
        /// Default values.
        default: Vec<String>,
    },
    /// Integer value.
    Int {
        /// Flag name.
        name: String,
        /// Default value.
        default: i64,
    },
    /// Boolean switch, `false` unless sent as `"true"`.
    Bool {
        /// Flag name.
        name: String,
    },
}

impl DriverFlag {
    /// Flag name.
    pub fn name(&self) -> &str {
        match self {
            DriverFlag::String { name, .. }
            | DriverFlag::StringSlice { name, .. }
            | DriverFlag::Int { name, .. }
            | DriverFlag::Bool { name } => name,
        }
    }

    /// Value used when the flag is not sent.
    pub fn default_value(&self) -> FlagValue {
        match self {
            DriverFlag::String { default, .. } => FlagValue::String(default.clone()),
            DriverFlag::StringSlice { default, .. } => FlagValue::StringSlice(default.clone()),
            DriverFlag::Int { default, .. } => FlagValue::Int(*default),
            DriverFlag::Bool { .. } => FlagValue::Bool(false),
        }
    }
}

/// A resolved flag value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// String value.
    String(String),
    /// String list.
    StringSlice(Vec<String>),
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
}

/// Resolved driver flag values, keyed by flag name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverOptions {
    values: BTreeMap<String, FlagValue>,
}

impl DriverOptions {
    /// Set a flag value.
    pub fn insert(&mut self, name: impl Into<String>, value: FlagValue) {
        self.values.insert(name.into(), value);
    }

    /// Raw value for `name`.
    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.values.get(name)
    }

    /// String value for `name`, or empty.
    pub fn string(&self, name: &str) -> String {
        match self.values.get(name) {
            Some(FlagValue::String(value)) => value.clone(),
            _ => String::new(),
        }
    }

    /// String list for `name`, or empty.
    pub fn string_slice(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(FlagValue::StringSlice(values)) => values.clone(),
            _ => Vec::new(),
        }
    }

    /// Integer for `name`, or 0.
    pub fn int(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(FlagValue::Int(value)) => *value,
            _ => 0,
        }
    }

    /// Boolean for `name`, or `false`.
    pub fn bool(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(FlagValue::Bool(true)))
    }
}

/// Machine-specific operations.
///
/// Configuration methods run before the driver is shared; runtime methods
/// may be called concurrently by the status fan-out.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Registered driver name.
    fn driver_name(&self) -> &str;

    /// Flags accepted at creation time.
    fn create_flags(&self) -> Vec<DriverFlag>;

    /// Apply resolved creation flags.
    fn set_config_from_flags(&mut self, options: &DriverOptions) -> Result<(), MachineError>;

    /// Driver configuration to persist alongside the machine record.
    fn config(&self) -> serde_json::Value;

    /// Endpoint URL of the machine's engine.
    async fn url(&self) -> Result<String, MachineError>;

    /// Current machine state.
    async fn state(&self) -> Result<State, MachineError>;

    /// Provision the machine.
    async fn create(&self) -> Result<(), MachineError>;

    /// Start the machine.
    async fn start(&self) -> Result<(), MachineError>;

    /// Stop the machine.
    async fn stop(&self) -> Result<(), MachineError>;

    /// Restart the machine.
    async fn restart(&self) -> Result<(), MachineError>;

    /// Destroy the machine's resources.
    async fn remove(&self) -> Result<(), MachineError>;
}

type Constructor = Arc<
    dyn Fn(&str, Option<&serde_json::Value>) -> Result<Box<dyn Driver>, MachineError> + Send + Sync,
>;

/// Driver constructors by name.
///
/// A constructor receives the machine name and, when restoring a saved
/// machine, the configuration previously returned by [`Driver::config`].
#[derive(Clone, Default)]
pub struct DriverRegistry {
    constructors: HashMap<String, Constructor>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("DriverRegistry")
            .field("drivers", &names)
            .finish()
    }
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in drivers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(NoneDriver::NAME, |machine, config| {
            let driver = match config {
                Some(config) => NoneDriver::restore(config)?,
                None => NoneDriver::new(machine),
            };
            Ok(Box::new(driver) as Box<dyn Driver>)
        });
        registry
    }

    /// Register a driver constructor under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&str, Option<&serde_json::Value>) -> Result<Box<dyn Driver>, MachineError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    /// Whether a driver named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// A fresh, unconfigured driver for a new machine.
    pub fn new_driver(&self, name: &str, machine: &str) -> Result<Box<dyn Driver>, MachineError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| MachineError::UnknownDriver(name.to_string()))?;
        constructor(machine, None)
    }

    /// A driver restored from its saved configuration.
    pub fn restore(
        &self,
        name: &str,
        machine: &str,
        config: &serde_json::Value,
    ) -> Result<Box<dyn Driver>, MachineError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| MachineError::UnknownDriver(name.to_string()))?;
        constructor(machine, Some(config))
    }
}

/// Driver for machines managed elsewhere: it only knows the engine URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NoneDriver {
    machine_name: String,
    #[serde(rename = "URL")]
    url: String,
}

impl NoneDriver {
    /// Registered name.
    pub const NAME: &'static str = "none";

    /// An unconfigured driver for `machine`.
    pub fn new(machine: &str) -> Self {
        Self {
            machine_name: machine.to_string(),
            url: String::new(),
        }
    }

    /// Restore from saved configuration.
    pub fn restore(config: &serde_json::Value) -> Result<Self, MachineError> {
        Ok(Self::deserialize(config)?)
    }

    fn unsupported(action: &str) -> MachineError {
        MachineError::Unsupported(format!("hosts without a driver cannot be {action}"))
    }
}

#[async_trait]
impl Driver for NoneDriver {
    fn driver_name(&self) -> &str {
        Self::NAME
    }

    fn create_flags(&self) -> Vec<DriverFlag> {
        vec![DriverFlag::String {
            name: "url".to_string(),
            default: String::new(),
        }]
    }

    fn set_config_from_flags(&mut self, options: &DriverOptions) -> Result<(), MachineError> {
        let url = options.string("url");
        if url.is_empty() {
            return Err(MachineError::Driver(
                "--url option is required for the none driver".to_string(),
            ));
        }
        self.url = url;
        Ok(())
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({ "MachineName": self.machine_name, "URL": self.url })
    }

    async fn url(&self) -> Result<String, MachineError> {
        Ok(self.url.clone())
    }

    async fn state(&self) -> Result<State, MachineError> {
        Ok(State::Running)
    }

    async fn create(&self) -> Result<(), MachineError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), MachineError> {
        Err(Self::unsupported("started"))
    }

    async fn stop(&self) -> Result<(), MachineError> {
        Err(Self::unsupported("stopped"))
    }

    async fn restart(&self) -> Result<(), MachineError> {
        Err(Self::unsupported("restarted"))
    }

    async fn remove(&self) -> Result<(), MachineError> {
        Ok(())
    }
}
