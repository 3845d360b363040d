//! On-disk machine records.
//!
//! Layout: `<root>/machines/<name>/config.json`, one JSON record per
//! machine holding the driver name, the driver's own configuration and the
//! host options.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{BackendFactory, DriverRegistry, Host, HostOptions, LoadedHosts, MachineApi, NewHost};
use crate::error::MachineError;

const CONFIG_VERSION: u32 = 3;
const RECORD_FILE: &str = "config.json";

static HOST_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9\-\.]*$").ok());

/// Whether `name` is acceptable as a machine name.
pub fn is_valid_host_name(name: &str) -> bool {
    HOST_NAME
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HostRecord {
    config_version: u32,
    name: String,
    driver_name: String,
    driver: serde_json::Value,
    #[serde(default)]
    host_options: Option<HostOptions>,
}

/// [`MachineApi`] over a directory of JSON records.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    drivers: DriverRegistry,
}

impl FileStore {
    /// A store rooted at `root` using `drivers` to rebuild machines.
    pub fn new(root: impl Into<PathBuf>, drivers: DriverRegistry) -> Self {
        Self {
            root: root.into(),
            drivers,
        }
    }

    /// Store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn machines_dir(&self) -> PathBuf {
        self.root.join("machines")
    }

    fn machine_dir(&self, name: &str) -> Result<PathBuf, MachineError> {
        if !is_valid_host_name(name) {
            return Err(MachineError::HostDoesNotExist(name.to_string()));
        }
        Ok(self.machines_dir().join(name))
    }

    fn to_host(&self, record: HostRecord) -> Result<Host, MachineError> {
        let driver = self
            .drivers
            .restore(&record.driver_name, &record.name, &record.driver)?;
        Ok(Host {
            name: record.name,
            driver: Arc::from(driver),
            options: record.host_options,
        })
    }

    async fn write_record(&self, record: &HostRecord) -> Result<(), MachineError> {
        let dir = self.machine_dir(&record.name)?;
        tokio::fs::create_dir_all(&dir).await?;
        let body = serde_json::to_vec_pretty(record)?;
        let staging = dir.join(format!("{RECORD_FILE}.tmp"));
        tokio::fs::write(&staging, body).await?;
        tokio::fs::rename(&staging, dir.join(RECORD_FILE)).await?;
        Ok(())
    }
}

#[async_trait]
impl MachineApi for FileStore {
    async fn exists(&self, name: &str) -> Result<bool, MachineError> {
        if !is_valid_host_name(name) {
            return Ok(false);
        }
        let path = self.machine_dir(name)?.join(RECORD_FILE);
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn load(&self, name: &str) -> Result<Host, MachineError> {
        let path = self.machine_dir(name)?.join(RECORD_FILE);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MachineError::HostDoesNotExist(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let record: HostRecord = serde_json::from_slice(&body)?;
        self.to_host(record)
    }

    async fn load_all(&self) -> Result<LoadedHosts, MachineError> {
        let mut loaded = LoadedHosts::default();
        let mut entries = match tokio::fs::read_dir(self.machines_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(loaded),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match self.load(&name).await {
                Ok(host) => loaded.hosts.push(host),
                Err(e) => {
                    debug!(machine = %name, error = %e, "machine failed to load");
                    loaded.errors.insert(name, e.to_string());
                }
            }
        }

        loaded.hosts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(loaded)
    }

    async fn new_host(&self, name: &str, driver: &str) -> Result<NewHost, MachineError> {
        let driver = self.drivers.new_driver(driver, name)?;
        Ok(NewHost {
            name: name.to_string(),
            driver,
            options: HostOptions::default(),
        })
    }

    async fn create(&self, host: NewHost) -> Result<Host, MachineError> {
        let dir = self.machine_dir(&host.name)?;
        tokio::fs::create_dir_all(&dir).await?;
        if let Err(e) = host.driver.create().await {
            // A directory without a record would list as a broken machine.
            if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
                warn!(machine = %host.name, error = %cleanup, "failed to clean up machine directory");
            }
            return Err(e);
        }
        let host = Host {
            name: host.name,
            driver: Arc::from(host.driver),
            options: Some(host.options),
        };
        self.save(&host).await?;
        Ok(host)
    }

    async fn save(&self, host: &Host) -> Result<(), MachineError> {
        let record = HostRecord {
            config_version: CONFIG_VERSION,
            name: host.name.clone(),
            driver_name: host.driver_name().to_string(),
            driver: host.driver.config(),
            host_options: host.options.clone(),
        };
        self.write_record(&record).await
    }

    async fn remove(&self, name: &str) -> Result<(), MachineError> {
        let dir = self.machine_dir(name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(MachineError::HostDoesNotExist(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Opens a [`FileStore`] per dispatch.
#[derive(Debug, Clone)]
pub struct FileStoreFactory {
    root: PathBuf,
    drivers: DriverRegistry,
}

impl FileStoreFactory {
    /// A factory for stores rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, drivers: DriverRegistry) -> Self {
        Self {
            root: root.into(),
            drivers,
        }
    }
}

#[async_trait]
impl BackendFactory for FileStoreFactory {
    async fn open(&self) -> Result<Box<dyn MachineApi>, MachineError> {
        Ok(Box::new(FileStore::new(
            self.root.clone(),
            self.drivers.clone(),
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{Driver, DriverFlag, DriverOptions, FlagValue, State};

    fn store(dir: &Path) -> FileStore {
        FileStore::new(dir, DriverRegistry::with_builtin())
    }

    async fn create_none(store: &FileStore, name: &str, url: &str) -> Host {
        let mut new_host = store.new_host(name, "none").await.unwrap();
        let mut options = DriverOptions::default();
        options.insert("url", FlagValue::String(url.to_string()));
        new_host.driver.set_config_from_flags(&options).unwrap();
        store.create(new_host).await.unwrap()
    }

    #[test]
    fn test_host_name_validation() {
        assert!(is_valid_host_name("dev"));
        assert!(is_valid_host_name("dev-1.local"));
        assert!(!is_valid_host_name(""));
        assert!(!is_valid_host_name("-dev"));
        assert!(!is_valid_host_name("../etc"));
        assert!(!is_valid_host_name("my machine"));
    }

    #[tokio::test]
    async fn test_create_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(!store.exists("dev").await.unwrap());

        create_none(&store, "dev", "tcp://10.0.0.5:2376").await;

        assert!(store.exists("dev").await.unwrap());
        let host = store.load("dev").await.unwrap();
        assert_eq!(host.driver_name(), "none");
        assert_eq!(host.url().await.unwrap(), "tcp://10.0.0.5:2376");
        assert_eq!(host.state().await.unwrap(), State::Running);
        assert!(host.options.is_some());
    }

    #[tokio::test]
    async fn test_load_missing_host() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(dir.path()).load("ghost").await.unwrap_err();
        assert!(matches!(err, MachineError::HostDoesNotExist(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_load_all_separates_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        create_none(&store, "b", "tcp://b:2376").await;
        create_none(&store, "a", "tcp://a:2376").await;

        let corrupt = dir.path().join("machines").join("broken");
        std::fs::create_dir_all(&corrupt).unwrap();
        std::fs::write(corrupt.join(RECORD_FILE), b"{not json").unwrap();

        let loaded = store.load_all().await.unwrap();
        let names: Vec<_> = loaded.hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(loaded.errors.len(), 1);
        assert!(loaded.errors.contains_key("broken"));
    }

    #[tokio::test]
    async fn test_load_all_without_machines_dir() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = store(dir.path()).load_all().await.unwrap();
        assert!(loaded.hosts.is_empty());
        assert!(loaded.errors.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_driver_record_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let record = HostRecord {
            config_version: CONFIG_VERSION,
            name: "vb".to_string(),
            driver_name: "virtualbox".to_string(),
            driver: serde_json::json!({}),
            host_options: None,
        };
        store.write_record(&record).await.unwrap();

        let err = store.load("vb").await.unwrap_err();
        assert!(matches!(err, MachineError::UnknownDriver(_)));
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        create_none(&store, "dev", "tcp://dev:2376").await;

        store.remove("dev").await.unwrap();
        assert!(!store.exists("dev").await.unwrap());
        assert!(matches!(
            store.remove("dev").await.unwrap_err(),
            MachineError::HostDoesNotExist(_)
        ));
    }

    struct UnprovisionableDriver;

    #[async_trait]
    impl Driver for UnprovisionableDriver {
        fn driver_name(&self) -> &str {
            "unprovisionable"
        }

        fn create_flags(&self) -> Vec<DriverFlag> {
            Vec::new()
        }

        fn set_config_from_flags(&mut self, _: &DriverOptions) -> Result<(), MachineError> {
            Ok(())
        }

        fn config(&self) -> serde_json::Value {
            serde_json::json!({})
        }

        async fn url(&self) -> Result<String, MachineError> {
            Ok(String::new())
        }

        async fn state(&self) -> Result<State, MachineError> {
            Ok(State::None)
        }

        async fn create(&self) -> Result<(), MachineError> {
            Err(MachineError::Driver("out of capacity".to_string()))
        }

        async fn start(&self) -> Result<(), MachineError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), MachineError> {
            Ok(())
        }

        async fn restart(&self) -> Result<(), MachineError> {
            Ok(())
        }

        async fn remove(&self) -> Result<(), MachineError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_provisioning_leaves_no_machine_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut drivers = DriverRegistry::with_builtin();
        drivers.register("unprovisionable", |_, _| {
            Ok(Box::new(UnprovisionableDriver) as Box<dyn Driver>)
        });
        let store = FileStore::new(dir.path(), drivers);

        let new_host = store.new_host("dev", "unprovisionable").await.unwrap();
        let err = store.create(new_host).await.unwrap_err();
        assert_eq!(err.to_string(), "out of capacity");

        assert!(!dir.path().join("machines").join("dev").exists());
        let loaded = store.load_all().await.unwrap();
        assert!(loaded.hosts.is_empty());
        assert!(loaded.errors.is_empty());
    }

    #[tokio::test]
    async fn test_factory_opens_independent_handles() {
        let dir = tempfile::tempdir().unwrap();
        let factory = FileStoreFactory::new(dir.path(), DriverRegistry::with_builtin());
        let first = factory.open().await.unwrap();
        let second = factory.open().await.unwrap();
        assert!(!first.exists("dev").await.unwrap());
        drop(first);
        assert!(!second.exists("dev").await.unwrap());
    }
}
