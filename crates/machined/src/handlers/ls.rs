use async_trait::async_trait;
use tracing::debug;

use crate::backend::MachineApi;
use crate::handler::{Handler, HandlerResult, reply};
use crate::params::RequestContext;
use crate::status::{StatusSettings, list_hosts};

/// Lists every machine with its probed status.
#[derive(Debug, Clone)]
pub struct List {
    settings: StatusSettings,
}

impl List {
    /// A listing that probes with `settings`.
    pub fn new(settings: StatusSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Handler for List {
    async fn handle(&self, api: &dyn MachineApi, _ctx: &RequestContext) -> HandlerResult {
        let loaded = api.load_all().await?;
        debug!(
            loaded = loaded.hosts.len(),
            failed = loaded.errors.len(),
            "probing machines"
        );
        let items = list_hosts(loaded.hosts, &loaded.errors, &self.settings).await;
        reply(&items)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{DriverOptions, DriverRegistry, FileStore, FlagValue};
    use crate::handlers::tests::settings;
    use crate::status::HostListItem;

    #[tokio::test]
    async fn test_list_reports_loaded_and_broken_machines() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), DriverRegistry::with_builtin());

        let mut new_host = store.new_host("dev", "none").await.unwrap();
        let mut options = DriverOptions::default();
        options.insert("url", FlagValue::String("tcp://10.0.0.5:2376".to_string()));
        new_host.driver.set_config_from_flags(&options).unwrap();
        store.create(new_host).await.unwrap();

        let broken = dir.path().join("machines").join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("config.json"), b"[]").unwrap();

        let value = List::new(settings())
            .handle(&store, &RequestContext::default())
            .await
            .unwrap();
        let items: Vec<HostListItem> = serde_json::from_value(value).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "dev");
        assert_eq!(items[0].url, "tcp://10.0.0.5:2376");
        assert_eq!(items[0].docker_version, "Unknown");
        assert_eq!(items[1].name, "broken");
        assert_eq!(items[1].driver_name, "not found");
    }

    #[tokio::test]
    async fn test_list_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), DriverRegistry::with_builtin());
        let value = List::new(settings())
            .handle(&store, &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!([]));
    }
}
