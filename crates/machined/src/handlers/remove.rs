use futures::future::BoxFuture;
use tracing::{debug, info};

use super::{Success, machine_name};
use crate::backend::MachineApi;
use crate::handler::{HandlerResult, reply};
use crate::params::RequestContext;

/// Removes the machine bound to `{name}`.
///
/// Removing a machine that does not exist succeeds with the same envelope.
pub fn remove<'a>(api: &'a dyn MachineApi, ctx: &'a RequestContext) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let name = machine_name(ctx)?;

        // An existence check that fails is treated like a missing machine.
        if !api.exists(name).await.unwrap_or(false) {
            debug!(machine = %name, "nothing to remove");
            return reply(&Success::new("removed", name));
        }

        let host = api.load(name).await?;
        host.driver.remove().await?;
        api.remove(name).await?;

        info!(machine = %name, "machine removed");
        reply(&Success::new("removed", name))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{DriverOptions, DriverRegistry, FileStore, FlagValue};
    use crate::params::NamedParams;

    fn named(name: &str) -> RequestContext {
        let mut named = NamedParams::new();
        named.insert("name".to_string(), name.to_string());
        RequestContext::new(named, Default::default())
    }

    #[tokio::test]
    async fn test_remove_existing_machine() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), DriverRegistry::with_builtin());
        let mut new_host = store.new_host("dev", "none").await.unwrap();
        let mut options = DriverOptions::default();
        options.insert("url", FlagValue::String("tcp://10.0.0.5:2376".to_string()));
        new_host.driver.set_config_from_flags(&options).unwrap();
        store.create(new_host).await.unwrap();

        let value = remove(&store, &named("dev")).await.unwrap();
        assert_eq!(value, serde_json::json!({ "action": "removed", "name": "dev" }));
        assert!(!store.exists("dev").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_missing_machine_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), DriverRegistry::with_builtin());

        let value = remove(&store, &named("ghost")).await.unwrap();
        assert_eq!(value, serde_json::json!({ "action": "removed", "name": "ghost" }));
    }

    #[tokio::test]
    async fn test_remove_requires_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), DriverRegistry::with_builtin());
        let err = remove(&store, &RequestContext::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Requires one machine name");
    }
}
