use async_trait::async_trait;
use tracing::{debug, info};

use super::{Success, machine_name};
use crate::backend::{MachineApi, State};
use crate::handler::{Handler, HandlerResult, reply};
use crate::params::RequestContext;

/// A lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start a stopped machine.
    Start,
    /// Stop a running machine.
    Stop,
    /// Restart a machine.
    Restart,
}

impl Action {
    /// Past-tense name used in the success envelope.
    pub fn past_tense(self) -> &'static str {
        match self {
            Action::Start => "started",
            Action::Stop => "stopped",
            Action::Restart => "restarted",
        }
    }

    /// State in which this action has nothing left to do.
    fn settled_state(self) -> Option<State> {
        match self {
            Action::Start => Some(State::Running),
            Action::Stop => Some(State::Stopped),
            Action::Restart => None,
        }
    }
}

/// Starts, stops or restarts the machine bound to `{name}`.
///
/// Starting a running machine and stopping a stopped one succeed without
/// touching the driver. Restart always goes through the driver.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    action: Action,
}

impl Lifecycle {
    /// A handler performing `action`.
    pub fn new(action: Action) -> Self {
        Self { action }
    }
}

#[async_trait]
impl Handler for Lifecycle {
    async fn handle(&self, api: &dyn MachineApi, ctx: &RequestContext) -> HandlerResult {
        let name = machine_name(ctx)?;
        let host = api.load(name).await?;

        if let Some(settled) = self.action.settled_state() {
            // A failed state query is not conclusive; let the driver decide.
            if host.state().await.ok() == Some(settled) {
                debug!(machine = %name, state = %settled, "already in requested state");
                return reply(&Success::new(self.action.past_tense(), &host.name));
            }
        }

        match self.action {
            Action::Start => host.start().await?,
            Action::Stop => host.stop().await?,
            Action::Restart => host.restart().await?,
        }
        info!(machine = %name, action = self.action.past_tense(), "machine lifecycle changed");
        reply(&Success::new(self.action.past_tense(), &host.name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{Driver, DriverFlag, DriverOptions, DriverRegistry, FileStore, FlagValue};
    use crate::error::MachineError;
    use crate::params::NamedParams;

    async fn store_with_none_host(dir: &std::path::Path) -> FileStore {
        let store = FileStore::new(dir, DriverRegistry::with_builtin());
        let mut new_host = store.new_host("dev", "none").await.unwrap();
        let mut options = DriverOptions::default();
        options.insert("url", FlagValue::String("tcp://10.0.0.5:2376".to_string()));
        new_host.driver.set_config_from_flags(&options).unwrap();
        store.create(new_host).await.unwrap();
        store
    }

    fn named(name: &str) -> RequestContext {
        let mut named = NamedParams::new();
        named.insert("name".to_string(), name.to_string());
        RequestContext::new(named, Default::default())
    }

    #[tokio::test]
    async fn test_start_running_machine_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_none_host(dir.path()).await;

        let value = Lifecycle::new(Action::Start)
            .handle(&store, &named("dev"))
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!({ "action": "started", "name": "dev" }));
    }

    /// A machine that reports Stopped and refuses every transition.
    struct ParkedDriver;

    #[async_trait]
    impl Driver for ParkedDriver {
        fn driver_name(&self) -> &str {
            "parked"
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
            Ok(State::Stopped)
        }

        async fn create(&self) -> Result<(), MachineError> {
            Ok(())
        }

        async fn start(&self) -> Result<(), MachineError> {
            Err(MachineError::Driver("start called".to_string()))
        }

        async fn stop(&self) -> Result<(), MachineError> {
            Err(MachineError::Driver("stop called".to_string()))
        }

        async fn restart(&self) -> Result<(), MachineError> {
            Err(MachineError::Driver("restart called".to_string()))
        }

        async fn remove(&self) -> Result<(), MachineError> {
            Ok(())
        }
    }

    async fn store_with_parked_host(dir: &std::path::Path) -> FileStore {
        let mut drivers = DriverRegistry::with_builtin();
        drivers.register("parked", |_, _| Ok(Box::new(ParkedDriver) as Box<dyn Driver>));
        let store = FileStore::new(dir, drivers);
        let new_host = store.new_host("dev", "parked").await.unwrap();
        store.create(new_host).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_stop_stopped_machine_skips_driver() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_parked_host(dir.path()).await;

        let value = Lifecycle::new(Action::Stop)
            .handle(&store, &named("dev"))
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!({ "action": "stopped", "name": "dev" }));

        let err = Lifecycle::new(Action::Start)
            .handle(&store, &named("dev"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "start called");
    }

    #[tokio::test]
    async fn test_stop_reaches_driver() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_none_host(dir.path()).await;

        let err = Lifecycle::new(Action::Stop)
            .handle(&store, &named("dev"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "hosts without a driver cannot be stopped");
    }

    #[tokio::test]
    async fn test_restart_always_reaches_driver() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_none_host(dir.path()).await;

        let err = Lifecycle::new(Action::Restart)
            .handle(&store, &named("dev"))
            .await
            .unwrap_err();
        assert!(matches!(err, MachineError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_requires_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), DriverRegistry::with_builtin());
        let err = Lifecycle::new(Action::Start)
            .handle(&store, &RequestContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Requires one machine name");
    }

    #[tokio::test]
    async fn test_unknown_machine() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), DriverRegistry::with_builtin());
        let err = Lifecycle::new(Action::Stop)
            .handle(&store, &named("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Host does not exist: \"ghost\"");
    }
}
