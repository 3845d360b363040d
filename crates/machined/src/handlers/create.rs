use futures::future::BoxFuture;
use tracing::info;

use super::{Success, machine_name};
use crate::backend::{
    DriverFlag, DriverOptions, EngineOptions, FlagValue, HostOptions, MachineApi, SwarmOptions,
    is_valid_host_name,
};
use crate::error::MachineError;
use crate::handler::{HandlerResult, reply};
use crate::params::{FormParams, RequestContext};

fn string(name: &str, default: &str) -> DriverFlag {
    DriverFlag::String {
        name: name.to_string(),
        default: default.to_string(),
    }
}

fn string_slice(name: &str) -> DriverFlag {
    DriverFlag::StringSlice {
        name: name.to_string(),
        default: Vec::new(),
    }
}

fn switch(name: &str) -> DriverFlag {
    DriverFlag::Bool {
        name: name.to_string(),
    }
}

/// Flags every `create` accepts regardless of driver.
pub fn shared_create_flags() -> Vec<DriverFlag> {
    vec![
        string("engine-install-url", "https://get.docker.com"),
        string_slice("engine-opt"),
        string_slice("engine-insecure-registry"),
        string_slice("engine-registry-mirror"),
        string_slice("engine-label"),
        string("engine-storage-driver", ""),
        string_slice("engine-env"),
        switch("swarm"),
        string("swarm-image", "swarm:latest"),
        switch("swarm-master"),
        string("swarm-discovery", ""),
        string("swarm-strategy", "spread"),
        string_slice("swarm-opt"),
        string("swarm-host", "tcp://0.0.0.0:3376"),
        string("swarm-addr", ""),
        switch("swarm-experimental"),
        string_slice("tls-san"),
    ]
}

/// Creates the machine bound to `{name}` with the form's `driver`.
///
/// Exactly one `driver` value is required; the check happens before the
/// backend is touched.
pub fn create<'a>(api: &'a dyn MachineApi, ctx: &'a RequestContext) -> BoxFuture<'a, HandlerResult> {
    Box::pin(async move {
        let name = machine_name(ctx)?;
        let driver = match ctx.form.get("driver") {
            Some([driver]) => driver.as_str(),
            _ => return Err(MachineError::RequireDriverName),
        };

        create_machine(api, name, driver, &ctx.form).await?;
        info!(machine = %name, driver = %driver, "machine created");
        reply(&Success::new("created", name))
    })
}

async fn create_machine(
    api: &dyn MachineApi,
    name: &str,
    driver: &str,
    form: &FormParams,
) -> Result<(), MachineError> {
    if !is_valid_host_name(name) {
        return Err(MachineError::InvalidHostName(name.to_string()));
    }
    if api.exists(name).await? {
        return Err(MachineError::HostAlreadyExists(name.to_string()));
    }

    let mut host = api.new_host(name, driver).await?;

    let mut flags = shared_create_flags();
    flags.extend(host.driver.create_flags());
    let options = parse_flags(form, &flags)?;

    host.options = host_options(&options);
    host.driver.set_config_from_flags(&options).map_err(|e| {
        MachineError::Driver(format!(
            "Error setting machine configuration from flags provided: {e}"
        ))
    })?;

    api.create(host).await?;
    Ok(())
}

/// Resolve every flag to its form value or its default.
fn parse_flags(form: &FormParams, flags: &[DriverFlag]) -> Result<DriverOptions, MachineError> {
    let mut options = DriverOptions::default();
    for flag in flags {
        let name = flag.name();
        // Scalar flags take a value only when exactly one was sent.
        let value = match (flag, form.get(name)) {
            (DriverFlag::StringSlice { .. }, Some(values)) if !values.is_empty() => {
                FlagValue::StringSlice(values.to_vec())
            }
            (DriverFlag::String { .. }, Some([only])) => FlagValue::String(only.clone()),
            (DriverFlag::Int { .. }, Some([only])) => {
                let parsed = only.parse().map_err(|_| MachineError::InvalidFlag {
                    flag: name.to_string(),
                    value: only.clone(),
                })?;
                FlagValue::Int(parsed)
            }
            (DriverFlag::Bool { .. }, Some([only])) => FlagValue::Bool(only == "true"),
            _ => flag.default_value(),
        };
        options.insert(name, value);
    }
    Ok(options)
}

fn host_options(options: &DriverOptions) -> HostOptions {
    HostOptions {
        engine_options: EngineOptions {
            arbitrary_flags: options.string_slice("engine-opt"),
            env: options.string_slice("engine-env"),
            insecure_registry: options.string_slice("engine-insecure-registry"),
            labels: options.string_slice("engine-label"),
            registry_mirror: options.string_slice("engine-registry-mirror"),
            storage_driver: options.string("engine-storage-driver"),
            tls_verify: true,
            install_url: options.string("engine-install-url"),
            server_cert_sans: options.string_slice("tls-san"),
        },
        swarm_options: SwarmOptions {
            is_swarm: options.bool("swarm"),
            master: options.bool("swarm-master"),
            image: options.string("swarm-image"),
            discovery: options.string("swarm-discovery"),
            address: options.string("swarm-addr"),
            host: options.string("swarm-host"),
            strategy: options.string("swarm-strategy"),
            arbitrary_flags: options.string_slice("swarm-opt"),
            is_experimental: options.bool("swarm-experimental"),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{DriverRegistry, FileStore};
    use crate::params::NamedParams;

    fn request(name: &str, form: &[(&str, &str)]) -> RequestContext {
        let mut named = NamedParams::new();
        named.insert("name".to_string(), name.to_string());
        RequestContext::new(named, form.iter().copied().collect())
    }

    fn store(dir: &std::path::Path) -> FileStore {
        FileStore::new(dir, DriverRegistry::with_builtin())
    }

    #[test]
    fn test_parse_flags_defaults_and_values() {
        let flags = vec![
            string("url", ""),
            string_slice("label"),
            DriverFlag::Int {
                name: "memory".to_string(),
                default: 1024,
            },
            switch("debug"),
            switch("quiet"),
        ];
        let form: FormParams = [("label", "a"), ("label", "b"), ("quiet", "true")]
            .into_iter()
            .collect();

        let options = parse_flags(&form, &flags).unwrap();
        assert_eq!(options.string("url"), "");
        assert_eq!(options.string_slice("label"), vec!["a", "b"]);
        assert_eq!(options.int("memory"), 1024);
        assert_eq!(options.get("debug"), Some(&FlagValue::Bool(false)));
        assert!(options.bool("quiet"));
    }

    #[test]
    fn test_parse_flags_repeated_scalar_keeps_default() {
        let flags = vec![
            string("engine-storage-driver", "overlay2"),
            DriverFlag::Int {
                name: "memory".to_string(),
                default: 1024,
            },
            switch("debug"),
        ];
        let form: FormParams = [
            ("engine-storage-driver", "aufs"),
            ("engine-storage-driver", "btrfs"),
            ("memory", "lots"),
            ("memory", "2048"),
            ("debug", "true"),
            ("debug", "true"),
        ]
        .into_iter()
        .collect();

        let options = parse_flags(&form, &flags).unwrap();
        assert_eq!(options.string("engine-storage-driver"), "overlay2");
        assert_eq!(options.int("memory"), 1024);
        assert!(!options.bool("debug"));
    }

    #[test]
    fn test_parse_flags_rejects_bad_int() {
        let flags = vec![DriverFlag::Int {
            name: "memory".to_string(),
            default: 1024,
        }];
        let form: FormParams = [("memory", "lots")].into_iter().collect();

        let err = parse_flags(&form, &flags).unwrap_err();
        assert!(matches!(err, MachineError::InvalidFlag { flag, value } if flag == "memory" && value == "lots"));
    }

    #[test]
    fn test_host_options_from_shared_flags() {
        let form: FormParams = [
            ("engine-label", "env=dev"),
            ("swarm-master", "true"),
            ("swarm-host", "tcp://0.0.0.0:4000"),
        ]
        .into_iter()
        .collect();
        let options = parse_flags(&form, &shared_create_flags()).unwrap();
        let host = host_options(&options);

        assert_eq!(host.engine_options.labels, vec!["env=dev"]);
        assert!(host.engine_options.tls_verify);
        assert_eq!(host.engine_options.install_url, "https://get.docker.com");
        assert!(host.swarm_options.master);
        assert!(!host.swarm_options.is_swarm);
        assert_eq!(host.swarm_options.host, "tcp://0.0.0.0:4000");
        assert_eq!(host.swarm_options.strategy, "spread");
    }

    #[tokio::test]
    async fn test_create_none_machine() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let value = create(
            &store,
            &request("dev", &[("driver", "none"), ("url", "tcp://10.0.0.5:2376")]),
        )
        .await
        .unwrap();
        assert_eq!(value, serde_json::json!({ "action": "created", "name": "dev" }));

        let host = store.load("dev").await.unwrap();
        assert_eq!(host.url().await.unwrap(), "tcp://10.0.0.5:2376");
    }

    #[tokio::test]
    async fn test_create_requires_exactly_one_driver() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        for form in [
            &[][..],
            &[("driver", "none"), ("driver", "virtualbox")][..],
        ] {
            let err = create(&store, &request("dev", form)).await.unwrap_err();
            assert_eq!(err.to_string(), "Requires a driver name");
        }
        assert!(!dir.path().join("machines").exists());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_name() {
        let dir = tempfile::tempdir().unwrap();
        let err = create(&store(dir.path()), &request("my machine", &[("driver", "none")]))
            .await
            .unwrap_err();
        assert!(matches!(err, MachineError::InvalidHostName(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let form = [("driver", "none"), ("url", "tcp://10.0.0.5:2376")];
        create(&store, &request("dev", &form)).await.unwrap();

        let err = create(&store, &request("dev", &form)).await.unwrap_err();
        assert_eq!(err.to_string(), "Machine dev already exists");
    }

    #[tokio::test]
    async fn test_create_unknown_driver() {
        let dir = tempfile::tempdir().unwrap();
        let err = create(&store(dir.path()), &request("dev", &[("driver", "virtualbox")]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Driver \"virtualbox\" not found");
    }

    #[tokio::test]
    async fn test_create_surfaces_driver_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let err = create(&store, &request("dev", &[("driver", "none")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--url option is required"));
        assert!(!store.exists("dev").await.unwrap());
    }
}
