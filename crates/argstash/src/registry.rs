//! Backend registry and write selection.
//!
//! The registry maps backend names (which double as address schemes) to
//! factories. It is built once, either explicitly or lazily through
//! [`BackendRegistry::global`], and is read-only afterwards.
//!
//! Configuration decides two things on every call:
//! - which registered backends are enabled (reads of any other scheme fail
//!   with `UnsupportedBackend`)
//! - the order in which enabled backends are offered a value on write

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use stashconf::StashConfig;
use tracing::{trace, warn};

use crate::address::scheme_of;
use crate::backend::http::HTTPS;
use crate::backend::inline::INLINE;
use crate::backend::mem::MEM;
use crate::backend::object_store::S3;
use crate::backend::{
    Backend, FileObjectClient, HttpBackend, InlineBackend, MemBackend, ObjectStoreBackend,
};
use crate::codec::ArgValue;
use crate::error::{StashError, StashResult};
use crate::stash::LinkedStash;

/// Builds a backend for the active configuration.
pub type BackendFactory =
    Box<dyn Fn(&StashConfig) -> StashResult<Arc<dyn Backend>> + Send + Sync>;

static GLOBAL: OnceLock<BackendRegistry> = OnceLock::new();

/// Name-to-factory table.
///
/// Each backend is built once per distinct configuration and reused until a
/// call arrives with a different one.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
    built: Mutex<HashMap<String, (StashConfig, Arc<dyn Backend>)>>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `inline`, `mem`, `s3` and `https`.
    ///
    /// `mem` uses the process-wide table, `s3` stores files under
    /// `object_store.root`, and `https` builds a blocking reqwest client with
    /// `http.timeout_secs` on its first fetch.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, BackendFactory); 4] = [
            (
                INLINE,
                Box::new(|_: &StashConfig| Ok(Arc::new(InlineBackend) as Arc<dyn Backend>)),
            ),
            (
                MEM,
                Box::new(|_: &StashConfig| Ok(Arc::new(MemBackend::shared()) as Arc<dyn Backend>)),
            ),
            (
                S3,
                Box::new(|config: &StashConfig| {
                    let client = FileObjectClient::new(&config.object_store.root);
                    Ok(Arc::new(ObjectStoreBackend::new(Arc::new(client))) as Arc<dyn Backend>)
                }),
            ),
            (
                HTTPS,
                Box::new(|config: &StashConfig| {
                    let timeout = Duration::from_secs(config.http.timeout_secs);
                    Ok(Arc::new(HttpBackend::with_timeout(timeout)) as Arc<dyn Backend>)
                }),
            ),
        ];
        for (name, factory) in builtins {
            registry.factories.insert(name.to_string(), factory);
        }
        registry
    }

    /// The process-wide registry, built with [`Self::with_builtins`] unless
    /// [`Self::install_global`] ran first.
    pub fn global() -> &'static BackendRegistry {
        GLOBAL.get_or_init(Self::with_builtins)
    }

    /// Install `registry` as the process-wide registry.
    ///
    /// Returns it back if the global registry was already initialized.
    pub fn install_global(registry: BackendRegistry) -> Result<(), BackendRegistry> {
        GLOBAL.set(registry)
    }

    /// Register a factory under `name`.
    pub fn register(&mut self, name: &str, factory: BackendFactory) -> StashResult<()> {
        if self.factories.contains_key(name) {
            return Err(StashError::DuplicateBackend(name.to_string()));
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// Register a ready-made backend under its own name.
    pub fn register_backend(&mut self, backend: Arc<dyn Backend>) -> StashResult<()> {
        let name = backend.name().to_string();
        self.register(&name, Box::new(move |_: &StashConfig| Ok(backend.clone())))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// The backend registered as `name`, enabled or not.
    ///
    /// The factory runs only when no instance exists yet for this exact
    /// configuration.
    pub fn get(&self, name: &str, config: &StashConfig) -> StashResult<Arc<dyn Backend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| StashError::UnknownBackend(name.to_string()))?;

        let mut built = self.built.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((built_for, backend)) = built.get(name) {
            if built_for == config {
                return Ok(backend.clone());
            }
        }
        let backend = factory(config)?;
        built.insert(name.to_string(), (config.clone(), backend.clone()));
        Ok(backend)
    }

    /// Backend owning the scheme of `address`, if it is enabled.
    pub fn resolve_by_scheme(
        &self,
        address: &str,
        config: &StashConfig,
    ) -> StashResult<Arc<dyn Backend>> {
        let scheme = scheme_of(address)?;
        self.enabled(scheme, config)
    }

    fn enabled(&self, name: &str, config: &StashConfig) -> StashResult<Arc<dyn Backend>> {
        if !self.contains(name) {
            return Err(StashError::UnknownBackend(name.to_string()));
        }
        if !config.is_enabled(name) {
            return Err(StashError::UnsupportedBackend(format!(
                "'{}' is not enabled (enabled: {})",
                name,
                config.backends.join(", ")
            )));
        }
        self.get(name, config)
    }

    /// First enabled backend, in configuration order, that accepts `value`.
    ///
    /// A name that is not registered is an error. A backend whose factory
    /// fails is skipped; if nothing else accepts the value, that failure is
    /// returned.
    pub fn select_for_write(
        &self,
        value: &ArgValue,
        config: &StashConfig,
    ) -> StashResult<Arc<dyn Backend>> {
        let mut build_error = None;
        for name in &config.backends {
            let backend = match self.get(name, config) {
                Ok(backend) => backend,
                Err(e @ StashError::UnknownBackend(_)) => return Err(e),
                Err(e) => {
                    warn!(backend = %name, error = %e, "backend unavailable for write");
                    build_error.get_or_insert(e);
                    continue;
                }
            };
            let accepted = backend.accepts(value, config);
            trace!(backend = %name, kind = value.kind(), accepted, "write selection");
            if accepted {
                return Ok(backend);
            }
        }
        Err(build_error.unwrap_or_else(|| {
            StashError::UnsupportedBackend(format!(
                "no enabled backend accepts this {} value (tried: {})",
                value.kind(),
                config.backends.join(", ")
            ))
        }))
    }

    /// Store `value` on the first enabled backend that accepts it.
    pub fn create(
        &self,
        name: &str,
        value: ArgValue,
        namespace: &str,
        config: &StashConfig,
    ) -> StashResult<LinkedStash> {
        let backend = self.select_for_write(&value, config)?;
        backend.save(name, value, namespace, config)
    }

    /// Load the stash named by `address` from the backend owning its scheme.
    pub fn retrieve(&self, address: &str, config: &StashConfig) -> StashResult<LinkedStash> {
        self.resolve_by_scheme(address, config)?.load(address)
    }

    /// Time-limited URL for `stash`, valid for `share_link_ttl_seconds`.
    pub fn share(&self, stash: &LinkedStash, config: &StashConfig) -> StashResult<String> {
        self.enabled(stash.backend(), config)?
            .make_share_address(stash, config.share_link_ttl_seconds)
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, AddressShape};
    use crate::stash::Stash;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that accepts nothing, for ordering tests.
    struct Picky(&'static str);

    impl Backend for Picky {
        fn name(&self) -> &str {
            self.0
        }

        fn shape(&self) -> AddressShape {
            AddressShape::ContentAddressed
        }

        fn accepts(&self, _value: &ArgValue, _config: &StashConfig) -> bool {
            false
        }

        fn make_address(&self, _stash: &Stash) -> StashResult<Address> {
            Err(StashError::unsupported(self.0, "save"))
        }

        fn persist(&self, _stash: &LinkedStash) -> StashResult<()> {
            Err(StashError::unsupported(self.0, "save"))
        }

        fn fetch(&self, address: &Address) -> StashResult<Vec<u8>> {
            Err(StashError::StashNotFound(address.to_string()))
        }
    }

    fn local_registry() -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register_backend(Arc::new(InlineBackend)).unwrap();
        registry.register_backend(Arc::new(MemBackend::new())).unwrap();
        registry
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(
            BackendRegistry::with_builtins().names(),
            vec!["https", "inline", "mem", "s3"]
        );
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = local_registry();
        let result = registry.register_backend(Arc::new(MemBackend::new()));
        match result {
            Err(StashError::DuplicateBackend(name)) => assert_eq!(name, "mem"),
            other => panic!("expected DuplicateBackend, got {:?}", other),
        }
    }

    #[test]
    fn test_get_unknown() {
        let registry = local_registry();
        assert!(matches!(
            registry.get("ftp", &StashConfig::default()),
            Err(StashError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_resolve_by_scheme() {
        let registry = local_registry();
        let config = StashConfig::default().with_backends(["inline"]);

        let backend = registry
            .resolve_by_scheme("inline://app/x?data=AQ%3D%3D", &config)
            .unwrap();
        assert_eq!(backend.name(), "inline");

        assert!(matches!(
            registry.resolve_by_scheme("mem://app/x.28a5e15a666b0cd1415490dcf6674255", &config),
            Err(StashError::UnsupportedBackend(_))
        ));
        assert!(matches!(
            registry.resolve_by_scheme("ftp://app/x", &config),
            Err(StashError::UnknownBackend(_))
        ));
        assert!(matches!(
            registry.resolve_by_scheme("no-scheme-here", &config),
            Err(StashError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_select_follows_config_order() {
        let registry = local_registry();
        let config = StashConfig::default()
            .with_backends(["inline", "mem"])
            .with_max_inline_value_bytes(5);

        let pick = |value: ArgValue| registry.select_for_write(&value, &config).unwrap();
        assert_eq!(pick(ArgValue::Int(1)).name(), "inline");
        assert_eq!(pick(ArgValue::from("short")).name(), "inline");
        assert_eq!(pick(ArgValue::from("longer")).name(), "mem");
        assert_eq!(pick(ArgValue::map([("a", ArgValue::Int(1))])).name(), "mem");

        let reversed = config.clone().with_backends(["mem", "inline"]);
        assert_eq!(
            registry.select_for_write(&ArgValue::Int(1), &reversed).unwrap().name(),
            "mem"
        );
    }

    #[test]
    fn test_select_exhausted() {
        let mut registry = local_registry();
        registry.register_backend(Arc::new(Picky("picky"))).unwrap();
        let config = StashConfig::default().with_backends(["inline", "picky"]);

        let result = registry.select_for_write(&ArgValue::from(vec![ArgValue::Null]), &config);
        assert!(matches!(result, Err(StashError::UnsupportedBackend(_))));
    }

    #[test]
    fn test_select_with_unregistered_config_entry() {
        let registry = local_registry();
        let config = StashConfig::default().with_backends(["nope", "mem"]);
        assert!(matches!(
            registry.select_for_write(&ArgValue::Int(1), &config),
            Err(StashError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_create_retrieve_share() {
        let registry = local_registry();
        let config = StashConfig::default();

        let saved = registry
            .create("mydatapoint", ArgValue::map([("color", ArgValue::from("red-red"))]), "app", &config)
            .unwrap();
        assert_eq!(saved.backend(), "mem");

        let loaded = registry
            .retrieve(&saved.address().to_string(), &config)
            .unwrap();
        assert_eq!(loaded, saved);

        assert!(matches!(
            registry.share(&saved, &config),
            Err(StashError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_factory_sees_config() {
        let mut registry = BackendRegistry::new();
        registry
            .register(
                "mem",
                Box::new(|config: &StashConfig| {
                    if config.max_inline_value_bytes == 0 {
                        return Err(StashError::UnsupportedBackend("mem disabled".into()));
                    }
                    Ok(Arc::new(MemBackend::new()) as Arc<dyn Backend>)
                }),
            )
            .unwrap();

        let off = StashConfig::default().with_max_inline_value_bytes(0);
        assert!(registry.get("mem", &off).is_err());
        assert!(registry.get("mem", &StashConfig::default()).is_ok());
    }

    fn counting_mem(registry: &mut BackendRegistry) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry
            .register(
                "mem",
                Box::new(move |_: &StashConfig| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(MemBackend::new()) as Arc<dyn Backend>)
                }),
            )
            .unwrap();
        calls
    }

    #[test]
    fn test_backend_built_once_per_config() {
        let mut registry = BackendRegistry::new();
        let calls = counting_mem(&mut registry);
        let config = StashConfig::default().with_backends(["mem"]);

        let saved = registry.create("x", ArgValue::Int(1), "ns", &config).unwrap();
        for _ in 0..3 {
            registry.create("y", ArgValue::Int(2), "ns", &config).unwrap();
            let loaded = registry.retrieve(&saved.address().to_string(), &config).unwrap();
            assert_eq!(loaded.data(), &ArgValue::Int(1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let other = config.clone().with_max_inline_value_bytes(1);
        registry.get("mem", &other).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_factory_is_skipped_for_writes() {
        let mut registry = local_registry();
        registry
            .register(
                "flaky",
                Box::new(|_: &StashConfig| Err(StashError::remote("flaky", "cannot connect"))),
            )
            .unwrap();

        let config = StashConfig::default().with_backends(["flaky", "inline"]);
        let picked = registry.select_for_write(&ArgValue::Int(1), &config).unwrap();
        assert_eq!(picked.name(), "inline");

        let only_flaky = StashConfig::default().with_backends(["flaky"]);
        assert!(matches!(
            registry.select_for_write(&ArgValue::Int(1), &only_flaky),
            Err(StashError::BackendRemote { .. })
        ));
    }

    #[test]
    fn test_builtin_https_ahead_of_inline() {
        let registry = BackendRegistry::with_builtins();
        let config = StashConfig::default().with_backends(["https", "inline"]);
        for _ in 0..3 {
            let saved = registry.create("x", ArgValue::Int(1), "ns", &config).unwrap();
            assert_eq!(saved.backend(), "inline");
        }
    }
}
