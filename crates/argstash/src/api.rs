//! Entry points over the process-wide registry.

use std::fmt::Display;

use stashconf::StashConfig;
use tracing::instrument;

use crate::codec::ArgValue;
use crate::error::StashResult;
use crate::registry::BackendRegistry;
use crate::stash::LinkedStash;

/// Stash `value` under `namespace/name` on the first enabled backend that
/// accepts it. Use [`DEFAULT_NAMESPACE`](crate::DEFAULT_NAMESPACE) when the
/// caller has no namespace of its own.
#[instrument(skip_all, fields(name = %name, namespace = %namespace))]
pub fn create(
    name: &str,
    value: impl Into<ArgValue>,
    namespace: &str,
    config: &StashConfig,
) -> StashResult<LinkedStash> {
    BackendRegistry::global().create(name, value.into(), namespace, config)
}

/// Load the stash named by `address`.
///
/// Accepts a string or an [`Address`](crate::Address).
#[instrument(skip_all, fields(address = %address))]
pub fn retrieve(address: impl Display, config: &StashConfig) -> StashResult<LinkedStash> {
    BackendRegistry::global().retrieve(&address.to_string(), config)
}

/// Time-limited URL for a stored stash.
#[instrument(skip_all, fields(backend = %stash.backend(), address = %stash.address()))]
pub fn share(stash: &LinkedStash, config: &StashConfig) -> StashResult<String> {
    BackendRegistry::global().share(stash, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StashError;

    #[test]
    fn test_create_and_retrieve_inline() {
        let config = StashConfig::default().with_backends(["inline"]);
        let saved = create("color", "red-red", "app", &config).unwrap();
        assert_eq!(saved.address().to_string(), "inline://app/color?data=p3JlZC1yZWQ%3D");

        let loaded = retrieve(saved.address(), &config).unwrap();
        assert_eq!(loaded.data(), &ArgValue::from("red-red"));
    }

    #[test]
    fn test_share_inline_unsupported() {
        let config = StashConfig::default().with_backends(["inline"]);
        let saved = create("flag", true, "app", &config).unwrap();
        assert!(matches!(
            share(&saved, &config),
            Err(StashError::UnsupportedOperation { .. })
        ));
    }
}
