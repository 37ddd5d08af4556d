//! Config file discovery, layered loading, and environment variable overlay.

use crate::{ConfigError, StashConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in load order (system, user, local).
///
/// Only returns files that exist. If `override_path` is provided and exists,
/// it replaces the local override.
pub fn discover_config_files_with_override(override_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/argstash/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("argstash/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = override_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("argstash.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and layer its values onto `config`.
pub fn apply_file(config: &mut StashConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Layer the keys present in `contents` onto `config`. Absent keys keep
/// whatever the previous layer set.
fn apply_toml(config: &mut StashConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(backends) = table.get("backends") {
        let list = backends
            .as_array()
            .ok_or_else(|| wrong_type("backends", "an array of strings", path))?;
        config.backends = list
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| wrong_type("backends", "an array of strings", path))
            })
            .collect::<Result<_, _>>()?;
    }

    if let Some(v) = get_integer(&table, "max_inline_value_bytes", "max_inline_value_bytes", path)?
    {
        config.max_inline_value_bytes = non_negative(v, "max_inline_value_bytes", path)? as usize;
    }

    if let Some(v) = get_integer(&table, "share_link_ttl_seconds", "share_link_ttl_seconds", path)?
    {
        config.share_link_ttl_seconds = non_negative(v, "share_link_ttl_seconds", path)?;
    }

    if let Some(http) = get_table(&table, "http", path)? {
        if let Some(v) = get_integer(http, "timeout_secs", "http.timeout_secs", path)? {
            config.http.timeout_secs = non_negative(v, "http.timeout_secs", path)?;
        }
    }

    if let Some(store) = get_table(&table, "object_store", path)? {
        if let Some(v) = store.get("root") {
            let root = v
                .as_str()
                .ok_or_else(|| wrong_type("object_store.root", "a string", path))?;
            config.object_store.root = expand_path(root);
        }
    }

    Ok(())
}

fn wrong_type(key: &str, expected: &str, path: &Path) -> ConfigError {
    ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("`{}` must be {}", key, expected),
    }
}

fn get_integer(
    table: &toml::Table,
    key: &str,
    qualified: &str,
    path: &Path,
) -> Result<Option<i64>, ConfigError> {
    table
        .get(key)
        .map(|v| v.as_integer().ok_or_else(|| wrong_type(qualified, "an integer", path)))
        .transpose()
}

fn get_table<'a>(
    table: &'a toml::Table,
    key: &str,
    path: &Path,
) -> Result<Option<&'a toml::Table>, ConfigError> {
    table
        .get(key)
        .map(|v| v.as_table().ok_or_else(|| wrong_type(key, "a table", path)))
        .transpose()
}

fn non_negative(value: i64, key: &str, path: &Path) -> Result<u64, ConfigError> {
    u64::try_from(value).map_err(|_| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("`{}` must not be negative", key),
    })
}

/// Apply `ARGSTASH_*` environment variable overrides to config.
pub fn apply_env_overrides(config: &mut StashConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides using `lookup` in place of the process environment.
pub fn apply_overrides_from<F>(config: &mut StashConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("ARGSTASH_BACKENDS") {
        config.backends = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        sources.env_overrides.push("ARGSTASH_BACKENDS".to_string());
    }
    if let Some(v) = lookup("ARGSTASH_MAX_INLINE_VALUE_BYTES") {
        if let Ok(max) = v.trim().parse() {
            config.max_inline_value_bytes = max;
            sources
                .env_overrides
                .push("ARGSTASH_MAX_INLINE_VALUE_BYTES".to_string());
        }
    }
    if let Some(v) = lookup("ARGSTASH_SHARE_LINK_TTL_SECONDS") {
        if let Ok(ttl) = v.trim().parse() {
            config.share_link_ttl_seconds = ttl;
            sources
                .env_overrides
                .push("ARGSTASH_SHARE_LINK_TTL_SECONDS".to_string());
        }
    }
    if let Some(v) = lookup("ARGSTASH_HTTP_TIMEOUT_SECS") {
        if let Ok(secs) = v.trim().parse() {
            config.http.timeout_secs = secs;
            sources
                .env_overrides
                .push("ARGSTASH_HTTP_TIMEOUT_SECS".to_string());
        }
    }
    if let Some(v) = lookup("ARGSTASH_OBJECT_STORE_ROOT") {
        config.object_store.root = expand_path(&v);
        sources
            .env_overrides
            .push("ARGSTASH_OBJECT_STORE_ROOT".to_string());
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
