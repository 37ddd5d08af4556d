//! Configuration loading for argstash.
//!
//! The core only consumes three settings: the ordered list of enabled
//! backends, the largest string the inline backend will embed, and the TTL
//! for share links. Network backends additionally read their own sections.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/argstash/config.toml` (system)
//! 2. `~/.config/argstash/config.toml` (user)
//! 3. `./argstash.toml` (local override, or an explicit path)
//! 4. Environment variables (`ARGSTASH_*`)
//!
//! # Example Config
//!
//! ```toml
//! backends = ["inline", "s3"]
//! max_inline_value_bytes = 100
//! share_link_ttl_seconds = 600
//!
//! [http]
//! timeout_secs = 30
//!
//! [object_store]
//! root = "~/.argstash/objects"
//! ```

pub mod loader;

pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Settings for backends that fetch over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout. Default: 30
    #[serde(default = "HttpConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl HttpConfig {
    fn default_timeout_secs() -> u64 {
        30
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// Settings for the bundled filesystem object-store client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Directory holding one subdirectory per bucket.
    /// Default: ~/.argstash/objects
    #[serde(default = "ObjectStoreConfig::default_root")]
    pub root: PathBuf,
}

impl ObjectStoreConfig {
    fn default_root() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".argstash").join("objects"))
            .unwrap_or_else(|| PathBuf::from(".argstash/objects"))
    }
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
        }
    }
}

/// Complete argstash configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashConfig {
    /// Enabled backends. Order is write priority; membership gates reads.
    #[serde(default = "StashConfig::default_backends")]
    pub backends: Vec<String>,

    /// Longest UTF-8 string (in bytes) the inline backend accepts.
    #[serde(default = "StashConfig::default_max_inline_value_bytes")]
    pub max_inline_value_bytes: usize,

    /// Lifetime of links produced by `share`.
    #[serde(default = "StashConfig::default_share_link_ttl_seconds")]
    pub share_link_ttl_seconds: u64,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub object_store: ObjectStoreConfig,
}

impl StashConfig {
    fn default_backends() -> Vec<String> {
        vec!["inline".to_string(), "mem".to_string()]
    }

    fn default_max_inline_value_bytes() -> usize {
        100
    }

    fn default_share_link_ttl_seconds() -> u64 {
        600
    }

    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/argstash/config.toml`
    /// 3. `~/.config/argstash/config.toml`
    /// 4. `./argstash.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` replacing the local override.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = StashConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Replace the enabled backend list.
    pub fn with_backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backends = backends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_inline_value_bytes(mut self, max: usize) -> Self {
        self.max_inline_value_bytes = max;
        self
    }

    /// Whether `name` is in the enabled backend list.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.backends.iter().any(|b| b == name)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# argstash configuration\n\n");

        let backends: Vec<String> = self
            .backends
            .iter()
            .map(|b| format!("\"{}\"", b))
            .collect();
        output.push_str(&format!("backends = [{}]\n", backends.join(", ")));
        output.push_str(&format!(
            "max_inline_value_bytes = {}\n",
            self.max_inline_value_bytes
        ));
        output.push_str(&format!(
            "share_link_ttl_seconds = {}\n",
            self.share_link_ttl_seconds
        ));

        output.push_str("\n[http]\n");
        output.push_str(&format!("timeout_secs = {}\n", self.http.timeout_secs));

        output.push_str("\n[object_store]\n");
        output.push_str(&format!(
            "root = \"{}\"\n",
            self.object_store.root.display()
        ));

        output
    }
}

impl Default for StashConfig {
    fn default() -> Self {
        Self {
            backends: Self::default_backends(),
            max_inline_value_bytes: Self::default_max_inline_value_bytes(),
            share_link_ttl_seconds: Self::default_share_link_ttl_seconds(),
            http: HttpConfig::default(),
            object_store: ObjectStoreConfig::default(),
        }
    }
}
