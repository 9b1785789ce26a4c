//! Layered configuration: a YAML file overridden by `PORTAL__*` environment
//! variables, with optional hot reload of the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock, mpsc};
use std::thread;
use std::time::Duration;

use config::{Config as RawConfig, Environment, File};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

const ENV_PREFIX: &str = "PORTAL";
const ENV_SEPARATOR: &str = "__";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load or parse configuration")]
    Load(#[from] config::ConfigError),

    #[error("Failed to initialize file watcher")]
    Watch(#[from] notify::Error),

    #[error("Unknown deployment target: {0}")]
    DeploymentTarget(String),

    #[error("Configuration lock was poisoned, indicating a panic in another thread")]
    LockPoisoned,
}

/// How the portal is deployed.
///
/// `Standalone` serves the JSON API only. `StaticExport` additionally serves
/// the exported front-end bundle from `app.static_dir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum DeploymentTarget {
    Standalone,
    StaticExport,
}

impl FromStr for DeploymentTarget {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "standalone" | "server" => Ok(DeploymentTarget::Standalone),
            "static-export" | "static_export" | "export" | "static" => Ok(DeploymentTarget::StaticExport),
            other => Err(ConfigError::DeploymentTarget(other.to_string())),
        }
    }
}

impl TryFrom<String> for DeploymentTarget {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentTarget::Standalone => write!(f, "standalone"),
            DeploymentTarget::StaticExport => write!(f, "static-export"),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    inner: Arc<RwLock<RawConfig>>,
    // Dropping the config stops the watcher thread.
    _watcher: Option<RecommendedWatcher>,
}

impl Config {
    pub fn builder<P: AsRef<Path>>(path: P) -> ConfigBuilder {
        ConfigBuilder::new(path.as_ref().to_path_buf())
    }

    #[cfg(feature = "testing")]
    pub fn builder_test() -> test_utils::TestConfigBuilder {
        test_utils::TestConfigBuilder::new()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let guard = self.inner.read().map_err(|_| ConfigError::LockPoisoned)?;
        guard.get(key).map_err(ConfigError::from)
    }

    /// Like [`Config::get`] but falls back to `default` when the key is absent.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Ok(value) => Ok(value),
            Err(ConfigError::Load(config::ConfigError::NotFound(_))) => Ok(default),
            Err(err) => Err(err),
        }
    }

    /// Public origin of the web application, without a trailing slash. Used to
    /// build email-verification callback links.
    pub fn base_url(&self) -> Result<String, ConfigError> {
        let url: String = self.get_or("app.base_url", "http://localhost:3000".to_string())?;
        Ok(url.trim_end_matches('/').to_string())
    }

    /// Public origin of this API, used in links that must reach the server
    /// itself rather than the web application.
    pub fn public_url(&self) -> Result<String, ConfigError> {
        let url: String = self.get_or("server.public_url", "http://localhost:8080".to_string())?;
        Ok(url.trim_end_matches('/').to_string())
    }

    pub fn deployment_target(&self) -> Result<DeploymentTarget, ConfigError> {
        let raw: String = self.get_or("app.deployment_target", DeploymentTarget::Standalone.to_string())?;
        raw.parse()
    }
}

pub struct ConfigBuilder {
    path: PathBuf,
    watch: bool,
    watch_interval: Duration,
    env_overrides: bool,
}

impl ConfigBuilder {
    fn new(path: PathBuf) -> Self {
        Self { path, watch: false, watch_interval: Duration::from_secs(2), env_overrides: true }
    }

    pub fn watch(mut self) -> Self {
        self.watch = true;
        self
    }

    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Ignores `PORTAL__*` environment variables. Mostly useful in tests.
    pub fn without_env(mut self) -> Self {
        self.env_overrides = false;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let raw_config = Self::load(&self.path, self.env_overrides)?;
        let config_arc = Arc::new(RwLock::new(raw_config));
        let mut watcher = None;

        if self.watch {
            let path = self.path.clone();
            let env_overrides = self.env_overrides;
            let shared = Arc::clone(&config_arc);
            let (tx, rx) = mpsc::channel();

            let mut w = RecommendedWatcher::new(tx, notify::Config::default().with_poll_interval(self.watch_interval))?;
            w.watch(&self.path, RecursiveMode::NonRecursive)?;

            thread::spawn(move || {
                tracing::info!(path = %path.display(), "watching configuration file");
                while let Ok(event) = rx.recv() {
                    match event {
                        Ok(Event { kind: EventKind::Modify(_), .. }) => Self::reload(&path, env_overrides, &shared),
                        Ok(_) => {},
                        Err(e) => tracing::error!("configuration watcher error: {:?}", e),
                    }
                }
            });
            watcher = Some(w);
        }

        Ok(Config { inner: config_arc, _watcher: watcher })
    }

    fn reload(path: &Path, env_overrides: bool, shared: &RwLock<RawConfig>) {
        match Self::load(path, env_overrides) {
            Ok(fresh) => match shared.write() {
                Ok(mut guard) => {
                    *guard = fresh;
                    tracing::info!("configuration reloaded");
                },
                Err(_) => tracing::error!("configuration lock poisoned, keeping previous values"),
            },
            Err(e) => tracing::error!("failed to reload configuration: {}", e),
        }
    }

    fn load(path: &Path, env_overrides: bool) -> Result<RawConfig, config::ConfigError> {
        let mut builder = RawConfig::builder().add_source(File::from(path).required(true));
        if env_overrides {
            builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR));
        }
        builder.build()
    }
}

#[cfg(feature = "testing")]
pub mod test_utils {
    use std::collections::HashMap;

    use config::Value;

    use super::*;

    #[derive(Default)]
    pub struct TestConfigBuilder {
        values: HashMap<String, Value>,
    }

    impl TestConfigBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
            self.values.insert(key.to_string(), value.into());
            self
        }

        pub fn build(self) -> Config {
            let mut builder = RawConfig::builder();

            for (key, value) in self.values {
                builder = builder.set_override(key, value).expect("invalid test config key");
            }

            let raw_config = builder.build().expect("Failed to create config from test values");

            Config { inner: Arc::new(RwLock::new(raw_config)), _watcher: None }
        }
    }
}
