// ABOUTME: Configuration types and parsing for stevedore.yml.
// ABOUTME: Every key is optional; a missing file means built-in defaults.

mod init;

pub use init::{TEMPLATE, init_config};

use crate::error::{Error, Result};
use crate::proxy::{
    DEFAULT_CHECK_TARGET, DEFAULT_CHECK_TIMEOUT, DEFAULT_NO_PROXY, ProxyChecker, ProxyManager,
    SystemHost,
};
use crate::runtime::{DEFAULT_REGISTRY, RuntimeConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "stevedore.yml";
pub const CONFIG_FILENAME_ALT: &str = "stevedore.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".stevedore/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default)]
    pub engine: RuntimeConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Registry address sent with login and push credentials.
    #[serde(default = "default_registry")]
    pub server: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Systemd drop-in written while a proxy session is active.
    #[serde(default = "default_daemon_config")]
    pub daemon_config: PathBuf,

    /// Wait after each daemon restart.
    #[serde(default = "default_settle", with = "humantime_serde")]
    pub settle: Duration,

    /// Run `systemctl daemon-reload` and restart the daemon around sessions.
    #[serde(default = "default_true")]
    pub restart_daemon: bool,

    #[serde(default = "default_no_proxy")]
    pub no_proxy: String,

    /// `host:port` that proxy checks tunnel to.
    #[serde(default = "default_check_target")]
    pub check_target: String,

    #[serde(default = "default_check_timeout", with = "humantime_serde")]
    pub check_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append logs to a dated file in this directory instead of stderr.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5526))
}

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_string()
}

fn default_daemon_config() -> PathBuf {
    crate::proxy::default_daemon_config()
}

fn default_settle() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

fn default_no_proxy() -> String {
    DEFAULT_NO_PROXY.to_string()
}

fn default_check_target() -> String {
    DEFAULT_CHECK_TARGET.to_string()
}

fn default_check_timeout() -> Duration {
    DEFAULT_CHECK_TIMEOUT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            server: default_registry(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            daemon_config: default_daemon_config(),
            settle: default_settle(),
            restart_daemon: true,
            no_proxy: default_no_proxy(),
            check_target: default_check_target(),
            check_timeout: default_check_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            engine: RuntimeConfig::default(),
            registry: RegistryConfig::default(),
            proxy: ProxyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Proxy manager acting on this host.
    pub fn manager(&self) -> ProxyManager {
        let host = SystemHost::new(&self.daemon_config, self.restart_daemon);
        ProxyManager::new(Arc::new(host))
            .with_settle(self.settle)
            .with_no_proxy(&self.no_proxy)
    }

    pub fn checker(&self) -> ProxyChecker {
        ProxyChecker::new(&self.check_target, self.check_timeout)
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // A file holding only comments is an empty document.
        let has_content = yaml.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        });
        if !has_content {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Load `explicit` if given, else discover in `dir`, else use defaults.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::ConfigNotFound(path.to_path_buf()));
            }
            return Self::load(path);
        }

        match Self::discover(dir) {
            Err(Error::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }
}
