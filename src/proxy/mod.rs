// ABOUTME: Outbound proxy configuration for registry pushes.
// ABOUTME: Parses proxy requests and owns the scoped proxy session.

mod check;
mod host;
mod session;

pub use check::{
    DEFAULT_CHECK_TARGET, DEFAULT_CHECK_TIMEOUT, ProxyCheck, ProxyCheckError, ProxyChecker,
};
pub use host::{DAEMON_UNIT, ProxyHost, SystemHost};
pub use session::{ProxyManager, ProxySession};

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default location of the engine daemon's proxy drop-in.
pub const DEFAULT_DAEMON_CONFIG: &str = "/etc/systemd/system/docker.service.d/http-proxy.conf";

/// Default hosts that bypass the proxy.
pub const DEFAULT_NO_PROXY: &str = "localhost,127.0.0.1";

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("unsupported proxy type: {0} (expected http, https or socks5)")]
    UnknownType(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("daemon reload failed: {0}")]
    Reload(String),
}

/// Proxy protocol requested for a push batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    Http,
    Https,
    Socks5,
}

impl ProxyType {
    pub const ALL: [ProxyType; 3] = [ProxyType::Http, ProxyType::Https, ProxyType::Socks5];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Http => "http",
            ProxyType::Https => "https",
            ProxyType::Socks5 => "socks5",
        }
    }

    /// Environment variable names for this type, upper-case first.
    pub fn env_names(&self) -> [String; 2] {
        [
            format!("{}_PROXY", self.as_str().to_ascii_uppercase()),
            format!("{}_proxy", self.as_str()),
        ]
    }
}

impl FromStr for ProxyType {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks5" => Ok(ProxyType::Socks5),
            _ => Err(ProxyError::UnknownType(s.to_string())),
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proxy to route one push batch through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub proxy_type: ProxyType,
    pub address: String,
}

impl ProxySettings {
    /// Build settings from optional request fields.
    ///
    /// Returns `Ok(None)` when either field is missing or blank, which
    /// means "no proxy".
    pub fn from_request(
        proxy_type: Option<&str>,
        address: Option<&str>,
    ) -> Result<Option<Self>, ProxyError> {
        let proxy_type = proxy_type.map(str::trim).filter(|s| !s.is_empty());
        let address = address.map(str::trim).filter(|s| !s.is_empty());

        match (proxy_type, address) {
            (Some(t), Some(a)) => Ok(Some(Self {
                proxy_type: t.parse()?,
                address: a.to_string(),
            })),
            _ => Ok(None),
        }
    }
}

/// Every environment variable a proxy session may touch.
pub fn managed_env_names() -> Vec<String> {
    let mut names: Vec<String> = ProxyType::ALL.iter().flat_map(|t| t.env_names()).collect();
    names.push("NO_PROXY".to_string());
    names.push("no_proxy".to_string());
    names
}

/// Systemd drop-in that points the engine daemon at `address`.
pub fn daemon_config_contents(address: &str, no_proxy: &str) -> String {
    format!(
        "[Service]\nEnvironment=\"HTTP_PROXY={address}\"\nEnvironment=\"HTTPS_PROXY={address}\"\nEnvironment=\"NO_PROXY={no_proxy}\"\n"
    )
}

pub(crate) fn default_daemon_config() -> PathBuf {
    PathBuf::from(DEFAULT_DAEMON_CONFIG)
}
