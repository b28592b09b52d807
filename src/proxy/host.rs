// ABOUTME: Host-level side effects of a proxy session.
// ABOUTME: Environment variables, the daemon drop-in file, and daemon restarts.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::ProxyError;

/// Systemd unit restarted after the drop-in changes.
pub const DAEMON_UNIT: &str = "docker";

/// The process and host state a proxy session mutates.
#[async_trait]
pub trait ProxyHost: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;

    fn set_var(&self, key: &str, value: &str);

    fn remove_var(&self, key: &str);

    /// Current daemon drop-in contents, `None` if the file does not exist.
    fn read_daemon_config(&self) -> Result<Option<String>, ProxyError>;

    /// Write the drop-in, creating parent directories as needed.
    fn write_daemon_config(&self, contents: &str) -> Result<(), ProxyError>;

    /// Remove the drop-in. A missing file is not an error.
    fn remove_daemon_config(&self) -> Result<(), ProxyError>;

    /// Make the daemon pick up the drop-in.
    async fn reload_daemon(&self) -> Result<(), ProxyError>;
}

/// The real host: process environment, filesystem and systemd.
#[derive(Debug, Clone)]
pub struct SystemHost {
    daemon_config: PathBuf,
    restart_daemon: bool,
}

impl SystemHost {
    pub fn new(daemon_config: impl Into<PathBuf>, restart_daemon: bool) -> Self {
        Self {
            daemon_config: daemon_config.into(),
            restart_daemon,
        }
    }

    pub fn daemon_config(&self) -> &Path {
        &self.daemon_config
    }

    fn io_error(&self, source: std::io::Error) -> ProxyError {
        ProxyError::Io {
            path: self.daemon_config.clone(),
            source,
        }
    }
}

async fn systemctl(args: &[&str]) -> Result<(), ProxyError> {
    let output = Command::new("systemctl")
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProxyError::Reload(format!("systemctl {}: {}", args.join(" "), e)))?;

    if !output.status.success() {
        return Err(ProxyError::Reload(format!(
            "systemctl {} exited with {:?}: {}",
            args.join(" "),
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[async_trait]
impl ProxyHost for SystemHost {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn set_var(&self, key: &str, value: &str) {
        // SAFETY: proxy sessions are serialized by the process-wide proxy
        // lock, and nothing else in this process writes these variables.
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_var(&self, key: &str) {
        // SAFETY: see set_var.
        unsafe { std::env::remove_var(key) }
    }

    fn read_daemon_config(&self) -> Result<Option<String>, ProxyError> {
        match std::fs::read_to_string(&self.daemon_config) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn write_daemon_config(&self, contents: &str) -> Result<(), ProxyError> {
        if let Some(parent) = self.daemon_config.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        std::fs::write(&self.daemon_config, contents).map_err(|e| self.io_error(e))
    }

    fn remove_daemon_config(&self) -> Result<(), ProxyError> {
        match std::fs::remove_file(&self.daemon_config) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn reload_daemon(&self) -> Result<(), ProxyError> {
        if !self.restart_daemon {
            tracing::debug!("daemon restart disabled, skipping reload");
            return Ok(());
        }
        systemctl(&["daemon-reload"]).await?;
        systemctl(&["restart", DAEMON_UNIT]).await
    }
}
