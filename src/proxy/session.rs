// ABOUTME: Scoped proxy activation around a push batch.
// ABOUTME: Snapshots host state on activate and restores exactly that snapshot afterwards.

use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    DEFAULT_NO_PROXY, ProxyHost, ProxySettings, ProxyType, daemon_config_contents,
    managed_env_names,
};

/// Environment variables and the daemon drop-in are process-wide, so only
/// one session may exist at a time.
static PROXY_LOCK: LazyLock<Arc<Mutex<()>>> = LazyLock::new(|| Arc::new(Mutex::new(())));

/// Settle time after a daemon restart.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(5);

/// Creates proxy sessions against a host.
pub struct ProxyManager {
    host: Arc<dyn ProxyHost>,
    settle: Duration,
    no_proxy: String,
}

impl ProxyManager {
    pub fn new(host: Arc<dyn ProxyHost>) -> Self {
        Self {
            host,
            settle: DEFAULT_SETTLE,
            no_proxy: DEFAULT_NO_PROXY.to_string(),
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_no_proxy(mut self, no_proxy: impl Into<String>) -> Self {
        self.no_proxy = no_proxy.into();
        self
    }

    /// Route outbound traffic through `settings` until the session ends.
    ///
    /// Waits for any other session to end first. Host failures (an
    /// unwritable drop-in, a failed restart) are logged and do not stop
    /// the push; the engine reports its own errors if the proxy is unusable.
    pub async fn activate(&self, settings: &ProxySettings) -> ProxySession {
        let guard = Arc::clone(&PROXY_LOCK).lock_owned().await;
        let snapshot = Snapshot::capture(self.host.as_ref());

        tracing::info!(
            proxy_type = %settings.proxy_type,
            address = %settings.address,
            "Activating proxy"
        );

        let [upper, lower] = settings.proxy_type.env_names();
        self.host.set_var(&upper, &settings.address);
        self.host.set_var(&lower, &settings.address);
        // The registry is always reached over HTTPS.
        for name in ProxyType::Https.env_names() {
            self.host.set_var(&name, &settings.address);
        }

        // A drop-in we could not read could not be put back either.
        if snapshot.daemon_config.is_known() {
            let contents = daemon_config_contents(&settings.address, &self.no_proxy);
            if let Err(e) = self.host.write_daemon_config(&contents) {
                tracing::warn!(error = %e, "failed to write daemon proxy config");
            }
        }
        self.settle_daemon().await;

        ProxySession {
            host: Arc::clone(&self.host),
            settle: self.settle,
            snapshot: Some(snapshot),
            guard: Some(guard),
        }
    }

    async fn settle_daemon(&self) {
        settle_daemon(self.host.as_ref(), self.settle).await;
    }
}

async fn settle_daemon(host: &dyn ProxyHost, settle: Duration) {
    if let Err(e) = host.reload_daemon().await {
        tracing::warn!(error = %e, "daemon reload failed");
    }
    if !settle.is_zero() {
        tracing::debug!(?settle, "waiting for daemon to settle");
        tokio::time::sleep(settle).await;
    }
}

/// The daemon drop-in as it was before a session.
#[derive(Debug)]
enum SavedConfig {
    Absent,
    Present(String),
    /// Reading failed; the file is left alone on both ends of the session.
    Unreadable,
}

impl SavedConfig {
    fn is_known(&self) -> bool {
        !matches!(self, SavedConfig::Unreadable)
    }
}

/// Host state captured before a session touched it.
#[derive(Debug)]
struct Snapshot {
    vars: Vec<(String, Option<String>)>,
    daemon_config: SavedConfig,
}

impl Snapshot {
    fn capture(host: &dyn ProxyHost) -> Self {
        let vars = managed_env_names()
            .into_iter()
            .map(|name| {
                let value = host.var(&name);
                (name, value)
            })
            .collect();

        let daemon_config = match host.read_daemon_config() {
            Ok(Some(contents)) => SavedConfig::Present(contents),
            Ok(None) => SavedConfig::Absent,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read daemon proxy config, leaving it untouched");
                SavedConfig::Unreadable
            }
        };

        Self {
            vars,
            daemon_config,
        }
    }

    fn restore(self, host: &dyn ProxyHost) {
        for (name, value) in &self.vars {
            match value {
                Some(v) => host.set_var(name, v),
                None => host.remove_var(name),
            }
        }

        let result = match &self.daemon_config {
            SavedConfig::Present(contents) => host.write_daemon_config(contents),
            SavedConfig::Absent => host.remove_daemon_config(),
            SavedConfig::Unreadable => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to restore daemon proxy config");
        }
    }
}

/// An active proxy. End it with [`ProxySession::deactivate`].
///
/// Dropping a session without deactivating restores the environment and the
/// drop-in file at once, then restarts the daemon on a background task when
/// a tokio runtime is available. The next session waits for that restart.
#[must_use = "a proxy session must be deactivated"]
pub struct ProxySession {
    host: Arc<dyn ProxyHost>,
    settle: Duration,
    snapshot: Option<Snapshot>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ProxySession {
    /// Restore the pre-session state and restart the daemon.
    pub async fn deactivate(mut self) {
        tracing::info!("Deactivating proxy");
        if let Some(snapshot) = self.snapshot.take() {
            snapshot.restore(self.host.as_ref());
        }
        settle_daemon(self.host.as_ref(), self.settle).await;
    }
}

impl Drop for ProxySession {
    fn drop(&mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        tracing::warn!("proxy session dropped without deactivation");
        snapshot.restore(self.host.as_ref());

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let host = Arc::clone(&self.host);
                let settle = self.settle;
                let guard = self.guard.take();
                runtime.spawn(async move {
                    settle_daemon(host.as_ref(), settle).await;
                    drop(guard);
                });
            }
            Err(_) => tracing::warn!("no runtime to restart the daemon on; restart skipped"),
        }
    }
}
