// ABOUTME: Config scaffolding for new installations.
// ABOUTME: Writes a commented stevedore.yml showing every key and its default.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

/// Template written by `stevedore init`. Parses to the built-in defaults.
pub const TEMPLATE: &str = r#"# stevedore configuration. Every key is optional.

# Address the HTTP API listens on.
listen: 0.0.0.0:5526

engine:
  # docker or podman. Auto-detected when unset.
  # runtime: docker
  # socket: /var/run/docker.sock
  timeout: 120s

registry:
  server: https://index.docker.io/v1/

proxy:
  # Drop-in written while a push runs through a proxy.
  daemon_config: /etc/systemd/system/docker.service.d/http-proxy.conf
  settle: 5s
  restart_daemon: true
  no_proxy: localhost,127.0.0.1
  # Tunnel target and time limit for proxy checks.
  check_target: registry-1.docker.io:443
  check_timeout: 5s

logging:
  level: info
  # Append to stevedore-YYYY-MM-DD.log in this directory instead of stderr.
  # dir: logs
"#;

pub fn init_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE)?;
    Ok(config_path)
}
