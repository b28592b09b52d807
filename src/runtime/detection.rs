// ABOUTME: Local runtime detection for Docker and Podman.
// ABOUTME: Honours explicit config, otherwise probes Podman sockets first, then Docker.

use super::types::{RuntimeConfig, RuntimeInfo, RuntimeType};
use std::path::Path;

/// Error during runtime detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error("configured socket does not exist: {0}")]
    SocketMissing(String),
}

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Resolve the engine socket for this host.
///
/// Explicit `runtime`/`socket` settings win. A configured socket must exist.
/// Otherwise falls back to [`detect_local`].
pub fn resolve_runtime(config: &RuntimeConfig) -> Result<RuntimeInfo, DetectionError> {
    match (config.runtime, config.socket.as_deref()) {
        (runtime, Some(socket)) => {
            let socket = socket.trim_start_matches("unix://");
            if !Path::new(socket).exists() {
                return Err(DetectionError::SocketMissing(socket.to_string()));
            }
            Ok(RuntimeInfo {
                runtime_type: runtime.unwrap_or_else(|| guess_runtime(socket)),
                socket_path: socket.to_string(),
            })
        }
        (Some(runtime_type), None) => Ok(RuntimeInfo {
            runtime_type,
            socket_path: default_socket_path(runtime_type),
        }),
        (None, None) => detect_local(),
    }
}

/// Detect container runtime on the local system.
///
/// Detection order:
/// 1. Rootless Podman socket (`/run/user/$UID/podman/podman.sock`)
/// 2. Rootful Podman socket (`/run/podman/podman.sock`)
/// 3. Docker socket (`/var/run/docker.sock`)
pub fn detect_local() -> Result<RuntimeInfo, DetectionError> {
    if let Some(uid) = get_uid() {
        let rootless_socket = format!("/run/user/{}/podman/podman.sock", uid);
        if Path::new(&rootless_socket).exists() {
            return Ok(RuntimeInfo {
                runtime_type: RuntimeType::Podman,
                socket_path: rootless_socket,
            });
        }
    }

    if Path::new(ROOTFUL_PODMAN).exists() {
        return Ok(RuntimeInfo {
            runtime_type: RuntimeType::Podman,
            socket_path: ROOTFUL_PODMAN.to_string(),
        });
    }

    if Path::new(DOCKER_SOCKET).exists() {
        return Ok(RuntimeInfo {
            runtime_type: RuntimeType::Docker,
            socket_path: DOCKER_SOCKET.to_string(),
        });
    }

    Err(DetectionError::NoRuntimeFound)
}

fn get_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(|s| s.to_string())
            })
    })
}

fn guess_runtime(socket: &str) -> RuntimeType {
    if socket.contains("podman") {
        RuntimeType::Podman
    } else {
        RuntimeType::Docker
    }
}

fn default_socket_path(runtime: RuntimeType) -> String {
    match runtime {
        RuntimeType::Docker => DOCKER_SOCKET.to_string(),
        RuntimeType::Podman => ROOTFUL_PODMAN.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_runtime_without_socket_uses_default_path() {
        let config = RuntimeConfig {
            runtime: Some(RuntimeType::Podman),
            ..Default::default()
        };
        let info = resolve_runtime(&config).unwrap();
        assert_eq!(info.runtime_type, RuntimeType::Podman);
        assert_eq!(info.socket_path, ROOTFUL_PODMAN);
    }

    #[test]
    fn missing_configured_socket_is_an_error() {
        let config = RuntimeConfig {
            socket: Some("/nonexistent/stevedore.sock".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_runtime(&config),
            Err(DetectionError::SocketMissing(_))
        ));
    }

    #[test]
    fn configured_socket_strips_scheme_and_guesses_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("podman.sock");
        std::fs::write(&socket, b"").unwrap();

        let config = RuntimeConfig {
            socket: Some(format!("unix://{}", socket.display())),
            ..Default::default()
        };
        let info = resolve_runtime(&config).unwrap();
        assert_eq!(info.runtime_type, RuntimeType::Podman);
        assert_eq!(info.socket_path, socket.display().to_string());
    }
}
