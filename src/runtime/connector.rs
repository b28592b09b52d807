// ABOUTME: Per-request engine connection factory.
// ABOUTME: Resolves the local socket and opens a fresh BollardEngine for each request.

use super::bollard::BollardEngine;
use super::detection::resolve_runtime;
use super::error::RuntimeError;
use super::traits::Engine;
use super::types::RuntimeConfig;

/// Opens one engine connection per top-level request.
///
/// The connection is released when the returned box is dropped.
pub trait EngineConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Engine>, RuntimeError>;
}

/// Connects to the engine on this host.
#[derive(Debug, Clone, Default)]
pub struct LocalConnector {
    config: RuntimeConfig,
}

impl LocalConnector {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }
}

impl EngineConnector for LocalConnector {
    fn connect(&self) -> Result<Box<dyn Engine>, RuntimeError> {
        let info = resolve_runtime(&self.config)?;
        let engine = BollardEngine::connect(&info, self.config.timeout)?;
        tracing::debug!(
            runtime = %engine.runtime_type(),
            socket = %info.socket_path,
            "connected to engine"
        );
        Ok(Box::new(engine))
    }
}
