// ABOUTME: Engine adapter error types.
// ABOUTME: EngineError for per-call failures, RuntimeError (SNAFU) for connection setup.

use snafu::Snafu;

use super::detection::DetectionError;

/// Failure of a single engine call.
///
/// Display texts carry the markers the error classifier looks for
/// ("not found", "unauthorized", "timeout"); transport errors keep the
/// operating system's wording.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("engine connection failed: {0}")]
    Connection(String),

    #[error("engine request timeout: {0}")]
    Timeout(String),

    #[error("invalid engine response: {0}")]
    InvalidResponse(String),

    #[error("engine error: {0}")]
    Runtime(String),
}

/// Unified error for detecting and connecting to an engine.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuntimeError {
    #[snafu(display("runtime detection failed: {source}"))]
    Detection { source: DetectionError },

    #[snafu(display("runtime connection failed: {source}"))]
    Connection { source: EngineError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// No container runtime socket found on this host.
    NoRuntimeFound,
    /// Socket exists but the client could not be built.
    ConnectionFailed,
}

impl RuntimeError {
    pub fn kind(&self) -> RuntimeErrorKind {
        match self {
            RuntimeError::Detection { .. } => RuntimeErrorKind::NoRuntimeFound,
            RuntimeError::Connection { .. } => RuntimeErrorKind::ConnectionFailed,
        }
    }
}

impl From<DetectionError> for RuntimeError {
    fn from(source: DetectionError) -> Self {
        RuntimeError::Detection { source }
    }
}

impl From<EngineError> for RuntimeError {
    fn from(source: EngineError) -> Self {
        RuntimeError::Connection { source }
    }
}
