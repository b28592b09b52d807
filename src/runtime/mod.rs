// ABOUTME: Engine adapter: capability traits plus the bollard implementation.
// ABOUTME: Also hosts socket detection and the push progress decoder.

mod bollard;
mod connector;
mod detection;
mod error;
mod progress;
pub mod traits;
mod types;

pub use self::bollard::BollardEngine;
pub use connector::{EngineConnector, LocalConnector};
pub use detection::{DetectionError, detect_local, resolve_runtime};
pub use error::{EngineError, RuntimeError, RuntimeErrorKind};
pub use progress::decode_progress;
pub use traits::*;
pub use types::{RuntimeConfig, RuntimeInfo, RuntimeType};
