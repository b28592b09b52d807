// ABOUTME: Registry operations trait for container engines.
// ABOUTME: Login once, then push tags with pre-encoded credentials.

use super::shared_types::{EncodedAuth, ProgressStream, RegistryCredentials};
use crate::runtime::EngineError;
use crate::types::ImageTag;
use async_trait::async_trait;

#[async_trait]
pub trait RegistryOps: Send + Sync {
    /// Authenticate against the registry named in `credentials`.
    async fn login(&self, credentials: &RegistryCredentials) -> Result<(), EngineError>;

    /// Start pushing `tag`.
    ///
    /// The returned stream must be drained, or dropped after its first
    /// terminal error, before the engine connection is released.
    async fn push_image(
        &self,
        tag: &ImageTag,
        auth: &EncodedAuth,
    ) -> Result<ProgressStream, EngineError>;
}
