// ABOUTME: Container listing trait for container engines.
// ABOUTME: Only what image housekeeping needs: which images containers reference.

use super::shared_types::ContainerSummary;
use crate::runtime::EngineError;
use async_trait::async_trait;

#[async_trait]
pub trait ContainerOps: Send + Sync {
    /// List containers. With `all`, stopped containers are included.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, EngineError>;
}
