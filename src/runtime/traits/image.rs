// ABOUTME: Image operations trait for container engines.
// ABOUTME: List, inspect, tag, and remove locally stored images.

use super::shared_types::{ImageDetail, ImageSummary};
use crate::runtime::EngineError;
use crate::types::ImageTag;
use async_trait::async_trait;

/// Image operations: list, inspect, tag, remove.
#[async_trait]
pub trait ImageOps: Send + Sync {
    /// List all images, including untagged intermediate layers.
    async fn list_images(&self) -> Result<Vec<ImageSummary>, EngineError>;

    /// Inspect a single image by ID or tag.
    async fn inspect_image(&self, id: &str) -> Result<ImageDetail, EngineError>;

    /// Add `tag` to the image `id`.
    async fn tag_image(&self, id: &str, tag: &ImageTag) -> Result<(), EngineError>;

    /// Remove an image. Given one of several tags, only that tag goes away.
    async fn remove_image(&self, id: &str, force: bool) -> Result<(), EngineError>;
}
