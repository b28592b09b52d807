// ABOUTME: Image listing with in-use detection.
// ABOUTME: Cross-references stored images against every container's image reference.

use chrono::{DateTime, Local};
use nonempty::NonEmpty;
use serde::Serialize;
use std::collections::HashSet;

use crate::classify::{Operation, TIMESTAMP_FORMAT};
use crate::runtime::{ContainerOps, ContainerSummary, EngineError, ImageOps, ImageSummary};
use crate::types::{ImageId, UNTAGGED};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Errors that stop a listing.
#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("failed to list images: {0}")]
    Images(#[source] EngineError),

    #[error("failed to list containers: {0}")]
    Containers(#[source] EngineError),

    #[error("engine reported an image id shorter than 12 characters: {0:?}")]
    ShortId(String),
}

impl ListingError {
    /// Operation to report when classifying this failure.
    pub fn operation(&self) -> Operation {
        match self {
            ListingError::Images(_) | ListingError::ShortId(_) => Operation::ListImages,
            ListingError::Containers(_) => Operation::ListContainers,
        }
    }
}

/// One locally stored image, ready for display.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub short_id: String,
    /// First tag, or the untagged placeholder.
    pub name: String,
    pub tags: NonEmpty<String>,
    /// Size in megabytes, e.g. "12.50 MB".
    pub size: String,
    /// Local creation time, "YYYY-MM-DD HH:MM:SS".
    pub created: String,
    #[serde(rename = "is_used")]
    pub in_use: bool,
}

/// Image ids referenced by any known container, running or stopped.
#[derive(Debug, Default)]
pub struct UsedImageSet(HashSet<ImageId>);

impl UsedImageSet {
    pub fn from_containers(containers: &[ContainerSummary]) -> Self {
        Self(containers.iter().map(|c| c.image_id.clone()).collect())
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Format a byte count as megabytes with two decimals.
pub fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / BYTES_PER_MB)
}

/// Format Unix epoch seconds as local time.
pub fn format_created(epoch_secs: i64) -> String {
    DateTime::from_timestamp(epoch_secs, 0)
        .map(|utc| utc.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

fn to_record(image: ImageSummary, used: &UsedImageSet) -> Result<ImageRecord, ListingError> {
    let short_id = image
        .id
        .short()
        .ok_or_else(|| ListingError::ShortId(image.id.to_string()))?
        .to_string();

    let tags = NonEmpty::from_vec(image.repo_tags)
        .unwrap_or_else(|| NonEmpty::new(UNTAGGED.to_string()));

    Ok(ImageRecord {
        in_use: used.contains(&image.id),
        name: tags.first().clone(),
        short_id,
        tags,
        size: format_size(image.size),
        created: format_created(image.created),
        id: image.id,
    })
}

/// List every stored image, in the engine's order, flagging the ones in use.
pub async fn list_images<E>(engine: &E) -> Result<Vec<ImageRecord>, ListingError>
where
    E: ImageOps + ContainerOps + ?Sized,
{
    tracing::info!("Fetching image list");

    let images = engine.list_images().await.map_err(ListingError::Images)?;
    let containers = engine
        .list_containers(true)
        .await
        .map_err(ListingError::Containers)?;

    // Rebuilt per request: container state changes between calls.
    let used = UsedImageSet::from_containers(&containers);
    tracing::debug!(
        images = images.len(),
        containers = containers.len(),
        used = used.len(),
        "building image records"
    );

    images
        .into_iter()
        .map(|image| to_record(image, &used))
        .collect()
}
