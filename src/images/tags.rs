// ABOUTME: Adding and removing repository tags on a stored image.
// ABOUTME: An image's last tag is never removed; that would delete the image.

use serde::Serialize;

use crate::classify::Operation;
use crate::runtime::{EngineError, ImageOps};
use crate::types::{ImageTag, ImageTagError};

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("invalid tag: {0}")]
    InvalidTag(#[from] ImageTagError),

    #[error("failed to inspect image: {0}")]
    Inspect(#[source] EngineError),

    #[error("failed to tag image: {0}")]
    Tag(#[source] EngineError),

    #[error("failed to remove tag: {0}")]
    Untag(#[source] EngineError),

    #[error("{tag} is not a tag of image {image_id}")]
    UnknownTag { image_id: String, tag: String },

    #[error("refusing to remove {0}, the image's last tag")]
    LastTag(String),
}

impl TagError {
    /// Operation to report when classifying this failure.
    pub fn operation(&self) -> Operation {
        match self {
            TagError::InvalidTag(_) | TagError::Tag(_) => Operation::TagImage,
            TagError::Inspect(_) => Operation::InspectImage,
            TagError::Untag(_) | TagError::UnknownTag { .. } | TagError::LastTag(_) => {
                Operation::UntagImage
            }
        }
    }

    /// Whether the request itself was at fault rather than the engine.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TagError::InvalidTag(_)
                | TagError::UnknownTag { .. }
                | TagError::LastTag(_)
                | TagError::Inspect(EngineError::NotFound(_))
        )
    }
}

/// Tags of an image after a tag was added or removed.
#[derive(Debug, Clone, Serialize)]
pub struct TagReport {
    pub image_id: String,
    /// The tag that was added or removed.
    pub tag: String,
    /// Every tag the image carries now.
    pub tags: Vec<String>,
}

/// Tag `image_id` as `new_tag`; a bare repository gets `latest`.
pub async fn add_tag<E>(engine: &E, image_id: &str, new_tag: &str) -> Result<TagReport, TagError>
where
    E: ImageOps + ?Sized,
{
    let tag = ImageTag::parse(new_tag)?.or_latest();
    tracing::info!(image_id = %image_id, tag = %tag, "Tagging image");

    engine.tag_image(image_id, &tag).await.map_err(TagError::Tag)?;
    let detail = engine
        .inspect_image(image_id)
        .await
        .map_err(TagError::Inspect)?;

    Ok(TagReport {
        image_id: image_id.to_string(),
        tag: tag.to_string(),
        tags: detail.repo_tags,
    })
}

/// Remove `tag` from `image_id`, leaving the image in place.
pub async fn remove_tag<E>(engine: &E, image_id: &str, tag: &str) -> Result<TagReport, TagError>
where
    E: ImageOps + ?Sized,
{
    let tag = ImageTag::parse(tag)?.or_latest().to_string();

    let detail = engine
        .inspect_image(image_id)
        .await
        .map_err(TagError::Inspect)?;
    if !detail.repo_tags.contains(&tag) {
        return Err(TagError::UnknownTag {
            image_id: image_id.to_string(),
            tag,
        });
    }
    if detail.repo_tags.len() == 1 {
        return Err(TagError::LastTag(tag));
    }

    tracing::info!(image_id = %image_id, tag = %tag, "Removing tag");
    engine
        .remove_image(&tag, false)
        .await
        .map_err(TagError::Untag)?;

    let detail = engine
        .inspect_image(image_id)
        .await
        .map_err(TagError::Inspect)?;

    Ok(TagReport {
        image_id: image_id.to_string(),
        tag,
        tags: detail.repo_tags,
    })
}
