// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Phantom-typed IDs plus repository tag parsing.

mod id;
mod image_tag;

pub use id::{ContainerId, Id, ImageId, SHORT_ID_LEN};
pub use image_tag::{ImageTag, ImageTagError, UNTAGGED};
