// ABOUTME: Image operations: listing, batch deletion, registry push and tagging.
// ABOUTME: Each batch runs sequentially and isolates per-item failures.

mod delete;
mod ledger;
mod listing;
mod outcome;
mod push;
mod tags;

pub use delete::delete_images;
pub use ledger::{BatchLedger, ItemIndex, ItemPhase};
pub use listing::{
    ImageRecord, ListingError, UsedImageSet, format_created, format_size, list_images,
};
pub use outcome::{BatchStatus, DeleteReport, PushReport};
pub use push::{
    PushError, PushErrorKind, PushRequest, check_login, push_batch, push_images, spawn_push,
};
pub use tags::{TagError, TagReport, add_tag, remove_tag};
