// ABOUTME: Batch image removal with size accounting.
// ABOUTME: Sizes every image first, then force-removes each one independently.

use crate::classify::{Operation, classify};
use crate::runtime::ImageOps;

use super::ledger::{BatchLedger, ItemIndex};
use super::outcome::DeleteReport;

/// Remove each image in `ids`, in order, recording every failure.
///
/// Never aborts early: a failed inspection or removal is recorded and the
/// batch moves on. Sizes count only images that were actually inspected.
pub async fn delete_images<E>(engine: &E, ids: &[String]) -> DeleteReport
where
    E: ImageOps + ?Sized,
{
    let mut ledger = BatchLedger::new();
    let items: Vec<(ItemIndex, &str)> = ids
        .iter()
        .map(|id| (ledger.track(id.as_str()), id.as_str()))
        .collect();

    // Pass 1: sizing
    let mut total_size: u64 = 0;
    let mut sized: Vec<Option<u64>> = Vec::with_capacity(items.len());
    for &(idx, id) in &items {
        ledger.begin_sizing(idx);
        match engine.inspect_image(id).await {
            Ok(detail) => {
                total_size += detail.size;
                sized.push(Some(detail.size));
            }
            Err(e) => {
                ledger.note(classify(Operation::InspectImage, id, &e));
                sized.push(None);
            }
        }
    }

    // Pass 2: removal
    let mut deleted_size: u64 = 0;
    for (&(idx, id), before) in items.iter().zip(&sized) {
        tracing::info!(image_id = %id, "Attempting to delete image");
        ledger.begin_acting(idx);

        if let Err(e) = engine.remove_image(id, true).await {
            ledger.fail(idx, classify(Operation::DeleteImage, id, &e));
            continue;
        }
        ledger.succeed(idx);

        // Usually fails because the image is gone; that is not an error.
        match engine.inspect_image(id).await {
            // Never credit more than was counted before removal.
            Ok(detail) => deleted_size += detail.size.min(before.unwrap_or(0)),
            Err(e) => tracing::debug!(image_id = %id, error = %e, "post-removal inspect failed"),
        }
    }

    let (status, deleted, errors) = ledger.into_parts(ids.len());
    tracing::info!(
        status = %status,
        deleted = deleted.len(),
        errors = errors.len(),
        total_size,
        deleted_size,
        "delete batch finished"
    );

    DeleteReport {
        status,
        deleted,
        errors,
        total_count: ids.len(),
        deleted_size,
        total_size,
    }
}
