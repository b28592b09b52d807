// ABOUTME: Per-item bookkeeping for sequential batch operations.
// ABOUTME: Tracks each item through pending -> sizing -> acting -> done|failed.

use crate::classify::StructuredError;

use super::outcome::BatchStatus;

/// Where an item is in its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    Pending,
    /// Being inspected (sizes, tags).
    Sizing,
    /// Being removed or pushed.
    Acting,
    Done,
    Failed,
}

impl ItemPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemPhase::Done | ItemPhase::Failed)
    }
}

/// Handle to an item tracked by a [`BatchLedger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemIndex(usize);

#[derive(Debug)]
struct Item {
    subject: String,
    phase: ItemPhase,
}

/// Append-only record of a batch: item phases, successes, and errors.
///
/// Errors are never removed or rewritten once recorded.
#[derive(Debug, Default)]
pub struct BatchLedger {
    items: Vec<Item>,
    succeeded: Vec<String>,
    errors: Vec<StructuredError>,
}

impl BatchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an item in the `Pending` phase.
    pub fn track(&mut self, subject: impl Into<String>) -> ItemIndex {
        self.items.push(Item {
            subject: subject.into(),
            phase: ItemPhase::Pending,
        });
        ItemIndex(self.items.len() - 1)
    }

    pub fn begin_sizing(&mut self, idx: ItemIndex) {
        self.advance(idx, &[ItemPhase::Pending], ItemPhase::Sizing);
    }

    pub fn begin_acting(&mut self, idx: ItemIndex) {
        self.advance(idx, &[ItemPhase::Pending, ItemPhase::Sizing], ItemPhase::Acting);
    }

    /// Mark an item done and list it as a success.
    pub fn succeed(&mut self, idx: ItemIndex) {
        if self.advance(idx, &[ItemPhase::Acting], ItemPhase::Done) {
            self.succeeded.push(self.items[idx.0].subject.clone());
        }
    }

    /// Mark an item done without listing it (a parent of listed items).
    pub fn finish(&mut self, idx: ItemIndex) {
        self.advance(idx, &[ItemPhase::Acting], ItemPhase::Done);
    }

    /// Mark an item failed and record why.
    pub fn fail(&mut self, idx: ItemIndex, error: StructuredError) {
        self.advance(
            idx,
            &[ItemPhase::Pending, ItemPhase::Sizing, ItemPhase::Acting],
            ItemPhase::Failed,
        );
        self.errors.push(error);
    }

    /// Record an error that does not end the item.
    pub fn note(&mut self, error: StructuredError) {
        self.errors.push(error);
    }

    #[cfg(test)]
    fn phase(&self, idx: ItemIndex) -> ItemPhase {
        self.items[idx.0].phase
    }

    #[cfg(test)]
    fn succeeded(&self) -> &[String] {
        &self.succeeded
    }

    #[cfg(test)]
    fn errors(&self) -> &[StructuredError] {
        &self.errors
    }

    /// Number of tracked items still short of a terminal phase.
    #[cfg(test)]
    fn unsettled(&self) -> usize {
        self.items.iter().filter(|i| !i.phase.is_terminal()).count()
    }

    /// Status of the batch, given how many items the caller asked for.
    pub fn status(&self, requested: usize) -> BatchStatus {
        BatchStatus::from_counts(requested, self.succeeded.len(), self.errors.len())
    }

    pub fn into_parts(self, requested: usize) -> (BatchStatus, Vec<String>, Vec<StructuredError>) {
        let status = self.status(requested);
        (status, self.succeeded, self.errors)
    }

    fn advance(&mut self, idx: ItemIndex, from: &[ItemPhase], to: ItemPhase) -> bool {
        let item = &mut self.items[idx.0];
        if !from.contains(&item.phase) {
            debug_assert!(
                false,
                "invalid transition for {}: {:?} -> {:?}",
                item.subject, item.phase, to
            );
            tracing::warn!(
                subject = %item.subject,
                from = ?item.phase,
                to = ?to,
                "ignoring invalid batch item transition"
            );
            return false;
        }
        item.phase = to;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Operation, classify};

    #[test]
    fn item_walks_through_every_phase() {
        let mut ledger = BatchLedger::new();
        let idx = ledger.track("img1");
        assert_eq!(ledger.phase(idx), ItemPhase::Pending);

        ledger.begin_sizing(idx);
        assert_eq!(ledger.phase(idx), ItemPhase::Sizing);

        ledger.begin_acting(idx);
        ledger.succeed(idx);
        assert_eq!(ledger.phase(idx), ItemPhase::Done);
        assert_eq!(ledger.succeeded(), ["img1".to_string()]);
        assert_eq!(ledger.unsettled(), 0);
    }

    #[test]
    fn noted_errors_do_not_end_the_item() {
        let mut ledger = BatchLedger::new();
        let idx = ledger.track("img1");
        ledger.begin_sizing(idx);
        ledger.note(classify(Operation::InspectImage, "img1", &"timeout"));

        assert_eq!(ledger.phase(idx), ItemPhase::Sizing);
        assert_eq!(ledger.errors().len(), 1);
        assert_eq!(ledger.unsettled(), 1);
    }

    #[test]
    fn finished_parents_are_not_listed() {
        let mut ledger = BatchLedger::new();
        let image = ledger.track("img1");
        ledger.begin_acting(image);
        let tag = ledger.track("app:v1");
        ledger.begin_acting(tag);
        ledger.succeed(tag);
        ledger.finish(image);

        assert_eq!(ledger.succeeded(), ["app:v1".to_string()]);
        assert_eq!(ledger.status(1), BatchStatus::Success);
    }

    #[test]
    fn failure_and_success_make_partial() {
        let mut ledger = BatchLedger::new();
        let ok = ledger.track("a");
        let bad = ledger.track("b");
        ledger.begin_acting(ok);
        ledger.succeed(ok);
        ledger.begin_acting(bad);
        ledger.fail(bad, classify(Operation::DeleteImage, "b", &"not found"));

        let (status, succeeded, errors) = ledger.into_parts(2);
        assert_eq!(status, BatchStatus::Partial);
        assert_eq!(succeeded, vec!["a".to_string()]);
        assert_eq!(errors[0].image_id(), "b");
    }

    #[test]
    fn parent_with_no_children_is_success() {
        let mut ledger = BatchLedger::new();
        let image = ledger.track("img1");
        ledger.begin_acting(image);
        ledger.finish(image);

        let (status, succeeded, errors) = ledger.into_parts(1);
        assert_eq!(status, BatchStatus::Success);
        assert!(succeeded.is_empty());
        assert!(errors.is_empty());
    }
}
