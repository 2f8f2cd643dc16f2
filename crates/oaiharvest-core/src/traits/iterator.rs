//! Harvesting iterator trait.

use crate::types::RecordHeader;
use crate::Result;

/// What an iteration action wants to happen next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IterationResult {
    /// Keep delivering items.
    Continue,
    /// Stop now. No further pages are requested.
    Terminate,
}

/// A closeable, lazily paged sequence of harvested items of type `R`.
///
/// Items are derived from record headers. Filters see the header before any
/// derivation work is done, so rejecting a header is cheap.
pub trait HarvestingIterator<R> {
    /// Deliver every item whose header passes `filter` to `action`, in
    /// repository order, until the list ends or `action` terminates.
    fn for_each_filtered<A, F>(&mut self, action: A, filter: F) -> Result<()>
    where
        A: FnMut(R) -> Result<IterationResult>,
        F: FnMut(&RecordHeader) -> bool;

    /// Like [`for_each_filtered`](Self::for_each_filtered), skipping deleted records.
    fn for_each_non_deleted<A>(&mut self, action: A) -> Result<()>
    where
        A: FnMut(R) -> Result<IterationResult>,
    {
        self.for_each_filtered(action, |header| !header.is_deleted())
    }

    /// The total list size reported by the repository, if it reports one.
    ///
    /// Issues a single request; never pages through the list.
    fn count_records(&mut self) -> Result<Option<u64>>;

    /// Release the underlying connection. Never fails; idempotent.
    fn close(&mut self);
}
