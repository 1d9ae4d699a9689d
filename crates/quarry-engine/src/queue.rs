//! The work queue: a thread-safe min-priority heap of scheduler records.

use std::{cmp::Ordering, collections::BinaryHeap, sync::Arc};

use parking_lot::Mutex;

use crate::unit::{Cases, Unit};

/// Priority used by abort signals so they jump ahead of any unit work.
pub(crate) const ABORT_PRIORITY: i32 = -10_000;

/// What a dequeued work item asks the worker to do.
pub(crate) enum Job {
    /// Exit the worker loop.
    Abort,
    /// Advance a unit's case sequence and evaluate the next case.
    ///
    /// `cases` is `None` until the first dequeue populates it from
    /// [`Unit::enumerate`]; thereafter the same iterator travels with the
    /// item through each requeue. Exactly one worker holds the item at a
    /// time, so case consumption is single-consumer by ownership.
    Run {
        /// The unit being evaluated.
        unit: Arc<dyn Unit>,
        /// The unit's case iterator, once initialized.
        cases: Option<Cases>,
    },
}

/// One schedulable record: a priority plus the job to perform.
pub(crate) struct WorkItem {
    /// Scheduling priority, lower served first; copied from the unit at
    /// enqueue time.
    pub(crate) priority: i32,
    /// The work to perform.
    pub(crate) job: Job,
}

impl WorkItem {
    /// A fresh item for a unit that has not yet enumerated cases.
    pub(crate) fn init(unit: Arc<dyn Unit>) -> Self {
        Self {
            priority: unit.priority(),
            job: Job::Run { unit, cases: None },
        }
    }

    /// An abort signal; carries no unit.
    pub(crate) fn abort() -> Self {
        Self {
            priority: ABORT_PRIORITY,
            job: Job::Abort,
        }
    }
}

// Ordering considers priority alone; equal-priority order is unspecified.
impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for WorkItem {}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap serves the lowest priority value first.
        other.priority.cmp(&self.priority)
    }
}

/// Thread-safe min-priority queue of [`WorkItem`]s.
///
/// The sole channel for cross-thread work handoff. Dequeue is non-blocking;
/// enqueue never blocks.
#[derive(Default)]
pub(crate) struct WorkQueue {
    heap: Mutex<BinaryHeap<WorkItem>>,
}

impl WorkQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enqueue an item.
    pub(crate) fn push(&self, item: WorkItem) {
        self.heap.lock().push(item);
    }

    /// Dequeue the lowest-priority item, or `None` when empty.
    pub(crate) fn try_pop(&self) -> Option<WorkItem> {
        self.heap.lock().pop()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.heap.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{target::Target, test_support::ScriptedUnit};

    fn unit_with_priority(priority: i32) -> Arc<dyn Unit> {
        let target = Target::new(b"payload".as_slice(), None);
        ScriptedUnit::new("test", target)
            .with_priority(priority)
            .build()
    }

    #[test]
    fn pops_lowest_priority_first() {
        let q = WorkQueue::new();
        q.push(WorkItem::init(unit_with_priority(70)));
        q.push(WorkItem::init(unit_with_priority(10)));
        q.push(WorkItem::init(unit_with_priority(40)));

        let order: Vec<i32> = std::iter::from_fn(|| q.try_pop().map(|i| i.priority)).collect();
        assert_eq!(order, vec![10, 40, 70]);
    }

    #[test]
    fn abort_jumps_ahead_of_unit_work() {
        let q = WorkQueue::new();
        q.push(WorkItem::init(unit_with_priority(-100)));
        q.push(WorkItem::abort());

        let first = q.try_pop().expect("item");
        assert!(matches!(first.job, Job::Abort));
        assert_eq!(first.priority, ABORT_PRIORITY);
    }

    #[test]
    fn empty_queue_yields_none() {
        let q = WorkQueue::new();
        assert!(q.try_pop().is_none());
        assert_eq!(q.len(), 0);
    }
}
