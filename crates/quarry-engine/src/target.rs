//! Targets and their derivation-tree bookkeeping.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::unit::Unit;

/// Completion state shared by every target in one derivation tree.
///
/// The root target allocates the origin; all derived targets hold the same
/// handle. Once any descendant finds a flag the whole tree is done: the flag
/// flips monotonically false → true and is never cleared. The write is
/// idempotent and the read advisory, so relaxed ordering suffices.
pub struct Origin {
    completed: AtomicBool,
}

impl Origin {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            completed: AtomicBool::new(false),
        })
    }

    /// Whether a flag has been found anywhere in this tree.
    pub fn completed(&self) -> bool {
        self.completed.load(Ordering::Relaxed)
    }

    pub(crate) fn complete(&self) {
        self.completed.store(true, Ordering::Relaxed);
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin")
            .field("completed", &self.completed())
            .finish()
    }
}

/// An input blob plus provenance: which unit produced it and how deep in the
/// derivation tree it sits. Immutable after construction.
pub struct Target {
    payload: Vec<u8>,
    parent: Option<Arc<dyn Unit>>,
    depth: u32,
    origin: Arc<Origin>,
}

impl Target {
    /// Build a target. A `parent` makes this a derived target one level below
    /// the parent unit's own target, sharing its origin; without one this is
    /// a fresh root with a fresh origin.
    pub fn new(payload: impl Into<Vec<u8>>, parent: Option<Arc<dyn Unit>>) -> Arc<Self> {
        let (depth, origin) = match &parent {
            Some(unit) => (unit.target().depth + 1, unit.origin().clone()),
            None => (0, Origin::new()),
        };
        Arc::new(Self {
            payload: payload.into(),
            parent,
            depth,
            origin,
        })
    }

    /// The raw input bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The unit that produced this target, if any.
    pub fn parent(&self) -> Option<&Arc<dyn Unit>> {
        self.parent.as_ref()
    }

    /// Distance from the root of the derivation tree (roots are 0).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// The shared root handle for this derivation tree.
    pub fn origin(&self) -> &Arc<Origin> {
        &self.origin
    }

    /// Whether this target's tree has already produced a flag.
    pub fn completed(&self) -> bool {
        self.origin.completed()
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("len", &self.payload.len())
            .field("depth", &self.depth)
            .field("completed", &self.completed())
            .finish()
    }
}
