//! The unit, finder, and registration-payload contracts.

use std::{any::Any, sync::Arc};

use crate::{
    error::Result,
    manager::Manager,
    target::{Origin, Target},
};

/// One concrete attempt a unit will evaluate. Opaque to the scheduler.
pub type Case = Box<dyn Any + Send>;

/// A lazy, single-consumer sequence of cases produced by [`Unit::enumerate`].
///
/// Exhaustion is signalled by `None`; the scheduler never restarts or clones
/// a case sequence.
pub type Cases = Box<dyn Iterator<Item = Case> + Send>;

/// An analysis module bound to a single target.
///
/// Units are created by a [`Finder`], enumerate a lazy sequence of cases, and
/// evaluate each case against their target. Evaluation registers artifacts,
/// data, and flags back on the [`Manager`], which is injected explicitly;
/// units hold no global state.
///
/// `evaluate` takes `self: Arc<Self>` so a unit can hand itself to the
/// manager's registration entry points as the parent of derived targets.
pub trait Unit: Send + Sync {
    /// Stable unit name, used for finder selection and recursion protection.
    fn name(&self) -> &'static str;

    /// Scheduling priority; lower values are served first.
    fn priority(&self) -> i32 {
        50
    }

    /// When true, a flag match must span the entire candidate data.
    fn strict_flags(&self) -> bool {
        false
    }

    /// When true, the finder will not feed this unit's own output back to it.
    fn protected_recurse(&self) -> bool {
        false
    }

    /// The target this unit was created for.
    fn target(&self) -> &Arc<Target>;

    /// The root handle of this unit's derivation tree.
    fn origin(&self) -> &Arc<Origin> {
        self.target().origin()
    }

    /// Produce the lazy case sequence for this unit.
    ///
    /// A failure here is treated as an exhausted sequence and reported via
    /// [`crate::Monitor::on_exception`].
    fn enumerate(&self) -> Result<Cases>;

    /// Evaluate one case. Errors are routed to the monitor; the worker that
    /// ran the case carries on.
    fn evaluate(self: Arc<Self>, manager: &Manager, case: Case) -> Result<()>;
}

/// Maps targets to the units applicable to them.
pub trait Finder: Send + Sync {
    /// Yield the units applicable to `target`, in preference order.
    fn match_target(&self, manager: &Manager, target: &Arc<Target>) -> Vec<Arc<dyn Unit>>;

    /// Check the finder's own configuration; called once from
    /// [`Manager::start`]. A failure there is fatal.
    fn validate(&self, manager: &Manager) -> Result<()>;
}

/// A registration payload: raw bytes, text, or an aggregate of either.
///
/// Flag search walks aggregates element-wise; recursion queues one derived
/// target per leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Text; searched as its UTF-8 bytes.
    Text(String),
    /// An aggregate searched element-wise.
    Items(Vec<Data>),
}

impl Data {
    /// Collect the leaf payloads, in order, as byte vectors.
    pub(crate) fn into_payloads(self) -> Vec<Vec<u8>> {
        match self {
            Self::Bytes(b) => vec![b],
            Self::Text(s) => vec![s.into_bytes()],
            Self::Items(items) => items
                .into_iter()
                .flat_map(Self::into_payloads)
                .collect(),
        }
    }
}

impl From<Vec<u8>> for Data {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for Data {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Data {
    fn from(b: &[u8; N]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<Data>> for Data {
    fn from(items: Vec<Data>) -> Self {
        Self::Items(items)
    }
}
