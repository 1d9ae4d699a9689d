//! The monitor contract: a passive sink for run events.

use std::{path::Path, sync::Arc};

use crate::{Error, manager::Manager, target::Target, unit::{Data, Unit}};

/// Receives run events from the manager and its workers.
///
/// Handlers are invoked from arbitrary worker threads and may interleave
/// across units; implementations serialize their own state. Return values
/// are never consulted, so handlers must not fail the scheduler.
pub trait Monitor: Send + Sync {
    /// An artifact (usually a file) was produced by a unit.
    fn on_artifact(&self, manager: &Manager, unit: &Arc<dyn Unit>, path: &Path) {
        let _ = (manager, unit, path);
    }

    /// Arbitrary result data was produced by a unit.
    fn on_data(&self, manager: &Manager, unit: &Arc<dyn Unit>, data: &Data) {
        let _ = (manager, unit, data);
    }

    /// A flag matching the configured format was found.
    fn on_flag(&self, manager: &Manager, unit: &Arc<dyn Unit>, flag: &str) {
        let _ = (manager, unit, flag);
    }

    /// A unit failed while enumerating or evaluating.
    fn on_exception(&self, manager: &Manager, unit: &Arc<dyn Unit>, error: &Error) {
        let _ = (manager, unit, error);
    }

    /// Recursion from `parent` was dropped because it would exceed the
    /// configured maximum depth.
    fn on_depth_limit(&self, manager: &Manager, target: &Arc<Target>, parent: &Arc<dyn Unit>) {
        let _ = (manager, target, parent);
    }

    /// The run finished, cleanly or by timeout.
    fn on_completion(&self, manager: &Manager, did_timeout: bool) {
        let _ = (manager, did_timeout);
    }
}

/// A monitor that ignores every event.
#[derive(Debug, Default)]
pub struct NullMonitor;

impl Monitor for NullMonitor {}
