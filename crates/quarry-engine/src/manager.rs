//! The manager: worker pool, recursion policy, flag search, and run lifecycle.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use config::{MANAGER_SECTION, Options};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    barrier::{Barrier, WaitOutcome},
    error::{Error, Result},
    flags::FlagMatcher,
    monitor::Monitor,
    queue::{Job, WorkItem, WorkQueue},
    target::Target,
    unit::{Data, Finder, Unit},
};

/// Floor for the driver's idle re-check interval.
const MIN_POLL_MS: u64 = 10;

/// Owns the evaluation of units against targets: a priority work queue, a
/// pool of worker threads, the recursion and depth-limit policy, flag
/// search, and the idle barrier that detects global quiescence.
///
/// Cheap to clone; clones share the same scheduler state. A typical run:
/// seed with [`Manager::queue_target`], then [`Manager::start`], then
/// [`Manager::join`]. Results flow out through the injected [`Monitor`].
///
/// Concurrency notes
/// - The work queue is the only mutable state shared by all workers; it is
///   internally synchronised and all cross-thread coordination goes through
///   it plus the idle barrier.
/// - Each derivation tree's `completed` flag is written only by
///   [`Manager::register_flag`] and read advisorily by every worker.
/// - The flag pattern is compiled once at [`Manager::start`] and immutable
///   afterwards.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

/// Shared scheduler state.
struct Inner {
    /// Tuning knobs; `manager` section with `DEFAULT` fallbacks.
    options: Options,
    /// Event sink; externally synchronised.
    monitor: Arc<dyn Monitor>,
    /// Maps targets to applicable units.
    finder: Arc<dyn Finder>,
    /// The sole work channel.
    work: WorkQueue,
    /// Idle barrier, `threads + 1` parties; set by `start`.
    barrier: OnceLock<Arc<Barrier>>,
    /// Compiled flag pattern; set by `start`.
    matcher: OnceLock<FlagMatcher>,
    /// Worker handles, drained by `join`.
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
    /// Set once `join` has returned; new root targets are refused after.
    joined: AtomicBool,
    /// Count of user interrupts delivered via `interrupt`.
    interrupts: AtomicUsize,
}

impl Manager {
    /// Create a manager with the given options, finder, and monitor.
    pub fn new(options: Options, finder: Arc<dyn Finder>, monitor: Arc<dyn Monitor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                monitor,
                finder,
                work: WorkQueue::new(),
                barrier: OnceLock::new(),
                matcher: OnceLock::new(),
                threads: Mutex::new(Vec::new()),
                joined: AtomicBool::new(false),
                interrupts: AtomicUsize::new(0),
            }),
        }
    }

    /// The option bag this manager was configured with.
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Register an artifact result and recurse on it when permitted.
    pub fn register_artifact(&self, unit: &Arc<dyn Unit>, path: &Path, recurse: bool) {
        self.inner.monitor.on_artifact(self, unit, path);

        if self.recurse_enabled() && recurse {
            let payload = path.to_string_lossy().into_owned().into_bytes();
            if let Err(err) = self.queue_target(payload, Some(unit)) {
                warn!(unit = unit.name(), %err, "artifact recursion rejected");
            }
        }
    }

    /// Register arbitrary result data: notify the monitor, search it for
    /// flags, and recurse on it when permitted and the tree is still open.
    pub fn register_data(&self, unit: &Arc<dyn Unit>, data: Data, recurse: bool) {
        self.inner.monitor.on_data(self, unit, &data);

        self.find_flag(unit, &data);

        if self.recurse_enabled() && !unit.origin().completed() && recurse {
            for payload in data.into_payloads() {
                if let Err(err) = self.queue_target(payload, Some(unit)) {
                    warn!(unit = unit.name(), %err, "data recursion rejected");
                }
            }
        }
    }

    /// Register a found flag and close the unit's derivation tree.
    ///
    /// Closing is a pure state transition observed cooperatively by the
    /// workers; pending work for the tree is discarded as it surfaces.
    pub fn register_flag(&self, unit: &Arc<dyn Unit>, flag: &str) {
        debug!(unit = unit.name(), flag, "flag found");
        self.inner.monitor.on_flag(self, unit, flag);
        unit.origin().complete();
    }

    /// Search result data for the configured flag pattern.
    ///
    /// Aggregates are searched element-wise. A form with XML-ish tags
    /// stripped is searched in addition to the original whenever stripping
    /// changes the data. Matches must be printable; for strict-flag units
    /// they must span the entire candidate.
    pub fn find_flag(&self, unit: &Arc<dyn Unit>, data: &Data) {
        match data {
            Data::Items(items) => {
                for item in items {
                    self.find_flag(unit, item);
                }
            }
            Data::Text(s) => self.find_flag_bytes(unit, s.as_bytes()),
            Data::Bytes(b) => self.find_flag_bytes(unit, b),
        }
    }

    fn find_flag_bytes(&self, unit: &Arc<dyn Unit>, data: &[u8]) {
        let Some(matcher) = self.inner.matcher.get() else {
            return;
        };

        if let Some(stripped) = matcher.strip_xml(data) {
            self.find_flag_bytes(unit, &stripped);
        }

        if let Some(flag) = matcher.search(data, unit.strict_flags()) {
            self.register_flag(unit, &flag);
        }
    }

    /// Build a target from `payload`, enumerate the units applicable to it,
    /// and queue them all.
    ///
    /// Returns `Ok(None)` when the payload trims to nothing, when the
    /// parent's tree already completed, or when recursion would exceed
    /// `max-depth` (the last also notifies the monitor). Root targets are
    /// refused with [`Error::State`] once [`Manager::join`] has returned;
    /// recursion may still drain.
    pub fn queue_target(
        &self,
        payload: impl Into<Vec<u8>>,
        parent: Option<&Arc<dyn Unit>>,
    ) -> Result<Option<Arc<Target>>> {
        let payload = payload.into();
        if payload.trim_ascii().is_empty() {
            return Ok(None);
        }

        match parent {
            None => {
                if self.inner.joined.load(Ordering::Relaxed) {
                    return Err(Error::State("root targets cannot be queued after join"));
                }
            }
            Some(parent) => {
                if parent.origin().completed() {
                    return Ok(None);
                }
                if parent.target().depth() + 1 >= self.max_depth() {
                    debug!(unit = parent.name(), "recursion dropped at depth limit");
                    self.inner.monitor.on_depth_limit(self, parent.target(), parent);
                    return Ok(None);
                }
            }
        }

        let target = Target::new(payload, parent.cloned());
        for unit in self.inner.finder.match_target(self, &target) {
            self.queue(unit);
        }
        Ok(Some(target))
    }

    /// Queue a unit for evaluation.
    ///
    /// The unit runs once the manager is started; if already started it is
    /// picked up by the next free worker in priority order.
    pub fn queue(&self, unit: Arc<dyn Unit>) {
        if unit.origin().completed() {
            return;
        }

        trace!(unit = unit.name(), priority = unit.priority(), "queueing unit");
        self.inner.work.push(WorkItem::init(unit));

        // Ensure sleeping workers wake up and re-check the queue.
        if let Some(barrier) = self.inner.barrier.get() {
            barrier.reset();
        }
    }

    /// Re-enqueue an item whose case sequence is not yet exhausted.
    /// Skipped silently when its tree has completed in the meantime.
    pub(crate) fn requeue(&self, item: WorkItem) {
        if let Job::Run { unit, .. } = &item.job
            && unit.origin().completed()
        {
            return;
        }
        self.inner.work.push(item);
    }

    /// Start evaluation: prepare the results directory, validate the
    /// configuration, compile the flag pattern, and spawn the worker pool.
    ///
    /// Units and root targets can still be queued after `start`, up until
    /// [`Manager::join`] is called.
    pub fn start(&self) -> Result<()> {
        if self.inner.barrier.get().is_some() {
            return Err(Error::State("manager already started"));
        }

        self.prepare_results()?;
        self.validate()?;

        let format = self.inner.options.get_str(MANAGER_SECTION, "flag-format")?;
        let _ = self.inner.matcher.set(FlagMatcher::compile(&format)?);

        let threads = self.thread_count();
        let barrier = Arc::new(Barrier::new(threads + 1));
        let _ = self.inner.barrier.set(barrier);

        debug!(threads, "starting workers");
        let mut handles = self.inner.threads.lock();
        for n in 0..threads {
            let mgr = self.clone();
            let handle = thread::Builder::new()
                .name(format!("quarry-worker-{}", n))
                .spawn(move || mgr.worker())?;
            handles.push(handle);
        }
        Ok(())
    }

    /// Wait for all work to drain, a timeout, or a user interrupt.
    ///
    /// Returns `true` iff completion was clean (no timeout). After `join`
    /// returns, new root targets are refused; recursion from still-running
    /// units remains legal while the queue drains.
    pub fn join(&self, timeout: Option<Duration>) -> Result<bool> {
        let barrier = self
            .inner
            .barrier
            .get()
            .ok_or(Error::State("manager not started"))?
            .clone();

        let deadline = timeout.map(|t| Instant::now() + t);
        let poll = self.poll_interval();
        let mut aborting = false;
        let mut seen_interrupts = 0;
        let mut did_timeout = false;

        loop {
            let wait_for = match deadline {
                Some(d) => d.saturating_duration_since(Instant::now()).min(poll),
                None => poll,
            };
            let outcome = barrier.wait(Some(wait_for));

            let interrupts = self.inner.interrupts.load(Ordering::Relaxed);
            if interrupts > seen_interrupts {
                seen_interrupts = interrupts;
                if aborting {
                    // Second interrupt: the user's escape hatch from a stuck
                    // worker. Proceed straight to the thread join.
                    debug!("second interrupt, forcing join");
                    break;
                }
                debug!("interrupt, draining in-flight cases");
                self.signal_complete();
                aborting = true;
            }

            if outcome == WaitOutcome::Tripped {
                // All workers and the driver met: the run has drained. The
                // aborts are a safety net; workers exit off the barrier.
                self.signal_complete();
                break;
            }

            // After an interrupt the workers exit off the abort items rather
            // than the barrier, so watch for the pool winding down.
            if aborting && self.inner.threads.lock().iter().all(|h| h.is_finished()) {
                break;
            }

            if let Some(d) = deadline
                && Instant::now() >= d
            {
                debug!("join timed out");
                did_timeout = true;
                self.signal_complete();
                break;
            }
        }

        let handles: Vec<_> = self.inner.threads.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }

        self.inner.joined.store(true, Ordering::Relaxed);
        self.inner.monitor.on_completion(self, did_timeout);
        Ok(!did_timeout)
    }

    /// Deliver a user interrupt.
    ///
    /// The first interrupt asks workers to exit cleanly once their current
    /// case finishes; the second makes [`Manager::join`] stop waiting.
    pub fn interrupt(&self) {
        self.inner.interrupts.fetch_add(1, Ordering::Relaxed);
        if let Some(barrier) = self.inner.barrier.get() {
            barrier.reset();
        }
    }

    /// Queue one abort item per worker and wake any sleepers to grab them.
    fn signal_complete(&self) {
        for _ in 0..self.thread_count() {
            self.inner.work.push(WorkItem::abort());
        }
        if let Some(barrier) = self.inner.barrier.get() {
            barrier.reset();
        }
    }

    /// Main loop for each evaluator thread.
    fn worker(&self) {
        let Some(barrier) = self.inner.barrier.get() else {
            return;
        };

        loop {
            let Some(item) = self.inner.work.try_pop() else {
                match barrier.wait(None) {
                    // All parties met: everything has drained.
                    WaitOutcome::Tripped => break,
                    // New work was queued or the run is winding down.
                    WaitOutcome::Broken | WaitOutcome::TimedOut => continue,
                }
            };

            let WorkItem { priority, job } = item;
            let (unit, cases) = match job {
                Job::Abort => break,
                Job::Run { unit, cases } => (unit, cases),
            };

            // A flag elsewhere in the tree finishes this unit's work.
            if unit.origin().completed() {
                trace!(unit = unit.name(), "discarding completed work");
                continue;
            }

            let mut cases = match cases {
                Some(cases) => cases,
                None => match unit.enumerate() {
                    Ok(cases) => cases,
                    Err(err) => {
                        warn!(unit = unit.name(), %err, "enumerate failed");
                        self.inner.monitor.on_exception(self, &unit, &err);
                        continue;
                    }
                },
            };

            let Some(case) = cases.next() else {
                trace!(unit = unit.name(), "cases exhausted");
                continue;
            };

            // Put the item back before evaluating so a peer worker can take
            // the next case in parallel.
            self.requeue(WorkItem {
                priority,
                job: Job::Run {
                    unit: unit.clone(),
                    cases: Some(cases),
                },
            });

            if let Err(err) = unit.clone().evaluate(self, case) {
                warn!(unit = unit.name(), %err, "evaluate failed");
                self.inner.monitor.on_exception(self, &unit, &err);
            }
        }
        trace!("worker exiting");
    }

    /// Create the output directory tree; a pre-existing directory is fatal
    /// so prior runs are never overwritten.
    fn prepare_results(&self) -> Result<()> {
        let outdir = PathBuf::from(self.inner.options.get_str(MANAGER_SECTION, "outdir")?);
        if outdir.exists() {
            return Err(Error::OutputDirExists(outdir));
        }
        fs::create_dir_all(&outdir)?;
        Ok(())
    }

    /// Check the options this manager and its finder will run with.
    fn validate(&self) -> Result<()> {
        if !self.inner.options.contains(MANAGER_SECTION, "flag-format") {
            return Err(Error::MissingFlagFormat);
        }

        let threads = self.inner.options.get_int(MANAGER_SECTION, "threads")?;
        if threads < 1 {
            return Err(Error::Option {
                key: "threads",
                message: format!("must be at least 1, got {}", threads),
            });
        }

        let max_depth = self.inner.options.get_int(MANAGER_SECTION, "max-depth")?;
        if max_depth < 1 {
            return Err(Error::Option {
                key: "max-depth",
                message: format!("must be at least 1, got {}", max_depth),
            });
        }

        let timeout = self.inner.options.get_float(MANAGER_SECTION, "timeout")?;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(Error::Option {
                key: "timeout",
                message: format!("must be a positive interval, got {}", timeout),
            });
        }

        self.inner.finder.validate(self)
    }

    fn recurse_enabled(&self) -> bool {
        self.inner
            .options
            .get_bool(MANAGER_SECTION, "recurse")
            .unwrap_or(true)
    }

    fn max_depth(&self) -> u32 {
        self.inner
            .options
            .get_int(MANAGER_SECTION, "max-depth")
            .map(|n| n.max(1) as u32)
            .unwrap_or(10)
    }

    fn thread_count(&self) -> usize {
        self.inner
            .options
            .get_int(MANAGER_SECTION, "threads")
            .map(|n| n.max(1) as usize)
            .unwrap_or(1)
    }

    /// The driver's idle re-check interval while waiting on the barrier.
    fn poll_interval(&self) -> Duration {
        let secs = self
            .inner
            .options
            .get_float(MANAGER_SECTION, "timeout")
            .unwrap_or(0.1);
        Duration::from_secs_f64(secs.clamp(MIN_POLL_MS as f64 / 1000.0, 3600.0))
    }
}
