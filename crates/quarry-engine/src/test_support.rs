//! Test fixtures exported for the test suite.

use std::{
    env, process,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use config::{MANAGER_SECTION, Options, Value};
use parking_lot::Mutex;

use crate::{
    error::{Error, Result},
    manager::Manager,
    monitor::Monitor,
    target::Target,
    unit::{Case, Cases, Data, Finder, Unit},
};

/// Evaluation callback for [`ScriptedUnit`]: manager, the unit itself, and
/// the case index.
pub type EvalFn = Arc<dyn Fn(&Manager, &Arc<dyn Unit>, usize) -> Result<()> + Send + Sync>;

/// A configurable unit for tests: yields `case_count` index cases and runs a
/// caller-supplied closure for each.
pub struct ScriptedUnit {
    name: &'static str,
    priority: i32,
    strict_flags: bool,
    protected_recurse: bool,
    target: Arc<Target>,
    case_count: usize,
    fail_enumerate: bool,
    on_evaluate: EvalFn,
}

impl ScriptedUnit {
    /// A unit named `name` bound to `target`, with one case and a no-op
    /// evaluation.
    pub fn new(name: &'static str, target: Arc<Target>) -> Self {
        Self {
            name,
            priority: 50,
            strict_flags: false,
            protected_recurse: false,
            target,
            case_count: 1,
            fail_enumerate: false,
            on_evaluate: Arc::new(|_, _, _| Ok(())),
        }
    }

    /// Override the scheduling priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Require flag matches to span the whole candidate data.
    pub fn with_strict_flags(mut self) -> Self {
        self.strict_flags = true;
        self
    }

    /// Mark the unit as protected against self-recursion.
    pub fn with_protected_recurse(mut self) -> Self {
        self.protected_recurse = true;
        self
    }

    /// Yield `count` cases instead of one.
    pub fn with_cases(mut self, count: usize) -> Self {
        self.case_count = count;
        self
    }

    /// Make `enumerate` fail.
    pub fn with_enumerate_error(mut self) -> Self {
        self.fail_enumerate = true;
        self
    }

    /// Run `eval` for each case.
    pub fn with_evaluate(
        mut self,
        eval: impl Fn(&Manager, &Arc<dyn Unit>, usize) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_evaluate = Arc::new(eval);
        self
    }

    /// Finish building.
    pub fn build(self) -> Arc<dyn Unit> {
        Arc::new(self)
    }
}

impl Unit for ScriptedUnit {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn strict_flags(&self) -> bool {
        self.strict_flags
    }

    fn protected_recurse(&self) -> bool {
        self.protected_recurse
    }

    fn target(&self) -> &Arc<Target> {
        &self.target
    }

    fn enumerate(&self) -> Result<Cases> {
        if self.fail_enumerate {
            return Err(Error::Unit("scripted enumerate failure".into()));
        }
        Ok(Box::new(
            (0..self.case_count).map(|i| Box::new(i) as Case),
        ))
    }

    fn evaluate(self: Arc<Self>, manager: &Manager, case: Case) -> Result<()> {
        let index = case
            .downcast::<usize>()
            .map_err(|_| Error::Unit("unexpected case type".into()))?;
        let unit: Arc<dyn Unit> = self.clone();
        (self.on_evaluate)(manager, &unit, *index)
    }
}

/// A finder driven by a closure over the target.
pub struct ListFinder {
    build: BuildFn,
}

/// Unit construction callback for [`ListFinder`].
type BuildFn = Arc<dyn Fn(&Manager, &Arc<Target>) -> Vec<Arc<dyn Unit>> + Send + Sync>;

impl ListFinder {
    /// A finder that yields whatever `build` returns for each target.
    pub fn new(
        build: impl Fn(&Manager, &Arc<Target>) -> Vec<Arc<dyn Unit>> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            build: Arc::new(build),
        })
    }
}

impl Finder for ListFinder {
    fn match_target(&self, manager: &Manager, target: &Arc<Target>) -> Vec<Arc<dyn Unit>> {
        (self.build)(manager, target)
    }

    fn validate(&self, _manager: &Manager) -> Result<()> {
        Ok(())
    }
}

/// One recorded monitor callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// `on_artifact` with the path rendered lossily.
    Artifact(String),
    /// `on_data` with the payload.
    Data(Data),
    /// `on_flag` with the matched text.
    Flag(String),
    /// `on_exception` with the rendered error.
    Exception(String),
    /// `on_depth_limit` with the parent target's depth.
    DepthLimit(u32),
    /// `on_completion` with `did_timeout`.
    Completion(bool),
}

/// A monitor that records every callback for later assertions.
#[derive(Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingMonitor {
    /// A fresh shared recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    /// The flags reported, in order.
    pub fn flags(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Flag(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    /// Number of `on_data` callbacks.
    pub fn data_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Recorded::Data(_)))
            .count()
    }

    /// Number of `on_depth_limit` callbacks.
    pub fn depth_limit_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Recorded::DepthLimit(_)))
            .count()
    }

    /// Number of `on_exception` callbacks.
    pub fn exception_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Recorded::Exception(_)))
            .count()
    }

    /// The `did_timeout` values of `on_completion` callbacks, in order.
    pub fn completions(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Completion(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

impl Monitor for RecordingMonitor {
    fn on_artifact(&self, _manager: &Manager, _unit: &Arc<dyn Unit>, path: &std::path::Path) {
        self.events
            .lock()
            .push(Recorded::Artifact(path.to_string_lossy().into_owned()));
    }

    fn on_data(&self, _manager: &Manager, _unit: &Arc<dyn Unit>, data: &Data) {
        self.events.lock().push(Recorded::Data(data.clone()));
    }

    fn on_flag(&self, _manager: &Manager, _unit: &Arc<dyn Unit>, flag: &str) {
        self.events.lock().push(Recorded::Flag(flag.to_string()));
    }

    fn on_exception(&self, _manager: &Manager, _unit: &Arc<dyn Unit>, error: &Error) {
        self.events
            .lock()
            .push(Recorded::Exception(error.to_string()));
    }

    fn on_depth_limit(&self, _manager: &Manager, target: &Arc<Target>, _parent: &Arc<dyn Unit>) {
        self.events.lock().push(Recorded::DepthLimit(target.depth()));
    }

    fn on_completion(&self, _manager: &Manager, did_timeout: bool) {
        self.events.lock().push(Recorded::Completion(did_timeout));
    }
}

/// Options seeded with a throwaway output directory and a `FLAG{...}`
/// pattern, suitable for one test run.
pub fn test_options(tag: &str) -> Options {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time since epoch")
        .as_nanos();
    let outdir = env::temp_dir().join(format!("quarry-{}-{}-{}", tag, process::id(), ts));

    let mut opts = Options::new();
    opts.set(
        MANAGER_SECTION,
        "outdir",
        Value::String(outdir.display().to_string()),
    );
    opts.set(
        MANAGER_SECTION,
        "flag-format",
        Value::String(r"FLAG\{[^}]+\}".to_string()),
    );
    opts
}
