//! The default finder: a catalogue of unit constructors plus selection policy.

use std::sync::Arc;

use config::MANAGER_SECTION;
use quarry_engine::{Error, Finder, Manager, Result, Target, Unit};
use tracing::trace;

use crate::{railfence::Railfence, raw::Raw};

/// A unit constructor: returns `None` when the unit is not applicable to the
/// target.
pub type Constructor = fn(&Manager, &Arc<Target>) -> Option<Arc<dyn Unit>>;

/// Maps targets to applicable units from a registered catalogue.
///
/// Selection policy, in order:
/// - a non-empty `unit` option restricts matching to those names; otherwise
///   the `default-units` switch gates the whole catalogue
/// - `exclude` names are skipped
/// - a unit is never offered a target produced by a protected-recurse unit
///   of the same name
/// - with `prioritize` set, matches are sorted by ascending priority
pub struct UnitRegistry {
    units: Vec<(&'static str, Constructor)>,
}

impl UnitRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { units: Vec::new() }
    }

    /// The stock catalogue.
    pub fn with_defaults() -> Arc<Self> {
        let mut reg = Self::new();
        reg.register("raw", Raw::applicable);
        reg.register("railfence", Railfence::applicable);
        Arc::new(reg)
    }

    /// Add a named constructor to the catalogue.
    pub fn register(&mut self, name: &'static str, ctor: Constructor) {
        self.units.push((name, ctor));
    }

    /// The registered unit names.
    pub fn names(&self) -> Vec<&'static str> {
        self.units.iter().map(|(name, _)| *name).collect()
    }

    fn check_known(&self, key: &'static str, names: &[String]) -> Result<()> {
        for name in names {
            if !self.units.iter().any(|(known, _)| *known == name.as_str()) {
                return Err(Error::Config(config::Error::Validation {
                    section: MANAGER_SECTION.to_string(),
                    key: key.to_string(),
                    message: format!("unknown unit `{}`", name),
                }));
            }
        }
        Ok(())
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Finder for UnitRegistry {
    fn match_target(&self, manager: &Manager, target: &Arc<Target>) -> Vec<Arc<dyn Unit>> {
        let opts = manager.options();
        let selected = opts.get_list(MANAGER_SECTION, "unit").unwrap_or_default();
        let excluded = opts.get_list(MANAGER_SECTION, "exclude").unwrap_or_default();
        let use_defaults = opts
            .get_bool(MANAGER_SECTION, "default-units")
            .unwrap_or(true);
        let prioritize = opts.get_bool(MANAGER_SECTION, "prioritize").unwrap_or(true);

        let mut matched: Vec<Arc<dyn Unit>> = Vec::new();
        for (name, ctor) in &self.units {
            if selected.is_empty() {
                if !use_defaults {
                    continue;
                }
            } else if !selected.iter().any(|s| s.as_str() == *name) {
                continue;
            }
            if excluded.iter().any(|s| s.as_str() == *name) {
                continue;
            }

            // Don't feed a protected unit its own output.
            if let Some(parent) = target.parent()
                && parent.protected_recurse()
                && parent.name() == *name
            {
                trace!(unit = name, "skipping protected self-recursion");
                continue;
            }

            if let Some(unit) = ctor(manager, target) {
                matched.push(unit);
            }
        }

        if prioritize {
            matched.sort_by_key(|u| u.priority());
        }
        matched
    }

    fn validate(&self, manager: &Manager) -> Result<()> {
        let opts = manager.options();
        self.check_known("unit", &opts.get_list(MANAGER_SECTION, "unit")?)?;
        self.check_known("exclude", &opts.get_list(MANAGER_SECTION, "exclude")?)?;
        Ok(())
    }
}
