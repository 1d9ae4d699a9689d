//! Layered configuration for quarry: sectioned key/value options with
//! `DEFAULT`-section fallbacks.
//!
//! Files are TOML tables of sections (`[DEFAULT]`, `[manager]`, plus
//! free-form per-unit sections). A lookup consults the named section first,
//! then `DEFAULT`. Built-in defaults for every scheduler knob are seeded at
//! construction, so a missing file or an empty section still yields a
//! runnable configuration; only `flag-format` has no default.
#![warn(unsafe_op_in_unsafe_fn)]

use std::{
    collections::BTreeMap,
    env,
    path::{Path, PathBuf},
    thread,
};

mod error;
mod loader;

#[cfg(test)]
mod test_options;

pub use error::Error;
pub use loader::{load_from_path, load_from_str};
pub use toml::Value;

/// Section consulted when a key is absent from the requested section.
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Section holding scheduler-specific overrides.
pub const MANAGER_SECTION: &str = "manager";

/// A named bag of options grouped into sections.
#[derive(Debug, Clone)]
pub struct Options {
    sections: BTreeMap<String, toml::Table>,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    /// Create an option bag seeded with the built-in defaults.
    pub fn new() -> Self {
        let mut defaults = toml::Table::new();
        let threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        defaults.insert("unit".into(), Value::Array(vec![]));
        defaults.insert("threads".into(), Value::Integer(threads as i64));
        defaults.insert("outdir".into(), Value::String("./results".into()));
        defaults.insert("auto".into(), Value::Boolean(false));
        defaults.insert("recurse".into(), Value::Boolean(true));
        defaults.insert("exclude".into(), Value::Array(vec![]));
        defaults.insert("min-data".into(), Value::Integer(10));
        defaults.insert("download".into(), Value::Boolean(false));
        defaults.insert("template".into(), Value::String("default".into()));
        defaults.insert("timeout".into(), Value::Float(0.1));
        defaults.insert("password".into(), Value::Array(vec![]));
        defaults.insert("prioritize".into(), Value::Boolean(true));
        defaults.insert("default-units".into(), Value::Boolean(true));
        defaults.insert("max-depth".into(), Value::Integer(10));

        let mut sections = BTreeMap::new();
        sections.insert(DEFAULT_SECTION.to_string(), defaults);
        sections.insert(MANAGER_SECTION.to_string(), toml::Table::new());
        Self { sections }
    }

    /// Overlay a parsed file on top of the current contents.
    pub(crate) fn merge(&mut self, parsed: BTreeMap<String, toml::Table>) {
        for (section, table) in parsed {
            let dst = self.sections.entry(section).or_default();
            for (key, value) in table {
                dst.insert(key, value);
            }
        }
    }

    /// Raw lookup: the named section first, then `DEFAULT`.
    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections
            .get(section)
            .and_then(|t| t.get(key))
            .or_else(|| self.sections.get(DEFAULT_SECTION).and_then(|t| t.get(key)))
    }

    /// Whether the key resolves in the section (including `DEFAULT` fallback).
    pub fn contains(&self, section: &str, key: &str) -> bool {
        self.get(section, key).is_some()
    }

    /// Set an option in a section, creating the section if needed.
    pub fn set(&mut self, section: &str, key: &str, value: Value) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// String option.
    pub fn get_str(&self, section: &str, key: &str) -> Result<String, Error> {
        match self.require(section, key)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.mismatch(section, key, "string", other)),
        }
    }

    /// Boolean option. Accepts native booleans and the usual string spellings
    /// (`true`/`false`, `yes`/`no`, `on`/`off`, `1`/`0`).
    pub fn get_bool(&self, section: &str, key: &str) -> Result<bool, Error> {
        let value = self.require(section, key)?;
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(self.mismatch(section, key, "boolean", value)),
            },
            other => Err(self.mismatch(section, key, "boolean", other)),
        }
    }

    /// Integer option. Accepts native integers and decimal strings.
    pub fn get_int(&self, section: &str, key: &str) -> Result<i64, Error> {
        let value = self.require(section, key)?;
        match value {
            Value::Integer(n) => Ok(*n),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| self.mismatch(section, key, "integer", value)),
            other => Err(self.mismatch(section, key, "integer", other)),
        }
    }

    /// Float option. Accepts floats, integers, and decimal strings.
    pub fn get_float(&self, section: &str, key: &str) -> Result<f64, Error> {
        let value = self.require(section, key)?;
        match value {
            Value::Float(f) => Ok(*f),
            Value::Integer(n) => Ok(*n as f64),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.mismatch(section, key, "float", value)),
            other => Err(self.mismatch(section, key, "float", other)),
        }
    }

    /// List option. Accepts arrays of strings and comma-separated strings.
    pub fn get_list(&self, section: &str, key: &str) -> Result<Vec<String>, Error> {
        match self.require(section, key)? {
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(self.mismatch(section, key, "list of strings", v)),
                })
                .collect(),
            Value::String(s) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()),
            other => Err(self.mismatch(section, key, "list of strings", other)),
        }
    }

    fn require(&self, section: &str, key: &str) -> Result<&Value, Error> {
        self.get(section, key).ok_or_else(|| Error::Validation {
            section: section.to_string(),
            key: key.to_string(),
            message: "not set".to_string(),
        })
    }

    fn mismatch(&self, section: &str, key: &str, wanted: &str, got: &Value) -> Error {
        Error::Validation {
            section: section.to_string(),
            key: key.to_string(),
            message: format!("expected {}, got `{}`", wanted, got),
        }
    }
}

/// Determine the preferred user config path (`~/.quarry/config.toml`).
pub fn default_config_path() -> PathBuf {
    let mut p = PathBuf::from(env::var_os("HOME").unwrap_or_default());
    p.push(".quarry");
    p.push("config.toml");
    p
}

/// Resolve the effective config path.
///
/// Policy:
/// 1) Use `explicit` when provided.
/// 2) Else use `~/.quarry/config.toml` when it exists.
/// 3) Else run on built-in defaults (no file).
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let preferred = default_config_path();
    preferred.exists().then_some(preferred)
}
