//! Parse and load option files.

use std::{collections::BTreeMap, fs, path::Path};

use toml::Value;

use crate::{DEFAULT_SECTION, Error, Options};

/// Load options from a TOML file at `path`, overlaid on the built-in defaults.
pub fn load_from_path(path: &Path) -> Result<Options, Error> {
    let s = fs::read_to_string(path).map_err(|e| Error::Read {
        path: Some(path.to_path_buf()),
        message: e.to_string(),
    })?;
    load_from_str(&s, Some(path))
}

/// Parse an option string into an `Options` bag.
///
/// Top-level tables become sections; bare top-level keys land in `DEFAULT`.
/// `path` is only used to enrich error messages.
pub fn load_from_str(s: &str, path: Option<&Path>) -> Result<Options, Error> {
    let table: toml::Table = match toml::from_str(s) {
        Ok(t) => t,
        Err(err) => return Err(Error::from_toml(s, &err, path)),
    };

    let mut sections: BTreeMap<String, toml::Table> = BTreeMap::new();
    for (key, value) in table {
        match value {
            Value::Table(t) => {
                let dst = sections.entry(key).or_default();
                for (k, v) in t {
                    dst.insert(k, v);
                }
            }
            other => {
                sections
                    .entry(DEFAULT_SECTION.to_string())
                    .or_default()
                    .insert(key, other);
            }
        }
    }

    let mut options = Options::new();
    options.merge(sections);
    Ok(options)
}
