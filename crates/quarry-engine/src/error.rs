use std::{io, path::PathBuf, result::Result as StdResult};

use thiserror::Error;

/// Convenient result type for the engine crate.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for the quarry engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration option failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] config::Error),

    /// The mandatory flag pattern was not configured.
    #[error("manager: flag-format not specified")]
    MissingFlagFormat,

    /// The configured flag pattern is not a valid regular expression.
    #[error("invalid flag-format: {0}")]
    FlagFormat(#[from] regex::Error),

    /// A scheduler option is present but out of range.
    #[error("manager.{key}: {message}")]
    Option {
        /// The offending option key.
        key: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The results directory already exists from a prior run.
    #[error("output directory {0} already exists")]
    OutputDirExists(PathBuf),

    /// I/O failure while performing a system operation.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An operation was attempted in the wrong manager lifecycle state.
    #[error("{0}")]
    State(&'static str),

    /// A unit failed while enumerating or evaluating a case.
    #[error("unit error: {0}")]
    Unit(String),
}
