//! Error types for configuration loading and validation.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors produced while reading, parsing, or validating options.
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// The file could not be read.
    #[error("{message}")]
    Read {
        /// Source path, when loading from a file.
        path: Option<PathBuf>,
        /// Underlying I/O failure.
        message: String,
    },
    /// The file was read but is not valid TOML.
    #[error("{message}")]
    Parse {
        /// Source path, when loading from a file.
        path: Option<PathBuf>,
        /// 1-based line of the offending span.
        line: usize,
        /// 1-based column of the offending span.
        col: usize,
        /// Parser message.
        message: String,
        /// The offending source line.
        excerpt: String,
    },
    /// An option is missing or has the wrong type.
    #[error("{section}.{key}: {message}")]
    Validation {
        /// Section the lookup went through.
        section: String,
        /// Option key.
        key: String,
        /// What was wrong.
        message: String,
    },
}

impl Error {
    /// Render a human-friendly error message including location when available.
    pub fn pretty(&self) -> String {
        match self {
            Self::Read { path, message } => match path {
                Some(p) => format!("Read error at {}: {}", p.display(), message),
                None => format!("Read error: {}", message),
            },
            Self::Parse {
                path,
                line,
                col,
                message,
                excerpt,
            } => match path {
                Some(p) => format!(
                    "Config parse error at {}:{}:{}\n{}\n{}",
                    p.display(),
                    line,
                    col,
                    message,
                    excerpt
                ),
                None => format!(
                    "Config parse error at {}:{}\n{}\n{}",
                    line, col, message, excerpt
                ),
            },
            Self::Validation {
                section,
                key,
                message,
            } => format!("Invalid option {}.{}: {}", section, key, message),
        }
    }

    /// Build a `Parse` error from a TOML deserialization failure.
    pub(crate) fn from_toml(src: &str, err: &toml::de::Error, path: Option<&Path>) -> Self {
        let (line, col, excerpt) = match err.span() {
            Some(span) => {
                let offset = span.start.min(src.len());
                let line_idx = src[..offset].matches('\n').count();
                let line_start = src[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
                let col = offset - line_start;
                let excerpt = src.lines().nth(line_idx).unwrap_or("").to_string();
                (line_idx + 1, col + 1, excerpt)
            }
            None => (1, 1, String::new()),
        };
        Self::Parse {
            path: path.map(|p| p.to_path_buf()),
            line,
            col,
            message: err.message().to_string(),
            excerpt,
        }
    }
}
