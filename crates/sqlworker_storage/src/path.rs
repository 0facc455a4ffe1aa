//! Validated store paths.

use crate::error::{StoreError, StoreResult};
use std::fmt;
use std::path::PathBuf;

/// A normalized, root-relative path inside a store.
///
/// Accepts `/`-separated names. Empty segments and `.` are dropped;
/// `..`, absolute paths, and backslashes are rejected so a path can never
/// leave the store root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// Parses and normalizes a store path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPath`] if the path is empty after
    /// normalization, absolute, or contains `..` or `\`.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        if raw.starts_with('/') || raw.contains('\\') {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }

        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(StoreError::InvalidPath(raw.to_string())),
                name => segments.push(name.to_string()),
            }
        }

        if segments.is_empty() {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self { segments })
    }

    /// Returns the final path segment.
    #[must_use]
    pub fn file_name(&self) -> &str {
        // parse() guarantees at least one segment
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Returns the parent directory segments.
    #[must_use]
    pub fn parent(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    /// Returns a sibling path whose file name has `suffix` appended.
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> Self {
        let mut segments = self.segments.clone();
        if let Some(last) = segments.last_mut() {
            last.push_str(suffix);
        }
        Self { segments }
    }

    /// Converts to a relative OS path.
    #[must_use]
    pub fn to_relative(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}
