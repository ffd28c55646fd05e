//! The protected-key policy.
//!
//! Management-owned label keys that tenant declarations may never create,
//! overwrite or remove. Built once at startup and shared read-only.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;

/// Keys protected when no explicit list is configured.
pub const DEFAULT_PROTECTED_KEYS: &[&str] = &[
    "kubernetes.io/managed-by",
    "kubernetes.io/created-by",
    "control-plane",
    "cluster-owner",
    "kubernetes.io/metadata.name",
];

/// Immutable set of protected label keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedKeySet {
    keys: BTreeSet<String>,
}

impl ProtectedKeySet {
    /// Build from explicit keys.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma-separated list. Entries are trimmed and empty entries
    /// dropped, so `"a, b,,"` protects `a` and `b`.
    #[must_use]
    pub fn from_csv(csv: &str) -> Self {
        Self::new(
            csv.split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty()),
        )
    }

    /// Parse `csv` when it is set and non-blank, otherwise use the defaults.
    #[must_use]
    pub fn from_setting(csv: Option<&str>) -> Self {
        match csv.map(str::trim) {
            Some(csv) if !csv.is_empty() => Self::from_csv(csv),
            _ => Self::default(),
        }
    }

    #[must_use]
    pub fn is_protected(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

impl Default for ProtectedKeySet {
    fn default() -> Self {
        Self::new(DEFAULT_PROTECTED_KEYS.iter().copied())
    }
}

impl fmt::Display for ProtectedKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.keys.iter().join(","))
    }
}
