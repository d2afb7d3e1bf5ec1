//! Immutable registry of supported key versions.
//!
//! Built once (either the process-wide built-in via [`KeyVersionRegistry::global`]
//! or an explicit set for tests) and never mutated afterwards, so concurrent
//! reads need no synchronization.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use taskvault_crypto::ALGORITHM;

use crate::{RotationError, RotationResult};

/// One supported key version. Immutable after registry construction.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVersionEntry {
    pub version: u32,
    pub algorithm: String,
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct KeyVersionRegistry {
    entries: Vec<KeyVersionEntry>,
}

impl KeyVersionRegistry {
    /// Builds a registry from an explicit entry set. Fails on an empty set —
    /// a registry with no latest version is meaningless.
    pub fn new(entries: Vec<KeyVersionEntry>) -> RotationResult<Self> {
        if entries.is_empty() {
            return Err(RotationError::EmptyRegistry);
        }
        Ok(Self { entries })
    }

    /// The process-wide built-in registry. Currently a single entry:
    /// version 1, xchacha20-poly1305, not deprecated.
    pub fn global() -> &'static KeyVersionRegistry {
        static REGISTRY: OnceLock<KeyVersionRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| KeyVersionRegistry {
            entries: vec![KeyVersionEntry {
                version: 1,
                algorithm: ALGORITHM.to_string(),
                deprecated: false,
                expires_at: None,
            }],
        })
    }

    pub fn entry(&self, version: u32) -> Option<&KeyVersionEntry> {
        self.entries.iter().find(|e| e.version == version)
    }

    pub fn is_supported(&self, version: u32) -> bool {
        self.entry(version).is_some()
    }

    /// Supported versions, ascending.
    pub fn supported_versions(&self) -> Vec<u32> {
        let mut versions: Vec<u32> = self.entries.iter().map(|e| e.version).collect();
        versions.sort_unstable();
        versions
    }

    /// Highest supported version. Monotonic and fixed per release.
    pub fn latest_version(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.version)
            .max()
            .expect("registry is never empty")
    }

    /// Unknown versions are deprecated by definition.
    pub fn is_deprecated(&self, version: u32) -> bool {
        self.entry(version).is_none_or(|e| e.deprecated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: u32, deprecated: bool) -> KeyVersionEntry {
        KeyVersionEntry {
            version,
            algorithm: ALGORITHM.to_string(),
            deprecated,
            expires_at: None,
        }
    }

    #[test]
    fn global_registry_has_version_one() {
        let registry = KeyVersionRegistry::global();
        assert!(registry.is_supported(1));
        assert_eq!(registry.latest_version(), 1);
        assert!(!registry.is_deprecated(1));
    }

    #[test]
    fn unknown_versions_are_deprecated() {
        let registry = KeyVersionRegistry::global();
        assert!(registry.is_deprecated(0));
        assert!(registry.is_deprecated(99));
    }

    #[test]
    fn empty_registry_is_rejected() {
        assert!(matches!(
            KeyVersionRegistry::new(vec![]),
            Err(RotationError::EmptyRegistry)
        ));
    }

    #[test]
    fn latest_is_the_maximum_version() {
        let registry =
            KeyVersionRegistry::new(vec![entry(2, false), entry(1, true)]).unwrap();
        assert_eq!(registry.latest_version(), 2);
        assert_eq!(registry.supported_versions(), vec![1, 2]);
        assert!(registry.is_deprecated(1));
    }
}
