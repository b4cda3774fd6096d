//! Engine configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ContentError;

/// Object type tag stamped on every document node.
pub const DOCUMENT_OBJECT_TYPE: Uuid = Uuid::from_u128(0xc66ba18e_eaf3_4cff_8a22_41b16d66a972);

/// Id of the tree root. Every path starts with it.
pub const ROOT_ID: i64 = -1;

/// Id of the content recycle bin, a direct child of the root.
pub const RECYCLE_BIN_ID: i64 = -20;

/// Tunables for a [`ContentRepository`](crate::ContentRepository).
///
/// Loaded from TOML with every key optional:
///
/// ```toml
/// ensure_unique_naming = false
/// recycle_bin_id = -20
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Suffix sibling names with ` (n)` so no two siblings collide.
    pub ensure_unique_naming: bool,
    pub root_id: i64,
    pub recycle_bin_id: i64,
    /// Object type of the nodes this engine manages.
    pub object_type: Uuid,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ensure_unique_naming: true,
            root_id: ROOT_ID,
            recycle_bin_id: RECYCLE_BIN_ID,
            object_type: DOCUMENT_OBJECT_TYPE,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ContentError> {
        Ok(toml::from_str(contents)?)
    }

    /// Path prefix shared by everything in the recycle bin.
    pub fn recycle_bin_prefix(&self) -> String {
        format!("{},{},", self.root_id, self.recycle_bin_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.ensure_unique_naming);
    }

    #[test]
    fn toml_overrides_single_keys() {
        let config = EngineConfig::from_toml_str("ensure_unique_naming = false\n").unwrap();
        assert!(!config.ensure_unique_naming);
        assert_eq!(config.recycle_bin_id, RECYCLE_BIN_ID);
        assert_eq!(config.recycle_bin_prefix(), "-1,-20,");
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = EngineConfig::from_toml_str("root_id = \"x\"").unwrap_err();
        assert!(matches!(err, ContentError::Config(_)));
    }
}
