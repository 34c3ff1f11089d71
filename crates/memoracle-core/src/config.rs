//! Traversal configuration.
//!
//! Loaded from JSON by the CLI (`--config`) or built in code; every field has
//! a default so partial files are accepted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OracleResult;

/// Whether an entry's parent sets survive from one full pass to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentHistory
{
    /// Clear an entry's parents the first time a full pass touches it.
    #[default]
    PerPass,
    /// Keep every parent ever recorded.
    Accumulate,
}

/// What to do when a new name reaches an existing leaf entry with a
/// different canonical type (a union read through another member, for
/// instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy
{
    /// Keep the first classification and log the conflict.
    #[default]
    KeepFirst,
    /// Fail the incoming branch with `DuplicateAddress`.
    Reject,
}

/// Knobs for a snapshot session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig
{
    /// Install a mutation observer on every recorded address.
    pub install_watches: bool,
    pub parent_history: ParentHistory,
    pub conflict_policy: ConflictPolicy,
    /// Expand `std::` values instead of recording them as opaque leaves.
    pub expand_standard_library: bool,
    /// Bytes observed per address. Defaults to one machine word.
    pub watch_length: Option<usize>,
    /// Elements walked per array; the rest are left unexpanded.
    pub max_array_elements: usize,
}

impl Default for TraversalConfig
{
    fn default() -> Self
    {
        Self {
            install_watches: true,
            parent_history: ParentHistory::default(),
            conflict_policy: ConflictPolicy::default(),
            expand_standard_library: false,
            watch_length: None,
            max_array_elements: 4096,
        }
    }
}

impl TraversalConfig
{
    /// Load a configuration from a JSON file.
    ///
    /// ## Errors
    ///
    /// - `Io`: the file cannot be read
    /// - `Serialization`: the file is not valid JSON for this type
    pub fn from_file(path: impl AsRef<Path>) -> OracleResult<Self>
    {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Byte length passed to the mutation notifier.
    #[must_use]
    pub fn effective_watch_length(&self) -> usize
    {
        self.watch_length.unwrap_or(std::mem::size_of::<u64>())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults()
    {
        let config: TraversalConfig = serde_json::from_str(r#"{"conflict_policy": "reject"}"#).unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::Reject);
        assert!(config.install_watches);
        assert_eq!(config.parent_history, ParentHistory::PerPass);
        assert_eq!(config.effective_watch_length(), 8);
        assert_eq!(config.max_array_elements, 4096);
    }
}
