//! Stack frame identity.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::Address;

/// Stable identifier for an execution context (a stack frame).
///
/// Entries record every frame they were observed in, and observers remember
/// the frame their root name must be evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(u64);

impl FrameId
{
    /// Build an identifier from the function name, call depth, and frame base.
    pub fn from_parts(function: &str, depth: u32, base: Address) -> Self
    {
        let mut hasher = DefaultHasher::new();
        function.hash(&mut hasher);
        depth.hash(&mut hasher);
        base.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Wrap a raw identifier handed out by the host debugger.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    /// Raw representation suitable for serialization.
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for FrameId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "frame#{:x}", self.0)
    }
}

/// A symbol declared in a frame's block or in the global block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo
{
    /// Source-level name, evaluable in the owning frame.
    pub name: String,
    /// Enumerators, functions and other constants are not traversal roots.
    pub constant: bool,
}

impl SymbolInfo
{
    /// A non-constant variable symbol.
    pub fn variable(name: impl Into<String>) -> Self
    {
        Self {
            name: name.into(),
            constant: false,
        }
    }
}
