//! # Error Types
//!
//! General error handling for memory-graph traversal.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

use crate::types::{Address, FrameId, Kind};

/// Main error type for traversal operations
///
/// This enum represents all the ways resolving, classifying, or recording a
/// value can fail. Most variants are recovered locally by the traversal
/// engine: the affected branch degrades to an invalid leaf and the pass
/// continues with the remaining roots and siblings.
///
/// ## Error Categories
///
/// 1. **Debuggee errors**: Resolution, Memory, StaleFrame
/// 2. **Bookkeeping errors**: AmbiguousParent, DuplicateAddress, NotFound
/// 3. **Host resource errors**: ResourceExhausted
/// 4. **Caller errors**: InvalidArgument
/// 5. **Output errors**: Serialization, Io
#[derive(Error, Debug)]
pub enum OracleError
{
    /// A name or symbol cannot be evaluated in the given frame
    ///
    /// This happens when:
    /// - The symbol is not in scope in the selected frame
    /// - The expression references a field that does not exist
    /// - A type lookup for a recovered type fails
    #[error("Cannot resolve `{name}`: {reason}")]
    Resolution
    {
        /// Expression that failed to evaluate
        name: String,
        /// Debuggee-provided explanation
        reason: String,
    },

    /// Reading memory at the given address failed
    ///
    /// Expected for null or dangling pointers. The traversal records the
    /// pointer's target as absent rather than retrying.
    #[error("Cannot access memory at address {address}")]
    Memory
    {
        /// Address that could not be read
        address: Address,
    },

    /// A parent address was supplied without a relation kind, or vice versa
    ///
    /// This is a contract violation in the caller and is never recovered.
    #[error("Parent and relation must be supplied together (name `{name}`)")]
    AmbiguousParent
    {
        /// Name whose registration carried the inconsistent parent data
        name: String,
    },

    /// Two names produced the same address under incompatible types
    #[error("Address {address} already recorded as `{existing}` in the {kind} partition, refusing `{incoming}`")]
    DuplicateAddress
    {
        /// Shared address
        address: Address,
        /// Partition of the existing entry
        kind: Kind,
        /// Canonical type already recorded
        existing: String,
        /// Canonical type that was refused
        incoming: String,
    },

    /// The frame is no longer valid (the debuggee resumed and unwound it)
    #[error("Frame {0} is no longer valid")]
    StaleFrame(FrameId),

    /// No entry is stored for the requested key
    #[error("No {kind} entry at address {address}")]
    NotFound
    {
        /// Requested partition
        kind: Kind,
        /// Requested address
        address: Address,
    },

    /// The host debugger ran out of a limited resource (e.g. watchpoint slots)
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Invalid argument passed to a traversal or debuggee function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to serialize an entry record
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (writing records, reading fixtures, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OracleError
{
    /// Shorthand for a [`OracleError::Resolution`].
    pub fn resolution(name: impl Into<String>, reason: impl Into<String>) -> Self
    {
        Self::Resolution {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the traversal engine may degrade the affected branch and carry on.
    ///
    /// Only [`OracleError::AmbiguousParent`] is fatal: it signals broken
    /// bookkeeping rather than imperfect debuggee state.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool
    {
        !matches!(self, Self::AmbiguousParent { .. })
    }
}

/// Convenience type alias for `Result<T, OracleError>`
///
/// ```rust
/// use memoracle_core::error::OracleResult;
/// fn foo() -> OracleResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type OracleResult<T> = std::result::Result<T, OracleError>;
