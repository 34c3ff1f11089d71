//! Mutation events delivered by the host debugger's watch facility.
//!
//! The watch subsystem hands a [`MutationSender`] to the host when it installs
//! an observer. The host sends a [`MutationEvent`] whenever memory under that
//! observer is written, and the session drains the matching receiver the next
//! time the debuggee is stopped. Events are therefore serialized with respect
//! to traversal passes rather than interleaved with them.

use std::fmt;
use std::sync::mpsc;

use crate::types::Address;

/// Identifier of an observer installed with the host debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(u64);

impl WatchHandle
{
    /// Create a new identifier from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    /// Get the raw numeric representation (useful for logging / errors).
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for WatchHandle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "watch#{}", self.0)
    }
}

/// Memory under an observer was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationEvent
{
    /// Observer that fired.
    pub handle: WatchHandle,
    /// Watched address (start of the observed range).
    pub address: Address,
}

impl MutationEvent
{
    /// Human-readable description of the event.
    #[must_use]
    pub fn describe(&self) -> String
    {
        format!("Memory at {} written ({})", self.address, self.handle)
    }
}

/// Sender side of the mutation event channel.
pub type MutationSender = mpsc::Sender<MutationEvent>;
/// Receiver side of the mutation event channel.
pub type MutationReceiver = mpsc::Receiver<MutationEvent>;

/// Create a new mutation event channel.
#[must_use]
pub fn event_channel() -> (MutationSender, MutationReceiver)
{
    mpsc::channel()
}
