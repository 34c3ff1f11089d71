//! Per-pass visitation bookkeeping.
//!
//! Two kinds of markers bound the work of one snapshot pass:
//!
//! - **names**: expression paths already processed. A name seen twice is
//!   skipped outright (only its new parent link is recorded). This is the
//!   coarse, cheap check.
//! - **claims**: `(kind, address)` pairs already expanded. Reaching a claimed
//!   pair again through a different name records the new name and parent but
//!   does not recurse. This is what breaks pointer cycles.
//!
//! Together they guarantee termination on any finite memory graph: every
//! distinct `(kind, address)` is expanded at most once per pass, except where
//! a container deliberately withdraws its own claim so that a same-address
//! child of the same kind (the first row of a 2-D array) can be expanded.

use std::collections::HashSet;

use tracing::trace;

use crate::types::{Address, Kind};

/// Markers for one snapshot pass. Cleared by [`VisitationTracker::begin_pass`].
#[derive(Debug, Default)]
pub struct VisitationTracker
{
    names: HashSet<String>,
    claimed: HashSet<(Kind, Address)>,
    touched: HashSet<(Kind, Address)>,
    reset_parents: bool,
}

impl VisitationTracker
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Forget every marker and start a new pass.
    ///
    /// `reset_parents` asks the repository to clear an entry's parent sets the
    /// first time the entry is touched in this pass.
    pub fn begin_pass(&mut self, reset_parents: bool)
    {
        self.names.clear();
        self.claimed.clear();
        self.touched.clear();
        self.reset_parents = reset_parents;
    }

    /// Move to the next frame of a multi-frame pass.
    ///
    /// Names are only meaningful within one frame and are forgotten. Claims
    /// and touches are kept, so an entry shared between frames is expanded
    /// once and its parents are not reset a second time.
    pub fn begin_frame(&mut self)
    {
        self.names.clear();
    }

    /// Record `name` as processed. Returns `false` if it already was.
    pub fn visit_name(&mut self, name: &str) -> bool
    {
        if self.names.contains(name) {
            trace!(%name, "name already visited in this pass");
            return false;
        }
        self.names.insert(name.to_string());
        true
    }

    #[must_use]
    pub fn has_visited(&self, name: &str) -> bool
    {
        self.names.contains(name)
    }

    /// Claim `(kind, address)` for expansion. Returns `false` if already claimed.
    pub fn claim(&mut self, kind: Kind, address: Address) -> bool
    {
        self.claimed.insert((kind, address))
    }

    #[must_use]
    pub fn is_claimed(&self, kind: Kind, address: Address) -> bool
    {
        self.claimed.contains(&(kind, address))
    }

    /// Give up a claim so a same-address child of the same kind can expand.
    pub fn withdraw(&mut self, kind: Kind, address: Address) -> bool
    {
        let removed = self.claimed.remove(&(kind, address));
        if removed {
            trace!(%kind, %address, "withdrew claim for nested same-address child");
        }
        removed
    }

    /// Mark an entry as touched. Returns `true` on the first touch of the pass.
    pub fn touch(&mut self, kind: Kind, address: Address) -> bool
    {
        self.touched.insert((kind, address))
    }

    /// Whether parent sets are reset on first touch in this pass.
    #[must_use]
    pub const fn resets_parents(&self) -> bool
    {
        self.reset_parents
    }

    /// Number of names processed so far.
    #[must_use]
    pub fn visited_names(&self) -> usize
    {
        self.names.len()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_names_are_visited_once()
    {
        let mut tracker = VisitationTracker::new();
        assert!(tracker.visit_name("p"));
        assert!(!tracker.visit_name("p"));
        assert!(tracker.has_visited("p"));
        tracker.begin_pass(true);
        assert!(!tracker.has_visited("p"));
        assert!(tracker.resets_parents());
    }

    #[test]
    fn test_claim_and_withdraw()
    {
        let mut tracker = VisitationTracker::new();
        let addr = Address::new(0x1000);
        assert!(tracker.claim(Kind::Array, addr));
        assert!(!tracker.claim(Kind::Array, addr));
        // Partitions are independent
        assert!(tracker.claim(Kind::Primitive, addr));
        assert!(tracker.withdraw(Kind::Array, addr));
        assert!(!tracker.is_claimed(Kind::Array, addr));
        assert!(tracker.claim(Kind::Array, addr));
    }
}
