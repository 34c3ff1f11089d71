//! # Entry Repository
//!
//! Address-keyed, kind-partitioned store of every entry observed during an
//! execution. It is the single authority on deduplication: a `(kind,
//! address)` pair owns exactly one [`Entry`] for the lifetime of the
//! repository, and every re-traversal merges into it.
//!
//! Partitioning by kind lets a struct and its first field, or an array and
//! its first element, share an address without colliding.
//!
//! A secondary index maps `(frame, name)` to the key the name last resolved
//! to. When a name moves to a different key its stale membership is
//! discarded instead of merged. Entries themselves outlive their names: only
//! a reclassification (a different kind at the same address) drops the stale
//! entry, and only once no name is left on it. A repointed pointer leaves its
//! old target in place with its last known value.

mod entry;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::ConflictPolicy;
use crate::error::{OracleError, OracleResult};
use crate::sink::EntryRecord;
use crate::types::{Address, FrameId, Kind, Relation, TypeDescriptor};
use crate::visit::VisitationTracker;

pub use entry::{ChildLabel, ChildRef, Entry, EntryStatus, Shape};

/// Everything needed to create or merge one entry.
///
/// `parent` and `relation` must be supplied together or not at all.
#[derive(Debug, Clone)]
pub struct Registration<'a>
{
    pub kind: Kind,
    pub address: Address,
    pub name: &'a str,
    pub frame: FrameId,
    pub descriptor: TypeDescriptor,
    pub parent: Option<Address>,
    pub relation: Option<Relation>,
}

impl<'a> Registration<'a>
{
    /// A parentless registration (a root symbol).
    pub fn root(kind: Kind, address: Address, name: &'a str, frame: FrameId, descriptor: TypeDescriptor) -> Self
    {
        Self {
            kind,
            address,
            name,
            frame,
            descriptor,
            parent: None,
            relation: None,
        }
    }

    /// Attach a parent reached through `relation`.
    #[must_use]
    pub fn with_parent(mut self, relation: Relation, parent: Address) -> Self
    {
        self.relation = Some(relation);
        self.parent = Some(parent);
        self
    }

    fn link(&self) -> OracleResult<Option<(Relation, Address)>>
    {
        match (self.relation, self.parent) {
            (Some(relation), Some(parent)) => Ok(Some((relation, parent))),
            (None, None) => Ok(None),
            _ => Err(OracleError::AmbiguousParent {
                name: self.name.to_string(),
            }),
        }
    }
}

/// A name that reached an existing leaf entry with a different type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict
{
    pub address: Address,
    pub kind: Kind,
    pub name: String,
    /// Canonical type kept on the entry.
    pub existing: String,
    /// Canonical type that was not recorded.
    pub incoming: String,
}

/// The deduplicated entry store of one execution.
#[derive(Debug, Default)]
pub struct Repository
{
    partitions: BTreeMap<Kind, BTreeMap<Address, Entry>>,
    names: HashMap<(FrameId, String), (Kind, Address)>,
    conflicts: Vec<Conflict>,
    conflict_policy: ConflictPolicy,
    created: usize,
}

impl Repository
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    #[must_use]
    pub fn with_conflict_policy(conflict_policy: ConflictPolicy) -> Self
    {
        Self {
            conflict_policy,
            ..Self::default()
        }
    }

    /// Create the entry for `(kind, address)` or merge into the existing one.
    ///
    /// Returns the entry and whether the caller should expand its children:
    /// `true` exactly when this pass has not expanded `(kind, address)` yet.
    ///
    /// ## Errors
    ///
    /// - `AmbiguousParent`: only one of `parent` and `relation` was supplied
    /// - `DuplicateAddress`: the policy is `Reject` and a new name reached a
    ///   leaf entry with a different canonical type
    pub fn create_or_merge(
        &mut self,
        registration: Registration<'_>,
        tracker: &mut VisitationTracker,
    ) -> OracleResult<(&mut Entry, bool)>
    {
        let link = registration.link()?;
        let Registration {
            kind,
            address,
            name,
            frame,
            descriptor,
            ..
        } = registration;

        self.discard_stale(frame, name, kind, address);
        let first_touch = tracker.touch(kind, address);

        let partition = self.partitions.entry(kind).or_default();
        match partition.get_mut(&address) {
            None => {
                trace!(%kind, %address, %name, "creating entry");
                partition.insert(address, Entry::new(kind, address, name, frame, descriptor));
                self.created += 1;
            }
            Some(entry) => {
                let new_name = !entry.names.contains(name);
                let type_known = entry.types.iter().any(|known| known.name == descriptor.name);
                if new_name && !type_known && matches!(kind, Kind::Primitive | Kind::Pointer) {
                    let existing = entry.type_name().unwrap_or_default().to_string();
                    if self.conflict_policy == ConflictPolicy::Reject {
                        return Err(OracleError::DuplicateAddress {
                            address,
                            kind,
                            existing,
                            incoming: descriptor.name,
                        });
                    }
                    warn!(%address, %kind, %name, %existing, incoming = %descriptor.name, "conflicting type for address, keeping first");
                    self.conflicts.push(Conflict {
                        address,
                        kind,
                        name: name.to_string(),
                        existing,
                        incoming: descriptor.name,
                    });
                } else {
                    entry.types.insert(descriptor);
                }

                if first_touch && tracker.resets_parents() {
                    entry.parents.clear();
                }
                trace!(%kind, %address, %name, new_name, "merging into existing entry");
                entry.names.insert(name.to_string());
                entry.frames.insert(frame);
            }
        }

        self.names.insert((frame, name.to_string()), (kind, address));
        let expand = tracker.claim(kind, address);
        let entry = self.entry_mut(kind, address).ok_or(OracleError::NotFound { kind, address })?;
        if let Some((relation, parent)) = link {
            entry.add_parent(relation, parent);
        }
        Ok((entry, expand))
    }

    /// Record that `parent` references the entry at `(kind, address)`.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: no such entry
    pub fn add_parent(&mut self, kind: Kind, address: Address, relation: Relation, parent: Address) -> OracleResult<()>
    {
        let entry = self.entry_mut(kind, address).ok_or(OracleError::NotFound { kind, address })?;
        entry.add_parent(relation, parent);
        Ok(())
    }

    /// Read accessor for one entry.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: no entry is stored for `(kind, address)`
    pub fn get(&self, kind: Kind, address: Address) -> OracleResult<&Entry>
    {
        self.partitions
            .get(&kind)
            .and_then(|partition| partition.get(&address))
            .ok_or(OracleError::NotFound { kind, address })
    }

    pub(crate) fn entry_mut(&mut self, kind: Kind, address: Address) -> Option<&mut Entry>
    {
        self.partitions.get_mut(&kind)?.get_mut(&address)
    }

    /// Key a name last resolved to in `frame`.
    #[must_use]
    pub fn resolved(&self, frame: FrameId, name: &str) -> Option<(Kind, Address)>
    {
        self.names.get(&(frame, name.to_string())).copied()
    }

    /// Unlink `name` and every name derived from it in `frame`.
    ///
    /// The entries are kept with their last values. Returns the detached
    /// names with the address each one resolved to.
    pub fn detach(&mut self, frame: FrameId, name: &str) -> Vec<(String, Address)>
    {
        let stale = self
            .names
            .iter()
            .filter(|((owner, other), _)| *owner == frame && other.contains(name))
            .map(|((_, other), &target)| (other.clone(), target))
            .collect::<Vec<_>>();

        for (other, (kind, address)) in &stale {
            self.names.remove(&(frame, other.clone()));
            self.unlink_name(*kind, *address, other);
        }
        if !stale.is_empty() {
            debug!(%name, %frame, detached = stale.len(), "detached names");
        }
        stale.into_iter().map(|(other, (_, address))| (other, address)).collect()
    }

    /// Entry a name last resolved to in `frame`.
    #[must_use]
    pub fn lookup(&self, frame: FrameId, name: &str) -> Option<&Entry>
    {
        let &(kind, address) = self.names.get(&(frame, name.to_string()))?;
        self.get(kind, address).ok()
    }

    /// Entries of every kind stored at `address`.
    pub fn entries_at(&self, address: Address) -> impl Iterator<Item = &Entry> + '_
    {
        self.partitions.values().filter_map(move |partition| partition.get(&address))
    }

    /// Entries in `(kind, address)` order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_
    {
        self.partitions.values().flat_map(BTreeMap::values)
    }

    /// Entries of one kind in address order.
    pub fn partition(&self, kind: Kind) -> impl Iterator<Item = &Entry> + '_
    {
        self.partitions.get(&kind).into_iter().flat_map(BTreeMap::values)
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.partitions.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// Entries created over the repository's lifetime, released ones included.
    #[must_use]
    pub const fn created(&self) -> usize
    {
        self.created
    }

    /// Type conflicts recorded under [`ConflictPolicy::KeepFirst`].
    #[must_use]
    pub fn conflicts(&self) -> &[Conflict]
    {
        &self.conflicts
    }

    /// Forget everything that was only observed in `frame`.
    ///
    /// Names resolved in the frame are unlinked, the frame is removed from
    /// every entry, and entries left without any frame are dropped. Returns
    /// the number of dropped entries.
    pub fn release_frame(&mut self, frame: FrameId) -> usize
    {
        let keys = self
            .names
            .keys()
            .filter(|(owner, _)| *owner == frame)
            .cloned()
            .collect::<Vec<_>>();
        for key in keys {
            if let Some((kind, address)) = self.names.remove(&key) {
                self.unlink_name(kind, address, &key.1);
            }
        }

        let mut dropped = 0;
        for partition in self.partitions.values_mut() {
            partition.retain(|_, entry| {
                entry.frames.remove(&frame);
                let keep = !entry.frames.is_empty();
                if !keep {
                    dropped += 1;
                }
                keep
            });
        }

        let partitions = &self.partitions;
        self.names
            .retain(|_, target| partitions.get(&target.0).is_some_and(|partition| partition.contains_key(&target.1)));

        debug!(%frame, dropped, "released frame");
        dropped
    }

    /// Flat records of every entry, tagged with the execution id.
    #[must_use]
    pub fn records(&self, execution: &str) -> Vec<EntryRecord>
    {
        self.iter().map(|entry| EntryRecord::from_entry(execution, entry)).collect()
    }

    fn discard_stale(&mut self, frame: FrameId, name: &str, kind: Kind, address: Address)
    {
        let key = (frame, name.to_string());
        let Some(&(old_kind, old_address)) = self.names.get(&key) else {
            return;
        };
        if (old_kind, old_address) == (kind, address) {
            return;
        }

        self.names.remove(&key);
        self.unlink_name(old_kind, old_address, name);
        // A different kind at the same address is a reclassification; a new
        // address is the name now referring elsewhere
        let reclassified = old_address == address
            && self
                .partitions
                .get(&old_kind)
                .and_then(|partition| partition.get(&old_address))
                .is_some_and(|entry| entry.names.is_empty());
        if reclassified {
            if let Some(partition) = self.partitions.get_mut(&old_kind) {
                partition.remove(&old_address);
            }
        }
        debug!(%name, from = %old_kind, to = %kind, %old_address, %address, reclassified, "discarded stale membership");
    }

    // Removes `name` from the entry unless another frame still maps it there.
    fn unlink_name(&mut self, kind: Kind, address: Address, name: &str)
    {
        let still_referenced = self
            .names
            .iter()
            .any(|((_, other), target)| other == name && *target == (kind, address));
        if still_referenced {
            return;
        }
        let Some(entry) = self.entry_mut(kind, address) else {
            return;
        };
        entry.names.remove(name);
        entry.shapes.remove(name);
        if entry.name == name {
            if let Some(first) = entry.names.iter().next() {
                entry.name = first.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn frame() -> FrameId
    {
        FrameId::from_raw(1)
    }

    fn int() -> TypeDescriptor
    {
        TypeDescriptor::new(Kind::Primitive, "int")
    }

    #[test]
    fn test_parent_without_relation_is_rejected()
    {
        let mut repository = Repository::new();
        let mut tracker = VisitationTracker::new();
        let mut registration = Registration::root(Kind::Primitive, Address::new(0x10), "x", frame(), int());
        registration.parent = Some(Address::new(0x20));

        let result = repository.create_or_merge(registration, &mut tracker);
        assert!(matches!(result, Err(OracleError::AmbiguousParent { .. })));
        assert!(repository.is_empty());
    }

    #[test]
    fn test_expand_only_once_per_pass()
    {
        let mut repository = Repository::new();
        let mut tracker = VisitationTracker::new();
        let address = Address::new(0x10);

        let registration = Registration::root(Kind::Primitive, address, "x", frame(), int());
        let (_, expand) = repository.create_or_merge(registration.clone(), &mut tracker).unwrap();
        assert!(expand);
        let (_, expand) = repository.create_or_merge(registration.clone(), &mut tracker).unwrap();
        assert!(!expand);

        tracker.begin_pass(false);
        let (entry, expand) = repository.create_or_merge(registration, &mut tracker).unwrap();
        assert!(expand);
        assert_eq!(entry.names.len(), 1);
        assert_eq!(repository.len(), 1);
    }

    #[test]
    fn test_reclassified_name_discards_stale_entry()
    {
        let mut repository = Repository::new();
        let mut tracker = VisitationTracker::new();
        let address = Address::new(0x10);

        repository
            .create_or_merge(Registration::root(Kind::Primitive, address, "p", frame(), int()), &mut tracker)
            .unwrap();
        let pointer = TypeDescriptor::new(Kind::Pointer, "node*");
        repository
            .create_or_merge(Registration::root(Kind::Pointer, address, "p", frame(), pointer), &mut tracker)
            .unwrap();

        assert!(repository.get(Kind::Primitive, address).is_err());
        assert_eq!(repository.lookup(frame(), "p").map(|entry| entry.kind), Some(Kind::Pointer));
        assert_eq!(repository.created(), 2);
    }

    #[test]
    fn test_moved_name_keeps_old_entry()
    {
        let mut repository = Repository::new();
        let mut tracker = VisitationTracker::new();
        let (old, new) = (Address::new(0x10), Address::new(0x20));

        repository
            .create_or_merge(Registration::root(Kind::Primitive, old, "(*p)", frame(), int()), &mut tracker)
            .unwrap();
        tracker.begin_pass(false);
        repository
            .create_or_merge(Registration::root(Kind::Primitive, new, "(*p)", frame(), int()), &mut tracker)
            .unwrap();

        let stale = repository.get(Kind::Primitive, old).unwrap();
        assert!(stale.names.is_empty());
        assert_eq!(stale.name, "(*p)");
        assert_eq!(repository.resolved(frame(), "(*p)"), Some((Kind::Primitive, new)));
        assert_eq!(repository.len(), 2);
        assert_eq!(repository.created(), 2);
    }

    #[test]
    fn test_detach_unlinks_derived_names()
    {
        let mut repository = Repository::new();
        let mut tracker = VisitationTracker::new();
        let node = TypeDescriptor::new(Kind::Struct, "node");
        let target = Address::new(0x40);

        repository
            .create_or_merge(Registration::root(Kind::Struct, target, "(*p)", frame(), node), &mut tracker)
            .unwrap();
        repository
            .create_or_merge(Registration::root(Kind::Primitive, target, "(*p).value", frame(), int()), &mut tracker)
            .unwrap();
        repository
            .create_or_merge(Registration::root(Kind::Primitive, Address::new(0x80), "q", frame(), int()), &mut tracker)
            .unwrap();

        let mut detached = repository.detach(frame(), "(*p)");
        detached.sort();
        assert_eq!(
            detached,
            vec![("(*p)".to_string(), target), ("(*p).value".to_string(), target)]
        );
        assert!(repository.lookup(frame(), "(*p)").is_none());
        assert!(repository.get(Kind::Struct, target).unwrap().names.is_empty());
        assert_eq!(repository.lookup(frame(), "q").map(|entry| entry.address), Some(Address::new(0x80)));
        assert_eq!(repository.len(), 3);
    }
}
