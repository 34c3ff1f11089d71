//! # Traversal Engine
//!
//! Recursive descent over the memory graph reachable from one root name.
//!
//! Every name goes through the same steps:
//!
//! 1. **Resolve**: the caller hands in a typed value (evaluated in the right
//!    frame) or [`Traversal::traverse_root`] evaluates the root name.
//! 2. **Classify**: [`classify`] the static type, after trying
//!    [`recover_true_type`] on integer-kind values.
//! 3. **Record**: create or merge the entry in the [`Repository`].
//! 4. **Observe**: register the address with the [`WatchRegistry`].
//! 5. **Dispatch**: only when the repository says this pass has not expanded
//!    the `(kind, address)` yet, record the value or recurse into children.
//!
//! Failures degrade the affected branch and are collected in the
//! [`PassReport`]; only a broken bookkeeping contract aborts a pass.
//!
//! Child names follow the debugger's expression syntax so they can be
//! re-evaluated later: `(*p)` for a pointer target, `s.field` for a member
//! (`q->field` when the container name is a bare `*q`), and `a[i]` for an
//! element.

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::classify::{classify, describe, is_ambiguous_integer, is_standard_library, recover_true_type, target_type_name};
use crate::config::TraversalConfig;
use crate::debuggee::Debuggee;
use crate::error::{OracleError, OracleResult};
use crate::repository::{ChildLabel, ChildRef, EntryStatus, Registration, Repository, Shape};
use crate::types::{Address, FrameId, Kind, RawType, Relation};
use crate::visit::VisitationTracker;
use crate::watch::{WatchRegistry, WatchRoot};

/// What started a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind
{
    Locals,
    Globals,
    Upward,
    /// Incremental pass triggered by a memory write.
    Mutation,
}

/// A branch that was abandoned during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchFailure
{
    pub frame: FrameId,
    pub name: String,
    pub error: String,
}

/// Summary of one snapshot pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport
{
    pub kind: PassKind,
    /// Frames the pass evaluated names in, newest first.
    pub frames: Vec<FrameId>,
    pub roots: Vec<String>,
    /// Entries that did not exist before the pass.
    pub created: usize,
    /// Entries expanded (value refreshed, children walked).
    pub expanded: usize,
    /// Names that reached an entry this pass had already expanded.
    pub revisited: usize,
    pub failures: Vec<BranchFailure>,
}

impl PassReport
{
    #[must_use]
    pub fn new(kind: PassKind) -> Self
    {
        Self {
            kind,
            frames: Vec::new(),
            roots: Vec::new(),
            created: 0,
            expanded: 0,
            revisited: 0,
            failures: Vec::new(),
        }
    }

    /// No branch was degraded.
    #[must_use]
    pub fn is_clean(&self) -> bool
    {
        self.failures.is_empty()
    }
}

/// One traversal bound to a frame. The frame must already be selected.
pub struct Traversal<'a, D: Debuggee + ?Sized>
{
    debuggee: &'a mut D,
    repository: &'a mut Repository,
    tracker: &'a mut VisitationTracker,
    watches: &'a mut WatchRegistry,
    config: &'a TraversalConfig,
    frame: FrameId,
    report: &'a mut PassReport,
}

impl<'a, D: Debuggee + ?Sized> Traversal<'a, D>
{
    pub fn new(
        debuggee: &'a mut D,
        repository: &'a mut Repository,
        tracker: &'a mut VisitationTracker,
        watches: &'a mut WatchRegistry,
        config: &'a TraversalConfig,
        frame: FrameId,
        report: &'a mut PassReport,
    ) -> Self
    {
        Self {
            debuggee,
            repository,
            tracker,
            watches,
            config,
            frame,
            report,
        }
    }

    /// Evaluate `name` in the selected frame and walk everything it reaches.
    ///
    /// Returns the address of the root entry, or `None` if the root could
    /// not be resolved (the failure is in the report).
    ///
    /// ## Errors
    ///
    /// - `AmbiguousParent`: repository bookkeeping is broken
    pub fn traverse_root(&mut self, name: &str) -> OracleResult<Option<Address>>
    {
        self.report.roots.push(name.to_string());
        match self.debuggee.evaluate(name) {
            Ok(value) => self.visit(name, value, None),
            Err(err) => self.degrade(name, err),
        }
    }

    /// Walk an already resolved `value` known as `name`.
    ///
    /// `link` is the parent entry and the relation it reaches `value` through.
    ///
    /// ## Errors
    ///
    /// - `AmbiguousParent`: repository bookkeeping is broken
    pub fn visit(&mut self, name: &str, value: D::Value, link: Option<(Relation, Address)>) -> OracleResult<Option<Address>>
    {
        if !self.tracker.visit_name(name) {
            return self.relink(name, link);
        }

        let (value, ty) = self.resolve_type(name, value);
        let kind = classify(&ty);
        let Some(address) = self.debuggee.address_of(&value) else {
            return self.degrade(name, OracleError::resolution(name, "value has no address"));
        };
        let descriptor = describe(&*self.debuggee, &value, &ty);
        let opaque = !self.config.expand_standard_library && is_standard_library(&descriptor.name);
        let type_name = descriptor.name.clone();
        debug!(%name, %address, %kind, ty = %type_name, "classified");

        // Row 0 of a nested array, or a leading struct member
        let member = link.is_some_and(|(relation, parent)| {
            parent == address && matches!((relation, kind), (Relation::Array, Kind::Array) | (Relation::Struct, Kind::Struct))
        });
        let previous = self.repository.resolved(self.frame, name);

        let mut registration = Registration::root(kind, address, name, self.frame, descriptor);
        if let Some((relation, parent)) = link {
            registration = registration.with_parent(relation, parent);
        }
        let (owns, expand) = match self.repository.create_or_merge(registration, self.tracker) {
            // Leaves belong to every name that agrees on the type; a container
            // belongs to every name except its same-address members, which
            // record their own shape
            Ok((entry, expand)) => {
                let owns = match kind {
                    Kind::Primitive | Kind::Pointer => entry.types.iter().any(|known| known.name == type_name),
                    _ => !member && !entry.shapes.contains_key(name),
                };
                (owns, expand)
            }
            Err(err) => return self.degrade(name, err),
        };

        if let Some((_, moved_from)) = previous.filter(|&(_, old)| old != address) {
            self.unobserve(moved_from, name);
        }
        self.observe(address, name, &ty);

        if !expand {
            trace!(%name, %address, %kind, "already expanded in this pass");
            self.report.revisited += 1;
            return Ok(Some(address));
        }
        self.report.expanded += 1;

        if opaque {
            self.record_leaf(kind, address, &value, owns, true);
            return Ok(Some(address));
        }

        match kind {
            Kind::Primitive | Kind::Function | Kind::Void | Kind::Unknown => {
                self.record_leaf(kind, address, &value, owns, false);
            }
            Kind::Pointer if owns => self.expand_pointer(name, &value, address)?,
            // A conflicting reinterpretation of someone else's pointer
            Kind::Pointer => {}
            Kind::Array => self.expand_array(name, &value, &ty, address, owns)?,
            Kind::Struct => self.expand_struct(name, &value, address, owns)?,
        }
        Ok(Some(address))
    }

    fn resolve_type(&self, name: &str, value: D::Value) -> (D::Value, RawType)
    {
        let ty = self.debuggee.type_of(&value);
        if !is_ambiguous_integer(&ty) {
            return (value, ty);
        }
        let Some(recovered) = recover_true_type(&*self.debuggee, &value) else {
            return (value, ty);
        };
        match self.debuggee.cast(&value, &recovered) {
            Ok(cast) => {
                debug!(%name, from = %ty, to = %recovered, "reclassified integer value");
                (cast, recovered)
            }
            Err(err) => {
                debug!(%name, to = %recovered, error = %err, "recovered type rejected by cast");
                (value, ty)
            }
        }
    }

    // A name seen earlier in this pass: only the new parent link is recorded.
    fn relink(&mut self, name: &str, link: Option<(Relation, Address)>) -> OracleResult<Option<Address>>
    {
        let Some(entry) = self.repository.lookup(self.frame, name) else {
            return Ok(None);
        };
        let (kind, address) = (entry.kind, entry.address);
        self.report.revisited += 1;
        if let Some((relation, parent)) = link {
            if let Err(err) = self.repository.add_parent(kind, address, relation, parent) {
                return self.degrade(name, err);
            }
        }
        Ok(Some(address))
    }

    fn observe(&mut self, address: Address, name: &str, ty: &RawType)
    {
        if !self.config.install_watches {
            return;
        }
        let root = WatchRoot::new(self.frame, name);
        let length = self.config.effective_watch_length();
        if let Err(err) = self.watches.install(&mut *self.debuggee, address, root, ty, length) {
            warn!(%name, %address, error = %err, "address left unobserved");
        }
    }

    // `name` now refers to other memory; writes to its old address no longer
    // concern it
    fn unobserve(&mut self, address: Address, name: &str)
    {
        let root = WatchRoot::new(self.frame, name);
        match self.watches.remove_root(&mut *self.debuggee, address, &root) {
            Ok(torn_down) => debug!(%name, %address, torn_down, "name moved away from observed address"),
            Err(err) => warn!(%name, %address, error = %err, "failed to remove stale observer root"),
        }
    }

    // The target behind `name` is gone; names derived from it stop
    // resolving in this frame
    fn release(&mut self, name: &str)
    {
        for (stale, address) in self.repository.detach(self.frame, name) {
            self.unobserve(address, &stale);
        }
    }

    fn record_leaf(&mut self, kind: Kind, address: Address, value: &D::Value, owns: bool, opaque: bool)
    {
        if !owns {
            return;
        }
        let printed = self.debuggee.printed(value);
        if let Some(entry) = self.repository.entry_mut(kind, address) {
            entry.opaque = opaque;
            entry.children.clear();
            match printed {
                Ok(printed) => {
                    entry.value = Some(printed);
                    entry.status = EntryStatus::Valid;
                }
                Err(err) => {
                    entry.status = EntryStatus::Invalid {
                        reason: err.to_string(),
                    };
                }
            }
        }
    }

    fn expand_pointer(&mut self, name: &str, value: &D::Value, address: Address) -> OracleResult<()>
    {
        let printed = self.debuggee.printed(value).map(|printed| strip_symbol_suffix(&printed).to_string());
        let child_name = format!("(*{name})");

        let (children, status) = match self.debuggee.dereference(value) {
            Ok(target) => match self.visit(&child_name, target, Some((Relation::Pointer, address)))? {
                Some(child) => (vec![ChildRef::new(ChildLabel::Target, Some(child))], EntryStatus::Valid),
                None => (
                    Vec::new(),
                    EntryStatus::Invalid {
                        reason: format!("target `{child_name}` could not be resolved"),
                    },
                ),
            },
            Err(OracleError::Memory { address: target }) if target.is_null() => {
                trace!(%name, "null pointer");
                self.release(&child_name);
                (Vec::new(), EntryStatus::Valid)
            }
            Err(err) => {
                self.note_failure(&child_name, &err);
                (
                    Vec::new(),
                    EntryStatus::Invalid {
                        reason: err.to_string(),
                    },
                )
            }
        };

        if let Some(entry) = self.repository.entry_mut(Kind::Pointer, address) {
            entry.children = children;
            match printed {
                Ok(printed) => {
                    entry.value = Some(printed);
                    entry.status = status;
                }
                Err(err) => {
                    entry.status = EntryStatus::Invalid {
                        reason: err.to_string(),
                    };
                }
            }
        }
        Ok(())
    }

    fn expand_array(&mut self, name: &str, value: &D::Value, ty: &RawType, address: Address, owns: bool) -> OracleResult<()>
    {
        let stripped = ty.strip_typedefs();
        let Some((low, high)) = stripped.bounds else {
            if owns {
                self.mark_invalid(Kind::Array, address, "array type has no bounds");
            }
            return Ok(());
        };

        // The first element of a nested array lives at the array's own address
        if stripped.target().is_some_and(|element| classify(element) == Kind::Array) {
            self.tracker.withdraw(Kind::Array, address);
        }

        let limit = i64::try_from(self.config.max_array_elements).unwrap_or(i64::MAX);
        let last = if high.saturating_sub(low) >= limit {
            warn!(%name, %address, low, high, limit, "array truncated");
            low.saturating_add(limit - 1)
        } else {
            high
        };

        let mut children = Vec::new();
        let mut status = EntryStatus::Valid;
        for index in low..=last {
            let child_name = format!("{name}[{index}]");
            let child = match self.debuggee.element(value, index) {
                Ok(element) => self.visit(&child_name, element, Some((Relation::Array, address)))?,
                Err(err) => {
                    self.note_failure(&child_name, &err);
                    status = EntryStatus::Invalid {
                        reason: err.to_string(),
                    };
                    None
                }
            };
            children.push(ChildRef::new(ChildLabel::Index(index), child));
        }

        if let Some(entry) = self.repository.entry_mut(Kind::Array, address) {
            if owns {
                entry.range = Some((low, high));
                entry.target_type = Some(target_type_name(ty));
                entry.children = children;
                entry.status = status;
            } else {
                entry.shapes.insert(
                    name.to_string(),
                    Shape {
                        range: Some((low, high)),
                        target_type: Some(target_type_name(ty)),
                        children,
                    },
                );
            }
        }
        Ok(())
    }

    fn expand_struct(&mut self, name: &str, value: &D::Value, address: Address, owns: bool) -> OracleResult<()>
    {
        let fields = match self.debuggee.fields(value) {
            Ok(fields) => fields,
            Err(err) => {
                self.note_failure(name, &err);
                if owns {
                    self.mark_invalid(Kind::Struct, address, &err.to_string());
                }
                return Ok(());
            }
        };

        let mut children = Vec::with_capacity(fields.len());
        for (field, field_value) in fields {
            let child_name = member_name(name, &field);
            // A leading struct member shares its container's address
            if self.debuggee.address_of(&field_value) == Some(address)
                && classify(&self.debuggee.type_of(&field_value)) == Kind::Struct
            {
                self.tracker.withdraw(Kind::Struct, address);
            }
            let child = self.visit(&child_name, field_value, Some((Relation::Struct, address)))?;
            children.push(ChildRef::new(ChildLabel::Field(field), child));
        }

        if let Some(entry) = self.repository.entry_mut(Kind::Struct, address) {
            if owns {
                entry.children = children;
                entry.status = EntryStatus::Valid;
            } else {
                entry.shapes.insert(
                    name.to_string(),
                    Shape {
                        children,
                        ..Shape::default()
                    },
                );
            }
        }
        Ok(())
    }

    fn mark_invalid(&mut self, kind: Kind, address: Address, reason: &str)
    {
        if let Some(entry) = self.repository.entry_mut(kind, address) {
            entry.children.clear();
            entry.status = EntryStatus::Invalid {
                reason: reason.to_string(),
            };
        }
    }

    fn degrade(&mut self, name: &str, err: OracleError) -> OracleResult<Option<Address>>
    {
        if !err.is_recoverable() {
            return Err(err);
        }
        self.note_failure(name, &err);
        Ok(None)
    }

    fn note_failure(&mut self, name: &str, err: &OracleError)
    {
        warn!(%name, frame = %self.frame, error = %err, "branch degraded");
        self.report.failures.push(BranchFailure {
            frame: self.frame,
            name: name.to_string(),
            error: err.to_string(),
        });
    }
}

/// Expression for member `field` of the value named `container`.
#[must_use]
pub fn member_name(container: &str, field: &str) -> String
{
    match container.strip_prefix('*') {
        Some(pointer) => format!("{pointer}->{field}"),
        None => format!("{container}.{field}"),
    }
}

/// Drop a trailing ` <symbol>` from a printed value.
#[must_use]
pub fn strip_symbol_suffix(printed: &str) -> &str
{
    match printed.find(" <") {
        Some(index) if printed.ends_with('>') => &printed[..index],
        _ => printed,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_member_name()
    {
        assert_eq!(member_name("s", "a"), "s.a");
        assert_eq!(member_name("(*p)", "next"), "(*p).next");
        assert_eq!(member_name("*q", "next"), "q->next");
    }

    #[test]
    fn test_strip_symbol_suffix()
    {
        assert_eq!(strip_symbol_suffix("(node *) 0x601040 <head>"), "(node *) 0x601040");
        assert_eq!(strip_symbol_suffix("(node *) 0x0"), "(node *) 0x0");
        assert_eq!(strip_symbol_suffix("65 'A'"), "65 'A'");
    }
}
