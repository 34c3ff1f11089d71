//! The graph node: one entry per `(kind, address)`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Address, FrameId, Kind, Relation, TypeDescriptor};

/// How a child is reached from its parent entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildLabel
{
    /// Struct or union member.
    Field(String),
    /// Array element.
    Index(i64),
    /// Pointer target.
    Target,
}

impl ChildLabel
{
    /// Relation the parent has to a child with this label.
    #[must_use]
    pub const fn relation(&self) -> Relation
    {
        match self {
            ChildLabel::Field(_) => Relation::Struct,
            ChildLabel::Index(_) => Relation::Array,
            ChildLabel::Target => Relation::Pointer,
        }
    }
}

impl fmt::Display for ChildLabel
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ChildLabel::Field(name) => write!(f, ".{name}"),
            ChildLabel::Index(index) => write!(f, "[{index}]"),
            ChildLabel::Target => f.write_str("*"),
        }
    }
}

/// Reference from a container entry to one of its children.
///
/// Children are referenced by address, never embedded, so cyclic memory
/// graphs need no reference cycles. A `None` address marks a child that could
/// not be resolved (an unreadable field, a dangling pointer target).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef
{
    pub label: ChildLabel,
    pub address: Option<Address>,
}

impl ChildRef
{
    pub const fn new(label: ChildLabel, address: Option<Address>) -> Self
    {
        Self { label, address }
    }
}

/// Layout seen through a secondary name of a container entry.
///
/// Row 0 of a 2-D array and a leading struct member live at their
/// container's address and merge into its entry; their own range and
/// children are kept here, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Shape
{
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(i64, i64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    pub children: Vec<ChildRef>,
}

/// Whether the entry's memory could be read in full.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EntryStatus
{
    #[default]
    Valid,
    /// Part of the value could not be read; `reason` is the rendered error.
    Invalid
    {
        reason: String
    },
}

impl EntryStatus
{
    #[must_use]
    pub const fn is_valid(&self) -> bool
    {
        matches!(self, EntryStatus::Valid)
    }
}

/// One deduplicated node of the memory graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry
{
    /// Identity within the kind partition.
    pub address: Address,
    /// First name-path that produced this entry.
    pub name: String,
    /// Every name-path recorded for this address.
    pub names: BTreeSet<String>,
    pub kind: Kind,
    /// Type descriptors observed for this address.
    pub types: BTreeSet<TypeDescriptor>,
    /// Printed value for primitives and pointers.
    pub value: Option<String>,
    /// Inclusive index bounds for arrays.
    pub range: Option<(i64, i64)>,
    /// Innermost element type name for arrays.
    pub target_type: Option<String>,
    pub children: Vec<ChildRef>,
    /// Shapes of same-address members merged into this container.
    pub shapes: BTreeMap<String, Shape>,
    /// Referencing entries, by relation.
    pub parents: BTreeMap<Relation, BTreeSet<Address>>,
    /// Execution contexts this address was observed in.
    pub frames: BTreeSet<FrameId>,
    pub status: EntryStatus,
    /// Recorded as a leaf without expanding (standard library values).
    pub opaque: bool,
}

impl Entry
{
    pub(crate) fn new(kind: Kind, address: Address, name: &str, frame: FrameId, descriptor: TypeDescriptor) -> Self
    {
        Self {
            address,
            name: name.to_string(),
            names: BTreeSet::from([name.to_string()]),
            kind,
            types: BTreeSet::from([descriptor]),
            value: None,
            range: None,
            target_type: None,
            children: Vec::new(),
            shapes: BTreeMap::new(),
            parents: BTreeMap::new(),
            frames: BTreeSet::from([frame]),
            status: EntryStatus::Valid,
            opaque: false,
        }
    }

    /// Parent addresses that reference this entry through `relation`.
    #[must_use]
    pub fn parents_by(&self, relation: Relation) -> Option<&BTreeSet<Address>>
    {
        self.parents.get(&relation)
    }

    #[must_use]
    pub fn has_parent(&self, relation: Relation, parent: Address) -> bool
    {
        self.parents.get(&relation).is_some_and(|set| set.contains(&parent))
    }

    /// Number of parent links across all relations.
    #[must_use]
    pub fn parent_count(&self) -> usize
    {
        self.parents.values().map(BTreeSet::len).sum()
    }

    pub(crate) fn add_parent(&mut self, relation: Relation, parent: Address)
    {
        self.parents.entry(relation).or_default().insert(parent);
    }

    /// Address of the child with the given label, if resolved.
    #[must_use]
    pub fn child(&self, label: &ChildLabel) -> Option<Address>
    {
        self.children.iter().find(|child| &child.label == label).and_then(|child| child.address)
    }

    /// The canonical type name first recorded for this entry.
    #[must_use]
    pub fn type_name(&self) -> Option<&str>
    {
        self.types.iter().next().map(|descriptor| descriptor.name.as_str())
    }

    /// Shape recorded for the secondary name `name`.
    #[must_use]
    pub fn shape(&self, name: &str) -> Option<&Shape>
    {
        self.shapes.get(name)
    }

    /// Addresses of all resolved children, own shape first, then the shapes
    /// of merged members.
    pub fn child_addresses(&self) -> impl Iterator<Item = Address> + '_
    {
        self.children
            .iter()
            .chain(self.shapes.values().flat_map(|shape| shape.children.iter()))
            .filter_map(|child| child.address)
    }
}
