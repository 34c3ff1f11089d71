//! Classification results: value kinds, parent relations and type descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse classification of a value's type.
///
/// Each kind owns a separate partition of the entry repository, so a struct
/// and its first field (which share an address) never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind
{
    Primitive,
    Pointer,
    Array,
    Struct,
    Function,
    Void,
    Unknown,
}

impl Kind
{
    /// All kinds, in partition order.
    pub const ALL: [Kind; 7] = [
        Kind::Primitive,
        Kind::Pointer,
        Kind::Array,
        Kind::Struct,
        Kind::Function,
        Kind::Void,
        Kind::Unknown,
    ];

    /// Lowercase name used in records and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str
    {
        match self {
            Kind::Primitive => "primitive",
            Kind::Pointer => "pointer",
            Kind::Array => "array",
            Kind::Struct => "struct",
            Kind::Function => "function",
            Kind::Void => "void",
            Kind::Unknown => "unknown",
        }
    }

    /// Kinds whose entries own children.
    #[must_use]
    pub const fn is_container(self) -> bool
    {
        matches!(self, Kind::Pointer | Kind::Array | Kind::Struct)
    }
}

impl fmt::Display for Kind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

/// How a parent entry references a child entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation
{
    /// Child is a field of a struct or union.
    Struct,
    /// Child is an element of an array.
    Array,
    /// Child is the target of a pointer.
    Pointer,
}

impl Relation
{
    #[must_use]
    pub const fn as_str(self) -> &'static str
    {
        match self {
            Relation::Struct => "struct",
            Relation::Array => "array",
            Relation::Pointer => "pointer",
        }
    }
}

impl fmt::Display for Relation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

/// Classified type of one observed value. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeDescriptor
{
    pub kind: Kind,
    /// Canonical name with pointer / array decorations (`node*`, `int[2][3]`).
    pub name: String,
    /// Typedef-stripped name, only when it differs from `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unaliased: Option<String>,
    /// Runtime (polymorphic) type name, only when it differs from `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<String>,
}

impl TypeDescriptor
{
    pub fn new(kind: Kind, name: impl Into<String>) -> Self
    {
        Self {
            kind,
            name: name.into(),
            unaliased: None,
            dynamic: None,
        }
    }
}

impl fmt::Display for TypeDescriptor
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} {}", self.kind, self.name)
    }
}
