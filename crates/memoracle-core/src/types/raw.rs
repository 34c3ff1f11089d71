//! Accessor-side type model.
//!
//! [`RawType`] is what the host debugger reports for a value: a type code, an
//! optional name, and for pointers, arrays and typedefs the target type.
//! Struct layouts are not part of the type; fields are enumerated through the
//! value accessor, which keeps the tree finite for self-referential structs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type codes as reported by the host debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCode
{
    Int,
    Float,
    Char,
    Bool,
    Enum,
    Pointer,
    Reference,
    Array,
    Struct,
    Union,
    Function,
    Method,
    Void,
    Typedef,
    Error,
}

/// A type as reported by the value accessor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawType
{
    pub code: TypeCode,
    pub name: Option<String>,
    pub target: Option<Box<RawType>>,
    /// Inclusive index bounds for arrays.
    pub bounds: Option<(i64, i64)>,
}

impl RawType
{
    /// A terminal (non-derived) type with a name.
    pub fn named(code: TypeCode, name: impl Into<String>) -> Self
    {
        Self {
            code,
            name: Some(name.into()),
            target: None,
            bounds: None,
        }
    }

    /// Shorthand for `int`.
    #[must_use]
    pub fn int() -> Self
    {
        Self::named(TypeCode::Int, "int")
    }

    /// Shorthand for a struct type referenced by name.
    pub fn structure(name: impl Into<String>) -> Self
    {
        Self::named(TypeCode::Struct, name)
    }

    /// Pointer to this type.
    #[must_use]
    pub fn pointer(&self) -> Self
    {
        Self {
            code: TypeCode::Pointer,
            name: None,
            target: Some(Box::new(self.clone())),
            bounds: None,
        }
    }

    /// Array of this type with bounds `0..=upper`.
    #[must_use]
    pub fn array(&self, upper: i64) -> Self
    {
        Self {
            code: TypeCode::Array,
            name: None,
            target: Some(Box::new(self.clone())),
            bounds: Some((0, upper)),
        }
    }

    /// Alias `target` under `name`.
    pub fn typedef(name: impl Into<String>, target: RawType) -> Self
    {
        Self {
            code: TypeCode::Typedef,
            name: Some(name.into()),
            target: Some(Box::new(target)),
            bounds: None,
        }
    }

    /// Pointee / element / aliased type, if any.
    #[must_use]
    pub fn target(&self) -> Option<&RawType>
    {
        self.target.as_deref()
    }

    /// Number of elements for arrays (`hi - lo + 1`).
    #[must_use]
    pub fn element_count(&self) -> Option<u64>
    {
        self.bounds
            .map(|(lo, hi)| u64::try_from(hi - lo + 1).unwrap_or(0))
    }

    /// Remove typedef layers from the outermost type.
    #[must_use]
    pub fn strip_typedefs(&self) -> &RawType
    {
        let mut current = self;
        while current.code == TypeCode::Typedef {
            match current.target() {
                Some(target) => current = target,
                None => break,
            }
        }
        current
    }
}

impl fmt::Display for RawType
{
    /// Renders the type the way C debuggers print it (`int *`, `int [2][3]`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let mut base = self;
        let mut stars = String::new();
        let mut dims = String::new();
        let mut pointer_outermost = false;
        loop {
            match base.code {
                TypeCode::Pointer | TypeCode::Reference if base.name.is_none() => {
                    pointer_outermost |= stars.is_empty() && dims.is_empty();
                    stars.push('*');
                }
                TypeCode::Array if base.name.is_none() => {
                    dims.push_str(&format!("[{}]", base.element_count().unwrap_or(0)));
                }
                _ => break,
            }
            match base.target() {
                Some(target) => base = target,
                None => break,
            }
        }
        let name = base.name.as_deref().unwrap_or("<unknown type>");
        match (stars.is_empty(), dims.is_empty()) {
            (true, true) => write!(f, "{name}"),
            (false, true) => write!(f, "{name} {stars}"),
            (true, false) => write!(f, "{name} {dims}"),
            (false, false) if pointer_outermost => write!(f, "{name} ({stars}){dims}"),
            (false, false) => write!(f, "{name} {stars}{dims}"),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_display_matches_debugger_spelling()
    {
        assert_eq!(RawType::int().to_string(), "int");
        assert_eq!(RawType::int().pointer().to_string(), "int *");
        assert_eq!(RawType::int().pointer().pointer().to_string(), "int **");
        assert_eq!(RawType::int().array(2).array(1).to_string(), "int [2][3]");
    }

    #[test]
    fn test_strip_typedefs()
    {
        let alias = RawType::typedef("count_t", RawType::typedef("inner_t", RawType::int()));
        assert_eq!(alias.strip_typedefs(), &RawType::int());
        assert_eq!(RawType::int().strip_typedefs(), &RawType::int());
    }
}
