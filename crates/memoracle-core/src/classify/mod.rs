//! # Type Classification
//!
//! Maps the host debugger's [`RawType`]s onto the closed set of [`Kind`]s the
//! repository partitions by, and builds canonical type names.
//!
//! Canonical names flatten pointer and array levels into decorators appended
//! to the terminal type's name: `node **` becomes `node**`, an array of two
//! arrays of three ints becomes `int[2][3]`.
//!
//! Integer-kind values are ambiguous when debug information is incomplete;
//! see [`recovery`] for how their true type is re-derived.

pub mod recovery;

use crate::debuggee::ValueAccessor;
use crate::types::{Kind, RawType, TypeCode, TypeDescriptor};

pub use recovery::recover_true_type;

/// Name used when the terminal type has no name.
pub const UNKNOWN_TYPE_NAME: &str = "<unknown type>";

/// Classify a type by its (typedef-stripped) code.
#[must_use]
pub fn classify(ty: &RawType) -> Kind
{
    match ty.strip_typedefs().code {
        TypeCode::Int | TypeCode::Float | TypeCode::Char | TypeCode::Bool | TypeCode::Enum => Kind::Primitive,
        TypeCode::Pointer | TypeCode::Reference => Kind::Pointer,
        TypeCode::Array => Kind::Array,
        TypeCode::Struct | TypeCode::Union => Kind::Struct,
        TypeCode::Function | TypeCode::Method => Kind::Function,
        TypeCode::Void => Kind::Void,
        TypeCode::Typedef | TypeCode::Error => Kind::Unknown,
    }
}

/// Whether the value's static type is a plain integer and therefore a
/// candidate for true-type recovery.
#[must_use]
pub fn is_ambiguous_integer(ty: &RawType) -> bool
{
    ty.strip_typedefs().code == TypeCode::Int
}

/// Canonical type name: terminal name plus `*` per pointer level and `[N]`
/// per array dimension, outermost first.
#[must_use]
pub fn canonical_name(ty: &RawType) -> String
{
    let mut decorators = String::new();
    let mut current = ty;
    loop {
        match current.code {
            TypeCode::Pointer | TypeCode::Reference => decorators.push('*'),
            TypeCode::Array => decorators.push_str(&format!("[{}]", current.element_count().unwrap_or(0))),
            _ => break,
        }
        match current.target() {
            Some(target) => current = target,
            None => break,
        }
    }
    format!("{}{decorators}", terminal_name(current))
}

/// Name of the innermost non-pointer, non-array type (`float` for `float[3][2][7]`).
#[must_use]
pub fn target_type_name(ty: &RawType) -> String
{
    let mut current = ty;
    while matches!(current.code, TypeCode::Pointer | TypeCode::Reference | TypeCode::Array) {
        match current.target() {
            Some(target) => current = target,
            None => break,
        }
    }
    terminal_name(current).to_string()
}

fn terminal_name(ty: &RawType) -> &str
{
    ty.name.as_deref().unwrap_or(UNKNOWN_TYPE_NAME)
}

/// Whether the canonical name places the value in the language's standard
/// library (`std::vector<int>`, `std::string*`).
#[must_use]
pub fn is_standard_library(canonical: &str) -> bool
{
    canonical.starts_with("std::")
}

/// Build the [`TypeDescriptor`] for a value of static type `ty`.
///
/// The unaliased and dynamic names are only kept when they differ from the
/// canonical name.
pub fn describe<A: ValueAccessor + ?Sized>(accessor: &A, value: &A::Value, ty: &RawType) -> TypeDescriptor
{
    let mut descriptor = TypeDescriptor::new(classify(ty), canonical_name(ty));

    let stripped = canonical_name(ty.strip_typedefs());
    if stripped != descriptor.name {
        descriptor.unaliased = Some(stripped);
    }

    if let Some(dynamic) = accessor.dynamic_type_of(value) {
        let dynamic = canonical_name(&dynamic);
        if dynamic != descriptor.name {
            descriptor.dynamic = Some(dynamic);
        }
    }

    descriptor
}
