//! Type table of the simulated process: base types, aggregate layouts and
//! typedefs, plus a parser for C type strings.

use std::collections::HashMap;

use crate::classify::recovery::{array_of, parse_array_shape};
use crate::error::{OracleError, OracleResult};
use crate::types::{RawType, TypeCode};

/// Size of a pointer in the simulated address space.
pub const POINTER_SIZE: u64 = 8;

const BASE_TYPES: &[(&str, TypeCode, u64)] = &[
    ("char", TypeCode::Char, 1),
    ("signed char", TypeCode::Char, 1),
    ("unsigned char", TypeCode::Char, 1),
    ("bool", TypeCode::Bool, 1),
    ("_Bool", TypeCode::Bool, 1),
    ("short", TypeCode::Int, 2),
    ("unsigned short", TypeCode::Int, 2),
    ("int", TypeCode::Int, 4),
    ("unsigned int", TypeCode::Int, 4),
    ("long", TypeCode::Int, 8),
    ("unsigned long", TypeCode::Int, 8),
    ("long long", TypeCode::Int, 8),
    ("unsigned long long", TypeCode::Int, 8),
    ("float", TypeCode::Float, 4),
    ("double", TypeCode::Float, 8),
    ("void", TypeCode::Void, 1),
];

/// One member of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout
{
    pub name: String,
    pub ty: RawType,
    pub offset: u64,
}

/// Memory layout of a struct or union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateLayout
{
    pub code: TypeCode,
    pub fields: Vec<FieldLayout>,
    pub size: u64,
    pub align: u64,
}

/// Every type the simulated process knows by name.
#[derive(Debug, Clone, Default)]
pub struct TypeTable
{
    aggregates: HashMap<String, AggregateLayout>,
    typedefs: HashMap<String, RawType>,
}

impl TypeTable
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Lay out `fields` in order with natural alignment.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: a field type has no known size (an undefined struct
    ///   embedded by value)
    pub fn define_struct(&mut self, name: &str, fields: Vec<(String, RawType)>) -> OracleResult<()>
    {
        let mut offset = 0;
        let mut align = 1;
        let mut laid_out = Vec::with_capacity(fields.len());
        for (field, ty) in fields {
            let field_align = self.align_of(&ty)?;
            offset = round_up(offset, field_align);
            laid_out.push(FieldLayout {
                name: field,
                offset,
                ty: ty.clone(),
            });
            offset += self.size_of(&ty)?;
            align = align.max(field_align);
        }
        self.aggregates.insert(
            name.to_string(),
            AggregateLayout {
                code: TypeCode::Struct,
                fields: laid_out,
                size: round_up(offset.max(1), align),
                align,
            },
        );
        Ok(())
    }

    /// Place every member at offset zero.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: a member type has no known size
    pub fn define_union(&mut self, name: &str, fields: Vec<(String, RawType)>) -> OracleResult<()>
    {
        let mut size = 1;
        let mut align = 1;
        let mut laid_out = Vec::with_capacity(fields.len());
        for (field, ty) in fields {
            size = size.max(self.size_of(&ty)?);
            align = align.max(self.align_of(&ty)?);
            laid_out.push(FieldLayout {
                name: field,
                ty,
                offset: 0,
            });
        }
        self.aggregates.insert(
            name.to_string(),
            AggregateLayout {
                code: TypeCode::Union,
                fields: laid_out,
                size: round_up(size, align),
                align,
            },
        );
        Ok(())
    }

    pub fn define_typedef(&mut self, name: &str, target: RawType)
    {
        self.typedefs.insert(name.to_string(), target);
    }

    /// Layout of a struct or union by name.
    #[must_use]
    pub fn aggregate(&self, name: &str) -> Option<&AggregateLayout>
    {
        self.aggregates.get(strip_tag(name))
    }

    /// Look a type up by name, the way a debugger's `lookup_type` does.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: no type has that name
    pub fn lookup(&self, name: &str) -> OracleResult<RawType>
    {
        let name = name.trim();
        if let Some((_, code, _)) = BASE_TYPES.iter().find(|(base, _, _)| *base == name) {
            return Ok(RawType::named(*code, name));
        }
        let bare = strip_tag(name);
        if let Some(layout) = self.aggregates.get(bare) {
            return Ok(RawType::named(layout.code, bare));
        }
        if let Some(target) = self.typedefs.get(name) {
            return Ok(RawType::typedef(name, target.clone()));
        }
        Err(OracleError::resolution(name, "no type with this name"))
    }

    /// Parse a C type string: `int`, `node *`, `struct node **`, `int [2][3]`,
    /// `char *[4]`.
    ///
    /// Names of aggregates that are not defined yet are accepted behind a
    /// pointer, so self-referential structs can be declared.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: the base type is unknown
    pub fn parse(&self, spelled: &str) -> OracleResult<RawType>
    {
        let spelled = spelled.trim();
        let (declarator, dimensions) = match parse_array_shape(spelled) {
            Some((base, dimensions)) => (base, dimensions),
            None => (spelled.to_string(), Vec::new()),
        };

        let stars = declarator.chars().rev().take_while(|c| *c == '*' || c.is_whitespace()).filter(|c| *c == '*').count();
        let base_name = declarator.trim_end_matches(|c: char| c == '*' || c.is_whitespace());

        let base = match self.lookup(base_name) {
            Ok(base) => base,
            Err(_) if stars > 0 && is_tagged(base_name) => RawType::structure(strip_tag(base_name)),
            Err(err) => return Err(err),
        };
        let pointed = (0..stars).fold(base, |inner, _| inner.pointer());
        Ok(array_of(pointed, &dimensions))
    }

    /// Size of `ty` in bytes.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: an aggregate without a layout
    pub fn size_of(&self, ty: &RawType) -> OracleResult<u64>
    {
        match ty.code {
            TypeCode::Pointer | TypeCode::Reference => Ok(POINTER_SIZE),
            TypeCode::Array => {
                let element = ty
                    .target()
                    .ok_or_else(|| OracleError::resolution(ty.to_string(), "array without element type"))?;
                Ok(self.size_of(element)? * ty.element_count().unwrap_or(0))
            }
            TypeCode::Typedef => match ty.target() {
                Some(target) => self.size_of(target),
                None => self.lookup(ty.name.as_deref().unwrap_or_default()).and_then(|found| self.size_of(found.strip_typedefs())),
            },
            TypeCode::Struct | TypeCode::Union => self
                .aggregate(ty.name.as_deref().unwrap_or_default())
                .map(|layout| layout.size)
                .ok_or_else(|| OracleError::resolution(ty.to_string(), "incomplete type")),
            TypeCode::Function | TypeCode::Method => Ok(1),
            TypeCode::Error => Ok(0),
            TypeCode::Int | TypeCode::Float | TypeCode::Char | TypeCode::Bool | TypeCode::Enum | TypeCode::Void => {
                Ok(base_size(ty).unwrap_or(4))
            }
        }
    }

    /// Alignment of `ty` in bytes.
    ///
    /// ## Errors
    ///
    /// - `Resolution`: an aggregate without a layout
    pub fn align_of(&self, ty: &RawType) -> OracleResult<u64>
    {
        match ty.code {
            TypeCode::Array => match ty.target() {
                Some(element) => self.align_of(element),
                None => Ok(1),
            },
            TypeCode::Typedef => match ty.target() {
                Some(target) => self.align_of(target),
                None => Ok(1),
            },
            TypeCode::Struct | TypeCode::Union => self
                .aggregate(ty.name.as_deref().unwrap_or_default())
                .map(|layout| layout.align)
                .ok_or_else(|| OracleError::resolution(ty.to_string(), "incomplete type")),
            _ => Ok(self.size_of(ty)?.clamp(1, POINTER_SIZE)),
        }
    }
}

fn base_size(ty: &RawType) -> Option<u64>
{
    let name = ty.name.as_deref()?;
    BASE_TYPES
        .iter()
        .find(|(base, _, _)| *base == name)
        .map(|(_, _, size)| *size)
}

fn is_tagged(name: &str) -> bool
{
    name.starts_with("struct ") || name.starts_with("union ") || name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn strip_tag(name: &str) -> &str
{
    name.strip_prefix("struct ")
        .or_else(|| name.strip_prefix("union "))
        .unwrap_or(name)
        .trim()
}

/// Round `value` up to a multiple of `align`.
#[must_use]
pub const fn round_up(value: u64, align: u64) -> u64
{
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn table() -> TypeTable
    {
        let mut table = TypeTable::new();
        let next = table.parse("node *").unwrap();
        table
            .define_struct("node", vec![("value".to_string(), RawType::int()), ("next".to_string(), next)])
            .unwrap();
        table
    }

    #[test]
    fn test_struct_layout_is_naturally_aligned()
    {
        let table = table();
        let layout = table.aggregate("node").unwrap();
        assert_eq!(layout.fields[0].offset, 0);
        assert_eq!(layout.fields[1].offset, 8);
        assert_eq!(layout.size, 16);
        assert_eq!(layout.align, 8);
    }

    #[test]
    fn test_parse_type_strings()
    {
        let table = table();
        assert_eq!(table.parse("int").unwrap(), RawType::int());
        assert_eq!(table.parse("struct node *").unwrap(), RawType::structure("node").pointer());
        assert_eq!(table.parse("int [2][3]").unwrap().to_string(), "int [2][3]");
        assert_eq!(table.parse("char *[4]").unwrap().to_string(), "char *[4]");
        assert_eq!(table.size_of(&table.parse("int [2][3]").unwrap()).unwrap(), 24);
        assert!(table.parse("widget").is_err());
    }

    #[test]
    fn test_union_members_share_offset_zero()
    {
        let mut table = TypeTable::new();
        table
            .define_union(
                "number",
                vec![
                    ("i".to_string(), RawType::int()),
                    ("d".to_string(), RawType::named(TypeCode::Float, "double")),
                ],
            )
            .unwrap();
        let layout = table.aggregate("number").unwrap();
        assert!(layout.fields.iter().all(|field| field.offset == 0));
        assert_eq!(layout.size, 8);
        assert_eq!(table.lookup("number").unwrap().code, TypeCode::Union);
    }
}
