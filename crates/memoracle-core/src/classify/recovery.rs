//! True-type recovery for integer-kind values.
//!
//! With stripped or partially optimized builds the host debugger sometimes
//! reports a pointer or a multi-dimensional array as a plain integer. The
//! value still prints like its real type, and the static type string often
//! still carries the array dimensions, so both are inspected:
//!
//! 1. the static type string, for bracketed dimensions (`int [3][2]`)
//! 2. the printed value, for a pointer literal (`(node *) 0x601040`)
//!
//! A match is looked up and rebuilt into a proper [`RawType`]. No match, or a
//! failed lookup, means the value really is an integer.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use crate::debuggee::ValueAccessor;
use crate::types::RawType;

static ARRAY_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\s*((?:\[\d+\])+)$").expect("array shape pattern is valid"));
static ARRAY_DIMENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("dimension pattern is valid"));
static POINTER_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\((.+?)\s*(\*+)\)\s").expect("pointer literal pattern is valid"));

/// Split a type string like `int [3][2]` into its base name and dimensions.
#[must_use]
pub fn parse_array_shape(type_string: &str) -> Option<(String, Vec<u64>)>
{
    let captures = ARRAY_SHAPE.captures(type_string.trim())?;
    let base = captures.get(1)?.as_str().trim();
    if base.is_empty() {
        return None;
    }
    let dimensions = ARRAY_DIMENSION
        .captures_iter(captures.get(2)?.as_str())
        .filter_map(|dim| dim.get(1)?.as_str().parse().ok())
        .collect::<Vec<u64>>();
    Some((base.to_string(), dimensions))
}

/// Split a printed pointer like `(struct node **) 0x10` into base type name and
/// pointer depth.
#[must_use]
pub fn parse_pointer_literal(printed: &str) -> Option<(String, usize)>
{
    let captures = POINTER_LITERAL.captures(printed.trim_start())?;
    let base = strip_tag_keyword(captures.get(1)?.as_str().trim());
    if base.is_empty() {
        return None;
    }
    Some((base.to_string(), captures.get(2)?.as_str().len()))
}

fn strip_tag_keyword(name: &str) -> &str
{
    ["struct ", "union ", "enum ", "class "]
        .iter()
        .find_map(|keyword| name.strip_prefix(keyword))
        .unwrap_or(name)
        .trim()
}

/// Build `base` wrapped in `dimensions`, outermost dimension first.
#[must_use]
pub fn array_of(base: RawType, dimensions: &[u64]) -> RawType
{
    dimensions.iter().rev().fold(base, |inner, &dim| {
        inner.array(i64::try_from(dim).unwrap_or(i64::MAX) - 1)
    })
}

/// Re-derive the actual type of an integer-kind value.
///
/// Returns `None` when the value is a genuine integer or when the recovered
/// base type cannot be looked up; recovery failure is never an error.
pub fn recover_true_type<A: ValueAccessor + ?Sized>(accessor: &A, value: &A::Value) -> Option<RawType>
{
    let static_type = accessor.type_of(value).to_string();
    if let Some((base, dimensions)) = parse_array_shape(&static_type) {
        match accessor.lookup_type(&base) {
            Ok(element) => {
                let recovered = array_of(element, &dimensions);
                debug!(%static_type, recovered = %recovered, "integer recovered as array");
                return Some(recovered);
            }
            Err(err) => trace!(%base, error = %err, "array base type lookup failed"),
        }
    }

    let printed = accessor.printed(value).ok()?;
    let (base, depth) = parse_pointer_literal(&printed)?;
    match accessor.lookup_type(&base) {
        Ok(pointee) => {
            let recovered = (0..depth).fold(pointee, |inner, _| inner.pointer());
            debug!(%printed, recovered = %recovered, "integer recovered as pointer");
            Some(recovered)
        }
        Err(err) => {
            trace!(%base, error = %err, "pointer base type lookup failed");
            None
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_array_shape()
    {
        assert_eq!(parse_array_shape("int [3][2]"), Some(("int".to_string(), vec![3, 2])));
        assert_eq!(parse_array_shape("unsigned char[16]"), Some(("unsigned char".to_string(), vec![16])));
        assert_eq!(parse_array_shape("int"), None);
        assert_eq!(parse_array_shape("[4]"), None);
    }

    #[test]
    fn test_parse_pointer_literal()
    {
        assert_eq!(parse_pointer_literal("(node *) 0x601040 <head>"), Some(("node".to_string(), 1)));
        assert_eq!(parse_pointer_literal("(struct node **) 0x10"), Some(("node".to_string(), 2)));
        assert_eq!(parse_pointer_literal("(unsigned int *) 0x0"), Some(("unsigned int".to_string(), 1)));
        assert_eq!(parse_pointer_literal("42"), None);
        assert_eq!(parse_pointer_literal("(int (*)[3]) 0x10"), None);
    }

    #[test]
    fn test_array_of_orders_dimensions()
    {
        let recovered = array_of(RawType::int(), &[3, 2]);
        assert_eq!(recovered.bounds, Some((0, 2)));
        assert_eq!(recovered.target().and_then(|inner| inner.bounds), Some((0, 1)));
        assert_eq!(recovered.to_string(), "int [3][2]");
    }
}
