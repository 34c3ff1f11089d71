//! Memory address type.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{OracleError, OracleResult};

/// Strongly typed memory address in the debuggee
///
/// This wrapper around `u64` is the identity key of an entry within its kind
/// partition. Debuggers print addresses with symbolic decorations
/// (`0x601040 <table>`); [`Address::parse`] strips those so that two
/// printings of the same cell compare equal.
///
/// Addresses serialize as their `0x`-prefixed hex string so that records can
/// cross-reference entries without embedding them.
///
/// ## Example
///
/// ```rust
/// use memoracle_core::types::Address;
///
/// let addr = Address::parse("0x601040 <global_table>").unwrap();
/// assert_eq!(addr.value(), 0x601040);
/// assert_eq!(addr.to_string(), "0x601040");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Returns `true` for the null address.
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset to this address, checking for overflow
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Parse a printed address, dropping any symbolic suffix.
    ///
    /// Accepts `0x`-prefixed hex (`0x7ffe10 <buf>`, `0X10`) and plain decimal.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the leading token is not a number.
    pub fn parse(printed: &str) -> OracleResult<Self>
    {
        let token = printed.split_whitespace().next().unwrap_or_default();
        let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => token.parse::<u64>(),
        };
        parsed
            .map(Address)
            .map_err(|_| OracleError::InvalidArgument(format!("not an address: `{printed}`")))
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl FromStr for Address
{
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        Address::parse(s)
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:x}", self.0)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Serialize for Address
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>
    {
        let text = String::deserialize(deserializer)?;
        Address::parse(&text).map_err(serde::de::Error::custom)
    }
}
