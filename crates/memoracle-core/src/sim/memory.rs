//! Byte-addressed, little-endian memory made of mapped segments.

use std::collections::BTreeMap;

use crate::error::{OracleError, OracleResult};
use crate::types::Address;

use super::layout::round_up;

/// A contiguous mapped range with a bump allocator.
#[derive(Debug, Clone)]
struct Segment
{
    bytes: Vec<u8>,
    next: u64,
    /// Grows towards lower addresses.
    downward: bool,
}

/// The simulated address space.
#[derive(Debug, Clone, Default)]
pub struct Memory
{
    segments: BTreeMap<u64, Segment>,
}

impl Memory
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Map `length` zeroed bytes at `base`.
    pub fn map(&mut self, base: u64, length: usize, downward: bool)
    {
        let next = if downward { base + length as u64 } else { base };
        self.segments.insert(
            base,
            Segment {
                bytes: vec![0; length],
                next,
                downward,
            },
        );
    }

    /// Carve `size` bytes aligned to `align` out of the segment at `base`.
    ///
    /// ## Errors
    ///
    /// - `ResourceExhausted`: the segment is full
    /// - `InvalidArgument`: nothing is mapped at `base`
    pub fn allocate(&mut self, base: u64, size: u64, align: u64) -> OracleResult<Address>
    {
        let segment = self
            .segments
            .get_mut(&base)
            .ok_or_else(|| OracleError::InvalidArgument(format!("no segment at {base:#x}")))?;
        let end = base + segment.bytes.len() as u64;
        let size = size.max(1);

        let start = if segment.downward {
            let start = segment.next.checked_sub(size).map(|raw| raw - raw % align.max(1));
            match start {
                Some(start) if start >= base => {
                    segment.next = start;
                    start
                }
                _ => return Err(OracleError::ResourceExhausted(format!("segment at {base:#x} is full"))),
            }
        } else {
            let start = round_up(segment.next, align);
            if start + size > end {
                return Err(OracleError::ResourceExhausted(format!("segment at {base:#x} is full")));
            }
            segment.next = start + size;
            start
        };
        Ok(Address::new(start))
    }

    /// Current allocation cursor of the segment at `base`.
    #[must_use]
    pub fn cursor(&self, base: u64) -> Option<u64>
    {
        self.segments.get(&base).map(|segment| segment.next)
    }

    fn locate(&self, address: Address, length: usize) -> Option<(u64, usize)>
    {
        let raw = address.value();
        let (&base, segment) = self.segments.range(..=raw).next_back()?;
        let offset = usize::try_from(raw - base).ok()?;
        let end = offset.checked_add(length)?;
        (end <= segment.bytes.len()).then_some((base, offset))
    }

    /// Whether `[address, address + length)` is mapped.
    #[must_use]
    pub fn is_mapped(&self, address: Address, length: usize) -> bool
    {
        !address.is_null() && self.locate(address, length.max(1)).is_some()
    }

    /// ## Errors
    ///
    /// - `Memory`: any byte of the range is unmapped
    pub fn read(&self, address: Address, length: usize) -> OracleResult<&[u8]>
    {
        if address.is_null() {
            return Err(OracleError::Memory { address });
        }
        let (base, offset) = self.locate(address, length).ok_or(OracleError::Memory { address })?;
        let segment = self.segments.get(&base).ok_or(OracleError::Memory { address })?;
        Ok(&segment.bytes[offset..offset + length])
    }

    /// ## Errors
    ///
    /// - `Memory`: any byte of the range is unmapped
    pub fn write(&mut self, address: Address, bytes: &[u8]) -> OracleResult<()>
    {
        if address.is_null() {
            return Err(OracleError::Memory { address });
        }
        let (base, offset) = self.locate(address, bytes.len()).ok_or(OracleError::Memory { address })?;
        let segment = self.segments.get_mut(&base).ok_or(OracleError::Memory { address })?;
        segment.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Read an unsigned little-endian integer of `size` bytes (at most 8).
    ///
    /// ## Errors
    ///
    /// - `Memory`: the range is unmapped
    pub fn read_unsigned(&self, address: Address, size: usize) -> OracleResult<u64>
    {
        let bytes = self.read(address, size.min(8))?;
        let mut buffer = [0u8; 8];
        buffer[..bytes.len()].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buffer))
    }

    /// Read a sign-extended little-endian integer of `size` bytes.
    ///
    /// ## Errors
    ///
    /// - `Memory`: the range is unmapped
    pub fn read_signed(&self, address: Address, size: usize) -> OracleResult<i64>
    {
        let size = size.clamp(1, 8);
        let raw = self.read_unsigned(address, size)?;
        let shift = 64 - 8 * size as u32;
        Ok(((raw << shift) as i64) >> shift)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_unmapped_access_is_a_memory_error()
    {
        let mut memory = Memory::new();
        memory.map(0x1000, 0x100, false);
        assert!(memory.read(Address::new(0x1000), 4).is_ok());
        assert!(matches!(memory.read(Address::new(0x10fe), 4), Err(OracleError::Memory { .. })));
        assert!(matches!(memory.read(Address::ZERO, 1), Err(OracleError::Memory { .. })));
        assert!(!memory.is_mapped(Address::new(0x2000), 1));
    }

    #[test]
    fn test_signed_round_trip()
    {
        let mut memory = Memory::new();
        memory.map(0x1000, 0x100, false);
        memory.write(Address::new(0x1000), &(-5i32).to_le_bytes()).unwrap();
        assert_eq!(memory.read_signed(Address::new(0x1000), 4).unwrap(), -5);
        assert_eq!(memory.read_unsigned(Address::new(0x1000), 1).unwrap(), 0xfb);
    }

    #[test]
    fn test_downward_allocation()
    {
        let mut memory = Memory::new();
        memory.map(0x1000, 0x100, true);
        let first = memory.allocate(0x1000, 4, 4).unwrap();
        let second = memory.allocate(0x1000, 8, 8).unwrap();
        assert_eq!(first, Address::new(0x10fc));
        assert_eq!(second, Address::new(0x10f0));
        assert!(memory.allocate(0x1000, 0x200, 8).is_err());
    }
}
