//! Target-process address type with hex parsing and width narrowing

use super::bitness::Bitness;
use super::error::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An address inside the target process.
///
/// Always stored widened to 64 bits. It is never a pointer into the
/// controller's own address space.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Address(pub u64);

impl Address {
    /// Creates a new address from a u64 value
    pub const fn new(value: u64) -> Self {
        Address(value)
    }

    /// Creates a null address (0x0)
    pub const fn null() -> Self {
        Address(0)
    }

    /// Checks if the address is null
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Adds a signed byte offset, wrapping on overflow
    pub const fn offset(&self, offset: i64) -> Self {
        Address(self.0.wrapping_add(offset as u64))
    }

    /// Adds an RVA to a module base
    pub const fn add_rva(&self, rva: u32) -> Self {
        Address(self.0.wrapping_add(rva as u64))
    }

    /// Truncates the address to the given pointer width
    pub const fn narrow(&self, bitness: Bitness) -> Self {
        match bitness {
            Bitness::Width32 => Address(self.0 & 0xFFFF_FFFF),
            Bitness::Width64 => *self,
        }
    }

    /// Returns the raw u64 value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Converts to a controller-sized integer for the primitive boundary
    pub fn to_usize(&self) -> MemoryResult<usize> {
        usize::try_from(self.0).map_err(|_| {
            MemoryError::invalid_argument(format!(
                "address {} does not fit the host pointer width",
                self
            ))
        })
    }
}

impl FromStr for Address {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
        } else if let Some(hex) = s.strip_prefix('$') {
            u64::from_str_radix(hex, 16)
        } else if s.chars().any(|c| c.is_ascii_alphabetic()) {
            u64::from_str_radix(s, 16)
        } else {
            s.parse::<u64>().or_else(|_| u64::from_str_radix(s, 16))
        };

        value
            .map(Address::new)
            .map_err(|_| MemoryError::invalid_argument(format!("invalid address: {}", s)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address::new(value)
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        Address::new(value as u64)
    }
}

impl From<usize> for Address {
    fn from(value: usize) -> Self {
        Address::new(value as u64)
    }
}
