//! Target pointer width

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pointer width of a target process or of a single loaded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bitness {
    Width32,
    Width64,
}

impl Bitness {
    /// Pointer size in bytes
    pub const fn pointer_size(&self) -> usize {
        match self {
            Bitness::Width32 => 4,
            Bitness::Width64 => 8,
        }
    }

    /// Checks if this is a 64-bit width
    pub const fn is_64bit(&self) -> bool {
        matches!(self, Bitness::Width64)
    }

    /// Builds a bitness from a 64-bit flag
    pub const fn from_is_64bit(is_64bit: bool) -> Self {
        if is_64bit {
            Bitness::Width64
        } else {
            Bitness::Width32
        }
    }
}

impl fmt::Display for Bitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bitness::Width32 => write!(f, "32-bit"),
            Bitness::Width64 => write!(f, "64-bit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_size() {
        assert_eq!(Bitness::Width32.pointer_size(), 4);
        assert_eq!(Bitness::Width64.pointer_size(), 8);
        assert_eq!(Bitness::from_is_64bit(true), Bitness::Width64);
        assert_eq!(Bitness::from_is_64bit(false), Bitness::Width32);
        assert_eq!(Bitness::Width64.to_string(), "64-bit");
    }
}
