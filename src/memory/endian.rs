//! Byte-order handling for typed transfers

use serde::{Deserialize, Serialize};

/// How a typed transfer orders the bytes of each element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Bytes are moved as the controller lays them out
    #[default]
    Native,
    /// Each element's bytes are reversed after reading and before writing
    Swapped,
}

impl ByteOrder {
    /// Order for a big-endian target viewed from this host
    pub const fn big_endian() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Native
        } else {
            ByteOrder::Swapped
        }
    }

    /// Order for a little-endian target viewed from this host
    pub const fn little_endian() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Native
        } else {
            ByteOrder::Swapped
        }
    }

    /// Reverse every `lane`-byte chunk of `bytes` when swapping.
    ///
    /// Single-byte lanes are left untouched.
    pub fn apply(self, bytes: &mut [u8], lane: usize) {
        if self == ByteOrder::Native || lane < 2 {
            return;
        }
        for chunk in bytes.chunks_exact_mut(lane) {
            chunk.reverse();
        }
    }
}
