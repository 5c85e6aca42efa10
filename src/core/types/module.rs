//! Loaded module and exported symbol descriptors

use super::Address;
use crate::utils::string_conv::extract_filename;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A module loaded in the target process.
///
/// Produced fresh by every enumeration call; two descriptors for the same
/// module are equal by value, not by identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub base_address: Address,
    pub entry_point: Address,
    pub size: u64,
}

impl ModuleDescriptor {
    /// Creates a descriptor, deriving the short name from the path
    pub fn new(path: PathBuf, base_address: Address, entry_point: Address, size: u64) -> Self {
        let name = extract_filename(&path.to_string_lossy()).to_string();
        ModuleDescriptor {
            name,
            path,
            base_address,
            entry_point,
            size,
        }
    }

    /// Gets the end address of the module image
    pub fn end_address(&self) -> Address {
        Address::new(self.base_address.as_u64().wrapping_add(self.size))
    }

    /// Checks if an address is within this module
    pub fn contains_address(&self, address: Address) -> bool {
        address >= self.base_address && address < self.end_address()
    }

    /// Case-insensitive comparison against the short name
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// An exported symbol resolved from a module's export directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub address: Address,
    pub ordinal: u32,
}
