//! Core type definitions
//!
//! Address and width types, module and symbol descriptors, dynamically
//! typed scalar values, and the crate error type.

mod address;
mod bitness;
mod error;
mod module;
mod value;

pub use address::Address;
pub use bitness::Bitness;
pub use error::{ErrorKind, MemoryError, MemoryResult};
pub use module::{ModuleDescriptor, Symbol};
pub use value::{MemoryValue, ValueType};

// Common type aliases
pub type ProcessId = u32;
