//! Core module containing fundamental types shared by every layer
//!
//! Addresses are always widened to 64 bits here and narrowed only where a
//! value crosses into a platform primitive or is decoded as a target pointer.

pub mod types;

pub use types::{
    Address, Bitness, ErrorKind, MemoryError, MemoryResult, MemoryValue, ModuleDescriptor,
    ProcessId, Symbol, ValueType,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
