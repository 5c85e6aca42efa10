//! procmem: read, write and introspect the memory of another running process
//!
//! A [`Session`] owns one process handle and exposes typed reads and writes,
//! pointer-chain resolution, module enumeration and PE export lookup. All OS
//! access goes through the [`Platform`] trait; [`windows::WindowsApi`] is the
//! native backend and [`platform::SimulatedOs`] an in-memory one.

pub mod config;
pub mod core;
pub mod memory;
pub mod pe;
pub mod platform;
pub mod process;
pub mod utils;

#[cfg(windows)]
pub mod windows;

// Re-export main types from core module
pub use core::types::{
    Address, Bitness, ErrorKind, MemoryError, MemoryResult, MemoryValue, ModuleDescriptor,
    ProcessId, Symbol, ValueType,
};

pub use config::{Config, ConfigError, ConfigLoader};
pub use memory::{ByteOrder, MemoryIo, Plain, PointerChain};
pub use pe::{ExportLimits, ExportTable, Exports};
pub use platform::{Platform, RawModuleInfo};
pub use process::{
    enumerate_processes, AttachOptions, EnumerationLimits, ModuleScope, Modules,
    ProcessAttacher, Session,
};
