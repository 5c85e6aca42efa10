//! OS primitive interface consumed by the session layer
//!
//! Everything the engine needs from the operating system goes through
//! [`Platform`]. The Windows backend lives in [`crate::windows`]; the
//! [`simulated`] backend is an in-memory process table used by tests and by
//! consumers that want to exercise their own code without a live target.

pub mod simulated;

pub use simulated::{ImageBuilder, SimulatedOs, SimulatedProcess};

use crate::core::types::{Address, MemoryResult, ProcessId};
use std::fmt;

/// Base address, entry point and image size of one loaded module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawModuleInfo {
    pub base_address: Address,
    pub entry_point: Address,
    pub size: u64,
}

/// Raw OS primitives for one family of processes.
///
/// Handles are opaque and owned by whoever opened them; the trait never
/// closes a handle on its own. Enumeration calls follow the "bytes needed"
/// protocol: they fill as much of the buffer as fits and return the number
/// of bytes the complete result requires.
pub trait Platform: Send + Sync {
    /// Opaque process handle
    type Handle: Copy + Send + Sync + fmt::Debug;

    /// Open a process for read, write and query access
    fn open_process(&self, pid: ProcessId) -> MemoryResult<Self::Handle>;

    /// Close a handle previously returned by [`Platform::open_process`]
    fn close_handle(&self, handle: Self::Handle);

    /// Non-blocking check whether the handle's process has exited
    fn has_exited(&self, handle: Self::Handle) -> bool;

    /// Process id behind a handle
    fn process_id(&self, handle: Self::Handle) -> MemoryResult<ProcessId>;

    /// Whether the target runs with 64-bit pointers
    fn is_64bit(&self, handle: Self::Handle) -> MemoryResult<bool>;

    /// Full image path of the process as UTF-16; returns the length written
    fn process_image_name(&self, handle: Self::Handle, buffer: &mut [u16]) -> MemoryResult<usize>;

    /// Read target memory; `Ok(n)` with `n < buffer.len()` is a partial copy
    fn read_memory(&self, handle: Self::Handle, address: Address, buffer: &mut [u8])
        -> MemoryResult<usize>;

    /// Write target memory; `Ok(n)` with `n < data.len()` is a partial copy
    fn write_memory(&self, handle: Self::Handle, address: Address, data: &[u8])
        -> MemoryResult<usize>;

    /// Fill `buffer` with running process ids; returns bytes needed
    fn enum_processes(&self, buffer: &mut [u32]) -> MemoryResult<usize>;

    /// Fill `buffer` with module handles, main module first; returns bytes needed
    fn enum_modules(&self, handle: Self::Handle, buffer: &mut [usize]) -> MemoryResult<usize>;

    /// Base, entry point and size of a module
    fn module_information(&self, handle: Self::Handle, module: usize)
        -> MemoryResult<RawModuleInfo>;

    /// Full path of a module as UTF-16; returns the length written
    fn module_file_name(
        &self,
        handle: Self::Handle,
        module: usize,
        buffer: &mut [u16],
    ) -> MemoryResult<usize>;

    /// Reserve and commit read/write/execute memory in the target
    fn allocate(&self, handle: Self::Handle, size: usize) -> MemoryResult<Address>;

    /// Release memory previously returned by [`Platform::allocate`]
    fn free(&self, handle: Self::Handle, address: Address) -> MemoryResult<()>;
}
