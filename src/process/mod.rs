//! Process sessions, handle ownership and enumeration
//!
//! This module provides safe abstractions for attaching to a process,
//! enumerating processes and modules, and owning the process handle.

pub mod attacher;
pub mod enumeration;
pub mod handle;
pub mod modules;
pub mod session;

pub use attacher::{AttachOptions, ProcessAttacher};
pub use enumeration::{negotiate, EnumerationLimits, DEFAULT_MAX_ATTEMPTS};
pub use handle::ScopedHandle;
pub use modules::{ModuleScope, Modules, MAX_PATH};
pub use session::Session;

use crate::core::types::{MemoryResult, ProcessId};
use crate::memory::pool;
use crate::platform::Platform;

/// Snapshot the ids of all running processes
pub fn enumerate_processes<P: Platform>(
    platform: &P,
    limits: &EnumerationLimits,
) -> MemoryResult<Vec<ProcessId>> {
    let pids = negotiate(
        pool::shared::<u32>(),
        limits.process_seed,
        limits.max_attempts,
        |slots| platform.enum_processes(slots),
    )?;
    Ok(pids.as_slice()?.to_vec())
}
