//! Module enumeration and information retrieval

use super::enumeration::{negotiate, EnumerationLimits};
use crate::core::types::{MemoryError, MemoryResult, ModuleDescriptor};
use crate::memory::pool::{self, PooledBuffer};
use crate::platform::Platform;
use crate::utils::string_conv::wide_to_string;
use std::mem;
use std::path::PathBuf;
use tracing::debug;

/// Capacity of the per-module path buffer, in UTF-16 units
pub const MAX_PATH: usize = 260;

/// Which modules an enumeration should visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleScope {
    /// Every loaded module, main executable first
    #[default]
    All,
    /// Only the main executable image
    MainOnly,
}

/// Lazily described modules of one process.
///
/// The handle list is captured when the cursor is created; each step
/// queries the target for the next module's details. Modules whose details
/// cannot be read, or whose path does not fit [`MAX_PATH`], are skipped.
pub struct Modules<'s, P: Platform> {
    platform: &'s P,
    handle: P::Handle,
    modules: PooledBuffer<'static, usize>,
    cursor: usize,
}

impl<'s, P: Platform> Modules<'s, P> {
    /// Snapshot the module handle list of `handle`
    pub fn new(
        platform: &'s P,
        handle: P::Handle,
        scope: ModuleScope,
        limits: &EnumerationLimits,
    ) -> MemoryResult<Self> {
        let modules = module_handles(platform, handle, scope, limits)?;
        Ok(Modules {
            platform,
            handle,
            modules,
            cursor: 0,
        })
    }

    /// Module handles not yet visited
    pub fn remaining(&self) -> usize {
        self.modules.len().saturating_sub(self.cursor)
    }
}

impl<'s, P: Platform> Iterator for Modules<'s, P> {
    type Item = ModuleDescriptor;

    fn next(&mut self) -> Option<ModuleDescriptor> {
        loop {
            let module = *self.modules.as_slice().ok()?.get(self.cursor)?;
            self.cursor += 1;
            match describe(self.platform, self.handle, module) {
                Ok(descriptor) => return Some(descriptor),
                Err(err) => debug!("Skipping module {:#x}: {}", module, err),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

fn module_handles<P: Platform>(
    platform: &P,
    handle: P::Handle,
    scope: ModuleScope,
    limits: &EnumerationLimits,
) -> MemoryResult<PooledBuffer<'static, usize>> {
    let pool = pool::shared::<usize>();
    match scope {
        ModuleScope::All => negotiate(pool, limits.module_seed, limits.max_attempts, |slots| {
            platform.enum_modules(handle, slots)
        }),
        ModuleScope::MainOnly => {
            // The main image is always listed first, so one slot is enough.
            let mut slot = pool.lease(1)?;
            let needed = platform.enum_modules(handle, slot.as_mut_slice()?)?;
            slot.truncate(needed.div_ceil(mem::size_of::<usize>()));
            Ok(slot)
        }
    }
}

fn describe<P: Platform>(
    platform: &P,
    handle: P::Handle,
    module: usize,
) -> MemoryResult<ModuleDescriptor> {
    let info = platform.module_information(handle, module)?;

    let mut path = [0u16; MAX_PATH];
    let len = platform.module_file_name(handle, module, &mut path)?;
    // A full buffer is indistinguishable from a truncated path
    if len == 0 || len >= MAX_PATH - 1 {
        return Err(MemoryError::EnumerationFailed(format!(
            "module path length {} does not fit {} characters",
            len, MAX_PATH
        )));
    }

    Ok(ModuleDescriptor::new(
        PathBuf::from(wide_to_string(&path[..len])),
        info.base_address,
        info.entry_point,
        info.size,
    ))
}
