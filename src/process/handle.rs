//! Scoped process handle with RAII semantics

use crate::core::types::{MemoryResult, ProcessId};
use crate::platform::Platform;
use std::fmt;
use std::mem;

/// An open process handle that is closed when dropped
pub struct ScopedHandle<'p, P: Platform> {
    platform: &'p P,
    handle: P::Handle,
}

impl<'p, P: Platform> ScopedHandle<'p, P> {
    /// Open `pid` for read, write and query access
    pub fn open(platform: &'p P, pid: ProcessId) -> MemoryResult<Self> {
        let handle = platform.open_process(pid)?;
        Ok(ScopedHandle { platform, handle })
    }

    /// Take ownership of a handle opened elsewhere
    pub fn adopt(platform: &'p P, handle: P::Handle) -> Self {
        ScopedHandle { platform, handle }
    }

    /// Get the raw handle
    pub fn raw(&self) -> P::Handle {
        self.handle
    }

    /// Take ownership of the handle, preventing automatic cleanup
    pub fn into_raw(self) -> P::Handle {
        let handle = self.handle;
        mem::forget(self);
        handle
    }
}

impl<'p, P: Platform> Drop for ScopedHandle<'p, P> {
    fn drop(&mut self) {
        self.platform.close_handle(self.handle);
    }
}

impl<'p, P: Platform> fmt::Debug for ScopedHandle<'p, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedHandle")
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Bitness;
    use crate::platform::SimulatedOs;

    #[test]
    fn test_drop_closes() {
        let os = SimulatedOs::new();
        os.spawn(1, "C:\\a.exe", Bitness::Width64);
        {
            let _handle = ScopedHandle::open(&os, 1).unwrap();
            assert_eq!(os.open_handle_count(), 1);
        }
        assert_eq!(os.open_handle_count(), 0);
        assert_eq!(os.closed_count(), 1);
    }

    #[test]
    fn test_into_raw_keeps_handle_open() {
        let os = SimulatedOs::new();
        os.spawn(1, "C:\\a.exe", Bitness::Width64);
        let raw = ScopedHandle::open(&os, 1).unwrap().into_raw();
        assert_eq!(os.open_handle_count(), 1);
        os.close_handle(raw);
        assert_eq!(os.invalid_close_count(), 0);
    }

    #[test]
    fn test_open_missing_process() {
        let os = SimulatedOs::new();
        assert!(ScopedHandle::open(&os, 42).is_err());
        assert_eq!(os.opened_count(), 0);
    }
}
