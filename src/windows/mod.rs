//! Windows backend for [`Platform`]
//!
//! All unsafe FFI calls are contained within this module. Handles cross the
//! [`Platform`] boundary as [`WinHandle`], a plain integer wrapper, so that
//! sessions stay `Send + Sync`.

pub mod bindings;
pub mod error_codes;

pub use bindings::ProcessAccess;
pub use error_codes::ErrorCode;

use crate::core::types::{Address, MemoryResult, ProcessId};
use crate::platform::{Platform, RawModuleInfo};
use bindings::{kernel32, psapi};
use winapi::um::winnt::HANDLE;

/// A raw process handle owned by a session or scoped guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WinHandle(usize);

impl WinHandle {
    /// Wrap a handle obtained from OpenProcess or DuplicateHandle
    pub fn from_raw(handle: HANDLE) -> Self {
        WinHandle(handle as usize)
    }

    /// Get the raw handle
    pub fn raw(self) -> HANDLE {
        self.0 as HANDLE
    }
}

/// The native Windows process API
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsApi;

impl Platform for WindowsApi {
    type Handle = WinHandle;

    fn open_process(&self, pid: ProcessId) -> MemoryResult<WinHandle> {
        kernel32::open_process(pid, ProcessAccess::SESSION).map(WinHandle::from_raw)
    }

    fn close_handle(&self, handle: WinHandle) {
        // Ignore errors on cleanup
        let _ = unsafe { kernel32::close_handle(handle.raw()) };
    }

    fn has_exited(&self, handle: WinHandle) -> bool {
        unsafe { kernel32::has_exited(handle.raw()) }
    }

    fn process_id(&self, handle: WinHandle) -> MemoryResult<ProcessId> {
        unsafe { kernel32::process_id(handle.raw()) }
    }

    fn is_64bit(&self, handle: WinHandle) -> MemoryResult<bool> {
        let wow64 = unsafe { kernel32::is_wow64_process(handle.raw())? };
        Ok(cfg!(target_pointer_width = "64") && !wow64)
    }

    fn process_image_name(&self, handle: WinHandle, buffer: &mut [u16]) -> MemoryResult<usize> {
        unsafe { kernel32::query_full_process_image_name(handle.raw(), buffer) }
    }

    fn read_memory(
        &self,
        handle: WinHandle,
        address: Address,
        buffer: &mut [u8],
    ) -> MemoryResult<usize> {
        let address = address.to_usize()?;
        unsafe { kernel32::read_process_memory(handle.raw(), address, buffer) }
    }

    fn write_memory(&self, handle: WinHandle, address: Address, data: &[u8]) -> MemoryResult<usize> {
        let address = address.to_usize()?;
        unsafe { kernel32::write_process_memory(handle.raw(), address, data) }
    }

    fn enum_processes(&self, buffer: &mut [u32]) -> MemoryResult<usize> {
        psapi::enum_processes(buffer)
    }

    fn enum_modules(&self, handle: WinHandle, buffer: &mut [usize]) -> MemoryResult<usize> {
        unsafe { psapi::enum_process_modules(handle.raw(), buffer) }
    }

    fn module_information(&self, handle: WinHandle, module: usize) -> MemoryResult<RawModuleInfo> {
        unsafe { psapi::get_module_information(handle.raw(), module) }
    }

    fn module_file_name(
        &self,
        handle: WinHandle,
        module: usize,
        buffer: &mut [u16],
    ) -> MemoryResult<usize> {
        unsafe { psapi::get_module_file_name(handle.raw(), module, buffer) }
    }

    fn allocate(&self, handle: WinHandle, size: usize) -> MemoryResult<Address> {
        unsafe { kernel32::virtual_alloc_ex(handle.raw(), size).map(Address::from) }
    }

    fn free(&self, handle: WinHandle, address: Address) -> MemoryResult<()> {
        let address = address.to_usize()?;
        unsafe { kernel32::virtual_free_ex(handle.raw(), address) }
    }
}
