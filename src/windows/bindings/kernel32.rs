//! Kernel32.dll bindings for process and memory operations

use super::super::error_codes::ErrorCode;
use crate::core::types::{MemoryError, MemoryResult};
use std::ptr;
use winapi::shared::minwindef::{DWORD, FALSE, LPCVOID, LPVOID};
use winapi::shared::winerror::WAIT_TIMEOUT;
use winapi::um::handleapi::CloseHandle;
use winapi::um::memoryapi::{ReadProcessMemory, VirtualAllocEx, VirtualFreeEx, WriteProcessMemory};
use winapi::um::processthreadsapi::{GetProcessId, OpenProcess};
use winapi::um::synchapi::WaitForSingleObject;
use winapi::um::winbase::QueryFullProcessImageNameW;
use winapi::um::winnt::{HANDLE, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READWRITE};
use winapi::um::wow64apiset::IsWow64Process;

/// Access rights for process handles
#[derive(Debug, Clone, Copy)]
pub struct ProcessAccess {
    value: u32,
}

impl ProcessAccess {
    /// Query information access
    pub const QUERY_INFORMATION: Self = Self { value: 0x0400 };
    /// Read memory access
    pub const VM_READ: Self = Self { value: 0x0010 };
    /// Write memory access
    pub const VM_WRITE: Self = Self { value: 0x0020 };
    /// Allocate and protect memory
    pub const VM_OPERATION: Self = Self { value: 0x0008 };
    /// Wait on the process handle
    pub const SYNCHRONIZE: Self = Self { value: 0x0010_0000 };

    /// Rights every session handle is opened with
    pub const SESSION: Self = Self::combine(&[
        Self::QUERY_INFORMATION,
        Self::VM_READ,
        Self::VM_WRITE,
        Self::VM_OPERATION,
        Self::SYNCHRONIZE,
    ]);

    /// Combine access rights
    pub const fn combine(rights: &[Self]) -> Self {
        let mut value = 0;
        let mut index = 0;
        while index < rights.len() {
            value |= rights[index].value;
            index += 1;
        }
        Self { value }
    }

    /// Get raw value
    pub const fn value(&self) -> u32 {
        self.value
    }
}

/// Safe wrapper for OpenProcess
pub fn open_process(pid: u32, access: ProcessAccess) -> MemoryResult<HANDLE> {
    let handle = unsafe { OpenProcess(access.value(), FALSE, pid) };
    if !handle.is_null() {
        return Ok(handle);
    }
    match ErrorCode::last_error() {
        ErrorCode::AccessDenied => Err(MemoryError::access_denied(pid, "OpenProcess refused")),
        code => Err(MemoryError::ProcessNotFound(format!("PID: {} ({})", pid, code))),
    }
}

/// Safe wrapper for CloseHandle
///
/// # Safety
/// The handle must be a valid Windows handle not closed elsewhere
pub unsafe fn close_handle(handle: HANDLE) -> MemoryResult<()> {
    if handle.is_null() {
        return Ok(());
    }
    if CloseHandle(handle) == FALSE {
        return Err(MemoryError::last_os_error());
    }
    Ok(())
}

/// Non-blocking check whether the process behind `handle` has exited
///
/// # Safety
/// The handle must be a valid process handle with SYNCHRONIZE access
pub unsafe fn has_exited(handle: HANDLE) -> bool {
    WaitForSingleObject(handle, 0) != WAIT_TIMEOUT
}

/// Safe wrapper for GetProcessId
///
/// # Safety
/// The handle must be a valid process handle
pub unsafe fn process_id(handle: HANDLE) -> MemoryResult<u32> {
    match GetProcessId(handle) {
        0 => Err(MemoryError::last_os_error()),
        pid => Ok(pid),
    }
}

/// Whether the process runs under WOW64
///
/// # Safety
/// The handle must be a valid process handle
pub unsafe fn is_wow64_process(handle: HANDLE) -> MemoryResult<bool> {
    let mut wow64 = FALSE;
    if IsWow64Process(handle, &mut wow64) == FALSE {
        return Err(MemoryError::last_os_error());
    }
    Ok(wow64 != FALSE)
}

/// Safe wrapper for QueryFullProcessImageNameW; a path that does not fit
/// is reported as filling the whole buffer
///
/// # Safety
/// The handle must be a valid process handle
pub unsafe fn query_full_process_image_name(
    handle: HANDLE,
    buffer: &mut [u16],
) -> MemoryResult<usize> {
    let mut size = buffer.len() as DWORD;
    if QueryFullProcessImageNameW(handle, 0, buffer.as_mut_ptr(), &mut size) == FALSE {
        return match ErrorCode::last_error() {
            ErrorCode::InsufficientBuffer => Ok(buffer.len()),
            code => Err(MemoryError::WindowsApi(format!(
                "QueryFullProcessImageNameW failed: {}",
                code
            ))),
        };
    }
    Ok(size as usize)
}

/// Safe wrapper for ReadProcessMemory; a partial copy returns the bytes read
///
/// # Safety
/// The handle must be a valid process handle with appropriate access rights
pub unsafe fn read_process_memory(
    handle: HANDLE,
    address: usize,
    buffer: &mut [u8],
) -> MemoryResult<usize> {
    let mut bytes_read = 0;
    let result = ReadProcessMemory(
        handle,
        address as LPCVOID,
        buffer.as_mut_ptr() as LPVOID,
        buffer.len(),
        &mut bytes_read,
    );

    if result != FALSE {
        return Ok(bytes_read);
    }
    match ErrorCode::last_error() {
        ErrorCode::PartialCopy if bytes_read > 0 => Ok(bytes_read),
        code => Err(MemoryError::read_failed(
            format!("0x{:X}", address),
            code.to_string(),
        )),
    }
}

/// Safe wrapper for WriteProcessMemory; a partial copy returns the bytes written
///
/// # Safety
/// The handle must be a valid process handle with appropriate access rights
pub unsafe fn write_process_memory(
    handle: HANDLE,
    address: usize,
    data: &[u8],
) -> MemoryResult<usize> {
    let mut bytes_written = 0;
    let result = WriteProcessMemory(
        handle,
        address as LPVOID,
        data.as_ptr() as LPCVOID,
        data.len(),
        &mut bytes_written,
    );

    if result != FALSE {
        return Ok(bytes_written);
    }
    match ErrorCode::last_error() {
        ErrorCode::PartialCopy if bytes_written > 0 => Ok(bytes_written),
        code => Err(MemoryError::write_failed(
            format!("0x{:X}", address),
            code.to_string(),
        )),
    }
}

/// Reserve and commit read/write/execute memory in the target
///
/// # Safety
/// The handle must be a valid process handle with VM_OPERATION access
pub unsafe fn virtual_alloc_ex(handle: HANDLE, size: usize) -> MemoryResult<usize> {
    let address = VirtualAllocEx(
        handle,
        ptr::null_mut(),
        size,
        MEM_RESERVE | MEM_COMMIT,
        PAGE_EXECUTE_READWRITE,
    );
    if address.is_null() {
        return Err(MemoryError::AllocationFailed(format!(
            "VirtualAllocEx of {} bytes failed: {}",
            size,
            ErrorCode::last_error()
        )));
    }
    Ok(address as usize)
}

/// Release a region returned by [`virtual_alloc_ex`]
///
/// # Safety
/// The handle must be a valid process handle with VM_OPERATION access
pub unsafe fn virtual_free_ex(handle: HANDLE, address: usize) -> MemoryResult<()> {
    if VirtualFreeEx(handle, address as LPVOID, 0, MEM_RELEASE) == FALSE {
        return Err(MemoryError::AllocationFailed(format!(
            "VirtualFreeEx at 0x{:X} failed: {}",
            address,
            ErrorCode::last_error()
        )));
    }
    Ok(())
}
