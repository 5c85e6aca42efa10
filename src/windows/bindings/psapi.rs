//! PSAPI.dll bindings for process and module enumeration
//!
//! The enumeration wrappers follow the "bytes needed" protocol used by
//! [`crate::process::negotiate`]: they fill what fits and report the size
//! the complete list requires.

use crate::core::types::{Address, MemoryError, MemoryResult};
use crate::platform::RawModuleInfo;
use std::mem;
use winapi::shared::minwindef::{DWORD, FALSE, HMODULE};
use winapi::um::psapi::{
    EnumProcessModulesEx, EnumProcesses, GetModuleFileNameExW, GetModuleInformation,
    LIST_MODULES_ALL, MODULEINFO,
};
use winapi::um::winnt::HANDLE;

/// Safe wrapper for EnumProcesses.
///
/// EnumProcesses never reports more than it was given, so a completely
/// filled buffer is answered with one extra slot to request a larger one.
pub fn enum_processes(buffer: &mut [u32]) -> MemoryResult<usize> {
    let capacity = mem::size_of_val(buffer);
    let mut bytes_returned: DWORD = 0;

    let result = unsafe {
        EnumProcesses(
            buffer.as_mut_ptr(),
            capacity as DWORD,
            &mut bytes_returned,
        )
    };
    if result == FALSE {
        return Err(MemoryError::EnumerationFailed(
            "EnumProcesses failed".to_string(),
        ));
    }

    let returned = bytes_returned as usize;
    if returned >= capacity {
        return Ok(capacity + mem::size_of::<u32>());
    }
    Ok(returned)
}

/// Safe wrapper for EnumProcessModulesEx over 32- and 64-bit modules
///
/// # Safety
/// The handle must be a valid process handle
pub unsafe fn enum_process_modules(handle: HANDLE, buffer: &mut [usize]) -> MemoryResult<usize> {
    let mut bytes_needed: DWORD = 0;
    let result = EnumProcessModulesEx(
        handle,
        buffer.as_mut_ptr() as *mut HMODULE,
        mem::size_of_val(buffer) as DWORD,
        &mut bytes_needed,
        LIST_MODULES_ALL,
    );

    if result == FALSE {
        return Err(MemoryError::EnumerationFailed(
            "EnumProcessModulesEx failed".to_string(),
        ));
    }
    Ok(bytes_needed as usize)
}

/// Safe wrapper for GetModuleInformation
///
/// # Safety
/// The handle must be a valid process handle and module must be valid
pub unsafe fn get_module_information(handle: HANDLE, module: usize) -> MemoryResult<RawModuleInfo> {
    let mut info: MODULEINFO = mem::zeroed();
    let result = GetModuleInformation(
        handle,
        module as HMODULE,
        &mut info,
        mem::size_of::<MODULEINFO>() as DWORD,
    );

    if result == FALSE {
        return Err(MemoryError::WindowsApi(
            "Failed to get module information".to_string(),
        ));
    }

    Ok(RawModuleInfo {
        base_address: Address::from(info.lpBaseOfDll as usize),
        entry_point: Address::from(info.EntryPoint as usize),
        size: info.SizeOfImage as u64,
    })
}

/// Safe wrapper for GetModuleFileNameExW
///
/// # Safety
/// The handle must be a valid process handle and module must be valid
pub unsafe fn get_module_file_name(
    handle: HANDLE,
    module: usize,
    buffer: &mut [u16],
) -> MemoryResult<usize> {
    let length = GetModuleFileNameExW(
        handle,
        module as HMODULE,
        buffer.as_mut_ptr(),
        buffer.len() as DWORD,
    );

    if length == 0 {
        return Err(MemoryError::WindowsApi(
            "Failed to get module file name".to_string(),
        ));
    }
    Ok(length as usize)
}
