//! Smoke tests against the live Windows process API, using this test process as target
#![cfg(windows)]

use procmem::core::types::Address;
use procmem::process::{ModuleScope, Session};
use procmem::windows::WindowsApi;
use std::process;

fn current() -> Session<WindowsApi> {
    Session::attach(WindowsApi, process::id()).expect("Failed to open current process")
}

#[test]
#[cfg_attr(miri, ignore = "FFI not supported in Miri")]
fn test_read_and_write_own_memory() {
    let session = current();
    let mut local = [0u64; 4];
    let address = Address::from(local.as_mut_ptr() as usize);

    session.write_from(address, &[1u64, 2, 3, 4]).unwrap();
    let mut back = [0u64; 4];
    session.read_into(address, &mut back).unwrap();
    assert_eq!(back, [1, 2, 3, 4]);
}

#[test]
#[cfg_attr(miri, ignore = "FFI not supported in Miri")]
fn test_kernel32_exports() {
    let session = current();
    let kernel32 = session.find_module("kernel32.dll").unwrap();
    let symbol = session
        .find_export(&kernel32, "GetCurrentProcessId")
        .unwrap()
        .expect("kernel32 exports GetCurrentProcessId");
    assert!(kernel32.contains_address(symbol.address));
    assert!(session.exports(&kernel32).unwrap().count() > 100);
}

#[test]
#[cfg_attr(miri, ignore = "FFI not supported in Miri")]
fn test_main_module_is_test_binary() {
    let session = current();
    let main = session.main_module().unwrap();
    let exe = std::env::current_exe().unwrap();
    let expected = exe.file_name().unwrap().to_string_lossy();
    assert!(main.name_matches(&expected));
    assert!(session.modules(ModuleScope::All).unwrap().count() > 2);
}

#[test]
#[cfg_attr(miri, ignore = "FFI not supported in Miri")]
fn test_allocate_and_free_remote_block() {
    let session = current();
    let block = session.allocate(0x1000).unwrap();
    session.write(block, 0x5A5A_5A5Au32).unwrap();
    assert_eq!(session.read::<u32>(block).unwrap(), 0x5A5A_5A5A);
    session.free(block).unwrap();
}

#[test]
#[cfg_attr(miri, ignore = "FFI not supported in Miri")]
fn test_attach_by_own_name() {
    let exe = std::env::current_exe().unwrap();
    let name = exe.file_name().unwrap().to_string_lossy().into_owned();
    let session = Session::attach_by_name(WindowsApi, &name).unwrap();
    assert!(session.is_alive().unwrap());
}
