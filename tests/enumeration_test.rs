//! Integration tests for process and module enumeration and name lookup

use procmem::core::types::{Address, Bitness, ErrorKind, MemoryError};
use procmem::platform::SimulatedOs;
use procmem::process::{
    enumerate_processes, AttachOptions, EnumerationLimits, ModuleScope, ProcessAttacher, Session,
};

fn system() -> SimulatedOs {
    let os = SimulatedOs::new();
    os.spawn(4, "System", Bitness::Width64);
    os.spawn(100, "C:\\Windows\\explorer.exe", Bitness::Width64);
    os.spawn(200, "C:\\Games\\Game.exe", Bitness::Width64);
    os.spawn(300, "D:\\Other\\game.exe", Bitness::Width32);
    os
}

fn with_modules(os: &SimulatedOs, pid: u32) {
    os.add_module(pid, "C:\\Games\\Game.exe", 0x40_0000, 0x40_1000, 0x8000);
    os.add_module(
        pid,
        "C:\\Windows\\System32\\ntdll.dll",
        0x7FFA_0000_0000,
        0x7FFA_0000_1000,
        0x20_0000,
    );
    os.add_module(
        pid,
        "C:\\Windows\\System32\\KERNEL32.DLL",
        0x7FF9_0000_0000,
        0x7FF9_0000_1000,
        0x10_0000,
    );
}

#[test]
fn test_enumerate_processes_snapshot() {
    let os = system();
    let pids = enumerate_processes(&os, &EnumerationLimits::default()).unwrap();
    assert_eq!(pids, vec![4, 100, 200, 300]);
}

#[test]
fn test_enumerate_processes_grows_from_small_seed() {
    let os = system();
    let limits = EnumerationLimits {
        process_seed: 1,
        ..EnumerationLimits::default()
    };
    let pids = enumerate_processes(&os, &limits).unwrap();
    assert_eq!(pids.len(), 4);
}

#[test]
fn test_enumerate_processes_skips_exited() {
    let os = system();
    os.exit(100);
    let pids = enumerate_processes(&os, &EnumerationLimits::default()).unwrap();
    assert!(!pids.contains(&100));
}

#[test]
fn test_attach_by_name_picks_first_match() {
    let os = system();
    let session = Session::attach_by_name(os.clone(), "game.exe").unwrap();
    assert_eq!(session.pid(), 200);

    // Every non-matching handle opened during the scan was closed
    assert_eq!(os.open_handle_count(), 1);
    assert_eq!(os.opened_count(), os.closed_count() + 1);
}

#[test]
fn test_attach_by_name_requires_full_file_name() {
    let os = system();
    let err = Session::attach_by_name(os.clone(), "game").unwrap_err();
    assert!(matches!(err, MemoryError::ProcessNotFound(_)));
    assert_eq!(os.open_handle_count(), 0);
}

#[test]
fn test_attach_by_name_skips_inaccessible_processes() {
    let os = system();
    os.deny_access(200);
    let session = Session::attach_by_name(os, "GAME.EXE").unwrap();
    assert_eq!(session.pid(), 300);
}

#[test]
fn test_attach_by_empty_name_is_usage_error() {
    let os = system();
    assert!(Session::attach_by_name(os, "").unwrap_err().is_usage());
}

#[test]
fn test_attacher_by_name_with_small_seed() {
    let os = system();
    let mut options = AttachOptions::default();
    options.enumeration.process_seed = 2;
    let session = ProcessAttacher::new(os)
        .with_options(options)
        .attach_by_name("explorer.exe")
        .unwrap();
    assert_eq!(session.pid(), 100);
}

#[test]
fn test_modules_in_load_order() {
    let os = system();
    with_modules(&os, 200);
    let session = Session::attach(os, 200).unwrap();

    let names: Vec<String> = session
        .modules(ModuleScope::All)
        .unwrap()
        .map(|module| module.name)
        .collect();
    assert_eq!(names, vec!["Game.exe", "ntdll.dll", "KERNEL32.DLL"]);
}

#[test]
fn test_module_descriptor_fields() {
    let os = system();
    with_modules(&os, 200);
    let session = Session::attach(os, 200).unwrap();

    let kernel32 = session.find_module("kernel32.dll").unwrap();
    assert_eq!(kernel32.base_address, Address::new(0x7FF9_0000_0000));
    assert_eq!(kernel32.entry_point, Address::new(0x7FF9_0000_1000));
    assert_eq!(kernel32.size, 0x10_0000);
    assert_eq!(
        kernel32.path.to_string_lossy(),
        "C:\\Windows\\System32\\KERNEL32.DLL"
    );
}

#[test]
fn test_main_module_only() {
    let os = system();
    with_modules(&os, 200);
    let session = Session::attach(os, 200).unwrap();

    let modules: Vec<_> = session.modules(ModuleScope::MainOnly).unwrap().collect();
    assert_eq!(modules.len(), 1);
    assert_eq!(session.main_module().unwrap(), modules[0]);
}

#[test]
fn test_missing_module() {
    let os = system();
    with_modules(&os, 200);
    let session = Session::attach(os, 200).unwrap();
    assert!(matches!(
        session.find_module("user32.dll"),
        Err(MemoryError::ModuleNotFound(_))
    ));
}

#[test]
fn test_main_module_of_empty_process() {
    let os = system();
    let session = Session::attach(os, 100).unwrap();
    assert!(matches!(
        session.main_module(),
        Err(MemoryError::ModuleNotFound(_))
    ));
}

#[test]
fn test_each_enumeration_requeries() {
    let os = system();
    with_modules(&os, 200);
    let session = Session::attach(os.clone(), 200).unwrap();
    assert_eq!(session.modules(ModuleScope::All).unwrap().count(), 3);

    os.add_module(200, "C:\\late.dll", 0x1000_0000, 0x1000_1000, 0x1000);
    assert_eq!(session.modules(ModuleScope::All).unwrap().count(), 4);
}

#[test]
fn test_module_list_small_seed() {
    let os = system();
    with_modules(&os, 200);
    let mut options = AttachOptions::default();
    options.enumeration.module_seed = 1;
    let session = ProcessAttacher::new(os)
        .with_options(options)
        .attach(200)
        .unwrap();
    assert_eq!(session.modules(ModuleScope::All).unwrap().count(), 3);
}

#[test]
fn test_ever_growing_module_list_exhausts_retries() {
    let os = system();
    with_modules(&os, 200);
    os.set_module_growth(200, 1000);
    let session = Session::attach(os, 200).unwrap();

    let err = session.modules(ModuleScope::All).err().unwrap();
    assert!(matches!(err, MemoryError::RetryExhausted { attempts: 3 }));
    assert_eq!(err.kind(), ErrorKind::RetryExhausted);
}

#[test]
fn test_modules_of_exited_process() {
    let os = system();
    with_modules(&os, 200);
    let session = Session::attach(os.clone(), 200).unwrap();
    os.exit(200);
    assert!(session.modules(ModuleScope::All).is_err());
}
