//! Integration tests for PE export resolution in 32- and 64-bit images

use procmem::core::types::{Address, Bitness, ErrorKind, MemoryError};
use procmem::pe::{ExportLimits, ImageHeaders};
use procmem::platform::{ImageBuilder, SimulatedOs};
use procmem::process::{AttachOptions, ProcessAttacher, Session};

const PID: u32 = 1234;
const EXE_BASE: u64 = 0x40_0000;
const DLL_BASE: u64 = 0x7FF8_1000_0000;
const DLL_BASE_32: u64 = 0x7700_0000;

fn three_exports(bitness: Bitness) -> Vec<u8> {
    ImageBuilder::new(bitness)
        .export("CloseHandle", 0x1010)
        .export("CreateFileW", 0x1020)
        .export("ReadFile", 0x1030)
        .build()
}

fn target(bitness: Bitness, base: u64, image: &[u8]) -> SimulatedOs {
    let os = SimulatedOs::new();
    os.spawn(PID, "C:\\App\\app.exe", bitness);
    os.add_module(PID, "C:\\App\\app.exe", EXE_BASE, EXE_BASE + 0x1000, 0x1000);
    os.load_image(PID, "C:\\Windows\\System32\\kernel32.dll", base, image);
    os
}

#[test]
fn test_64bit_named_exports() {
    let os = target(Bitness::Width64, DLL_BASE, &three_exports(Bitness::Width64));
    let session = Session::attach(os, PID).unwrap();
    let module = session.find_module("kernel32.dll").unwrap();

    let symbols: Vec<_> = session.exports(&module).unwrap().collect();
    assert_eq!(symbols.len(), 3);
    assert_eq!(symbols[0].name, "CloseHandle");
    assert_eq!(symbols[0].address, Address::new(DLL_BASE + 0x1010));
    assert_eq!(symbols[0].ordinal, 1);
    assert_eq!(symbols[2].name, "ReadFile");
    assert_eq!(symbols[2].address, Address::new(DLL_BASE + 0x1030));
    assert_eq!(symbols[2].ordinal, 3);
}

#[test]
fn test_32bit_image_in_32bit_process() {
    let os = target(
        Bitness::Width32,
        DLL_BASE_32,
        &three_exports(Bitness::Width32),
    );
    let session = Session::attach(os, PID).unwrap();
    let module = session.find_module("KERNEL32.dll").unwrap();

    let table = session.export_table(module.base_address).unwrap();
    assert_eq!(table.bitness(), Bitness::Width32);
    assert_eq!(table.module_name().unwrap(), "simulated.dll");

    let create = session.find_export(&module, "CreateFileW").unwrap().unwrap();
    assert_eq!(create.address, Address::new(DLL_BASE_32 + 0x1020));
}

#[test]
fn test_32bit_exports_in_name_order_skipping_broken_entries() {
    let image = ImageBuilder::new(Bitness::Width32)
        .export("A", 0x1010)
        .export_with_ordinal("Bad", 99)
        .export("B", 0x1020)
        .export_with_name_rva(0x0F00_0000, 0x1040)
        .export("C", 0x1030)
        .build();
    let os = target(Bitness::Width32, DLL_BASE_32, &image);
    let session = Session::attach(os, PID).unwrap();
    let module = session.find_module("kernel32.dll").unwrap();

    let pairs: Vec<(String, Address)> = session
        .exports(&module)
        .unwrap()
        .map(|symbol| (symbol.name, symbol.address))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("A".to_string(), Address::new(DLL_BASE_32 + 0x1010)),
            ("B".to_string(), Address::new(DLL_BASE_32 + 0x1020)),
            ("C".to_string(), Address::new(DLL_BASE_32 + 0x1030)),
        ]
    );
}

#[test]
fn test_headers_report_image_width() {
    let os = target(Bitness::Width64, DLL_BASE, &three_exports(Bitness::Width64));
    os.load_image(PID, "C:\\wow.dll", 0x1000_0000, &three_exports(Bitness::Width32));
    let session = Session::attach(os, PID).unwrap();
    let io = session.io().unwrap();

    let pe64 = ImageHeaders::read(&io, Address::new(DLL_BASE)).unwrap();
    assert_eq!(pe64.bitness, Bitness::Width64);
    let pe32 = ImageHeaders::read(&io, Address::new(0x1000_0000)).unwrap();
    assert_eq!(pe32.bitness, Bitness::Width32);
}

#[test]
fn test_find_export_is_exact() {
    let os = target(Bitness::Width64, DLL_BASE, &three_exports(Bitness::Width64));
    let session = Session::attach(os, PID).unwrap();
    let module = session.find_module("kernel32.dll").unwrap();

    assert!(session.find_export(&module, "ReadFile").unwrap().is_some());
    assert!(session.find_export(&module, "readfile").unwrap().is_none());
    assert!(session.find_export(&module, "Read").unwrap().is_none());
}

#[test]
fn test_export_by_ordinal_with_base() {
    let image = ImageBuilder::new(Bitness::Width64)
        .ordinal_base(10)
        .export("First", 0x2000)
        .unnamed_export(0x2100)
        .unnamed_export(0)
        .build();
    let os = target(Bitness::Width64, DLL_BASE, &image);
    let session = Session::attach(os, PID).unwrap();
    let module = session.find_module("kernel32.dll").unwrap();

    assert_eq!(
        session.export_by_ordinal(&module, 10).unwrap(),
        Some(Address::new(DLL_BASE + 0x2000))
    );
    assert_eq!(
        session.export_by_ordinal(&module, 11).unwrap(),
        Some(Address::new(DLL_BASE + 0x2100))
    );
    // Empty slot, below base, past the end
    assert_eq!(session.export_by_ordinal(&module, 12).unwrap(), None);
    assert_eq!(session.export_by_ordinal(&module, 9).unwrap(), None);
    assert_eq!(session.export_by_ordinal(&module, 13).unwrap(), None);

    let names: Vec<_> = session.exports(&module).unwrap().map(|s| s.name).collect();
    assert_eq!(names, vec!["First"]);
}

#[test]
fn test_out_of_range_ordinal_is_skipped() {
    let image = ImageBuilder::new(Bitness::Width64)
        .export("Good", 0x1010)
        .export_with_ordinal("Broken", 40)
        .export("AlsoGood", 0x1020)
        .build();
    let os = target(Bitness::Width64, DLL_BASE, &image);
    let session = Session::attach(os, PID).unwrap();

    let names: Vec<_> = session
        .exports_at(Address::new(DLL_BASE))
        .unwrap()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["Good", "AlsoGood"]);
}

#[test]
fn test_unreadable_name_is_skipped() {
    let image = ImageBuilder::new(Bitness::Width64)
        .export("Visible", 0x1010)
        .export_with_name_rva(0x0F00_0000, 0x1020)
        .build();
    let os = target(Bitness::Width64, DLL_BASE, &image);
    let session = Session::attach(os, PID).unwrap();

    let symbols: Vec<_> = session
        .exports_at(Address::new(DLL_BASE))
        .unwrap()
        .collect();
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols[0].name, "Visible");
}

#[test]
fn test_long_names_are_truncated() {
    let long = "X".repeat(300);
    let image = ImageBuilder::new(Bitness::Width64)
        .export(&long, 0x1010)
        .build();
    let os = target(Bitness::Width64, DLL_BASE, &image);
    let session = Session::attach(os, PID).unwrap();

    let symbol = session
        .exports_at(Address::new(DLL_BASE))
        .unwrap()
        .next()
        .unwrap();
    assert_eq!(symbol.name.len(), 255);
}

#[test]
fn test_configured_name_length() {
    let image = ImageBuilder::new(Bitness::Width64)
        .export("CreateFileW", 0x1010)
        .build();
    let os = target(Bitness::Width64, DLL_BASE, &image);
    let options = AttachOptions {
        exports: ExportLimits {
            max_name_length: 6,
            ..ExportLimits::default()
        },
        ..AttachOptions::default()
    };
    let session = ProcessAttacher::new(os)
        .with_options(options)
        .attach(PID)
        .unwrap();

    let symbol = session
        .exports_at(Address::new(DLL_BASE))
        .unwrap()
        .next()
        .unwrap();
    assert_eq!(symbol.name, "Create");
}

#[test]
fn test_missing_export_directory_yields_nothing() {
    let image = ImageBuilder::new(Bitness::Width64)
        .export("Hidden", 0x1010)
        .without_export_directory()
        .build();
    let os = target(Bitness::Width64, DLL_BASE, &image);
    let session = Session::attach(os, PID).unwrap();
    let module = session.find_module("kernel32.dll").unwrap();

    assert_eq!(session.exports(&module).unwrap().count(), 0);

    let err = session.export_table(module.base_address).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::StructuralParse);
}

#[test]
fn test_unmapped_image_yields_nothing() {
    let os = target(Bitness::Width64, DLL_BASE, &three_exports(Bitness::Width64));
    let session = Session::attach(os, PID).unwrap();

    // The executable module is registered without any mapped memory
    let exe = session.main_module().unwrap();
    assert_eq!(session.exports(&exe).unwrap().count(), 0);
    assert!(matches!(
        session.export_table(exe.base_address).err().unwrap(),
        MemoryError::MalformedImage { .. }
    ));
}

#[test]
fn test_export_count_limit() {
    let os = target(Bitness::Width64, DLL_BASE, &three_exports(Bitness::Width64));
    let mut options = AttachOptions::default();
    options.exports.max_export_count = 2;
    let session = ProcessAttacher::new(os)
        .with_options(options)
        .attach(PID)
        .unwrap();

    let err = session.export_table(Address::new(DLL_BASE)).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::StructuralParse);
    assert_eq!(session.exports_at(Address::new(DLL_BASE)).unwrap().count(), 0);
}

#[test]
fn test_exports_after_release_is_usage_error() {
    let os = target(Bitness::Width64, DLL_BASE, &three_exports(Bitness::Width64));
    let session = Session::attach(os, PID).unwrap();
    session.release();
    assert!(session
        .exports_at(Address::new(DLL_BASE))
        .err()
        .unwrap()
        .is_usage());
}
