//! Integration tests for multi-level pointer resolution

use procmem::core::types::{Address, Bitness, ErrorKind, MemoryError};
use procmem::memory::{MemoryIo, PointerChain};
use procmem::platform::SimulatedOs;
use procmem::process::Session;

const PID: u32 = 77;

fn target(bitness: Bitness) -> SimulatedOs {
    let os = SimulatedOs::new();
    os.spawn(PID, "C:\\Games\\game.exe", bitness);
    os.map(PID, 0x10_0000, 0x1000);
    os.map(PID, 0x20_0000, 0x1000);
    os.map(PID, 0x30_0000, 0x1000);
    os
}

/// `[[[0x100000] + 0x18] + 0x40]` ends at 0x300040
fn build_chain_64(os: &SimulatedOs) {
    os.poke(PID, 0x10_0000, &0x20_0000u64.to_ne_bytes());
    os.poke(PID, 0x20_0018, &0x30_0000u64.to_ne_bytes());
    os.poke(PID, 0x30_0040, &100i32.to_ne_bytes());
}

#[test]
fn test_three_hop_chain() {
    let os = target(Bitness::Width64);
    build_chain_64(&os);
    let session = Session::attach(os, PID).unwrap();

    let start = Address::new(0x10_0000);
    assert_eq!(
        session.resolve_pointer(start, &[0x18, 0x40]).unwrap(),
        Address::new(0x30_0040)
    );
    assert_eq!(session.read_chain::<i32>(start, &[0x18, 0x40]).unwrap(), 100);
}

#[test]
fn test_empty_offsets_return_start() {
    let os = target(Bitness::Width64);
    let session = Session::attach(os, PID).unwrap();
    let start = Address::new(0x10_0008);
    assert_eq!(session.resolve_pointer(start, &[]).unwrap(), start);
}

#[test]
fn test_negative_offset() {
    let os = target(Bitness::Width64);
    os.poke(PID, 0x10_0000, &0x20_0100u64.to_ne_bytes());
    let session = Session::attach(os, PID).unwrap();
    assert_eq!(
        session
            .resolve_pointer(Address::new(0x10_0000), &[-0x100])
            .unwrap(),
        Address::new(0x20_0000)
    );
}

#[test]
fn test_null_pointer_reports_level() {
    let os = target(Bitness::Width64);
    os.poke(PID, 0x10_0000, &0x20_0000u64.to_ne_bytes());
    // 0x200018 is left zeroed
    let session = Session::attach(os, PID).unwrap();

    let err = session
        .resolve_pointer(Address::new(0x10_0000), &[0x18, 0x40, 0x8])
        .unwrap_err();
    assert!(matches!(err, MemoryError::PointerChainBroken { level: 1, .. }));
    assert_eq!(err.kind(), ErrorKind::TransientAccess);
}

#[test]
fn test_unmapped_hop_reports_level() {
    let os = target(Bitness::Width64);
    os.poke(PID, 0x10_0000, &0xDEAD_0000u64.to_ne_bytes());
    let session = Session::attach(os, PID).unwrap();

    let err = session
        .resolve_pointer(Address::new(0x10_0000), &[0x0, 0x0])
        .unwrap_err();
    assert!(matches!(err, MemoryError::PointerChainBroken { level: 1, .. }));
}

#[test]
fn test_32bit_target_reads_four_byte_pointers() {
    let os = target(Bitness::Width32);
    os.poke(PID, 0x10_0000, &0x20_0000u32.to_ne_bytes());
    // High dword that a 64-bit read would pick up
    os.poke(PID, 0x10_0004, &0xFFFF_FFFFu32.to_ne_bytes());
    os.poke(PID, 0x20_0010, &0x30_0000u32.to_ne_bytes());
    let session = Session::attach(os, PID).unwrap();

    assert_eq!(
        session
            .resolve_pointer(Address::new(0x10_0000), &[0x10, 0x4])
            .unwrap(),
        Address::new(0x30_0004)
    );
}

#[test]
fn test_32bit_offset_wraps_to_pointer_width() {
    let os = target(Bitness::Width32);
    os.poke(PID, 0x10_0000, &0xFFFF_FFF0u32.to_ne_bytes());
    let session = Session::attach(os, PID).unwrap();

    assert_eq!(
        session
            .resolve_pointer(Address::new(0x10_0000), &[0x20])
            .unwrap(),
        Address::new(0x10)
    );
}

#[test]
#[cfg(target_endian = "little")]
fn test_swapped_chain() {
    let os = target(Bitness::Width64);
    os.poke(PID, 0x10_0000, &0x20_0000u64.to_be_bytes());
    os.poke(PID, 0x20_0008, &0x0102_0304u32.to_be_bytes());
    let session = Session::attach(os, PID).unwrap();

    let start = Address::new(0x10_0000);
    assert_eq!(
        session.resolve_pointer_swapped(start, &[0x8]).unwrap(),
        Address::new(0x20_0008)
    );
    assert_eq!(
        session.read_chain_swapped::<u32>(start, &[0x8]).unwrap(),
        0x0102_0304
    );
}

#[test]
fn test_chain_over_raw_io() {
    let os = target(Bitness::Width64);
    build_chain_64(&os);
    let session = Session::attach(os, PID).unwrap();

    let io: MemoryIo<'_, SimulatedOs> = session.io().unwrap();
    let chain = PointerChain::new(io, Bitness::Width64);
    assert_eq!(
        chain.read::<i32>(Address::new(0x10_0000), &[0x18, 0x40]).unwrap(),
        100
    );
}

#[test]
fn test_chain_after_release_is_usage_error() {
    let os = target(Bitness::Width64);
    build_chain_64(&os);
    let session = Session::attach(os, PID).unwrap();
    session.release();

    let err = session
        .resolve_pointer(Address::new(0x10_0000), &[0x18])
        .unwrap_err();
    assert!(err.is_usage());
}
