//! An attached target process and every operation performed against it

use super::attacher::{AttachOptions, ProcessAttacher};
use super::modules::{ModuleScope, Modules};
use crate::core::types::{
    Address, Bitness, MemoryError, MemoryResult, MemoryValue, ModuleDescriptor, ProcessId,
    Symbol, ValueType,
};
use crate::memory::{ByteOrder, MemoryIo, Plain, PointerChain};
use crate::pe::{ExportTable, Exports};
use crate::platform::Platform;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Exclusive owner of one open process handle.
///
/// The handle is closed exactly once, by [`Session::release`] or on drop.
/// Every operation after release fails with [`MemoryError::SessionReleased`].
pub struct Session<P: Platform> {
    platform: P,
    pid: ProcessId,
    handle: P::Handle,
    released: AtomicBool,
    bitness: OnceCell<Bitness>,
    options: AttachOptions,
}

impl<P: Platform> Session<P> {
    pub(crate) fn new(platform: P, pid: ProcessId, handle: P::Handle, options: AttachOptions) -> Self {
        Session {
            platform,
            pid,
            handle,
            released: AtomicBool::new(false),
            bitness: OnceCell::new(),
            options,
        }
    }

    /// Attach to `pid` with default options
    pub fn attach(platform: P, pid: ProcessId) -> MemoryResult<Self> {
        ProcessAttacher::new(platform).attach(pid)
    }

    /// Take ownership of a handle opened by the caller
    pub fn from_handle(platform: P, handle: P::Handle) -> MemoryResult<Self> {
        ProcessAttacher::new(platform).adopt(handle)
    }

    /// Attach to the first process whose executable name matches `name`
    pub fn attach_by_name(platform: P, name: &str) -> MemoryResult<Self> {
        ProcessAttacher::new(platform).attach_by_name(name)
    }

    /// Target process id
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Options this session was opened with
    pub fn options(&self) -> &AttachOptions {
        &self.options
    }

    /// The platform backing this session
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Whether [`Session::release`] has run
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Close the handle. Further calls do nothing.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.platform.close_handle(self.handle);
            info!("Released process {}", self.pid);
        }
    }

    fn live_handle(&self) -> MemoryResult<P::Handle> {
        if self.is_released() {
            return Err(MemoryError::SessionReleased { pid: self.pid });
        }
        Ok(self.handle)
    }

    /// Typed accessor over this session's handle
    pub fn io(&self) -> MemoryResult<MemoryIo<'_, P>> {
        Ok(MemoryIo::new(&self.platform, self.live_handle()?))
    }

    /// Non-blocking check that the target is still running
    pub fn is_alive(&self) -> MemoryResult<bool> {
        let handle = self.live_handle()?;
        Ok(!self.platform.has_exited(handle))
    }

    /// Pointer width of the target, queried once and cached
    pub fn bitness(&self) -> MemoryResult<Bitness> {
        let handle = self.live_handle()?;
        self.bitness
            .get_or_try_init(|| {
                self.platform
                    .is_64bit(handle)
                    .map(Bitness::from_is_64bit)
            })
            .copied()
    }

    /// Pointer size of the target in bytes
    pub fn pointer_width(&self) -> MemoryResult<usize> {
        Ok(self.bitness()?.pointer_size())
    }

    /// Read one value in native byte order
    pub fn read<T: Plain>(&self, address: Address) -> MemoryResult<T> {
        self.io()?.read(address)
    }

    /// Read one value, reversing each lane's bytes
    pub fn read_swapped<T: Plain>(&self, address: Address) -> MemoryResult<T> {
        self.io()?.read_swapped(address)
    }

    /// Write one value in native byte order
    pub fn write<T: Plain>(&self, address: Address, value: T) -> MemoryResult<()> {
        self.io()?.write(address, value)
    }

    /// Write one value with each lane's bytes reversed
    pub fn write_swapped<T: Plain>(&self, address: Address, value: T) -> MemoryResult<()> {
        self.io()?.write_swapped(address, value)
    }

    /// Fill `values` from consecutive target memory
    pub fn read_into<T: Plain>(&self, address: Address, values: &mut [T]) -> MemoryResult<()> {
        self.io()?.read_into(address, values)
    }

    /// Fill `values`, swapping every element
    pub fn read_into_swapped<T: Plain>(
        &self,
        address: Address,
        values: &mut [T],
    ) -> MemoryResult<()> {
        self.io()?.read_into_swapped(address, values)
    }

    /// Write `values` to consecutive target memory
    pub fn write_from<T: Plain>(&self, address: Address, values: &[T]) -> MemoryResult<()> {
        self.io()?.write_from(address, values)
    }

    /// Write `values`, swapping every element
    pub fn write_from_swapped<T: Plain>(&self, address: Address, values: &[T]) -> MemoryResult<()> {
        self.io()?.write_from_swapped(address, values)
    }

    /// Read `len` raw bytes
    pub fn read_bytes(&self, address: Address, len: usize) -> MemoryResult<Vec<u8>> {
        self.io()?.read_bytes(address, len)
    }

    /// Write raw bytes
    pub fn write_bytes(&self, address: Address, data: &[u8]) -> MemoryResult<()> {
        self.io()?.write_bytes(address, data)
    }

    /// Read a NUL-terminated string of at most `max_len` bytes
    pub fn read_c_string(&self, address: Address, max_len: usize) -> MemoryResult<String> {
        self.io()?.read_c_string(address, max_len)
    }

    /// Read a pointer of the target's width
    pub fn read_pointer(&self, address: Address) -> MemoryResult<Address> {
        let bitness = self.bitness()?;
        self.io()?.read_pointer(address, bitness, ByteOrder::Native)
    }

    /// Read a scalar whose type is chosen at runtime
    pub fn read_value(
        &self,
        address: Address,
        value_type: ValueType,
        order: ByteOrder,
    ) -> MemoryResult<MemoryValue> {
        self.io()?.read_value(address, value_type, order)
    }

    fn chain(&self, order: ByteOrder) -> MemoryResult<PointerChain<'_, P>> {
        let bitness = self.bitness()?;
        Ok(PointerChain::new(self.io()?, bitness).with_order(order))
    }

    /// Follow `offsets` from `start` and return the final address
    pub fn resolve_pointer(&self, start: Address, offsets: &[i64]) -> MemoryResult<Address> {
        self.chain(ByteOrder::Native)?.resolve(start, offsets)
    }

    /// Like [`Session::resolve_pointer`] with every hop byte-swapped
    pub fn resolve_pointer_swapped(&self, start: Address, offsets: &[i64]) -> MemoryResult<Address> {
        self.chain(ByteOrder::Swapped)?.resolve(start, offsets)
    }

    /// Follow `offsets` from `start` and read a value at the end
    pub fn read_chain<T: Plain>(&self, start: Address, offsets: &[i64]) -> MemoryResult<T> {
        self.chain(ByteOrder::Native)?.read(start, offsets)
    }

    /// Like [`Session::read_chain`] with hops and value byte-swapped
    pub fn read_chain_swapped<T: Plain>(&self, start: Address, offsets: &[i64]) -> MemoryResult<T> {
        self.chain(ByteOrder::Swapped)?.read(start, offsets)
    }

    /// Lazily enumerate loaded modules; each call re-queries the target
    pub fn modules(&self, scope: ModuleScope) -> MemoryResult<Modules<'_, P>> {
        let handle = self.live_handle()?;
        Modules::new(&self.platform, handle, scope, &self.options.enumeration)
    }

    /// The main executable image
    pub fn main_module(&self) -> MemoryResult<ModuleDescriptor> {
        self.modules(ModuleScope::MainOnly)?
            .next()
            .ok_or_else(|| MemoryError::ModuleNotFound(format!("main module of {}", self.pid)))
    }

    /// First module whose file name matches `name`, ignoring ASCII case
    pub fn find_module(&self, name: &str) -> MemoryResult<ModuleDescriptor> {
        self.modules(ModuleScope::All)?
            .find(|module| module.name_matches(name))
            .ok_or_else(|| MemoryError::ModuleNotFound(name.to_string()))
    }

    /// Parse the export tables of the image mapped at `base`
    pub fn export_table(&self, base: Address) -> MemoryResult<ExportTable<'_, P>> {
        ExportTable::parse(self.io()?, base, &self.options.exports)
    }

    /// Named exports of the image at `base`.
    ///
    /// An image whose headers or tables cannot be read yields an empty
    /// sequence; only usage errors are returned.
    pub fn exports_at(&self, base: Address) -> MemoryResult<Exports<'_, P>> {
        match self.export_table(base) {
            Ok(table) => Ok(table.symbols()),
            Err(err) if err.is_usage() => Err(err),
            Err(err) => {
                warn!("Export parse of image at {} aborted: {}", base, err);
                Ok(Exports::empty())
            }
        }
    }

    /// Named exports of `module`
    pub fn exports(&self, module: &ModuleDescriptor) -> MemoryResult<Exports<'_, P>> {
        self.exports_at(module.base_address)
    }

    /// Look up one named export of `module`
    pub fn find_export(&self, module: &ModuleDescriptor, name: &str) -> MemoryResult<Option<Symbol>> {
        Ok(self.export_table(module.base_address)?.find(name))
    }

    /// Address of the export of `module` with the given biased ordinal
    pub fn export_by_ordinal(
        &self,
        module: &ModuleDescriptor,
        ordinal: u32,
    ) -> MemoryResult<Option<Address>> {
        Ok(self.export_table(module.base_address)?.by_ordinal(ordinal))
    }

    /// Reserve and commit `size` bytes of read/write/execute memory
    pub fn allocate(&self, size: usize) -> MemoryResult<Address> {
        if size == 0 {
            return Err(MemoryError::invalid_argument("zero-size allocation"));
        }
        let handle = self.live_handle()?;
        self.platform.allocate(handle, size)
    }

    /// Release memory returned by [`Session::allocate`]
    pub fn free(&self, address: Address) -> MemoryResult<()> {
        let handle = self.live_handle()?;
        self.platform.free(handle, address)
    }
}

impl<P: Platform> Drop for Session<P> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<P: Platform> fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("pid", &self.pid)
            .field("handle", &self.handle)
            .field("released", &self.is_released())
            .field("bitness", &self.bitness.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ErrorKind;
    use crate::platform::SimulatedOs;

    const PID: u32 = 500;

    fn session() -> (SimulatedOs, Session<SimulatedOs>) {
        let os = SimulatedOs::new();
        os.spawn(PID, "C:\\app.exe", Bitness::Width32);
        os.map(PID, 0x1000, 0x1000);
        let session = Session::attach(os.clone(), PID).unwrap();
        (os, session)
    }

    #[test]
    fn test_release_is_idempotent() {
        let (os, session) = session();
        session.release();
        session.release();
        drop(session);
        assert_eq!(os.closed_count(), 1);
        assert_eq!(os.invalid_close_count(), 0);
    }

    #[test]
    fn test_operations_after_release_are_usage_errors() {
        let (_os, session) = session();
        session.release();
        for err in [
            session.read::<u32>(Address::new(0x1000)).unwrap_err(),
            session.is_alive().unwrap_err(),
            session.bitness().unwrap_err(),
            session.modules(ModuleScope::All).err().unwrap(),
            session.allocate(16).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::Usage);
            assert!(matches!(err, MemoryError::SessionReleased { pid: PID }));
        }
    }

    #[test]
    fn test_liveness() {
        let (os, session) = session();
        assert!(session.is_alive().unwrap());
        os.exit(PID);
        assert!(!session.is_alive().unwrap());
    }

    #[test]
    fn test_bitness_cached() {
        let (_os, session) = session();
        assert_eq!(session.bitness().unwrap(), Bitness::Width32);
        assert_eq!(session.pointer_width().unwrap(), 4);
    }

    #[test]
    fn test_chain_uses_session_width() {
        let (_os, session) = session();
        session.write(Address::new(0x1000), 0x1800u32).unwrap();
        session.write(Address::new(0x1804), 77u16).unwrap();
        assert_eq!(session.read_chain::<u16>(Address::new(0x1000), &[4]).unwrap(), 77);
        assert_eq!(
            session.read_pointer(Address::new(0x1000)).unwrap(),
            Address::new(0x1800)
        );
    }

    #[test]
    fn test_allocate_and_free() {
        let (_os, session) = session();
        assert!(session.allocate(0).unwrap_err().is_usage());
        let block = session.allocate(64).unwrap();
        session.write(block, 5u64).unwrap();
        assert_eq!(session.read::<u64>(block).unwrap(), 5);
        session.free(block).unwrap();
        assert!(session.read::<u64>(block).is_err());
    }
}
