//! In-memory process table implementing [`Platform`]
//!
//! Each simulated process owns a sparse set of mapped regions, a module
//! list and an exit flag. Handles are counted so callers can verify that
//! every opened handle is closed exactly once.

use super::{Platform, RawModuleInfo};
use crate::core::types::{Address, Bitness, MemoryError, MemoryResult, ProcessId};
use byteorder::{ByteOrder as _, LittleEndian};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const PAGE_SIZE: u64 = 0x1000;
const ALLOCATION_BASE: u64 = 0x2000_0000;

/// Opaque handle issued by [`SimulatedOs`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimHandle(u64);

#[derive(Debug, Clone)]
struct Region {
    data: Vec<u8>,
    writable: bool,
}

#[derive(Debug, Clone)]
struct SimModule {
    info: RawModuleInfo,
    path: String,
}

/// One process in the simulated table
#[derive(Debug, Clone)]
pub struct SimulatedProcess {
    pid: ProcessId,
    image_path: String,
    bitness: Bitness,
    exited: bool,
    deny_open: bool,
    module_growth: usize,
    regions: BTreeMap<u64, Region>,
    modules: Vec<SimModule>,
    allocations: Vec<u64>,
}

impl SimulatedProcess {
    /// Creates an empty process with the given image path
    pub fn new(pid: ProcessId, image_path: impl Into<String>, bitness: Bitness) -> Self {
        SimulatedProcess {
            pid,
            image_path: image_path.into(),
            bitness,
            exited: false,
            deny_open: false,
            module_growth: 0,
            regions: BTreeMap::new(),
            modules: Vec::new(),
            allocations: Vec::new(),
        }
    }

    /// Process id
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    fn region_at(&self, address: u64) -> Option<(u64, &Region)> {
        let (&start, region) = self.regions.range(..=address).next_back()?;
        let end = start + region.data.len() as u64;
        (address < end).then_some((start, region))
    }

    fn region_at_mut(&mut self, address: u64) -> Option<(u64, &mut Region)> {
        let (&start, region) = self.regions.range_mut(..=address).next_back()?;
        let end = start + region.data.len() as u64;
        (address < end).then_some((start, region))
    }

    fn read(&self, address: u64, buffer: &mut [u8]) -> usize {
        let mut done = 0;
        while done < buffer.len() {
            let cursor = address.wrapping_add(done as u64);
            let Some((start, region)) = self.region_at(cursor) else {
                break;
            };
            let offset = (cursor - start) as usize;
            let count = (region.data.len() - offset).min(buffer.len() - done);
            buffer[done..done + count].copy_from_slice(&region.data[offset..offset + count]);
            done += count;
        }
        done
    }

    fn write(&mut self, address: u64, data: &[u8]) -> usize {
        let mut done = 0;
        while done < data.len() {
            let cursor = address.wrapping_add(done as u64);
            let Some((start, region)) = self.region_at_mut(cursor) else {
                break;
            };
            if !region.writable {
                break;
            }
            let offset = (cursor - start) as usize;
            let count = (region.data.len() - offset).min(data.len() - done);
            region.data[offset..offset + count].copy_from_slice(&data[done..done + count]);
            done += count;
        }
        done
    }
}

#[derive(Debug, Default)]
struct State {
    processes: BTreeMap<ProcessId, SimulatedProcess>,
    handles: HashMap<u64, ProcessId>,
    next_handle: u64,
    opened: usize,
    closed: usize,
    invalid_closes: usize,
}

impl State {
    fn process(&self, handle: SimHandle) -> MemoryResult<&SimulatedProcess> {
        let pid = self
            .handles
            .get(&handle.0)
            .ok_or_else(|| MemoryError::WindowsApi(format!("invalid handle {:?}", handle)))?;
        self.processes
            .get(pid)
            .ok_or_else(|| MemoryError::ProcessNotFound(format!("PID: {}", pid)))
    }

    fn process_mut(&mut self, handle: SimHandle) -> MemoryResult<&mut SimulatedProcess> {
        let pid = *self
            .handles
            .get(&handle.0)
            .ok_or_else(|| MemoryError::WindowsApi(format!("invalid handle {:?}", handle)))?;
        self.processes
            .get_mut(&pid)
            .ok_or_else(|| MemoryError::ProcessNotFound(format!("PID: {}", pid)))
    }
}

/// Shared, cloneable in-memory process table
#[derive(Debug, Clone, Default)]
pub struct SimulatedOs {
    state: Arc<Mutex<State>>,
}

impl SimulatedOs {
    /// Creates an empty process table
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a process to the table
    pub fn add_process(&self, process: SimulatedProcess) {
        self.state.lock().processes.insert(process.pid, process);
    }

    /// Convenience for adding an empty process
    pub fn spawn(&self, pid: ProcessId, image_path: &str, bitness: Bitness) {
        self.add_process(SimulatedProcess::new(pid, image_path, bitness));
    }

    /// Maps a zero-filled, writable region
    pub fn map(&self, pid: ProcessId, address: u64, size: usize) {
        self.map_bytes(pid, address, &vec![0u8; size]);
    }

    /// Maps a writable region holding `bytes`
    pub fn map_bytes(&self, pid: ProcessId, address: u64, bytes: &[u8]) {
        self.with_process(pid, |process| {
            process.regions.insert(
                address,
                Region {
                    data: bytes.to_vec(),
                    writable: true,
                },
            );
        });
    }

    /// Marks the region starting at `address` as read-only
    pub fn protect(&self, pid: ProcessId, address: u64) {
        self.with_process(pid, |process| {
            if let Some(region) = process.regions.get_mut(&address) {
                region.writable = false;
            }
        });
    }

    /// Writes bytes into already-mapped memory, ignoring protection
    pub fn poke(&self, pid: ProcessId, address: u64, bytes: &[u8]) {
        self.with_process(pid, |process| {
            let mut done = 0;
            while done < bytes.len() {
                let cursor = address + done as u64;
                let Some((start, region)) = process.region_at_mut(cursor) else {
                    break;
                };
                let offset = (cursor - start) as usize;
                let count = (region.data.len() - offset).min(bytes.len() - done);
                region.data[offset..offset + count].copy_from_slice(&bytes[done..done + count]);
                done += count;
            }
        });
    }

    /// Reads mapped bytes; `None` if any part is unmapped
    pub fn peek(&self, pid: ProcessId, address: u64, len: usize) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let process = state.processes.get(&pid)?;
        let mut buffer = vec![0u8; len];
        (process.read(address, &mut buffer) == len).then_some(buffer)
    }

    /// Registers a module without mapping any memory for it
    pub fn add_module(&self, pid: ProcessId, path: &str, base: u64, entry: u64, size: u64) {
        self.with_process(pid, |process| {
            process.modules.push(SimModule {
                info: RawModuleInfo {
                    base_address: Address::new(base),
                    entry_point: Address::new(entry),
                    size,
                },
                path: path.to_string(),
            });
        });
    }

    /// Maps an image at `base` and registers it as a module
    pub fn load_image(&self, pid: ProcessId, path: &str, base: u64, image: &[u8]) {
        self.map_bytes(pid, base, image);
        self.add_module(pid, path, base, base + 0x1000, image.len() as u64);
    }

    /// Each module enumeration appends `extra` placeholder modules first
    pub fn set_module_growth(&self, pid: ProcessId, extra: usize) {
        self.with_process(pid, |process| process.module_growth = extra);
    }

    /// Refuse future opens of this process
    pub fn deny_access(&self, pid: ProcessId) {
        self.with_process(pid, |process| process.deny_open = true);
    }

    /// Marks the process as exited; memory becomes unreadable
    pub fn exit(&self, pid: ProcessId) {
        self.with_process(pid, |process| process.exited = true);
    }

    /// Handles currently open
    pub fn open_handle_count(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// Total handles ever opened
    pub fn opened_count(&self) -> usize {
        self.state.lock().opened
    }

    /// Total successful closes
    pub fn closed_count(&self) -> usize {
        self.state.lock().closed
    }

    /// Closes of handles that were not open
    pub fn invalid_close_count(&self) -> usize {
        self.state.lock().invalid_closes
    }

    fn with_process<R>(&self, pid: ProcessId, f: impl FnOnce(&mut SimulatedProcess) -> R) -> R {
        let mut state = self.state.lock();
        let process = state
            .processes
            .get_mut(&pid)
            .unwrap_or_else(|| panic!("no simulated process with pid {}", pid));
        f(process)
    }
}

/// Copies like `GetModuleFileNameExW`: silently truncates and always
/// null-terminates, returning the units written before the terminator
fn copy_wide(source: &str, buffer: &mut [u16]) -> usize {
    let Some(room) = buffer.len().checked_sub(1) else {
        return 0;
    };
    let mut written = 0;
    for (slot, unit) in buffer[..room].iter_mut().zip(source.encode_utf16()) {
        *slot = unit;
        written += 1;
    }
    buffer[written] = 0;
    written
}

impl Platform for SimulatedOs {
    type Handle = SimHandle;

    fn open_process(&self, pid: ProcessId) -> MemoryResult<SimHandle> {
        let mut state = self.state.lock();
        let process = state
            .processes
            .get(&pid)
            .ok_or_else(|| MemoryError::ProcessNotFound(format!("PID: {}", pid)))?;
        if process.deny_open {
            return Err(MemoryError::access_denied(pid, "access denied"));
        }
        state.next_handle += 4;
        let id = state.next_handle;
        state.handles.insert(id, pid);
        state.opened += 1;
        Ok(SimHandle(id))
    }

    fn close_handle(&self, handle: SimHandle) {
        let mut state = self.state.lock();
        if state.handles.remove(&handle.0).is_some() {
            state.closed += 1;
        } else {
            state.invalid_closes += 1;
        }
    }

    fn has_exited(&self, handle: SimHandle) -> bool {
        let state = self.state.lock();
        state.process(handle).map(|p| p.exited).unwrap_or(true)
    }

    fn process_id(&self, handle: SimHandle) -> MemoryResult<ProcessId> {
        Ok(self.state.lock().process(handle)?.pid)
    }

    fn is_64bit(&self, handle: SimHandle) -> MemoryResult<bool> {
        Ok(self.state.lock().process(handle)?.bitness.is_64bit())
    }

    fn process_image_name(&self, handle: SimHandle, buffer: &mut [u16]) -> MemoryResult<usize> {
        let state = self.state.lock();
        let process = state.process(handle)?;
        Ok(copy_wide(&process.image_path, buffer))
    }

    fn read_memory(
        &self,
        handle: SimHandle,
        address: Address,
        buffer: &mut [u8],
    ) -> MemoryResult<usize> {
        let state = self.state.lock();
        let process = state.process(handle)?;
        if process.exited {
            return Err(MemoryError::read_failed(address, "process has exited"));
        }
        match process.read(address.as_u64(), buffer) {
            0 if !buffer.is_empty() => Err(MemoryError::read_failed(address, "unmapped memory")),
            n => Ok(n),
        }
    }

    fn write_memory(
        &self,
        handle: SimHandle,
        address: Address,
        data: &[u8],
    ) -> MemoryResult<usize> {
        let mut state = self.state.lock();
        let process = state.process_mut(handle)?;
        if process.exited {
            return Err(MemoryError::write_failed(address, "process has exited"));
        }
        match process.write(address.as_u64(), data) {
            0 if !data.is_empty() => Err(MemoryError::write_failed(
                address,
                "unmapped or protected memory",
            )),
            n => Ok(n),
        }
    }

    fn enum_processes(&self, buffer: &mut [u32]) -> MemoryResult<usize> {
        let state = self.state.lock();
        let live: Vec<u32> = state
            .processes
            .values()
            .filter(|p| !p.exited)
            .map(|p| p.pid)
            .collect();
        for (slot, pid) in buffer.iter_mut().zip(&live) {
            *slot = *pid;
        }
        Ok(live.len() * std::mem::size_of::<u32>())
    }

    fn enum_modules(&self, handle: SimHandle, buffer: &mut [usize]) -> MemoryResult<usize> {
        let mut state = self.state.lock();
        let process = state.process_mut(handle)?;
        if process.exited {
            return Err(MemoryError::EnumerationFailed(
                "process has exited".to_string(),
            ));
        }
        for _ in 0..process.module_growth {
            process.modules.push(SimModule {
                info: RawModuleInfo::default(),
                path: String::new(),
            });
        }
        // Module handles are 1-based indices into the module list.
        let count = process.modules.len();
        for (index, slot) in buffer.iter_mut().take(count).enumerate() {
            *slot = index + 1;
        }
        Ok(count * std::mem::size_of::<usize>())
    }

    fn module_information(&self, handle: SimHandle, module: usize) -> MemoryResult<RawModuleInfo> {
        let state = self.state.lock();
        let process = state.process(handle)?;
        module
            .checked_sub(1)
            .and_then(|index| process.modules.get(index))
            .map(|m| m.info)
            .ok_or_else(|| MemoryError::ModuleNotFound(format!("handle {}", module)))
    }

    fn module_file_name(
        &self,
        handle: SimHandle,
        module: usize,
        buffer: &mut [u16],
    ) -> MemoryResult<usize> {
        let state = self.state.lock();
        let process = state.process(handle)?;
        let module = module
            .checked_sub(1)
            .and_then(|index| process.modules.get(index))
            .ok_or_else(|| MemoryError::ModuleNotFound(format!("handle {}", module)))?;
        if module.path.is_empty() {
            return Err(MemoryError::WindowsApi(
                "module has no file name".to_string(),
            ));
        }
        Ok(copy_wide(&module.path, buffer))
    }

    fn allocate(&self, handle: SimHandle, size: usize) -> MemoryResult<Address> {
        let mut state = self.state.lock();
        let process = state.process_mut(handle)?;
        let rounded = (size as u64).div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let base = process
            .regions
            .range(ALLOCATION_BASE..)
            .next_back()
            .map(|(start, region)| {
                (start + region.data.len() as u64).div_ceil(PAGE_SIZE) * PAGE_SIZE
            })
            .unwrap_or(ALLOCATION_BASE);
        process.regions.insert(
            base,
            Region {
                data: vec![0u8; rounded as usize],
                writable: true,
            },
        );
        process.allocations.push(base);
        Ok(Address::new(base))
    }

    fn free(&self, handle: SimHandle, address: Address) -> MemoryResult<()> {
        let mut state = self.state.lock();
        let process = state.process_mut(handle)?;
        let position = process
            .allocations
            .iter()
            .position(|&base| base == address.as_u64())
            .ok_or_else(|| {
                MemoryError::AllocationFailed(format!("{} was not allocated", address))
            })?;
        process.allocations.swap_remove(position);
        process.regions.remove(&address.as_u64());
        Ok(())
    }
}

/// Lays out a minimal PE32 / PE32+ image with an export directory
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    bitness: Bitness,
    ordinal_base: u32,
    functions: Vec<u32>,
    names: Vec<(NameSource, u16)>,
    export_directory: bool,
}

#[derive(Debug, Clone)]
enum NameSource {
    Inline(String),
    Rva(u32),
}

const PE_HEADER_OFFSET: usize = 0x80;
const EXPORT_DIRECTORY_OFFSET: usize = 0x200;

impl ImageBuilder {
    /// Starts an image of the given width
    pub fn new(bitness: Bitness) -> Self {
        ImageBuilder {
            bitness,
            ordinal_base: 1,
            functions: Vec::new(),
            names: Vec::new(),
            export_directory: true,
        }
    }

    /// Sets the export ordinal base
    pub fn ordinal_base(mut self, base: u32) -> Self {
        self.ordinal_base = base;
        self
    }

    /// Adds a named export at `rva`
    pub fn export(mut self, name: &str, rva: u32) -> Self {
        let ordinal = self.functions.len() as u16;
        self.functions.push(rva);
        self.names.push((NameSource::Inline(name.to_string()), ordinal));
        self
    }

    /// Adds an export reachable only by ordinal
    pub fn unnamed_export(mut self, rva: u32) -> Self {
        self.functions.push(rva);
        self
    }

    /// Adds a name entry pointing at an arbitrary ordinal slot
    pub fn export_with_ordinal(mut self, name: &str, ordinal: u16) -> Self {
        self.names.push((NameSource::Inline(name.to_string()), ordinal));
        self
    }

    /// Adds an export whose name lives at an arbitrary RVA
    pub fn export_with_name_rva(mut self, name_rva: u32, rva: u32) -> Self {
        let ordinal = self.functions.len() as u16;
        self.functions.push(rva);
        self.names.push((NameSource::Rva(name_rva), ordinal));
        self
    }

    /// Leaves the export data directory empty
    pub fn without_export_directory(mut self) -> Self {
        self.export_directory = false;
        self
    }

    /// Produces the image bytes, padded to a page boundary
    pub fn build(&self) -> Vec<u8> {
        let mut image = vec![0u8; EXPORT_DIRECTORY_OFFSET + 40];
        image[0] = b'M';
        image[1] = b'Z';
        LittleEndian::write_u32(&mut image[0x3C..], PE_HEADER_OFFSET as u32);

        let pe = PE_HEADER_OFFSET;
        image[pe..pe + 4].copy_from_slice(b"PE\0\0");
        let (machine, optional_size, magic, directory_offset) = match self.bitness {
            Bitness::Width32 => (0x014Cu16, 0xE0u16, 0x10Bu16, 0x78usize),
            Bitness::Width64 => (0x8664u16, 0xF0u16, 0x20Bu16, 0x88usize),
        };
        LittleEndian::write_u16(&mut image[pe + 4..], machine);
        LittleEndian::write_u16(&mut image[pe + 20..], optional_size);
        LittleEndian::write_u16(&mut image[pe + 24..], magic);

        let functions_rva = image.len();
        for rva in &self.functions {
            let mut field = [0u8; 4];
            LittleEndian::write_u32(&mut field, *rva);
            image.extend_from_slice(&field);
        }
        let names_rva = image.len();
        image.resize(names_rva + self.names.len() * 4, 0);
        let ordinals_rva = image.len();
        for (_, ordinal) in &self.names {
            let mut field = [0u8; 2];
            LittleEndian::write_u16(&mut field, *ordinal);
            image.extend_from_slice(&field);
        }
        let module_name_rva = image.len();
        image.extend_from_slice(b"simulated.dll\0");
        for (index, (source, _)) in self.names.iter().enumerate() {
            let rva = match source {
                NameSource::Inline(name) => {
                    let rva = image.len() as u32;
                    image.extend_from_slice(name.as_bytes());
                    image.push(0);
                    rva
                }
                NameSource::Rva(rva) => *rva,
            };
            LittleEndian::write_u32(&mut image[names_rva + index * 4..], rva);
        }

        let directory = EXPORT_DIRECTORY_OFFSET;
        let fields = [
            0,
            0,
            0,
            module_name_rva as u32,
            self.ordinal_base,
            self.functions.len() as u32,
            self.names.len() as u32,
            functions_rva as u32,
            names_rva as u32,
            ordinals_rva as u32,
        ];
        for (index, value) in fields.iter().enumerate() {
            LittleEndian::write_u32(&mut image[directory + index * 4..], *value);
        }

        if self.export_directory {
            LittleEndian::write_u32(&mut image[pe + directory_offset..], directory as u32);
            LittleEndian::write_u32(&mut image[pe + directory_offset + 4..], 40);
        }

        let padded = (image.len() as u64).div_ceil(PAGE_SIZE) * PAGE_SIZE;
        image.resize(padded as usize, 0);
        image
    }
}
