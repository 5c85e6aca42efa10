//! Export directory parsing and lazy symbol enumeration

use super::headers::{structural, ImageHeaders};
use crate::core::types::{Address, Bitness, MemoryError, MemoryResult, Symbol};
use crate::memory::pool::{self, PoolElement, PooledBuffer};
use crate::memory::{ByteOrder, MemoryIo, Plain};
use crate::platform::Platform;
use byteorder::{ByteOrder as _, LittleEndian};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Size of `IMAGE_EXPORT_DIRECTORY` in bytes
pub const EXPORT_DIRECTORY_LEN: usize = 40;

/// Bounds applied while parsing export tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportLimits {
    /// Longest export name read, in bytes
    pub max_name_length: usize,
    /// Function or name counts above this mark the image as malformed
    pub max_export_count: u32,
}

impl Default for ExportLimits {
    fn default() -> Self {
        ExportLimits {
            max_name_length: 255,
            max_export_count: 65536,
        }
    }
}

/// Decoded `IMAGE_EXPORT_DIRECTORY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ExportDirectory {
    pub name_rva: u32,
    pub ordinal_base: u32,
    pub function_count: u32,
    pub name_count: u32,
    pub functions_rva: u32,
    pub names_rva: u32,
    pub ordinals_rva: u32,
}

impl ExportDirectory {
    /// Decode the ten little-endian fields of a raw directory
    pub fn decode(raw: &[u8; EXPORT_DIRECTORY_LEN]) -> Self {
        let field = |index: usize| LittleEndian::read_u32(&raw[index * 4..]);
        ExportDirectory {
            name_rva: field(3),
            ordinal_base: field(4),
            function_count: field(5),
            name_count: field(6),
            functions_rva: field(7),
            names_rva: field(8),
            ordinals_rva: field(9),
        }
    }

    /// Read the directory the headers point at
    pub fn read<P: Platform>(io: &MemoryIo<'_, P>, headers: &ImageHeaders) -> MemoryResult<Self> {
        let mut raw = [0u8; EXPORT_DIRECTORY_LEN];
        io.read_exact(headers.export_directory(), &mut raw)
            .map_err(|err| structural(headers.base, "export directory", err))?;
        Ok(Self::decode(&raw))
    }
}

/// The parsed export tables of one module image
pub struct ExportTable<'s, P: Platform> {
    io: MemoryIo<'s, P>,
    base: Address,
    bitness: Bitness,
    directory: ExportDirectory,
    functions: Option<PooledBuffer<'static, u32>>,
    names: Option<PooledBuffer<'static, u32>>,
    ordinals: Option<PooledBuffer<'static, u16>>,
    max_name_length: usize,
}

impl<'s, P: Platform> ExportTable<'s, P> {
    /// Parse headers, directory and the three export arrays of the image at `base`
    pub fn parse(io: MemoryIo<'s, P>, base: Address, limits: &ExportLimits) -> MemoryResult<Self> {
        let headers = ImageHeaders::read(&io, base)?;
        let directory = ExportDirectory::read(&io, &headers)?;

        if directory.function_count > limits.max_export_count
            || directory.name_count > limits.max_export_count
        {
            return Err(MemoryError::malformed_image(
                base,
                format!(
                    "{} functions / {} names exceeds the limit of {}",
                    directory.function_count, directory.name_count, limits.max_export_count
                ),
            ));
        }

        let functions = read_table(
            &io,
            base,
            directory.functions_rva,
            directory.function_count,
            "function table",
        )?;
        let names = read_table(
            &io,
            base,
            directory.names_rva,
            directory.name_count,
            "name table",
        )?;
        let ordinals = read_table(
            &io,
            base,
            directory.ordinals_rva,
            directory.name_count,
            "ordinal table",
        )?;

        Ok(ExportTable {
            io,
            base,
            bitness: headers.bitness,
            directory,
            functions,
            names,
            ordinals,
            max_name_length: limits.max_name_length,
        })
    }

    /// The decoded export directory
    pub fn directory(&self) -> &ExportDirectory {
        &self.directory
    }

    /// Width of the image, which may differ from the process
    pub fn bitness(&self) -> Bitness {
        self.bitness
    }

    /// Image base address
    pub fn base(&self) -> Address {
        self.base
    }

    /// Internal name recorded in the export directory
    pub fn module_name(&self) -> MemoryResult<String> {
        self.io
            .read_c_string(self.base.add_rva(self.directory.name_rva), self.max_name_length)
    }

    /// Address of the export with the given biased ordinal
    pub fn by_ordinal(&self, ordinal: u32) -> Option<Address> {
        let index = ordinal.checked_sub(self.directory.ordinal_base)?;
        let rva = *entries(&self.functions).get(index as usize)?;
        (rva != 0).then(|| self.base.add_rva(rva).narrow(self.bitness))
    }

    /// Look up a named export; names are compared exactly
    pub fn find(&self, name: &str) -> Option<Symbol> {
        (0..self.directory.name_count as usize)
            .filter_map(|index| self.symbol_at(index).ok())
            .find(|symbol| symbol.name == name)
    }

    /// Lazily walk the named exports in name-table order
    pub fn symbols(self) -> Exports<'s, P> {
        Exports {
            table: Some(self),
            cursor: 0,
        }
    }

    fn symbol_at(&self, index: usize) -> MemoryResult<Symbol> {
        let ordinal = entries(&self.ordinals)
            .get(index)
            .copied()
            .ok_or_else(|| MemoryError::malformed_image(self.base, "ordinal table too short"))?
            as u32;
        let rva = *entries(&self.functions).get(ordinal as usize).ok_or_else(|| {
            MemoryError::malformed_image(
                self.base,
                format!(
                    "ordinal {} outside {} functions",
                    ordinal, self.directory.function_count
                ),
            )
        })?;
        if rva == 0 {
            return Err(MemoryError::malformed_image(
                self.base,
                format!("ordinal {} has an empty function slot", ordinal),
            ));
        }
        let name_rva = *entries(&self.names)
            .get(index)
            .ok_or_else(|| MemoryError::malformed_image(self.base, "name table too short"))?;

        let name = self
            .io
            .read_c_string(self.base.add_rva(name_rva), self.max_name_length)?;

        Ok(Symbol {
            name,
            address: self.base.add_rva(rva).narrow(self.bitness),
            ordinal: self.directory.ordinal_base.wrapping_add(ordinal),
        })
    }
}

/// Cursor over the named exports of one image.
///
/// Entries whose name cannot be read or whose ordinal is out of range are
/// skipped individually.
pub struct Exports<'s, P: Platform> {
    table: Option<ExportTable<'s, P>>,
    cursor: usize,
}

impl<'s, P: Platform> Exports<'s, P> {
    /// A sequence that yields nothing
    pub fn empty() -> Self {
        Exports {
            table: None,
            cursor: 0,
        }
    }

    /// The table being walked, if the image parsed
    pub fn table(&self) -> Option<&ExportTable<'s, P>> {
        self.table.as_ref()
    }
}

impl<'s, P: Platform> Iterator for Exports<'s, P> {
    type Item = Symbol;

    fn next(&mut self) -> Option<Symbol> {
        let table = self.table.as_ref()?;
        while self.cursor < table.directory.name_count as usize {
            let index = self.cursor;
            self.cursor += 1;
            match table.symbol_at(index) {
                Ok(symbol) => return Some(symbol),
                Err(err) => debug!("Skipping export {} of {}: {}", index, table.base, err),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .table
            .as_ref()
            .map(|t| (t.directory.name_count as usize).saturating_sub(self.cursor))
            .unwrap_or(0);
        (0, Some(remaining))
    }
}

fn entries<'a, T: Copy + Default>(buffer: &'a Option<PooledBuffer<'static, T>>) -> &'a [T] {
    buffer
        .as_ref()
        .and_then(|b| b.as_slice().ok())
        .unwrap_or(&[])
}

fn read_table<P: Platform, T: Plain + PoolElement>(
    io: &MemoryIo<'_, P>,
    base: Address,
    rva: u32,
    count: u32,
    what: &str,
) -> MemoryResult<Option<PooledBuffer<'static, T>>> {
    if count == 0 {
        return Ok(None);
    }
    let mut buffer = pool::shared::<T>().lease(count as usize)?;
    io.read_into_ordered(
        base.add_rva(rva),
        buffer.as_mut_slice()?,
        ByteOrder::little_endian(),
    )
    .map_err(|err| structural(base, what, err))?;
    Ok(Some(buffer))
}
