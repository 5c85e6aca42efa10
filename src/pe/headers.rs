//! PE header fields needed to locate a module's export directory

use crate::core::types::{Address, Bitness, MemoryError, MemoryResult};
use crate::memory::{ByteOrder, MemoryIo, Plain};
use crate::platform::Platform;

/// Offset of `e_lfanew` in the DOS header
pub const PE_POINTER_OFFSET: i64 = 0x3C;
/// Offset of the optional header magic from the PE signature
pub const MAGIC_OFFSET: i64 = 24;
/// Optional header magic of a 64-bit image
pub const PE32_PLUS_MAGIC: u16 = 0x20B;
/// Export data directory offset from the PE signature, 32-bit images
pub const EXPORT_DIRECTORY_OFFSET_32: i64 = 0x78;
/// Export data directory offset from the PE signature, 64-bit images
pub const EXPORT_DIRECTORY_OFFSET_64: i64 = 0x88;

/// Header fields of one mapped image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeaders {
    pub base: Address,
    pub pe_header: Address,
    pub bitness: Bitness,
    pub export_rva: u32,
    pub export_size: u32,
}

impl ImageHeaders {
    /// Walk the DOS and PE headers of the image mapped at `base`.
    ///
    /// The image's own width decides where the export directory entry
    /// lives; a 32-bit module inside a 64-bit process is parsed as 32-bit.
    pub fn read<P: Platform>(io: &MemoryIo<'_, P>, base: Address) -> MemoryResult<Self> {
        let pe_offset: u32 = read_field(io, base, base.offset(PE_POINTER_OFFSET), "PE offset")?;
        let pe_header = base.add_rva(pe_offset);

        let magic: u16 = read_field(io, base, pe_header.offset(MAGIC_OFFSET), "magic")?;
        let (bitness, directory) = if magic == PE32_PLUS_MAGIC {
            (Bitness::Width64, EXPORT_DIRECTORY_OFFSET_64)
        } else {
            (Bitness::Width32, EXPORT_DIRECTORY_OFFSET_32)
        };

        let [export_rva, export_size]: [u32; 2] =
            read_field(io, base, pe_header.offset(directory), "export data directory")?;
        if export_rva == 0 {
            return Err(MemoryError::malformed_image(base, "no export directory"));
        }

        Ok(ImageHeaders {
            base,
            pe_header,
            bitness,
            export_rva,
            export_size,
        })
    }

    /// Absolute address of the export directory
    pub fn export_directory(&self) -> Address {
        self.base.add_rva(self.export_rva)
    }
}

/// Read a little-endian header field, reporting failures as a malformed image
pub(crate) fn read_field<P: Platform, T: Plain>(
    io: &MemoryIo<'_, P>,
    base: Address,
    address: Address,
    what: &str,
) -> MemoryResult<T> {
    io.read_ordered(address, ByteOrder::little_endian())
        .map_err(|err| structural(base, what, err))
}

/// Convert a read failure inside an image into a structural error
pub(crate) fn structural(base: Address, what: &str, err: MemoryError) -> MemoryError {
    if err.is_usage() {
        return err;
    }
    MemoryError::malformed_image(base, format!("cannot read {}: {}", what, err))
}
