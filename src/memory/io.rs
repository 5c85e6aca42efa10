//! Typed reads and writes against a target process

use super::endian::ByteOrder;
use super::plain::{self, Plain};
use super::pool::{self, PooledBuffer};
use crate::core::types::{
    Address, Bitness, MemoryError, MemoryResult, MemoryValue, ValueType,
};
use crate::platform::Platform;
use std::mem;
use std::slice;

/// Transfers up to this many bytes use stack scratch instead of the pool
pub const STACK_SCRATCH_LEN: usize = 64;

/// Memory access through one open handle
pub struct MemoryIo<'a, P: Platform> {
    platform: &'a P,
    handle: P::Handle,
}

impl<'a, P: Platform> Clone for MemoryIo<'a, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, P: Platform> Copy for MemoryIo<'a, P> {}

impl<'a, P: Platform> MemoryIo<'a, P> {
    /// Create an accessor over an already opened handle
    pub fn new(platform: &'a P, handle: P::Handle) -> Self {
        MemoryIo { platform, handle }
    }

    /// The platform backing this accessor
    pub fn platform(&self) -> &'a P {
        self.platform
    }

    /// The raw handle used for every transfer
    pub fn handle(&self) -> P::Handle {
        self.handle
    }

    /// Fill `buffer` completely from `address`
    pub fn read_exact(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<()> {
        if buffer.is_empty() {
            return Err(MemoryError::invalid_argument("zero-length read"));
        }
        let transferred = self.platform.read_memory(self.handle, address, buffer)?;
        if transferred < buffer.len() {
            return Err(MemoryError::partial_transfer(
                address,
                buffer.len(),
                transferred,
            ));
        }
        Ok(())
    }

    /// Read `len` bytes into a new vector
    pub fn read_bytes(&self, address: Address, len: usize) -> MemoryResult<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        self.read_exact(address, &mut bytes)?;
        Ok(bytes)
    }

    /// Write all of `data` at `address`
    pub fn write_bytes(&self, address: Address, data: &[u8]) -> MemoryResult<()> {
        if data.is_empty() {
            return Err(MemoryError::invalid_argument("zero-length write"));
        }
        let transferred = self.platform.write_memory(self.handle, address, data)?;
        if transferred < data.len() {
            return Err(MemoryError::partial_transfer(
                address,
                data.len(),
                transferred,
            ));
        }
        Ok(())
    }

    /// Read one value in the given byte order
    pub fn read_ordered<T: Plain>(&self, address: Address, order: ByteOrder) -> MemoryResult<T> {
        with_scratch(mem::size_of::<T>(), |scratch| {
            self.read_exact(address, scratch)?;
            order.apply(scratch, T::LANE);
            plain::from_bytes(scratch)
                .ok_or_else(|| MemoryError::invalid_argument("scratch shorter than value"))
        })
    }

    /// Read one value in controller byte order
    pub fn read<T: Plain>(&self, address: Address) -> MemoryResult<T> {
        self.read_ordered(address, ByteOrder::Native)
    }

    /// Read one value and reverse its bytes
    pub fn read_swapped<T: Plain>(&self, address: Address) -> MemoryResult<T> {
        self.read_ordered(address, ByteOrder::Swapped)
    }

    /// Fill `values` from consecutive target memory in the given byte order
    pub fn read_into_ordered<T: Plain>(
        &self,
        address: Address,
        values: &mut [T],
        order: ByteOrder,
    ) -> MemoryResult<()> {
        let bytes = plain::as_bytes_mut(values);
        self.read_exact(address, bytes)?;
        order.apply(bytes, T::LANE);
        Ok(())
    }

    /// Fill `values` from consecutive target memory
    pub fn read_into<T: Plain>(&self, address: Address, values: &mut [T]) -> MemoryResult<()> {
        self.read_into_ordered(address, values, ByteOrder::Native)
    }

    /// Fill `values` and reverse the bytes of each element
    pub fn read_into_swapped<T: Plain>(
        &self,
        address: Address,
        values: &mut [T],
    ) -> MemoryResult<()> {
        self.read_into_ordered(address, values, ByteOrder::Swapped)
    }

    /// Write one value in the given byte order
    pub fn write_ordered<T: Plain>(
        &self,
        address: Address,
        value: T,
        order: ByteOrder,
    ) -> MemoryResult<()> {
        self.write_from_ordered(address, slice::from_ref(&value), order)
    }

    /// Write one value in controller byte order
    pub fn write<T: Plain>(&self, address: Address, value: T) -> MemoryResult<()> {
        self.write_ordered(address, value, ByteOrder::Native)
    }

    /// Reverse the bytes of `value` and write it
    pub fn write_swapped<T: Plain>(&self, address: Address, value: T) -> MemoryResult<()> {
        self.write_ordered(address, value, ByteOrder::Swapped)
    }

    /// Write `values` contiguously in the given byte order
    pub fn write_from_ordered<T: Plain>(
        &self,
        address: Address,
        values: &[T],
        order: ByteOrder,
    ) -> MemoryResult<()> {
        let bytes = plain::as_bytes(values);
        if order == ByteOrder::Native || T::LANE < 2 {
            return self.write_bytes(address, bytes);
        }
        with_scratch(bytes.len(), |scratch| {
            scratch.copy_from_slice(bytes);
            order.apply(scratch, T::LANE);
            self.write_bytes(address, scratch)
        })
    }

    /// Write `values` contiguously
    pub fn write_from<T: Plain>(&self, address: Address, values: &[T]) -> MemoryResult<()> {
        self.write_from_ordered(address, values, ByteOrder::Native)
    }

    /// Write `values` with the bytes of each element reversed
    pub fn write_from_swapped<T: Plain>(&self, address: Address, values: &[T]) -> MemoryResult<()> {
        self.write_from_ordered(address, values, ByteOrder::Swapped)
    }

    /// Read a NUL-terminated string of at most `max_len` bytes.
    ///
    /// A short transfer is accepted when the bytes that did arrive contain
    /// the terminator. A full read without one is cut at `max_len`.
    pub fn read_c_string(&self, address: Address, max_len: usize) -> MemoryResult<String> {
        if max_len == 0 {
            return Err(MemoryError::invalid_argument("zero-length string read"));
        }
        with_scratch(max_len, |scratch| {
            let transferred = self.platform.read_memory(self.handle, address, scratch)?;
            let data = &scratch[..transferred];
            match data.iter().position(|&b| b == 0) {
                Some(end) => Ok(String::from_utf8_lossy(&data[..end]).into_owned()),
                None if transferred == max_len => Ok(String::from_utf8_lossy(data).into_owned()),
                None => Err(MemoryError::partial_transfer(address, max_len, transferred)),
            }
        })
    }

    /// Read a pointer of the given width
    pub fn read_pointer(
        &self,
        address: Address,
        bitness: Bitness,
        order: ByteOrder,
    ) -> MemoryResult<Address> {
        match bitness {
            Bitness::Width32 => self.read_ordered::<u32>(address, order).map(Address::from),
            Bitness::Width64 => self.read_ordered::<u64>(address, order).map(Address::from),
        }
    }

    /// Read a scalar whose type is chosen at runtime
    pub fn read_value(
        &self,
        address: Address,
        value_type: ValueType,
        order: ByteOrder,
    ) -> MemoryResult<MemoryValue> {
        Ok(match value_type {
            ValueType::I8 => MemoryValue::I8(self.read_ordered(address, order)?),
            ValueType::I16 => MemoryValue::I16(self.read_ordered(address, order)?),
            ValueType::I32 => MemoryValue::I32(self.read_ordered(address, order)?),
            ValueType::I64 => MemoryValue::I64(self.read_ordered(address, order)?),
            ValueType::U8 => MemoryValue::U8(self.read_ordered(address, order)?),
            ValueType::U16 => MemoryValue::U16(self.read_ordered(address, order)?),
            ValueType::U32 => MemoryValue::U32(self.read_ordered(address, order)?),
            ValueType::U64 => MemoryValue::U64(self.read_ordered(address, order)?),
            ValueType::F32 => MemoryValue::F32(self.read_ordered(address, order)?),
            ValueType::F64 => MemoryValue::F64(self.read_ordered(address, order)?),
        })
    }
}

/// Run `f` over `len` bytes of zeroed scratch, released before returning
fn with_scratch<R>(
    len: usize,
    f: impl FnOnce(&mut [u8]) -> MemoryResult<R>,
) -> MemoryResult<R> {
    let mut stack = [0u8; STACK_SCRATCH_LEN];
    let mut scratch = if len <= STACK_SCRATCH_LEN {
        PooledBuffer::wrap(&mut stack[..len])?
    } else {
        pool::shared::<u8>().lease(len)?
    };
    let result = f(scratch.as_mut_slice()?);
    scratch.release()?;
    result
}
