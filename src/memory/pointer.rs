//! Multi-level pointer chain resolution

use super::endian::ByteOrder;
use super::io::MemoryIo;
use super::plain::Plain;
use crate::core::types::{Address, Bitness, MemoryError, MemoryResult};
use crate::platform::Platform;
use tracing::trace;

/// Follows `[[start] + o1] + o2 ...` through target memory
pub struct PointerChain<'a, P: Platform> {
    io: MemoryIo<'a, P>,
    bitness: Bitness,
    order: ByteOrder,
}

impl<'a, P: Platform> PointerChain<'a, P> {
    /// Resolver reading pointers of `bitness` width in controller byte order
    pub fn new(io: MemoryIo<'a, P>, bitness: Bitness) -> Self {
        PointerChain {
            io,
            bitness,
            order: ByteOrder::Native,
        }
    }

    /// Read every hop and the final value with the given byte order
    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// Read every hop and the final value byte-swapped
    pub fn swapped(self) -> Self {
        self.with_order(ByteOrder::Swapped)
    }

    /// Resolve the final address.
    ///
    /// Each offset dereferences the current address and adds the offset to
    /// the pointer found there. An empty offset list returns `start`.
    pub fn resolve(&self, start: Address, offsets: &[i64]) -> MemoryResult<Address> {
        let mut current = start;
        for (level, &offset) in offsets.iter().enumerate() {
            let pointer = match self.io.read_pointer(current, self.bitness, self.order) {
                Ok(pointer) => pointer,
                Err(err) if err.is_usage() => return Err(err),
                Err(err) => {
                    return Err(MemoryError::pointer_chain_broken(
                        level,
                        format!("read at {} failed: {}", current, err),
                    ))
                }
            };
            if pointer.is_null() {
                return Err(MemoryError::pointer_chain_broken(
                    level,
                    format!("null pointer at {}", current),
                ));
            }

            let next = pointer.offset(offset).narrow(self.bitness);
            trace!("hop {}: [{}] = {} {:+#x} -> {}", level, current, pointer, offset, next);
            current = next;
        }
        Ok(current)
    }

    /// Resolve the chain and read a value at the final address
    pub fn read<T: Plain>(&self, start: Address, offsets: &[i64]) -> MemoryResult<T> {
        let address = self.resolve(start, offsets)?;
        self.io.read_ordered(address, self.order)
    }
}
