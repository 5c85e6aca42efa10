//! Reusable scratch storage leased in scoped, release-once handles
//!
//! Hot paths (pointer hops, export-name reads, enumeration retries) draw
//! their scratch space from here instead of allocating per call. A
//! [`PooledBuffer`] is either backed by a [`BufferPool`] or wraps storage
//! the caller already owns, typically a small stack array.

use crate::core::types::{MemoryError, MemoryResult};
use parking_lot::Mutex;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Buffers retained per pool after release
pub const DEFAULT_MAX_RETAINED: usize = 32;
/// Largest buffer, in elements, a pool keeps after release
pub const DEFAULT_MAX_RETAINED_LEN: usize = 1 << 20;

lazy_static::lazy_static! {
    static ref BYTE_POOL: BufferPool<u8> = BufferPool::default();
    static ref WORD_POOL: BufferPool<u16> = BufferPool::default();
    static ref DWORD_POOL: BufferPool<u32> = BufferPool::default();
    static ref HANDLE_POOL: BufferPool<usize> = BufferPool::default();
}

/// Element types that have a process-wide shared pool
pub trait PoolElement: Copy + Default + Send + 'static {
    /// The shared pool for this element type
    fn shared_pool() -> &'static BufferPool<Self>;
}

impl PoolElement for u8 {
    fn shared_pool() -> &'static BufferPool<Self> {
        &BYTE_POOL
    }
}

impl PoolElement for u16 {
    fn shared_pool() -> &'static BufferPool<Self> {
        &WORD_POOL
    }
}

impl PoolElement for u32 {
    fn shared_pool() -> &'static BufferPool<Self> {
        &DWORD_POOL
    }
}

impl PoolElement for usize {
    fn shared_pool() -> &'static BufferPool<Self> {
        &HANDLE_POOL
    }
}

/// Process-wide pool for `T`
pub fn shared<T: PoolElement>() -> &'static BufferPool<T> {
    T::shared_pool()
}

/// Thread-safe free list of reusable buffers
#[derive(Debug)]
pub struct BufferPool<T> {
    free: Mutex<Vec<Vec<T>>>,
    outstanding: AtomicUsize,
    max_retained: usize,
    max_retained_len: usize,
}

impl<T: Copy + Default> Default for BufferPool<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETAINED, DEFAULT_MAX_RETAINED_LEN)
    }
}

impl<T: Copy + Default> BufferPool<T> {
    /// Create a pool that retains at most `max_retained` buffers of at most
    /// `max_retained_len` elements each
    pub fn new(max_retained: usize, max_retained_len: usize) -> Self {
        BufferPool {
            free: Mutex::new(Vec::new()),
            outstanding: AtomicUsize::new(0),
            max_retained,
            max_retained_len,
        }
    }

    /// Lease a zero-filled buffer of `len` elements
    pub fn lease(&self, len: usize) -> MemoryResult<PooledBuffer<'_, T>> {
        if len == 0 {
            return Err(MemoryError::invalid_argument(
                "cannot lease a zero-length buffer",
            ));
        }

        let reused = {
            let mut free = self.free.lock();
            let best_fit = free
                .iter()
                .enumerate()
                .filter(|(_, buffer)| buffer.capacity() >= len)
                .min_by_key(|(_, buffer)| buffer.capacity())
                .map(|(index, _)| index);
            best_fit.map(|index| free.swap_remove(index))
        };

        let mut data = reused.unwrap_or_else(|| Vec::with_capacity(len.next_power_of_two()));
        data.clear();
        data.resize(len, T::default());

        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Ok(PooledBuffer {
            storage: Storage::Pooled { data, pool: self },
            len,
        })
    }

    /// Leases not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Buffers currently held on the free list
    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }

    fn give_back(&self, data: Vec<T>) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        if data.capacity() > self.max_retained_len {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(data);
        }
    }
}

#[derive(Debug)]
enum Storage<'a, T> {
    Pooled { data: Vec<T>, pool: &'a BufferPool<T> },
    Borrowed(&'a mut [T]),
    Released,
}

/// A scoped lease of contiguous scratch storage.
///
/// Released exactly once, either explicitly through [`PooledBuffer::release`]
/// or on drop. Any access after release fails with
/// [`MemoryError::BufferReleased`].
#[derive(Debug)]
pub struct PooledBuffer<'a, T: Copy + Default> {
    storage: Storage<'a, T>,
    len: usize,
}

impl<'a, T: Copy + Default> PooledBuffer<'a, T> {
    /// Wrap caller-supplied storage; releasing it is a no-op
    pub fn wrap(storage: &'a mut [T]) -> MemoryResult<Self> {
        if storage.is_empty() {
            return Err(MemoryError::invalid_argument(
                "cannot wrap a zero-length buffer",
            ));
        }
        let len = storage.len();
        Ok(PooledBuffer {
            storage: Storage::Borrowed(storage),
            len,
        })
    }

    /// Logical length in elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the logical length is zero
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the storage came from a pool
    pub fn is_pooled(&self) -> bool {
        matches!(self.storage, Storage::Pooled { .. })
    }

    /// Whether this lease has been released
    pub fn is_released(&self) -> bool {
        matches!(self.storage, Storage::Released)
    }

    /// Shrink the logical length; never grows
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// View the logical contents
    pub fn as_slice(&self) -> MemoryResult<&[T]> {
        match &self.storage {
            Storage::Pooled { data, .. } => Ok(&data[..self.len]),
            Storage::Borrowed(data) => Ok(&data[..self.len]),
            Storage::Released => Err(MemoryError::BufferReleased),
        }
    }

    /// Mutable view of the logical contents
    pub fn as_mut_slice(&mut self) -> MemoryResult<&mut [T]> {
        let len = self.len;
        match &mut self.storage {
            Storage::Pooled { data, .. } => Ok(&mut data[..len]),
            Storage::Borrowed(data) => Ok(&mut data[..len]),
            Storage::Released => Err(MemoryError::BufferReleased),
        }
    }

    /// Return the storage to its owner
    pub fn release(&mut self) -> MemoryResult<()> {
        match mem::replace(&mut self.storage, Storage::Released) {
            Storage::Pooled { data, pool } => {
                pool.give_back(data);
                Ok(())
            }
            Storage::Borrowed(_) => Ok(()),
            Storage::Released => Err(MemoryError::BufferReleased),
        }
    }
}

impl<'a, T: Copy + Default> Drop for PooledBuffer<'a, T> {
    fn drop(&mut self) {
        if !self.is_released() {
            let _ = self.release();
        }
    }
}
