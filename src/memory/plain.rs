//! Fixed-layout value types that can be copied to and from raw target bytes

use std::mem;
use std::slice;

/// A type whose every bit pattern is a valid value and whose layout has no
/// padding, so it can be filled straight from target memory.
///
/// # Safety
/// Implementors must be inhabited for every byte pattern of
/// `size_of::<Self>()` bytes and must not contain padding, references or
/// pointers into the controller's address space.
pub unsafe trait Plain: Copy + Send + Sync + 'static {
    /// Width of one byte-order lane; byte swapping reverses each lane
    const LANE: usize;
}

macro_rules! impl_plain {
    ($($ty:ty),* $(,)?) => {
        $(
            unsafe impl Plain for $ty {
                const LANE: usize = mem::size_of::<$ty>();
            }
        )*
    };
}

impl_plain!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, usize, isize, f32, f64);

unsafe impl<T: Plain, const N: usize> Plain for [T; N] {
    const LANE: usize = T::LANE;
}

/// View a slice of plain values as bytes
pub fn as_bytes<T: Plain>(values: &[T]) -> &[u8] {
    // SAFETY: Plain types have no padding, so every byte is initialized.
    unsafe { slice::from_raw_parts(values.as_ptr() as *const u8, mem::size_of_val(values)) }
}

/// View a mutable slice of plain values as bytes
pub fn as_bytes_mut<T: Plain>(values: &mut [T]) -> &mut [u8] {
    // SAFETY: any byte pattern written through the view is a valid T.
    unsafe {
        slice::from_raw_parts_mut(values.as_mut_ptr() as *mut u8, mem::size_of_val(values))
    }
}

/// Decode one value from the front of `bytes`
///
/// Returns `None` if `bytes` is shorter than `T`.
pub fn from_bytes<T: Plain>(bytes: &[u8]) -> Option<T> {
    if bytes.len() < mem::size_of::<T>() {
        return None;
    }
    // SAFETY: length checked above; Plain accepts any bit pattern.
    Some(unsafe { (bytes.as_ptr() as *const T).read_unaligned() })
}
