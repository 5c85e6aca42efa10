//! Grow-and-retry buffer negotiation for "bytes needed" enumeration calls

use crate::core::types::{MemoryError, MemoryResult};
use crate::memory::pool::{BufferPool, PooledBuffer};
use serde::{Deserialize, Serialize};
use std::mem;
use tracing::debug;

/// Default number of primitive invocations before giving up
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Initial buffer sizes and the retry bound for enumeration calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumerationLimits {
    /// Process ids leased for the first enumeration attempt
    pub process_seed: usize,
    /// Module handles leased for the first enumeration attempt
    pub module_seed: usize,
    /// Total primitive invocations allowed per enumeration
    pub max_attempts: usize,
}

impl Default for EnumerationLimits {
    fn default() -> Self {
        EnumerationLimits {
            process_seed: 1024,
            module_seed: 256,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Run `call` against a pooled buffer until the result fits.
///
/// `call` fills as much of the buffer as it can and returns the number of
/// bytes the full result needs. When that exceeds the lease, the lease is
/// released and a larger one (rounded up to a power of two) is tried. The
/// returned buffer is truncated to the reported element count.
pub fn negotiate<'p, T, F>(
    pool: &'p BufferPool<T>,
    seed: usize,
    max_attempts: usize,
    mut call: F,
) -> MemoryResult<PooledBuffer<'p, T>>
where
    T: Copy + Default,
    F: FnMut(&mut [T]) -> MemoryResult<usize>,
{
    if max_attempts == 0 {
        return Err(MemoryError::invalid_argument(
            "enumeration needs at least one attempt",
        ));
    }

    let element = mem::size_of::<T>().max(1);
    let mut capacity = seed;
    for attempt in 1..=max_attempts {
        let mut buffer = pool.lease(capacity)?;
        let needed_bytes = call(buffer.as_mut_slice()?)?;
        let needed = needed_bytes.div_ceil(element);
        if needed <= capacity {
            buffer.truncate(needed);
            return Ok(buffer);
        }

        debug!(
            "Enumeration attempt {} needs {} elements, had {}",
            attempt, needed, capacity
        );
        buffer.release()?;
        capacity = needed.next_power_of_two();
    }

    Err(MemoryError::RetryExhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ErrorKind;

    #[test]
    fn test_fits_first_time() {
        let pool = BufferPool::<u32>::default();
        let mut calls = 0;
        let buffer = negotiate(&pool, 8, 3, |slots| {
            calls += 1;
            slots[..3].copy_from_slice(&[10, 20, 30]);
            Ok(3 * 4)
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(buffer.as_slice().unwrap(), &[10, 20, 30]);
    }

    #[test]
    fn test_grows_to_power_of_two() {
        let pool = BufferPool::<u32>::default();
        let mut seen = Vec::new();
        let buffer = negotiate(&pool, 2, 3, |slots| {
            seen.push(slots.len());
            let total = 5;
            for (index, slot) in slots.iter_mut().take(total).enumerate() {
                *slot = index as u32;
            }
            Ok(total * 4)
        })
        .unwrap();
        assert_eq!(seen, vec![2, 8]);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_converges_within_two_growths() {
        let pool = BufferPool::<usize>::default();
        // The target keeps growing between the first two calls
        let required = [3usize, 7, 7];
        let mut calls = 0;
        let buffer = negotiate(&pool, 1, 3, |_| {
            let needed = required[calls];
            calls += 1;
            Ok(needed * mem::size_of::<usize>())
        })
        .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(buffer.len(), 7);
    }

    #[test]
    fn test_never_converging_stops_at_bound() {
        let pool = BufferPool::<u32>::default();
        let mut calls = 0;
        let err = negotiate(&pool, 1, 3, |slots| {
            calls += 1;
            Ok((slots.len() + 1) * 4)
        })
        .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(err.kind(), ErrorKind::RetryExhausted);
        assert!(matches!(err, MemoryError::RetryExhausted { attempts: 3 }));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_primitive_failure_propagates() {
        let pool = BufferPool::<u32>::default();
        let mut calls = 0;
        let err = negotiate(&pool, 4, 3, |_| {
            calls += 1;
            Err(MemoryError::EnumerationFailed("boom".to_string()))
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, MemoryError::EnumerationFailed(_)));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_invalid_bounds() {
        let pool = BufferPool::<u32>::default();
        assert!(negotiate(&pool, 0, 3, |_| Ok(0)).unwrap_err().is_usage());
        assert!(negotiate(&pool, 4, 0, |_| Ok(0)).unwrap_err().is_usage());
    }

    #[test]
    fn test_limits_default() {
        let limits = EnumerationLimits::default();
        assert_eq!(limits.max_attempts, 3);
        assert_eq!(limits.process_seed, 1024);
        assert_eq!(limits.module_seed, 256);
    }
}
