//! Memory operations module for reading and writing process memory
//!
//! This module provides:
//! - Typed transfers with native or byte-swapped element order
//! - Multi-level pointer chain resolution
//! - Pooled scratch storage shared by every hot path

pub mod endian;
pub mod io;
pub mod plain;
pub mod pointer;
pub mod pool;

pub use endian::ByteOrder;
pub use io::MemoryIo;
pub use plain::Plain;
pub use pointer::PointerChain;
pub use pool::{BufferPool, PoolElement, PooledBuffer};
