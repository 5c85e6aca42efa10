//! Export table resolution for PE32 and PE32+ images mapped in a target
//!
//! Only the structures needed to walk named exports are read: the DOS
//! header's PE offset, the optional header magic and the export data
//! directory.

pub mod exports;
pub mod headers;

pub use exports::{ExportDirectory, ExportLimits, ExportTable, Exports};
pub use headers::ImageHeaders;
