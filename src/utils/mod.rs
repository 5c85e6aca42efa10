//! Small helpers shared by the process and platform layers

pub mod string_conv;

pub use string_conv::{extract_filename, wide_to_string};
