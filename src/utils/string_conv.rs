//! String conversion utilities for UTF-16 paths returned by the OS

/// Convert a wide string (UTF-16) to a Rust string, stopping at the first NUL
pub fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

/// Extract filename from full path
pub fn extract_filename(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}
