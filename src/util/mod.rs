//! Utility module
//!
//! This module provides common utilities and helper functions used
//! throughout the library.

use tracing::Level;

/// Swaps every pair of bytes in place, converting 16-bit samples between
/// network and host output byte order
///
/// A trailing odd byte is left untouched.
pub fn swap_bytes_16(buf: &mut [u8]) {
    for pair in buf.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

/// Installs a fmt subscriber at `level`
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_twice_restores_buffer() {
        let original: Vec<u8> = (0..=255).collect();
        let mut buf = original.clone();
        swap_bytes_16(&mut buf);
        assert_ne!(buf, original);
        assert_eq!(&buf[..4], &[1, 0, 3, 2]);
        swap_bytes_16(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_odd_trailing_byte_untouched() {
        let mut buf = [0x10, 0x20, 0x30];
        swap_bytes_16(&mut buf);
        assert_eq!(buf, [0x20, 0x10, 0x30]);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let _ = init_tracing(Level::DEBUG);
        assert!(!init_tracing(Level::INFO));
    }
}
