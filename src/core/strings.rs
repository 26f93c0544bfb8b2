//! Null-terminated string copy used by every textual query.

/// Copies `src` into `dst` as a NUL-terminated string.
///
/// Returns the size needed to hold all of `src` plus the terminator. With no
/// buffer (or an empty one) nothing is written, so callers can query the size
/// first. A short buffer receives a truncated, still terminated, prefix.
pub fn copy_string(dst: Option<&mut [u8]>, src: &str) -> u64 {
    let bytes = src.as_bytes();
    let retval = bytes.len() as u64 + 1;

    if let Some(dst) = dst {
        if !dst.is_empty() {
            let n = bytes.len().min(dst.len() - 1);
            dst[..n].copy_from_slice(&bytes[..n]);
            dst[n] = 0;
        }
    }

    retval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_query() {
        assert_eq!(copy_string(None, "Plain"), 6);
        assert_eq!(copy_string(None, ""), 1);
    }

    #[test]
    fn test_full_copy() {
        let mut buf = [0xffu8; 8];
        assert_eq!(copy_string(Some(&mut buf[..]), "abc"), 4);
        assert_eq!(&buf[..4], b"abc\0");
    }

    #[test]
    fn test_truncated_copy_is_terminated() {
        let mut buf = [0xffu8; 3];
        assert_eq!(copy_string(Some(&mut buf[..]), "abcdef"), 7);
        assert_eq!(&buf, b"ab\0");
    }

    #[test]
    fn test_empty_buffer_untouched() {
        let mut buf: [u8; 0] = [];
        assert_eq!(copy_string(Some(&mut buf[..]), "abc"), 4);
    }
}
