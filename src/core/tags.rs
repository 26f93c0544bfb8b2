//! Tag convention for handles.
//!
//! The 8 most significant bits identify the infrastructure class of a handle.
//! The remaining 56 bits belong to backends, which use them to tell payload
//! kinds apart (e.g. "output of encode" vs "output of encrypt"). A backend tag
//! may be OR-ed onto [`ENGINE_OBJECT`] freely and may carry several bits at once.

use crate::{BridgeError, BridgeResult};

pub const ENGINE: u64 = 1 << 63;
pub const BENCHMARK: u64 = 1 << 62;
pub const ENGINE_OBJECT: u64 = 1 << 61;
pub const BENCHMARK_DESCRIPTOR: u64 = 1 << 60;

pub const RESERVED_MASK: u64 = 0xFF << 56;

/// True if every bit of `class_bits` is present in `tag`.
pub fn has_class(tag: u64, class_bits: u64) -> bool {
    (tag & class_bits) == class_bits
}

pub fn touches_reserved(tag: u64) -> bool {
    tag & RESERVED_MASK != 0
}

/// Rejects a backend-supplied tag that touches infrastructure bits.
pub fn assert_no_reserved_bits(candidate: u64) -> BridgeResult<()> {
    if touches_reserved(candidate) {
        return Err(BridgeError::critical(format!(
            "invalid tag {candidate:#x}: most significant 8 bits of tags are reserved"
        )));
    }
    Ok(())
}
