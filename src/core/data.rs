//! Borrowed views over host-native packed data.
//!
//! The host hands the backend a [`DataPackCollection`] of raw pointers. The
//! `from_raw` constructors here are the only place those pointers become
//! slices; everything downstream works with safe `&[u8]` / `&mut [u8]`.

use std::slice;

use crate::{BridgeError, BridgeResult};

use super::types::{DataPack, DataPackCollection, NativeDataBuffer};

/// All samples (buffers) of one operand.
#[derive(Debug)]
pub struct DataPackRef<'a> {
    pub param_position: u64,
    pub buffers: Vec<&'a [u8]>,
}

#[derive(Debug, Default)]
pub struct PackedParams<'a> {
    packs: Vec<DataPackRef<'a>>,
}

impl<'a> PackedParams<'a> {
    pub fn new(packs: Vec<DataPackRef<'a>>) -> Self {
        PackedParams { packs }
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataPackRef<'a>> {
        self.packs.iter()
    }

    /// Locates the pack for `param_position`, independent of array order.
    pub fn find(&self, param_position: u64) -> BridgeResult<&DataPackRef<'a>> {
        self.packs
            .iter()
            .find(|p| p.param_position == param_position)
            .ok_or_else(|| {
                BridgeError::invalid_args(format!(
                    "DataPack for component {param_position} not found"
                ))
            })
    }

    /// # Safety
    ///
    /// Every non-null pointer in `raw` must be valid for reads of the declared
    /// counts and sizes for the lifetime `'a`.
    pub unsafe fn from_raw(raw: &'a DataPackCollection) -> BridgeResult<Self> {
        // SAFETY: forwarded to the caller's contract.
        let raw_packs = unsafe { raw_slice(raw.p_data_packs, raw.pack_count, "p_data_packs")? };
        let mut packs = Vec::with_capacity(raw_packs.len());
        for pack in raw_packs {
            // SAFETY: as above.
            let buffers = unsafe { pack_buffers(pack)? };
            packs.push(DataPackRef {
                param_position: pack.param_position,
                buffers: buffers
                    .iter()
                    // SAFETY: as above.
                    .map(|b| unsafe { buffer_bytes(b) })
                    .collect(),
            });
        }
        Ok(PackedParams { packs })
    }
}

#[derive(Debug)]
pub struct DataPackMut<'a> {
    pub param_position: u64,
    pub buffers: Vec<&'a mut [u8]>,
}

/// Host-allocated destination for decoded results.
#[derive(Debug, Default)]
pub struct PackedParamsMut<'a> {
    packs: Vec<DataPackMut<'a>>,
}

impl<'a> PackedParamsMut<'a> {
    pub fn new(packs: Vec<DataPackMut<'a>>) -> Self {
        PackedParamsMut { packs }
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Destination pack for `param_position`, if the host asked for it.
    pub fn find_mut(&mut self, param_position: u64) -> Option<&mut DataPackMut<'a>> {
        self.packs
            .iter_mut()
            .find(|p| p.param_position == param_position)
    }

    /// # Safety
    ///
    /// Every non-null pointer in `raw` must be valid for writes of the declared
    /// counts and sizes for the lifetime `'a`, and no two buffers may overlap.
    pub unsafe fn from_raw(raw: &'a mut DataPackCollection) -> BridgeResult<Self> {
        // SAFETY: forwarded to the caller's contract.
        let raw_packs = unsafe { raw_slice(raw.p_data_packs, raw.pack_count, "p_data_packs")? };
        let mut packs = Vec::with_capacity(raw_packs.len());
        for pack in raw_packs {
            // SAFETY: as above.
            let buffers = unsafe { pack_buffers(pack)? };
            packs.push(DataPackMut {
                param_position: pack.param_position,
                buffers: buffers
                    .iter()
                    // SAFETY: as above; buffers do not overlap.
                    .map(|b| unsafe { buffer_bytes_mut(b) })
                    .collect(),
            });
        }
        Ok(PackedParamsMut { packs })
    }
}

unsafe fn raw_slice<'a, T>(p: *const T, count: u64, what: &str) -> BridgeResult<&'a [T]> {
    if count == 0 {
        return Ok(&[]);
    }
    if p.is_null() {
        return Err(BridgeError::invalid_args(format!(
            "invalid null array '{what}' with {count} elements"
        )));
    }
    // SAFETY: non-null and valid for `count` elements per the caller.
    Ok(unsafe { slice::from_raw_parts(p, count as usize) })
}

unsafe fn pack_buffers<'a>(pack: &DataPack) -> BridgeResult<&'a [NativeDataBuffer]> {
    // SAFETY: forwarded.
    unsafe { raw_slice(pack.p_buffers, pack.buffer_count, "p_buffers") }
}

unsafe fn buffer_bytes<'a>(b: &NativeDataBuffer) -> &'a [u8] {
    if b.p.is_null() || b.size == 0 {
        return &[];
    }
    // SAFETY: non-null and valid for `size` bytes per the caller.
    unsafe { slice::from_raw_parts(b.p as *const u8, b.size as usize) }
}

unsafe fn buffer_bytes_mut<'a>(b: &NativeDataBuffer) -> &'a mut [u8] {
    if b.p.is_null() || b.size == 0 {
        return &mut [];
    }
    // SAFETY: non-null, valid for writes of `size` bytes and unaliased per the caller.
    unsafe { slice::from_raw_parts_mut(b.p as *mut u8, b.size as usize) }
}

/// Reads native-endian `f64` values from a byte buffer, ignoring a trailing
/// partial element.
pub fn read_f64s(bytes: &[u8]) -> impl Iterator<Item = f64> + '_ {
    bytes
        .chunks_exact(8)
        .map(|c| f64::from_ne_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
}

/// Writes as many `values` as fit into `dst`; returns the number written.
pub fn write_f64s(dst: &mut [u8], values: &[f64]) -> usize {
    let mut written = 0;
    for (chunk, v) in dst.chunks_exact_mut(8).zip(values) {
        chunk.copy_from_slice(&v.to_ne_bytes());
        written += 1;
    }
    written
}

pub fn f64s_to_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;
    use std::ptr;

    #[test]
    fn test_find_by_position_not_order() {
        let a = f64s_to_bytes(&[1.0]);
        let b = f64s_to_bytes(&[2.0]);
        let packed = PackedParams::new(vec![
            DataPackRef {
                param_position: 1,
                buffers: vec![&b],
            },
            DataPackRef {
                param_position: 0,
                buffers: vec![&a],
            },
        ]);
        let first: Vec<f64> = read_f64s(packed.find(0).unwrap().buffers[0]).collect();
        assert_eq!(first, vec![1.0]);
        assert!(packed.find(2).is_err());
    }

    #[test]
    fn test_write_f64s_truncates() {
        let mut dst = vec![0u8; 20];
        assert_eq!(write_f64s(&mut dst, &[1.0, 2.0, 3.0]), 2);
        let back: Vec<f64> = read_f64s(&dst).collect();
        assert_eq!(back, vec![1.0, 2.0]);
    }

    #[test]
    fn test_from_raw_views_host_memory() {
        let mut values = [4.0f64, 5.0];
        let mut buffer = NativeDataBuffer {
            p: values.as_mut_ptr() as *mut c_void,
            size: std::mem::size_of_val(&values) as u64,
            tag: 0,
        };
        let mut pack = DataPack {
            p_buffers: &mut buffer,
            buffer_count: 1,
            param_position: 3,
        };
        let collection = DataPackCollection {
            p_data_packs: &mut pack,
            pack_count: 1,
        };
        let view = unsafe { PackedParams::from_raw(&collection) }.unwrap();
        let read: Vec<f64> = read_f64s(view.find(3).unwrap().buffers[0]).collect();
        assert_eq!(read, vec![4.0, 5.0]);
    }

    #[test]
    fn test_from_raw_rejects_null_array() {
        let collection = DataPackCollection {
            p_data_packs: ptr::null_mut(),
            pack_count: 2,
        };
        let err = unsafe { PackedParams::from_raw(&collection) }.unwrap_err();
        assert_eq!(err.code(), crate::ECODE_INVALID_ARGS);
    }
}
