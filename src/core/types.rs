//! `#[repr(C)]` types that cross the boundary.
//!
//! Layouts mirror the C header the host compiles against. Unions on the C side
//! are represented as plain 64-bit storage with typed accessors, so no Rust code
//! ever reads an inactive union field. C enums written by the host arrive as raw
//! `i32` fields and are converted with `TryFrom<i32>`, so an out-of-range value
//! is an argument error rather than an invalid Rust enum.

use std::ffi::c_void;
use std::ptr;

use crate::{BridgeError, BridgeResult};

pub type ErrorCode = i32;
pub type Scheme = i32;
pub type Security = i32;

pub const API_VERSION_MAJOR: u64 = 1;
pub const API_VERSION_MINOR: u64 = 0;
pub const API_VERSION_REVISION: u64 = 0;

/// Size of fixed name buffers, terminator included.
pub const MAX_BUFFER_SIZE: usize = 256;
/// Maximum number of operands an operation may take.
pub const MAX_OP_PARAMS: usize = 32;
/// Number of 64-bit slots in [`CategoryParams`].
pub const MAX_CATEGORY_PARAMS: usize = MAX_OP_PARAMS * 2;

pub const SCHEME_PLAIN: Scheme = 0;

pub const SECURITY_NONE: Security = 0;

pub const PARAM_FLAGS_ALL_PLAIN: u32 = 0;

/// The opaque `{pointer, size, tag}` triple.
///
/// `p` is whatever the minting session decided: a boxed object, a catalog
/// index, or null. `size` is advisory.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    pub p: *mut c_void,
    pub size: u64,
    pub tag: u64,
}

impl Handle {
    pub const fn null() -> Self {
        Handle {
            p: ptr::null_mut(),
            size: 0,
            tag: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.p.is_null()
    }
}

impl Default for Handle {
    fn default() -> Self {
        Handle::null()
    }
}

/// Host-owned memory region. Same layout as [`Handle`]; `size` is in bytes.
pub type NativeDataBuffer = Handle;

/// All samples for one operand of an operation.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DataPack {
    pub p_buffers: *mut NativeDataBuffer,
    pub buffer_count: u64,
    /// 0-based position of this operand in the operation's signature.
    pub param_position: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DataPackCollection {
    pub p_data_packs: *mut DataPack,
    pub pack_count: u64,
}

/// Selects `batch_size` samples starting at `value_index` for one operand.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParameterIndexer {
    pub value_index: u64,
    pub batch_size: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    MatrixMultiply = 0,
    EltwiseAdd = 1,
    EltwiseMultiply = 2,
    DotProduct = 3,
    LogisticRegression = 4,
    LogisticRegressionPolyD3 = 5,
    LogisticRegressionPolyD5 = 6,
    LogisticRegressionPolyD7 = 7,
    Generic = 8,
}

impl Workload {
    pub fn name(&self) -> &'static str {
        match self {
            Workload::MatrixMultiply => "Matrix Multiplication",
            Workload::EltwiseAdd => "Element-wise Vector Addition",
            Workload::EltwiseMultiply => "Element-wise Vector Multiplication",
            Workload::DotProduct => "Dot Product",
            Workload::LogisticRegression => "Logistic Regression",
            Workload::LogisticRegressionPolyD3 => "Logistic Regression PolyD3",
            Workload::LogisticRegressionPolyD5 => "Logistic Regression PolyD5",
            Workload::LogisticRegressionPolyD7 => "Logistic Regression PolyD7",
            Workload::Generic => "Generic",
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int32 = 0,
    Int64 = 1,
    Float32 = 2,
    Float64 = 3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// The same single sample is sent repeatedly.
    Latency = 0,
    /// The whole dataset is loaded and processed in a single operation.
    Offline = 1,
}

/// Implements `TryFrom<i32>` for a fieldless enum from its variant list.
macro_rules! c_enum_try_from {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl TryFrom<i32> for $ty {
            type Error = BridgeError;

            fn try_from(raw: i32) -> BridgeResult<Self> {
                $(
                    if raw == $ty::$variant as i32 {
                        return Ok($ty::$variant);
                    }
                )+
                Err(BridgeError::invalid_args(format!(
                    "invalid {} value {raw}",
                    stringify!($ty)
                )))
            }
        }
    };
}

c_enum_try_from!(Workload {
    MatrixMultiply,
    EltwiseAdd,
    EltwiseMultiply,
    DotProduct,
    LogisticRegression,
    LogisticRegressionPolyD3,
    LogisticRegressionPolyD5,
    LogisticRegressionPolyD7,
    Generic,
});
c_enum_try_from!(DataType { Int32, Int64, Float32, Float64 });
c_enum_try_from!(Category { Latency, Offline });

/// Category-specific parameters, stored as the C union's raw 64-bit slots.
///
/// Latency reads slot 0 (minimum test time, ms) and slot 1 (warmup
/// iterations); offline reads slots `0..MAX_OP_PARAMS` as per-operand sample
/// counts, where 0 lets the host choose.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryParams {
    pub reserved: [u64; MAX_CATEGORY_PARAMS],
}

impl CategoryParams {
    pub fn zeroed() -> Self {
        CategoryParams {
            reserved: [0; MAX_CATEGORY_PARAMS],
        }
    }

    pub fn latency(min_test_time_ms: u64, warmup_iterations_count: u64) -> Self {
        let mut retval = Self::zeroed();
        retval.reserved[0] = min_test_time_ms;
        retval.reserved[1] = warmup_iterations_count;
        retval
    }

    pub fn offline(data_count: &[u64]) -> Self {
        let mut retval = Self::zeroed();
        let n = data_count.len().min(MAX_OP_PARAMS);
        retval.reserved[..n].copy_from_slice(&data_count[..n]);
        retval
    }

    pub fn min_test_time_ms(&self) -> u64 {
        self.reserved[0]
    }

    pub fn warmup_iterations_count(&self) -> u64 {
        self.reserved[1]
    }

    pub fn data_count(&self) -> &[u64] {
        &self.reserved[..MAX_OP_PARAMS]
    }
}

impl Default for CategoryParams {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkDescriptor {
    pub workload: Workload,
    pub data_type: DataType,
    pub category: Category,
    pub cat_params: CategoryParams,
    /// Bit `i` set means operand `i` is ciphertext.
    pub cipher_param_mask: u32,
    pub scheme: Scheme,
    pub security: Security,
    /// Backend-private discriminator.
    pub other: i64,
}

impl Default for BenchmarkDescriptor {
    fn default() -> Self {
        BenchmarkDescriptor {
            workload: Workload::MatrixMultiply,
            data_type: DataType::Float64,
            category: Category::Latency,
            cat_params: CategoryParams::zeroed(),
            cipher_param_mask: PARAM_FLAGS_ALL_PLAIN,
            scheme: SCHEME_PLAIN,
            security: SECURITY_NONE,
            other: 0,
        }
    }
}

/// [`BenchmarkDescriptor`] as the host lays it out, with enum fields left raw.
///
/// Every descriptor read from or written to host memory goes through this
/// type.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBenchmarkDescriptor {
    pub workload: i32,
    pub data_type: i32,
    pub category: i32,
    pub cat_params: CategoryParams,
    pub cipher_param_mask: u32,
    pub scheme: Scheme,
    pub security: Security,
    pub other: i64,
}

impl Default for RawBenchmarkDescriptor {
    fn default() -> Self {
        RawBenchmarkDescriptor::from(&BenchmarkDescriptor::default())
    }
}

impl From<&BenchmarkDescriptor> for RawBenchmarkDescriptor {
    fn from(d: &BenchmarkDescriptor) -> Self {
        RawBenchmarkDescriptor {
            workload: d.workload as i32,
            data_type: d.data_type as i32,
            category: d.category as i32,
            cat_params: d.cat_params,
            cipher_param_mask: d.cipher_param_mask,
            scheme: d.scheme,
            security: d.security,
            other: d.other,
        }
    }
}

impl TryFrom<&RawBenchmarkDescriptor> for BenchmarkDescriptor {
    type Error = BridgeError;

    fn try_from(raw: &RawBenchmarkDescriptor) -> BridgeResult<Self> {
        Ok(BenchmarkDescriptor {
            workload: Workload::try_from(raw.workload)?,
            data_type: DataType::try_from(raw.data_type)?,
            category: Category::try_from(raw.category)?,
            cat_params: raw.cat_params,
            cipher_param_mask: raw.cipher_param_mask,
            scheme: raw.scheme,
            security: raw.security,
            other: raw.other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        let h = Handle::default();
        assert!(h.is_null());
    }

    #[test]
    fn test_handle_layout_matches_c() {
        assert_eq!(std::mem::size_of::<Handle>(), 8 + 8 + 8);
        assert_eq!(std::mem::size_of::<ParameterIndexer>(), 16);
    }

    #[test]
    fn test_category_params_views() {
        let lat = CategoryParams::latency(2000, 1);
        assert_eq!(lat.min_test_time_ms(), 2000);
        assert_eq!(lat.warmup_iterations_count(), 1);

        let off = CategoryParams::offline(&[2, 3]);
        assert_eq!(&off.data_count()[..3], &[2, 3, 0]);
    }

    #[test]
    fn test_raw_descriptor_conversion() {
        assert_eq!(
            std::mem::size_of::<RawBenchmarkDescriptor>(),
            std::mem::size_of::<BenchmarkDescriptor>()
        );
        let desc = BenchmarkDescriptor {
            workload: Workload::Generic,
            category: Category::Offline,
            ..BenchmarkDescriptor::default()
        };
        let raw = RawBenchmarkDescriptor::from(&desc);
        assert_eq!(raw.workload, 8);
        assert_eq!(BenchmarkDescriptor::try_from(&raw).unwrap(), desc);

        let bad = RawBenchmarkDescriptor { category: 7, ..raw };
        let err = BenchmarkDescriptor::try_from(&bad).unwrap_err();
        assert_eq!(err.code(), crate::ECODE_INVALID_ARGS);
        assert!(err.to_string().contains("Category"));
        assert!(Workload::try_from(-1).is_err());
        assert_eq!(DataType::try_from(3).unwrap(), DataType::Float64);
    }
}
