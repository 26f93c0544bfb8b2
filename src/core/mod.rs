//! Boundary value types shared by every layer.
//!
//! Nothing here owns backend state: these are the C-layout structs, the tag
//! convention, the workload parameter helpers, and safe views over host data.

pub mod data;
pub mod params;
pub mod strings;
pub mod tags;
pub mod types;

// Re-export key types for convenience
pub use data::{DataPackMut, DataPackRef, PackedParams, PackedParamsMut};
pub use params::{
    GenericParams, MatrixMultiplyParams, WorkloadParam, WorkloadParamType, WorkloadParams,
};
pub use types::{
    BenchmarkDescriptor, Category, CategoryParams, DataPack, DataPackCollection, DataType,
    ErrorCode, Handle, NativeDataBuffer, ParameterIndexer, RawBenchmarkDescriptor, Scheme,
    Security, Workload,
};
