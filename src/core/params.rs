//! Flexible workload parameters.
//!
//! A workload's shape (matrix dimensions, vector length, ...) is passed as a
//! list of named, typed 64-bit values. The typed views below validate a raw
//! list for one workload family.

use crate::{BridgeError, BridgeResult};

use super::types::MAX_BUFFER_SIZE;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadParamType {
    Int64 = 0,
    UInt64 = 1,
    Float64 = 2,
}

impl TryFrom<i32> for WorkloadParamType {
    type Error = BridgeError;

    fn try_from(raw: i32) -> BridgeResult<Self> {
        match raw {
            0 => Ok(WorkloadParamType::Int64),
            1 => Ok(WorkloadParamType::UInt64),
            2 => Ok(WorkloadParamType::Float64),
            _ => Err(BridgeError::invalid_args(format!(
                "invalid workload parameter data type {raw}"
            ))),
        }
    }
}

/// One named parameter. `bits` holds the value of the C union.
///
/// `data_type` is the raw C enum; [`WorkloadParam::param_type`] validates it.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct WorkloadParam {
    pub data_type: i32,
    pub name: [u8; MAX_BUFFER_SIZE],
    pub bits: u64,
}

impl WorkloadParam {
    fn with_bits(data_type: WorkloadParamType, name: &str, bits: u64) -> Self {
        let mut retval = WorkloadParam {
            data_type: data_type as i32,
            name: [0; MAX_BUFFER_SIZE],
            bits,
        };
        retval.set_name(name);
        retval
    }

    pub fn from_u64(name: &str, value: u64) -> Self {
        Self::with_bits(WorkloadParamType::UInt64, name, value)
    }

    pub fn from_i64(name: &str, value: i64) -> Self {
        Self::with_bits(WorkloadParamType::Int64, name, value as u64)
    }

    pub fn from_f64(name: &str, value: f64) -> Self {
        Self::with_bits(WorkloadParamType::Float64, name, value.to_bits())
    }

    /// Stores `name`, truncated to fit the fixed buffer with its terminator.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; MAX_BUFFER_SIZE];
        super::strings::copy_string(Some(&mut self.name[..]), name);
    }

    pub fn name(&self) -> String {
        let end = self.name.iter().position(|b| *b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn param_type(&self) -> BridgeResult<WorkloadParamType> {
        WorkloadParamType::try_from(self.data_type)
    }

    fn is(&self, data_type: WorkloadParamType) -> bool {
        self.data_type == data_type as i32
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.is(WorkloadParamType::UInt64).then_some(self.bits)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.is(WorkloadParamType::Int64).then_some(self.bits as i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.is(WorkloadParamType::Float64).then(|| f64::from_bits(self.bits))
    }
}

impl PartialEq for WorkloadParam {
    fn eq(&self, other: &Self) -> bool {
        self.data_type == other.data_type && self.bits == other.bits && self.name() == other.name()
    }
}

impl std::fmt::Debug for WorkloadParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("WorkloadParam");
        s.field("name", &self.name());
        match self.param_type() {
            Ok(WorkloadParamType::Int64) => s.field("i64", &(self.bits as i64)),
            Ok(WorkloadParamType::UInt64) => s.field("u64", &self.bits),
            Ok(WorkloadParamType::Float64) => s.field("f64", &f64::from_bits(self.bits)),
            Err(_) => s.field("data_type", &self.data_type).field("bits", &self.bits),
        };
        s.finish()
    }
}

/// Host-provided parameter list.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WorkloadParams {
    pub params: *mut WorkloadParam,
    pub count: u64,
}

fn require_u64_prefix(params: &[WorkloadParam], required: usize) -> BridgeResult<()> {
    if params.len() < required {
        return Err(BridgeError::invalid_args(format!(
            "workload requires, at least, {required} parameters; {} received",
            params.len()
        )));
    }
    for (i, p) in params.iter().take(required).enumerate() {
        if p.as_u64().is_none() {
            return Err(BridgeError::invalid_args(format!(
                "data type for workload parameter {i} must be UInt64"
            )));
        }
    }
    Ok(())
}

/// `M0 (rows_M0 x cols_M0) * M1 (cols_M0 x cols_M1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixMultiplyParams {
    pub rows_m0: u64,
    pub cols_m0: u64,
    pub cols_m1: u64,
}

impl MatrixMultiplyParams {
    pub const MIN_REQUIRED: usize = 3;

    pub fn new(rows_m0: u64, cols_m0: u64, cols_m1: u64) -> Self {
        MatrixMultiplyParams {
            rows_m0,
            cols_m0,
            cols_m1,
        }
    }

    pub fn to_params(&self) -> Vec<WorkloadParam> {
        vec![
            WorkloadParam::from_u64("rows_M0", self.rows_m0),
            WorkloadParam::from_u64("cols_M0", self.cols_m0),
            WorkloadParam::from_u64("cols_M1", self.cols_m1),
        ]
    }
}

impl TryFrom<&[WorkloadParam]> for MatrixMultiplyParams {
    type Error = BridgeError;

    fn try_from(params: &[WorkloadParam]) -> BridgeResult<Self> {
        require_u64_prefix(params, Self::MIN_REQUIRED)?;
        Ok(MatrixMultiplyParams {
            rows_m0: params[0].bits,
            cols_m0: params[1].bits,
            cols_m1: params[2].bits,
        })
    }
}

/// Generic workload: `n` inputs and `m` result components, each with a length.
///
/// Layout: `n, m, length_InputParam0..n, length_ResultComponent0..m`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericParams {
    pub input_lengths: Vec<u64>,
    pub result_lengths: Vec<u64>,
}

impl GenericParams {
    pub fn new(n: usize, m: usize) -> Self {
        GenericParams {
            input_lengths: vec![1; n],
            result_lengths: vec![1; m],
        }
    }

    pub fn to_params(&self) -> Vec<WorkloadParam> {
        let mut retval = vec![
            WorkloadParam::from_u64("n", self.input_lengths.len() as u64),
            WorkloadParam::from_u64("m", self.result_lengths.len() as u64),
        ];
        for (i, len) in self.input_lengths.iter().enumerate() {
            retval.push(WorkloadParam::from_u64(&format!("length_InputParam{i}"), *len));
        }
        for (i, len) in self.result_lengths.iter().enumerate() {
            retval.push(WorkloadParam::from_u64(&format!("length_ResultComponent{i}"), *len));
        }
        retval
    }
}

impl TryFrom<&[WorkloadParam]> for GenericParams {
    type Error = BridgeError;

    fn try_from(params: &[WorkloadParam]) -> BridgeResult<Self> {
        require_u64_prefix(params, 2)?;
        let n = params[0].bits as usize;
        let m = params[1].bits as usize;
        let required = n
            .checked_add(m)
            .and_then(|v| v.checked_add(2))
            .ok_or_else(|| BridgeError::invalid_args("generic workload arity overflows"))?;
        require_u64_prefix(params, required)?;
        Ok(GenericParams {
            input_lengths: params[2..2 + n].iter().map(|p| p.bits).collect(),
            result_lengths: params[2 + n..required].iter().map(|p| p.bits).collect(),
        })
    }
}
