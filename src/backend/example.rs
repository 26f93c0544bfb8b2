//! Plaintext matrix multiplication backend.
//!
//! Two workloads are registered: a latency benchmark that multiplies one pair
//! of matrices per call, and an offline benchmark that multiplies every pair
//! drawn from the selected slices of two operand datasets. "Encryption" is a
//! shared-ownership copy, so the pipeline exercises the handle machinery
//! without any cryptography.

use std::sync::Arc;

use crate::benchmark::{Benchmark, BenchmarkCore, BenchmarkDescription, DescriptionCore};
use crate::core::data::{self, PackedParams, PackedParamsMut};
use crate::core::params::{MatrixMultiplyParams, WorkloadParam};
use crate::core::types::{
    BenchmarkDescriptor, Category, CategoryParams, DataType, Handle, PARAM_FLAGS_ALL_PLAIN,
    ParameterIndexer, SCHEME_PLAIN, SECURITY_NONE, Workload,
};
use crate::engine::Engine;
use crate::engine::session::Session;
use crate::{BridgeError, BridgeResult};

use super::traits::Backend;

pub const TAG_ENCODED: u64 = 0x10;
/// Valid input for `decode`; set on both encode and decrypt output.
pub const TAG_PLAINTEXT: u64 = 0x20;
pub const TAG_ENCRYPTED: u64 = 0x40;
pub const TAG_DECRYPTED: u64 = 0x80;
pub const TAG_LOADED: u64 = 0x100;
pub const TAG_STORED: u64 = 0x200;
pub const TAG_OPERATED: u64 = 0x400;

pub const BENCHMARK_CLASS_TAG: u64 = 0x1;

const NUM_OPERANDS: usize = 2;

/// Dense row-major `f64` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Matrix::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        m
    }

    pub fn from_row_major(rows: usize, cols: usize, data: Vec<f64>) -> BridgeResult<Self> {
        if data.len() != rows * cols {
            return Err(BridgeError::invalid_args(format!(
                "matrix {rows}x{cols} needs {} elements, {} given",
                rows * cols,
                data.len()
            )));
        }
        Ok(Matrix { rows, cols, data })
    }

    /// Fills a `rows x cols` matrix from `f(row, col)`.
    pub fn from_fn(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Self {
        let data = (0..rows * cols).map(|i| f(i / cols, i % cols)).collect();
        Matrix { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn multiply(&self, rhs: &Matrix) -> BridgeResult<Matrix> {
        if self.cols != rhs.rows {
            return Err(BridgeError::invalid_args(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, rhs.rows, rhs.cols
            )));
        }
        let mut out = Matrix::zeros(self.rows, rhs.cols);
        for r in 0..self.rows {
            let lhs_row = &self.data[r * self.cols..(r + 1) * self.cols];
            let out_row = &mut out.data[r * rhs.cols..(r + 1) * rhs.cols];
            for (k, a) in lhs_row.iter().enumerate() {
                let rhs_row = &rhs.data[k * rhs.cols..(k + 1) * rhs.cols];
                for (o, b) in out_row.iter_mut().zip(rhs_row) {
                    *o += a * b;
                }
            }
        }
        Ok(out)
    }
}

/// Backend payload: one entry per operand (or result component), each
/// holding every sample of that operand.
#[derive(Debug, Clone, Default)]
pub struct MatMulData {
    pub components: Vec<Vec<Matrix>>,
}

impl MatMulData {
    fn size_hint(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

pub struct ExampleBackend;

impl Backend for ExampleBackend {
    fn name(&self) -> &str {
        "example"
    }

    fn version(&self) -> Option<String> {
        Some(env!("CARGO_PKG_VERSION").to_string())
    }

    fn init(&self, engine: &mut Engine) -> BridgeResult<()> {
        engine.add_scheme_name(SCHEME_PLAIN, "Plain")?;
        engine.add_security_name(SECURITY_NONE, "None")?;
        engine.add_benchmark_description(Arc::new(MatMulDescription::latency()?));
        engine.add_benchmark_description(Arc::new(MatMulDescription::offline()?));
        Ok(())
    }
}

pub struct MatMulDescription {
    core: DescriptionCore,
}

impl MatMulDescription {
    fn descriptor(category: Category, cat_params: CategoryParams) -> BenchmarkDescriptor {
        BenchmarkDescriptor {
            workload: Workload::MatrixMultiply,
            data_type: DataType::Float64,
            category,
            cat_params,
            cipher_param_mask: PARAM_FLAGS_ALL_PLAIN,
            scheme: SCHEME_PLAIN,
            security: SECURITY_NONE,
            other: 0,
        }
    }

    /// One pair per call; 2s minimum test time and a single warmup.
    pub fn latency() -> BridgeResult<Self> {
        let core = DescriptionCore::new(Self::descriptor(
            Category::Latency,
            CategoryParams::latency(2000, 1),
        ))
        .with_default_params(MatrixMultiplyParams::new(100, 100, 100).to_params())?
        .with_default_params(MatrixMultiplyParams::new(32, 32, 32).to_params())?;
        Ok(MatMulDescription { core })
    }

    /// Two samples of `M0` and three of `M1` per dataset.
    pub fn offline() -> BridgeResult<Self> {
        let core = DescriptionCore::new(Self::descriptor(
            Category::Offline,
            CategoryParams::offline(&[2, 3]),
        ))
        .with_default_params(MatrixMultiplyParams::new(10, 10, 10).to_params())?;
        Ok(MatMulDescription { core })
    }
}

impl BenchmarkDescription for MatMulDescription {
    fn core(&self) -> &DescriptionCore {
        &self.core
    }

    fn create_benchmark(
        &self,
        _session: &Session,
        params: Option<&[WorkloadParam]>,
    ) -> BridgeResult<Box<dyn Benchmark>> {
        let params = params.ok_or_else(|| {
            BridgeError::critical(
                "invalid empty workload parameters: this workload requires flexible parameters",
            )
        })?;
        Ok(Box::new(MatMulBenchmark::new(self.core.descriptor, params)?))
    }

    fn description(&self, params: Option<&[WorkloadParam]>) -> String {
        match params.map(MatrixMultiplyParams::try_from) {
            Some(Ok(mm)) => format!(
                ", M0 {}x{} by M1 {}x{}, example plaintext backend.",
                mm.rows_m0, mm.cols_m0, mm.cols_m0, mm.cols_m1
            ),
            _ => ", Example backend implementation.".to_string(),
        }
    }
}

pub struct MatMulBenchmark {
    core: BenchmarkCore,
    /// `(rows, cols)` of each operand.
    shapes: [(usize, usize); NUM_OPERANDS],
}

impl MatMulBenchmark {
    pub fn new(descriptor: BenchmarkDescriptor, params: &[WorkloadParam]) -> BridgeResult<Self> {
        let mm = MatrixMultiplyParams::try_from(params)?;
        let dim = |v: u64, name: &str| -> BridgeResult<usize> {
            if v == 0 {
                return Err(BridgeError::invalid_args(format!(
                    "invalid workload parameters: {name} must be non-zero"
                )));
            }
            usize::try_from(v)
                .map_err(|_| BridgeError::invalid_args(format!("{name} = {v} is too large")))
        };
        let (r0, c0, c1) = (
            dim(mm.rows_m0, "rows_M0")?,
            dim(mm.cols_m0, "cols_M0")?,
            dim(mm.cols_m1, "cols_M1")?,
        );
        for (r, c) in [(r0, c0), (c0, c1), (r0, c1)] {
            r.checked_mul(c)
                .and_then(|n| n.checked_mul(std::mem::size_of::<f64>()))
                .ok_or_else(|| BridgeError::invalid_args("matrix dimensions overflow"))?;
        }
        Ok(MatMulBenchmark {
            core: BenchmarkCore::new(descriptor, params),
            shapes: [(r0, c0), (c0, c1)],
        })
    }

    fn is_latency(&self) -> bool {
        self.core.descriptor.category == Category::Latency
    }

    fn read_sample(bytes: &[u8], (rows, cols): (usize, usize)) -> BridgeResult<Matrix> {
        let needed = rows * cols;
        if bytes.len() < needed * std::mem::size_of::<f64>() {
            return Err(BridgeError::invalid_args(format!(
                "sample holds {} bytes; a {rows}x{cols} matrix needs {}",
                bytes.len(),
                needed * std::mem::size_of::<f64>()
            )));
        }
        Matrix::from_row_major(rows, cols, data::read_f64s(bytes).take(needed).collect())
    }

    fn select<'m>(
        samples: &'m [Matrix],
        indexer: &ParameterIndexer,
        operand: usize,
    ) -> BridgeResult<&'m [Matrix]> {
        let start = usize::try_from(indexer.value_index).unwrap_or(usize::MAX);
        let len = usize::try_from(indexer.batch_size).unwrap_or(usize::MAX);
        match start.checked_add(len) {
            Some(end) if len > 0 && end <= samples.len() => Ok(&samples[start..end]),
            _ => Err(BridgeError::invalid_args(format!(
                "parameter indexer {{{}, {}}} out of range for operand {operand} with {} samples",
                indexer.value_index,
                indexer.batch_size,
                samples.len()
            ))),
        }
    }
}

impl Benchmark for MatMulBenchmark {
    fn core(&self) -> &BenchmarkCore {
        &self.core
    }

    fn class_tag(&self) -> u64 {
        BENCHMARK_CLASS_TAG
    }

    fn initialize(&mut self, concrete: &BenchmarkDescriptor) -> BridgeResult<()> {
        if concrete.workload != self.core.descriptor.workload
            || concrete.category != self.core.descriptor.category
        {
            return Err(BridgeError::invalid_args(
                "concrete descriptor does not match this benchmark",
            ));
        }
        self.core.descriptor = *concrete;
        Ok(())
    }

    fn encode(&mut self, session: &Session, params: &PackedParams<'_>) -> BridgeResult<Handle> {
        if params.len() != NUM_OPERANDS {
            return Err(BridgeError::invalid_args(format!(
                "invalid number of parameters in parameter pack: expected {NUM_OPERANDS}, got {}",
                params.len()
            )));
        }

        let mut components = Vec::with_capacity(NUM_OPERANDS);
        for (position, shape) in self.shapes.iter().enumerate() {
            let pack = params.find(position as u64)?;
            let wanted = if self.is_latency() { 1 } else { pack.buffers.len() };
            if pack.buffers.is_empty() || pack.buffers.iter().take(wanted).any(|b| b.is_empty()) {
                return Err(BridgeError::invalid_args(
                    "invalid empty samples detected in parameter pack",
                ));
            }
            let samples = pack
                .buffers
                .iter()
                .take(wanted)
                .map(|b| Self::read_sample(b, *shape))
                .collect::<BridgeResult<Vec<_>>>()?;
            components.push(samples);
        }

        let payload = MatMulData { components };
        session.create_handle(payload.size_hint(), TAG_ENCODED | TAG_PLAINTEXT, payload)
    }

    fn decode(
        &mut self,
        session: &Session,
        encoded: Handle,
        native: &mut PackedParamsMut<'_>,
    ) -> BridgeResult<()> {
        let payload = session.retrieve::<MatMulData>(&encoded, TAG_PLAINTEXT)?;
        for (position, samples) in payload.components.iter().enumerate() {
            let Some(pack) = native.find_mut(position as u64) else {
                continue;
            };
            for (buffer, matrix) in pack.buffers.iter_mut().zip(samples) {
                data::write_f64s(buffer, matrix.as_slice());
            }
        }
        Ok(())
    }

    fn encrypt(&mut self, session: &Session, encoded: Handle) -> BridgeResult<Handle> {
        session.duplicate_handle(&encoded, Some(TAG_ENCRYPTED), TAG_ENCODED)
    }

    fn decrypt(&mut self, session: &Session, encrypted: Handle) -> BridgeResult<Handle> {
        session.duplicate_handle(&encrypted, Some(TAG_DECRYPTED | TAG_PLAINTEXT), TAG_ENCRYPTED)
    }

    fn load(&mut self, session: &Session, local: &[Handle]) -> BridgeResult<Handle> {
        // all operands share plaintext status, so there is a single pack
        if local.len() != 1 {
            return Err(BridgeError::invalid_args(format!(
                "invalid number of handles: expected 1, got {}",
                local.len()
            )));
        }
        session.duplicate_handle(&local[0], Some(TAG_LOADED), TAG_ENCRYPTED)
    }

    fn store(&mut self, session: &Session, remote: Handle, local: &mut [Handle]) -> BridgeResult<()> {
        if local.is_empty() {
            return Ok(());
        }
        // stored results are still ciphertext, so they are valid decrypt input
        let stored =
            session.duplicate_handle(&remote, Some(TAG_STORED | TAG_ENCRYPTED), TAG_OPERATED)?;
        local.fill(Handle::null());
        local[0] = stored;
        Ok(())
    }

    fn operate(
        &mut self,
        session: &Session,
        remote: Handle,
        indexers: &[ParameterIndexer],
    ) -> BridgeResult<Handle> {
        if indexers.len() < NUM_OPERANDS {
            return Err(BridgeError::invalid_args(format!(
                "expected {NUM_OPERANDS} parameter indexers, got {}",
                indexers.len()
            )));
        }
        if self.is_latency()
            && indexers[..NUM_OPERANDS]
                .iter()
                .any(|ix| ix.value_index != 0 || ix.batch_size != 1)
        {
            return Err(BridgeError::invalid_args(
                "invalid parameter indexer: expected index 0 and batch size of 1",
            ));
        }

        let payload = session.retrieve::<MatMulData>(&remote, TAG_LOADED)?;
        if payload.components.len() != NUM_OPERANDS {
            return Err(BridgeError::critical(format!(
                "loaded data has {} components, expected {NUM_OPERANDS}",
                payload.components.len()
            )));
        }

        let lhs = Self::select(&payload.components[0], &indexers[0], 0)?;
        let rhs = Self::select(&payload.components[1], &indexers[1], 1)?;
        let mut results = Vec::with_capacity(lhs.len() * rhs.len());
        for a in lhs {
            for b in rhs {
                results.push(a.multiply(b)?);
            }
        }

        let result = MatMulData {
            components: vec![results],
        };
        session.create_handle(result.size_hint(), TAG_OPERATED, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiply_small() {
        let a = Matrix::from_row_major(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Matrix::from_row_major(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let c = a.multiply(&b).unwrap();
        assert_eq!(c.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
        assert!(b.multiply(&b).is_err());
    }

    #[test]
    fn test_identity_product() {
        let m = Matrix::from_fn(4, 4, |r, c| (r * 4 + c) as f64);
        assert_eq!(Matrix::identity(4).multiply(&m).unwrap(), m);
    }

    #[test]
    fn test_benchmark_rejects_bad_params() {
        let desc = MatMulDescription::latency().unwrap();
        let zero = MatrixMultiplyParams::new(0, 4, 4).to_params();
        let err = MatMulBenchmark::new(desc.core.descriptor, &zero).err().unwrap();
        assert_eq!(err.code(), crate::ECODE_INVALID_ARGS);

        let short = &MatrixMultiplyParams::new(4, 4, 4).to_params()[..2];
        assert!(MatMulBenchmark::new(desc.core.descriptor, short).is_err());

        let session = Session::new();
        let err = desc.create_benchmark(&session, None).err().unwrap();
        assert!(err.is_critical());
    }

    #[test]
    fn test_select_bounds() {
        let samples = vec![Matrix::zeros(1, 1); 3];
        let ok = ParameterIndexer {
            value_index: 1,
            batch_size: 2,
        };
        assert_eq!(MatMulBenchmark::select(&samples, &ok, 0).unwrap().len(), 2);
        let past_end = ParameterIndexer {
            value_index: 2,
            batch_size: 2,
        };
        assert!(MatMulBenchmark::select(&samples, &past_end, 0).is_err());
        let empty = ParameterIndexer {
            value_index: 0,
            batch_size: 0,
        };
        assert!(MatMulBenchmark::select(&samples, &empty, 0).is_err());
    }

    #[test]
    fn test_description_text() {
        let desc = MatMulDescription::latency().unwrap();
        let params = MatrixMultiplyParams::new(2, 3, 4).to_params();
        assert!(desc.description(Some(&params)).contains("M0 2x3 by M1 3x4"));
        assert_eq!(desc.description(None), ", Example backend implementation.");
    }
}
