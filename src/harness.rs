//! In-process driver that runs one benchmark through the full pipeline.
//!
//! The driver plays the host's role against an [`Engine`]: it describes and
//! instantiates a benchmark, generates operands, walks
//! encode -> encrypt -> load -> operate -> store -> decrypt -> decode, times
//! every `operate` call, checks the decoded result against a host-side
//! reference and releases every handle it obtained.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backend::{Backend, Matrix};
use crate::core::data::{self, DataPackMut, DataPackRef, PackedParams, PackedParamsMut};
use crate::core::params::{MatrixMultiplyParams, WorkloadParam};
use crate::core::types::{BenchmarkDescriptor, Category, Handle, ParameterIndexer, Workload};
use crate::engine::Engine;
use crate::report::{
    BackendInfo, EnvironmentInfo, RunConfig, RunReport, SCHEMA_VERSION, TimingStat, Verification,
    current_timestamp,
};
use crate::{BridgeError, BridgeResult};

const TOLERANCE: f64 = 1e-9;

/// Describes benchmark `index`: its descriptor and every default set.
pub fn describe(
    engine: &Engine,
    index: usize,
) -> BridgeResult<(Handle, BenchmarkDescriptor, Vec<Vec<WorkloadParam>>)> {
    let h_desc = *engine.list_descriptors().get(index).ok_or_else(|| {
        BridgeError::invalid_args(format!(
            "benchmark {index} not found; {} registered",
            engine.subscribe_benchmarks_count()
        ))
    })?;
    let arity = engine.workload_params_count(&h_desc)? as usize;
    let sets = engine.default_workload_params_count(&h_desc)? as usize;

    let mut storage = vec![vec![WorkloadParam::from_u64("", 0); arity]; sets];
    let mut descriptor = BenchmarkDescriptor::default();
    {
        let mut slots: Vec<&mut [WorkloadParam]> =
            storage.iter_mut().map(Vec::as_mut_slice).collect();
        engine.describe_benchmark(&h_desc, &mut descriptor, Some(slots.as_mut_slice()))?;
    }
    Ok((h_desc, descriptor, storage))
}

/// Deterministic small integers so products are exact in `f64`.
fn operand_value(seed: u64, operand: usize, sample: usize, row: usize, col: usize) -> f64 {
    let mix = seed
        .wrapping_add(operand as u64 * 7)
        .wrapping_add(sample as u64 * 13)
        .wrapping_add(row as u64 * 31)
        .wrapping_add(col as u64 * 17);
    (mix % 19) as f64 - 9.0
}

struct Operands {
    shapes: [(usize, usize); 2],
    matrices: [Vec<Matrix>; 2],
}

impl Operands {
    fn generate(descriptor: &BenchmarkDescriptor, mm: &MatrixMultiplyParams, seed: u64) -> Self {
        let shapes = [
            (mm.rows_m0 as usize, mm.cols_m0 as usize),
            (mm.cols_m0 as usize, mm.cols_m1 as usize),
        ];
        let counts = match descriptor.category {
            Category::Latency => [1, 1],
            Category::Offline => {
                let dc = descriptor.cat_params.data_count();
                [dc[0].max(1) as usize, dc[1].max(1) as usize]
            }
        };
        let matrices = [0, 1].map(|op| {
            let (rows, cols) = shapes[op];
            (0..counts[op])
                .map(|s| Matrix::from_fn(rows, cols, |r, c| operand_value(seed, op, s, r, c)))
                .collect::<Vec<_>>()
        });
        Operands { shapes, matrices }
    }

    fn result_count(&self) -> usize {
        self.matrices[0].len() * self.matrices[1].len()
    }

    fn result_shape(&self) -> (usize, usize) {
        (self.shapes[0].0, self.shapes[1].1)
    }

    fn indexers(&self) -> [ParameterIndexer; 2] {
        [0, 1].map(|op| ParameterIndexer {
            value_index: 0,
            batch_size: self.matrices[op].len() as u64,
        })
    }

    fn expected(&self) -> BridgeResult<Vec<Matrix>> {
        let mut out = Vec::with_capacity(self.result_count());
        for a in &self.matrices[0] {
            for b in &self.matrices[1] {
                out.push(a.multiply(b)?);
            }
        }
        Ok(out)
    }
}

struct PipelineOutput {
    operate_ms: Vec<f64>,
    decoded: Vec<Vec<u8>>,
}

fn drive(
    engine: &Engine,
    h_bench: &Handle,
    descriptor: &BenchmarkDescriptor,
    operands: &Operands,
    cfg: &RunConfig,
    owned: &mut Vec<Handle>,
) -> BridgeResult<PipelineOutput> {
    engine.init_benchmark(h_bench, descriptor)?;

    let bytes: Vec<Vec<Vec<u8>>> = operands
        .matrices
        .iter()
        .map(|samples| samples.iter().map(|m| data::f64s_to_bytes(m.as_slice())).collect())
        .collect();
    let packed = PackedParams::new(
        bytes
            .iter()
            .enumerate()
            .map(|(position, samples)| DataPackRef {
                param_position: position as u64,
                buffers: samples.iter().map(Vec::as_slice).collect(),
            })
            .collect(),
    );

    let encoded = engine.encode(h_bench, &packed)?;
    owned.push(encoded);
    let encrypted = engine.encrypt(h_bench, encoded)?;
    owned.push(encrypted);
    let remote = engine.load(h_bench, &[encrypted])?;
    owned.push(remote);

    let indexers = operands.indexers();
    let total = cfg.warmup_iterations + cfg.measured_iterations;
    let mut operate_ms = Vec::with_capacity(cfg.measured_iterations as usize);
    for i in 0..total {
        let start = Instant::now();
        let result = engine.operate(h_bench, remote, &indexers)?;
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        if i >= cfg.warmup_iterations {
            operate_ms.push(elapsed);
        }
        // only the latest result is kept
        if i > 0 {
            if let Some(prev) = owned.pop() {
                engine.destroy_handle(prev)?;
            }
        }
        owned.push(result);
        debug!(iteration = i, elapsed_ms = elapsed, "operate");
    }
    let result = owned
        .last()
        .copied()
        .ok_or_else(|| BridgeError::critical("operate produced no result"))?;

    let mut local = [Handle::null(); 1];
    engine.store(h_bench, result, &mut local)?;
    owned.extend(local.iter().filter(|h| !h.is_null()));
    let decrypted = engine.decrypt(h_bench, local[0])?;
    owned.push(decrypted);

    let (rows, cols) = operands.result_shape();
    let mut decoded = vec![vec![0u8; rows * cols * std::mem::size_of::<f64>()]; operands.result_count()];
    {
        let mut native = PackedParamsMut::new(vec![DataPackMut {
            param_position: 0,
            buffers: decoded.iter_mut().map(Vec::as_mut_slice).collect(),
        }]);
        engine.decode(h_bench, decrypted, &mut native)?;
    }

    Ok(PipelineOutput {
        operate_ms,
        decoded,
    })
}

fn verify(operands: &Operands, decoded: &[Vec<u8>]) -> BridgeResult<Verification> {
    let expected = operands.expected()?;
    let mut max_abs_error = 0.0f64;
    for (want, got) in expected.iter().zip(decoded) {
        for (w, g) in want.as_slice().iter().zip(data::read_f64s(got)) {
            max_abs_error = max_abs_error.max((w - g).abs());
        }
    }
    Ok(Verification {
        passed: expected.len() == decoded.len() && max_abs_error <= TOLERANCE,
        result_samples: decoded.len() as u64,
        max_abs_error,
    })
}

/// Runs the configured benchmark once and reports on it.
pub fn run(engine: &Engine, backend: &dyn Backend, cfg: &RunConfig) -> BridgeResult<RunReport> {
    if cfg.measured_iterations == 0 {
        return Err(BridgeError::invalid_args("measured iterations must be at least 1"));
    }

    let (h_desc, descriptor, defaults) = describe(engine, cfg.descriptor)?;
    if descriptor.workload != Workload::MatrixMultiply {
        return Err(BridgeError::invalid_args(format!(
            "the driver runs matrix multiplication only, not {}",
            descriptor.workload.name()
        )));
    }
    let params = defaults.get(cfg.default_set).cloned().ok_or_else(|| {
        BridgeError::invalid_args(format!(
            "default parameter set {} not found; {} available",
            cfg.default_set,
            defaults.len()
        ))
    })?;
    let mm = MatrixMultiplyParams::try_from(params.as_slice())?;
    let operands = Operands::generate(&descriptor, &mm, cfg.seed);

    info!(
        workload = descriptor.workload.name(),
        category = ?descriptor.category,
        rows_m0 = mm.rows_m0,
        cols_m0 = mm.cols_m0,
        cols_m1 = mm.cols_m1,
        "running benchmark"
    );

    let h_bench = engine.create_benchmark(&h_desc, Some(&params))?;
    let mut owned = Vec::new();
    let outcome = drive(engine, &h_bench, &descriptor, &operands, cfg, &mut owned);
    for h in owned.into_iter().rev() {
        if let Err(e) = engine.destroy_handle(h) {
            warn!(error = %e, "failed to release handle");
        }
    }
    engine.destroy_benchmark(h_bench)?;
    let output = outcome?;

    let verification = verify(&operands, &output.decoded)?;
    let operate = TimingStat::from_samples(&output.operate_ms);
    info!(
        mean_ms = operate.mean_ms,
        passed = verification.passed,
        "benchmark finished"
    );

    Ok(RunReport {
        schema_version: SCHEMA_VERSION,
        timestamp: current_timestamp(),
        backend: BackendInfo {
            name: backend.name().to_string(),
            version: backend.version(),
        },
        workload: descriptor.workload.name().to_string(),
        category: format!("{:?}", descriptor.category),
        scheme: engine
            .scheme_name(descriptor.scheme)
            .map_or_else(|_| descriptor.scheme.to_string(), str::to_string),
        security: engine
            .security_name(descriptor.security)
            .map_or_else(|_| descriptor.security.to_string(), str::to_string),
        description: engine.benchmark_description_ex(&h_desc, Some(&params))?,
        workload_params: params.iter().map(|p| (p.name(), p.bits)).collect::<BTreeMap<_, _>>(),
        config: cfg.clone(),
        operate,
        verification,
        env: EnvironmentInfo::detect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_values_are_small_integers() {
        for r in 0..5 {
            let v = operand_value(3, 1, 2, r, r + 1);
            assert_eq!(v.fract(), 0.0);
            assert!((-9.0..=9.0).contains(&v));
        }
    }

    #[test]
    fn test_offline_operands_follow_data_count() {
        let descriptor = BenchmarkDescriptor {
            category: Category::Offline,
            cat_params: crate::core::types::CategoryParams::offline(&[2, 0]),
            ..BenchmarkDescriptor::default()
        };
        let ops = Operands::generate(&descriptor, &MatrixMultiplyParams::new(2, 3, 4), 1);
        assert_eq!(ops.matrices[0].len(), 2);
        assert_eq!(ops.matrices[1].len(), 1);
        assert_eq!(ops.result_count(), 2);
        assert_eq!(ops.result_shape(), (2, 4));
        assert_eq!(ops.indexers()[0].batch_size, 2);
    }
}
