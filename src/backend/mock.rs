//! Mock backend for testing.
//!
//! Registers a single generic workload whose pipeline simply carries the raw
//! bytes of every operand through encode, load, operate and back. Failure
//! toggles let tests drive the error paths of the engine and the call adapter.

use std::sync::Arc;

use crate::benchmark::{Benchmark, BenchmarkCore, BenchmarkDescription, DescriptionCore};
use crate::core::data::{PackedParams, PackedParamsMut};
use crate::core::params::{GenericParams, WorkloadParam};
use crate::core::types::{
    BenchmarkDescriptor, Category, CategoryParams, DataType, ErrorCode, Handle, ParameterIndexer,
    SCHEME_PLAIN, SECURITY_NONE, Workload,
};
use crate::engine::Engine;
use crate::engine::session::Session;
use crate::{BridgeError, BridgeResult};

use super::traits::Backend;

/// Backend bit carried by every mock payload handle.
pub const TAG_MOCK_DATA: u64 = 0x1;

/// Configuration for mock backend responses.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Name to report
    pub name: String,
    /// Version to report
    pub version: Option<String>,
    /// Descriptor of the single registered workload
    pub descriptor: BenchmarkDescriptor,
    /// Default parameter sets of the workload
    pub default_params: Vec<Vec<WorkloadParam>>,
    /// Backend bits for benchmark handles
    pub class_tag: u64,
    /// Extra error codes registered at init
    pub error_codes: Vec<(ErrorCode, String)>,
    /// Whether create_benchmark should fail, and with which code
    pub create_fails_with: Option<ErrorCode>,
    /// Whether operate should fail
    pub operate_fails: bool,
    /// Whether operate should panic
    pub operate_panics: bool,
}

impl MockConfig {
    /// Create a new mock config with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        MockConfig {
            name: name.into(),
            version: Some("mock-1.0.0".to_string()),
            descriptor: BenchmarkDescriptor {
                workload: Workload::Generic,
                data_type: DataType::Int64,
                category: Category::Latency,
                cat_params: CategoryParams::latency(100, 0),
                ..BenchmarkDescriptor::default()
            },
            default_params: vec![
                GenericParams::new(2, 1).to_params(),
                GenericParams {
                    input_lengths: vec![4, 4],
                    result_lengths: vec![4],
                }
                .to_params(),
            ],
            class_tag: 0,
            error_codes: Vec::new(),
            create_fails_with: None,
            operate_fails: false,
            operate_panics: false,
        }
    }

    /// Set the descriptor.
    pub fn with_descriptor(mut self, descriptor: BenchmarkDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Replace the default parameter sets.
    pub fn with_default_params(mut self, sets: Vec<Vec<WorkloadParam>>) -> Self {
        self.default_params = sets;
        self
    }

    /// Set the benchmark class tag.
    pub fn with_class_tag(mut self, tag: u64) -> Self {
        self.class_tag = tag;
        self
    }

    /// Register an extra error code.
    pub fn with_error_code(mut self, code: ErrorCode, description: impl Into<String>) -> Self {
        self.error_codes.push((code, description.into()));
        self
    }

    /// Make create_benchmark fail with `code`.
    pub fn create_fails_with(mut self, code: ErrorCode) -> Self {
        self.create_fails_with = Some(code);
        self
    }

    /// Make operate fail.
    pub fn operate_fails(mut self) -> Self {
        self.operate_fails = true;
        self
    }

    /// Make operate panic.
    pub fn operate_panics(mut self) -> Self {
        self.operate_panics = true;
        self
    }
}

/// Mock backend for unit testing.
pub struct MockBackend {
    config: MockConfig,
}

impl MockBackend {
    /// Create a new mock backend with the given configuration.
    pub fn new(config: MockConfig) -> Self {
        MockBackend { config }
    }

    /// Create a mock backend with default configuration.
    pub fn default_mock() -> Self {
        Self::new(MockConfig::new("mock"))
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn version(&self) -> Option<String> {
        self.config.version.clone()
    }

    fn init(&self, engine: &mut Engine) -> BridgeResult<()> {
        engine.add_scheme_name(SCHEME_PLAIN, "Plain")?;
        engine.add_security_name(SECURITY_NONE, "None")?;
        for (code, description) in &self.config.error_codes {
            engine.add_error_code(*code, description.clone())?;
        }
        let mut core = DescriptionCore::new(self.config.descriptor);
        for set in &self.config.default_params {
            core.add_default_params(set.clone())?;
        }
        engine.add_benchmark_description(Arc::new(MockDescription {
            core,
            config: self.config.clone(),
        }));
        Ok(())
    }
}

struct MockDescription {
    core: DescriptionCore,
    config: MockConfig,
}

impl BenchmarkDescription for MockDescription {
    fn core(&self) -> &DescriptionCore {
        &self.core
    }

    fn create_benchmark(
        &self,
        _session: &Session,
        params: Option<&[WorkloadParam]>,
    ) -> BridgeResult<Box<dyn Benchmark>> {
        if let Some(code) = self.config.create_fails_with {
            return Err(BridgeError::Backend {
                code,
                message: "mock create_benchmark failed".into(),
            });
        }
        Ok(Box::new(MockBenchmark {
            core: BenchmarkCore::new(self.core.descriptor, params.unwrap_or_default()),
            config: self.config.clone(),
        }))
    }

    fn description(&self, _params: Option<&[WorkloadParam]>) -> String {
        format!(", {} backend.", self.config.name)
    }
}

/// `(param_position, samples)` per operand.
type MockData = Vec<(u64, Vec<Vec<u8>>)>;

struct MockBenchmark {
    core: BenchmarkCore,
    config: MockConfig,
}

impl Benchmark for MockBenchmark {
    fn core(&self) -> &BenchmarkCore {
        &self.core
    }

    fn class_tag(&self) -> u64 {
        self.config.class_tag
    }

    fn encode(&mut self, session: &Session, params: &PackedParams<'_>) -> BridgeResult<Handle> {
        let data: MockData = params
            .iter()
            .map(|p| (p.param_position, p.buffers.iter().map(|b| b.to_vec()).collect()))
            .collect();
        session.create_handle(0, TAG_MOCK_DATA, data)
    }

    fn decode(
        &mut self,
        session: &Session,
        encoded: Handle,
        native: &mut PackedParamsMut<'_>,
    ) -> BridgeResult<()> {
        let data = session.retrieve::<MockData>(&encoded, TAG_MOCK_DATA)?;
        for (position, samples) in data.iter() {
            if let Some(pack) = native.find_mut(*position) {
                for (dst, src) in pack.buffers.iter_mut().zip(samples) {
                    let n = dst.len().min(src.len());
                    dst[..n].copy_from_slice(&src[..n]);
                }
            }
        }
        Ok(())
    }

    fn encrypt(&mut self, session: &Session, encoded: Handle) -> BridgeResult<Handle> {
        session.duplicate_handle(&encoded, None, TAG_MOCK_DATA)
    }

    fn decrypt(&mut self, session: &Session, encrypted: Handle) -> BridgeResult<Handle> {
        session.duplicate_handle(&encrypted, None, TAG_MOCK_DATA)
    }

    fn load(&mut self, session: &Session, local: &[Handle]) -> BridgeResult<Handle> {
        let first = local
            .first()
            .ok_or_else(|| BridgeError::invalid_args("no local handles to load"))?;
        session.duplicate_handle(first, None, TAG_MOCK_DATA)
    }

    fn store(&mut self, session: &Session, remote: Handle, local: &mut [Handle]) -> BridgeResult<()> {
        let stored = session.duplicate_handle(&remote, None, TAG_MOCK_DATA)?;
        local.fill(Handle::null());
        match local.first_mut() {
            Some(slot) => *slot = stored,
            None => session.destroy_handle(stored)?,
        }
        Ok(())
    }

    fn operate(
        &mut self,
        session: &Session,
        remote: Handle,
        _indexers: &[ParameterIndexer],
    ) -> BridgeResult<Handle> {
        if self.config.operate_panics {
            panic!("mock operate panicked");
        }
        if self.config.operate_fails {
            return Err(BridgeError::invalid_args("mock operate failed"));
        }
        session.duplicate_handle(&remote, None, TAG_MOCK_DATA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    #[test]
    fn test_mock_backend_default() {
        let backend = MockBackend::default_mock();
        assert_eq!(backend.name(), "mock");
        assert!(backend.version().is_some());
    }

    #[test]
    fn test_mock_registers_error_codes() {
        let backend = MockBackend::new(MockConfig::new("mock").with_error_code(42, "answer"));
        let engine = Engine::with_backend(&backend, EngineConfig::default()).unwrap();
        assert_eq!(engine.session().error_description(42), "answer");
        assert_eq!(engine.subscribe_benchmarks_count(), 1);
    }

    #[test]
    fn test_mixed_arity_defaults_fail_init() {
        let backend = MockBackend::new(MockConfig::new("mock").with_default_params(vec![
            GenericParams::new(1, 1).to_params(),
            GenericParams::new(2, 1).to_params(),
        ]));
        let err = Engine::with_backend(&backend, EngineConfig::default()).unwrap_err();
        assert_eq!(err.code(), crate::ECODE_INVALID_ARGS);
    }

    #[test]
    fn test_create_failure_uses_backend_code() {
        let backend = MockBackend::new(MockConfig::new("mock").create_fails_with(42));
        let engine = Engine::with_backend(&backend, EngineConfig::default()).unwrap();
        let desc = engine.list_descriptors()[0];
        let err = engine.create_benchmark(&desc, None).unwrap_err();
        assert_eq!(err.code(), 42);
        assert_eq!(engine.session().live_benchmarks(), 0);
    }
}
