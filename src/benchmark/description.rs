use crate::core::params::WorkloadParam;
use crate::core::types::BenchmarkDescriptor;
use crate::engine::session::Session;
use crate::{BridgeError, BridgeResult};

use super::instance::Benchmark;

/// Fixed shape of a workload plus its default parameter sets.
#[derive(Debug, Clone, Default)]
pub struct DescriptionCore {
    pub descriptor: BenchmarkDescriptor,
    default_params: Vec<Vec<WorkloadParam>>,
}

impl DescriptionCore {
    pub fn new(descriptor: BenchmarkDescriptor) -> Self {
        DescriptionCore {
            descriptor,
            default_params: Vec::new(),
        }
    }

    /// Appends a default set. Every set must have the arity of the first.
    pub fn add_default_params(&mut self, set: Vec<WorkloadParam>) -> BridgeResult<()> {
        if let Some(first) = self.default_params.first() {
            if first.len() != set.len() {
                return Err(BridgeError::invalid_args(format!(
                    "size of new default set of arguments ({}) differs from existing default sets ({})",
                    set.len(),
                    first.len()
                )));
            }
        }
        self.default_params.push(set);
        Ok(())
    }

    pub fn with_default_params(mut self, set: Vec<WorkloadParam>) -> BridgeResult<Self> {
        self.add_default_params(set)?;
        Ok(self)
    }

    pub fn default_params(&self) -> &[Vec<WorkloadParam>] {
        &self.default_params
    }

    /// Arity shared by all default sets; 0 when there are none.
    pub fn workload_param_count(&self) -> usize {
        self.default_params.first().map_or(0, Vec::len)
    }
}

/// A registered workload: describes itself and creates benchmark instances.
pub trait BenchmarkDescription: Send + Sync {
    fn core(&self) -> &DescriptionCore;

    fn descriptor(&self) -> BenchmarkDescriptor {
        self.core().descriptor
    }

    fn default_params(&self) -> &[Vec<WorkloadParam>] {
        self.core().default_params()
    }

    fn workload_param_count(&self) -> usize {
        self.core().workload_param_count()
    }

    /// Builds an instance bound to `session`. `params` are the host's
    /// workload parameters; implementations validate them.
    fn create_benchmark(
        &self,
        session: &Session,
        params: Option<&[WorkloadParam]>,
    ) -> BridgeResult<Box<dyn Benchmark>>;

    /// Tears down an instance created by this description.
    fn destroy_benchmark(&self, benchmark: Box<dyn Benchmark>) {
        drop(benchmark);
    }

    /// Extended, human-readable text for a parameterization of this workload.
    fn description(&self, _params: Option<&[WorkloadParam]>) -> String {
        String::new()
    }
}


impl std::fmt::Debug for dyn BenchmarkDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkDescription")
            .field("core", self.core())
            .finish()
    }
}
