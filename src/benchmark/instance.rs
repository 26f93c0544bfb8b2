use crate::core::data::{PackedParams, PackedParamsMut};
use crate::core::params::WorkloadParam;
use crate::core::types::{BenchmarkDescriptor, Handle, ParameterIndexer};
use crate::engine::session::Session;
use crate::BridgeResult;

/// Descriptor snapshot and workload parameters bound at construction.
#[derive(Debug, Clone)]
pub struct BenchmarkCore {
    pub descriptor: BenchmarkDescriptor,
    pub workload_params: Vec<WorkloadParam>,
}

impl BenchmarkCore {
    pub fn new(descriptor: BenchmarkDescriptor, workload_params: &[WorkloadParam]) -> Self {
        BenchmarkCore {
            descriptor,
            workload_params: workload_params.to_vec(),
        }
    }
}

/// One live run of a workload.
///
/// Every handle returned from these methods is minted through `session` and
/// owned by the caller, who releases it independently of the instance.
/// Shape or tag problems in the inputs are `InvalidArgs`; anything that
/// means the instance can no longer be trusted is `Critical`.
pub trait Benchmark: Send {
    fn core(&self) -> &BenchmarkCore;

    /// Backend bits OR-ed into the benchmark handle tag. Must stay below the
    /// reserved range.
    fn class_tag(&self) -> u64 {
        0
    }

    /// Receives the concrete descriptor once before the first pipeline call.
    fn initialize(&mut self, _concrete: &BenchmarkDescriptor) -> BridgeResult<()> {
        Ok(())
    }

    /// Deep-copies host data; `params` may be released once this returns.
    fn encode(&mut self, session: &Session, params: &PackedParams<'_>) -> BridgeResult<Handle>;

    /// Writes as much of `encoded` as fits into `native`.
    fn decode(
        &mut self,
        session: &Session,
        encoded: Handle,
        native: &mut PackedParamsMut<'_>,
    ) -> BridgeResult<()>;

    fn encrypt(&mut self, session: &Session, encoded: Handle) -> BridgeResult<Handle>;

    fn decrypt(&mut self, session: &Session, encrypted: Handle) -> BridgeResult<Handle>;

    fn load(&mut self, session: &Session, local: &[Handle]) -> BridgeResult<Handle>;

    /// Fills `local`; slots without a result are set to a null handle.
    fn store(&mut self, session: &Session, remote: Handle, local: &mut [Handle]) -> BridgeResult<()>;

    /// Runs the workload to completion on the selected samples.
    fn operate(
        &mut self,
        session: &Session,
        remote: Handle,
        indexers: &[ParameterIndexer],
    ) -> BridgeResult<Handle>;
}
