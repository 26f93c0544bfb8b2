//! The engine: descriptor catalog, name tables and benchmark dispatch.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::Backend;
use crate::benchmark::handle::BENCHMARK_HANDLE_TAG;
use crate::benchmark::{Benchmark, BenchmarkDescription, BenchmarkHandle, DescriptionCore};
use crate::core::data::{PackedParams, PackedParamsMut};
use crate::core::params::WorkloadParam;
use crate::core::tags::{self, BENCHMARK, BENCHMARK_DESCRIPTOR};
use crate::core::types::{
    BenchmarkDescriptor, ErrorCode, Handle, ParameterIndexer, Scheme, Security,
};
use crate::{BridgeError, BridgeResult};

use super::config::EngineConfig;
use super::session::Session;

/// One initialized boundary session.
///
/// Populated by a [`Backend`] during construction and read-only afterwards;
/// descriptor handles are indices into the catalog, so they stay valid for the
/// engine's lifetime and never need releasing.
pub struct Engine {
    session: Session,
    config: EngineConfig,
    descriptors: Vec<Arc<dyn BenchmarkDescription>>,
    scheme_names: HashMap<Scheme, String>,
    security_names: HashMap<Security, String>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine {
            session: Session::new(),
            config,
            descriptors: Vec::new(),
            scheme_names: HashMap::new(),
            security_names: HashMap::new(),
        }
    }

    /// Builds an engine and lets `backend` register its workloads.
    pub fn with_backend(backend: &dyn Backend, config: EngineConfig) -> BridgeResult<Self> {
        config.check_api_version()?;
        let mut engine = Engine::new(config);
        backend.init(&mut engine)?;
        info!(
            backend = backend.name(),
            session = engine.session.id(),
            benchmarks = engine.descriptors.len(),
            "engine initialized"
        );
        Ok(engine)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- registration ------------------------------------------------------

    pub fn add_benchmark_description(&mut self, description: Arc<dyn BenchmarkDescription>) {
        self.descriptors.push(description);
    }

    pub fn add_scheme_name(&mut self, scheme: Scheme, name: impl Into<String>) -> BridgeResult<()> {
        if self.scheme_names.contains_key(&scheme) {
            return Err(BridgeError::critical(format!("scheme {scheme} already specified")));
        }
        self.scheme_names.insert(scheme, name.into());
        Ok(())
    }

    pub fn add_security_name(
        &mut self,
        security: Security,
        name: impl Into<String>,
    ) -> BridgeResult<()> {
        if self.security_names.contains_key(&security) {
            return Err(BridgeError::critical(format!(
                "security type {security} already specified"
            )));
        }
        self.security_names.insert(security, name.into());
        Ok(())
    }

    pub fn add_error_code(&self, code: ErrorCode, description: impl Into<String>) -> BridgeResult<()> {
        self.session.add_error_code(code, description)
    }

    pub fn scheme_name(&self, scheme: Scheme) -> BridgeResult<&str> {
        self.scheme_names
            .get(&scheme)
            .map(String::as_str)
            .ok_or_else(|| BridgeError::invalid_args(format!("scheme {scheme} not found")))
    }

    pub fn security_name(&self, security: Security) -> BridgeResult<&str> {
        self.security_names
            .get(&security)
            .map(String::as_str)
            .ok_or_else(|| BridgeError::invalid_args(format!("security {security} not found")))
    }

    // ---- catalog -----------------------------------------------------------

    pub fn subscribe_benchmarks_count(&self) -> u64 {
        self.descriptors.len() as u64
    }

    /// Fills `out` with one descriptor handle per catalog entry.
    pub fn subscribe_benchmarks(&self, out: &mut [Handle]) -> BridgeResult<()> {
        if out.len() != self.descriptors.len() {
            return Err(BridgeError::invalid_args(format!(
                "invalid size parameter 'count': expected {}, but {} received",
                self.descriptors.len(),
                out.len()
            )));
        }
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = descriptor_handle(i);
        }
        Ok(())
    }

    pub fn list_descriptors(&self) -> Vec<Handle> {
        (0..self.descriptors.len()).map(descriptor_handle).collect()
    }

    /// Resolves a descriptor handle to its catalog entry.
    pub fn match_benchmark(&self, h: &Handle) -> BridgeResult<&Arc<dyn BenchmarkDescription>> {
        if !tags::has_class(h.tag, BENCHMARK_DESCRIPTOR) || tags::has_class(h.tag, BENCHMARK) {
            return Err(BridgeError::critical(format!(
                "invalid benchmark descriptor handle (tag {:#x})",
                h.tag
            )));
        }
        self.descriptors
            .get(h.p as usize)
            .ok_or_else(|| BridgeError::critical("invalid benchmark descriptor not matched"))
    }

    pub fn workload_params_count(&self, h: &Handle) -> BridgeResult<u64> {
        Ok(self.match_benchmark(h)?.workload_param_count() as u64)
    }

    pub fn default_workload_params_count(&self, h: &Handle) -> BridgeResult<u64> {
        Ok(self.match_benchmark(h)?.default_params().len() as u64)
    }

    /// Copies the descriptor and as many default sets as `defaults` has slots.
    ///
    /// Fewer slots than sets truncates silently. A slot shorter than the
    /// arity of its set is Critical: a set is never copied partially.
    pub fn describe_benchmark(
        &self,
        h: &Handle,
        out: &mut BenchmarkDescriptor,
        defaults: Option<&mut [&mut [WorkloadParam]]>,
    ) -> BridgeResult<()> {
        let description = self.match_benchmark(h)?;
        *out = description.descriptor();

        if let Some(slots) = defaults {
            for (i, (slot, set)) in slots
                .iter_mut()
                .zip(description.default_params())
                .enumerate()
            {
                if slot.len() < set.len() {
                    return Err(BridgeError::critical(format!(
                        "insufficient space allocated for default set of parameters: {i}"
                    )));
                }
                slot[..set.len()].copy_from_slice(set);
            }
        }
        Ok(())
    }

    pub fn benchmark_description_ex(
        &self,
        h: &Handle,
        params: Option<&[WorkloadParam]>,
    ) -> BridgeResult<String> {
        Ok(self.match_benchmark(h)?.description(params))
    }

    // ---- benchmark lifecycle -----------------------------------------------

    pub fn create_benchmark(
        &self,
        h: &Handle,
        params: Option<&[WorkloadParam]>,
    ) -> BridgeResult<Handle> {
        let description = Arc::clone(self.match_benchmark(h)?);
        let live = self
            .session
            .acquire_benchmark_slot(self.config.max_live_benchmarks)?;
        let benchmark = description.create_benchmark(&self.session, params)?;
        let class_tag = benchmark.class_tag();
        let workload = benchmark.core().descriptor.workload;
        let bundle = BenchmarkHandle::new(benchmark, description, self.session.clone(), live);
        // dropping the bundle hands the instance back to its description
        tags::assert_no_reserved_bits(class_tag)?;

        info!(
            session = self.session.id(),
            workload = workload.name(),
            live = self.session.live_benchmarks(),
            "benchmark created"
        );
        Ok(bundle.into_handle(class_tag | BENCHMARK_HANDLE_TAG))
    }

    pub fn destroy_benchmark(&self, h: Handle) -> BridgeResult<()> {
        if h.p.is_null() {
            return Ok(());
        }
        self.resolve_benchmark(&h)?;
        // SAFETY: resolved above as a live bundle of this engine.
        unsafe { BenchmarkHandle::release(h)? };
        debug!(session = self.session.id(), "benchmark destroyed");
        Ok(())
    }

    fn resolve_benchmark<'a>(&self, h: &Handle) -> BridgeResult<&'a mut BenchmarkHandle> {
        // SAFETY: the host passes back a handle minted by `create_benchmark`;
        // the class bits are checked before the pointer is used.
        let bundle = unsafe { BenchmarkHandle::from_handle(h)? };
        if bundle.session().id() != self.session.id() {
            return Err(BridgeError::critical(
                "invalid handle: benchmark was not created by invoked engine",
            ));
        }
        Ok(bundle)
    }

    fn dispatch<R>(
        &self,
        h: &Handle,
        op: &'static str,
        f: impl FnOnce(&mut dyn Benchmark, &Session) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        self.resolve_benchmark(h)?.dispatch(op, f)
    }

    // ---- pipeline ----------------------------------------------------------

    pub fn init_benchmark(&self, h: &Handle, concrete: &BenchmarkDescriptor) -> BridgeResult<()> {
        self.dispatch(h, "initialize", |b, _| b.initialize(concrete))
    }

    pub fn encode(&self, h: &Handle, params: &PackedParams<'_>) -> BridgeResult<Handle> {
        self.dispatch(h, "encode", |b, s| b.encode(s, params))
    }

    pub fn decode(
        &self,
        h: &Handle,
        encoded: Handle,
        native: &mut PackedParamsMut<'_>,
    ) -> BridgeResult<()> {
        self.dispatch(h, "decode", |b, s| b.decode(s, encoded, native))
    }

    pub fn encrypt(&self, h: &Handle, encoded: Handle) -> BridgeResult<Handle> {
        self.dispatch(h, "encrypt", |b, s| b.encrypt(s, encoded))
    }

    pub fn decrypt(&self, h: &Handle, encrypted: Handle) -> BridgeResult<Handle> {
        self.dispatch(h, "decrypt", |b, s| b.decrypt(s, encrypted))
    }

    pub fn load(&self, h: &Handle, local: &[Handle]) -> BridgeResult<Handle> {
        self.dispatch(h, "load", |b, s| b.load(s, local))
    }

    pub fn store(&self, h: &Handle, remote: Handle, local: &mut [Handle]) -> BridgeResult<()> {
        self.dispatch(h, "store", |b, s| b.store(s, remote, local))
    }

    pub fn operate(
        &self,
        h: &Handle,
        remote: Handle,
        indexers: &[ParameterIndexer],
    ) -> BridgeResult<Handle> {
        self.dispatch(h, "operate", |b, s| b.operate(s, remote, indexers))
    }

    /// Releases any handle minted by this engine other than the engine itself.
    pub fn destroy_handle(&self, h: Handle) -> BridgeResult<()> {
        if h.p.is_null() && !tags::has_class(h.tag, BENCHMARK_DESCRIPTOR) {
            return Ok(());
        }
        if tags::has_class(h.tag, BENCHMARK_HANDLE_TAG) {
            self.destroy_benchmark(h)
        } else if tags::has_class(h.tag, tags::ENGINE_OBJECT) {
            self.session.destroy_handle(h)
        } else if h.tag == BENCHMARK_DESCRIPTOR {
            Ok(())
        } else {
            Err(BridgeError::critical(format!("invalid tag in handle: {:#x}", h.tag)))
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("session", &self.session.id())
            .field("config", &self.config)
            .field("benchmarks", &self.descriptors.len())
            .field("schemes", &self.scheme_names)
            .field("securities", &self.security_names)
            .finish()
    }
}

fn descriptor_handle(index: usize) -> Handle {
    Handle {
        p: index as *mut c_void,
        size: std::mem::size_of::<DescriptionCore>() as u64,
        tag: BENCHMARK_DESCRIPTOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockConfig};

    fn engine() -> Engine {
        Engine::with_backend(&MockBackend::default_mock(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_subscribe_requires_exact_count() {
        let e = engine();
        let n = e.subscribe_benchmarks_count() as usize;
        assert!(n > 0);
        let mut short = vec![Handle::null(); n - 1];
        let err = e.subscribe_benchmarks(&mut short).unwrap_err();
        assert_eq!(err.code(), crate::ECODE_INVALID_ARGS);

        let mut out = vec![Handle::null(); n];
        e.subscribe_benchmarks(&mut out).unwrap();
        assert_eq!(out, e.list_descriptors());
        assert_eq!(out[0].p as usize, 0);
        assert_eq!(out[0].tag, BENCHMARK_DESCRIPTOR);
    }

    #[test]
    fn test_match_rejects_bad_handles() {
        let e = engine();
        let out_of_range = descriptor_handle(99);
        assert!(e.match_benchmark(&out_of_range).unwrap_err().is_critical());
        let wrong_tag = Handle {
            tag: tags::ENGINE_OBJECT,
            ..descriptor_handle(0)
        };
        assert!(e.match_benchmark(&wrong_tag).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut e = Engine::new(EngineConfig::default());
        e.add_scheme_name(0, "Plain").unwrap();
        assert!(e.add_scheme_name(0, "Plain").unwrap_err().is_critical());
        e.add_security_name(0, "None").unwrap();
        assert!(e.add_security_name(0, "None").is_err());
        assert_eq!(e.scheme_name(0).unwrap(), "Plain");
        assert!(e.security_name(7).is_err());
    }

    #[test]
    fn test_reserved_class_tag_rejected() {
        let backend = MockBackend::new(MockConfig::new("mock").with_class_tag(1 << 60));
        let e = Engine::with_backend(&backend, EngineConfig::default()).unwrap();
        let desc = e.list_descriptors()[0];
        let params = e.match_benchmark(&desc).unwrap().default_params()[0].clone();
        let err = e.create_benchmark(&desc, Some(&params)).unwrap_err();
        assert!(err.is_critical());
        assert_eq!(e.session().live_benchmarks(), 0);
    }
}
