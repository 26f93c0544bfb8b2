use std::ffi::c_void;
use std::sync::Arc;

use tracing::debug;

use crate::core::tags::{self, BENCHMARK, BENCHMARK_DESCRIPTOR};
use crate::core::types::Handle;
use crate::engine::session::{LiveGuard, Session};
use crate::{BridgeError, BridgeResult};

use super::description::BenchmarkDescription;
use super::instance::Benchmark;

/// Infrastructure bits every benchmark handle carries.
pub const BENCHMARK_HANDLE_TAG: u64 = BENCHMARK | BENCHMARK_DESCRIPTOR;

/// What a benchmark handle points at: the instance together with the
/// description that must destroy it.
pub struct BenchmarkHandle {
    benchmark: Option<Box<dyn Benchmark>>,
    description: Arc<dyn BenchmarkDescription>,
    session: Session,
    _live: LiveGuard,
}

impl BenchmarkHandle {
    pub(crate) fn new(
        benchmark: Box<dyn Benchmark>,
        description: Arc<dyn BenchmarkDescription>,
        session: Session,
        live: LiveGuard,
    ) -> Self {
        BenchmarkHandle {
            benchmark: Some(benchmark),
            description,
            session,
            _live: live,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs one pipeline step against the instance with its session.
    pub fn dispatch<R>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut dyn Benchmark, &Session) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        debug!(session = self.session.id(), op, "pipeline dispatch");
        let benchmark = match self.benchmark.as_mut() {
            Some(b) => b.as_mut(),
            None => return Err(BridgeError::critical("invalid empty benchmark handle")),
        };
        f(benchmark, &self.session)
    }

    pub fn into_handle(self, tag: u64) -> Handle {
        Handle {
            p: Box::into_raw(Box::new(self)) as *mut c_void,
            size: std::mem::size_of::<BenchmarkHandle>() as u64,
            tag,
        }
    }

    fn check(h: &Handle) -> BridgeResult<()> {
        if !tags::has_class(h.tag, BENCHMARK_HANDLE_TAG) {
            return Err(BridgeError::critical(format!(
                "invalid handle not matching benchmark type (tag {:#x})",
                h.tag
            )));
        }
        if h.p.is_null() {
            return Err(BridgeError::critical("invalid empty benchmark handle"));
        }
        Ok(())
    }

    /// # Safety
    ///
    /// `h.p` must come from [`BenchmarkHandle::into_handle`] and not have been
    /// released. No other reference to the bundle may be alive.
    pub unsafe fn from_handle<'a>(h: &Handle) -> BridgeResult<&'a mut BenchmarkHandle> {
        Self::check(h)?;
        // SAFETY: tag checked and non-null; exclusive per the contract above.
        Ok(unsafe { &mut *(h.p as *mut BenchmarkHandle) })
    }

    /// Destroys the instance through its description and frees the bundle.
    ///
    /// # Safety
    ///
    /// Same contract as [`BenchmarkHandle::from_handle`]; `h` is dangling
    /// afterwards.
    pub unsafe fn release(h: Handle) -> BridgeResult<()> {
        Self::check(&h)?;
        // SAFETY: ownership of the box goes back to Rust exactly once.
        drop(unsafe { Box::from_raw(h.p as *mut BenchmarkHandle) });
        Ok(())
    }
}

impl Drop for BenchmarkHandle {
    fn drop(&mut self) {
        if let Some(benchmark) = self.benchmark.take() {
            self.description.destroy_benchmark(benchmark);
        }
    }
}
