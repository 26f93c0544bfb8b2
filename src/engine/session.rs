//! Per-engine state shared with every benchmark the engine creates.
//!
//! A [`Session`] is the handle factory: it mints object handles, resolves them
//! back into typed payloads and duplicates them. It also owns the last-error
//! record and the error-description table the call adapter reports through.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::core::tags::{self, ENGINE_OBJECT};
use crate::core::types::{ErrorCode, Handle};
use crate::{BridgeError, BridgeResult, ECODE_CRITICAL_ERROR, ECODE_INVALID_ARGS, ECODE_SUCCESS};

use super::object::EngineObject;

const UNKNOWN_ERROR: &str = "Unknown Error";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub code: ErrorCode,
    pub description: String,
}

#[derive(Debug)]
struct SessionInner {
    id: u64,
    last_error: Mutex<LastError>,
    error_descriptions: RwLock<HashMap<ErrorCode, String>>,
    live_benchmarks: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let descriptions = HashMap::from([
            (ECODE_SUCCESS, "Success".to_string()),
            (ECODE_INVALID_ARGS, "Invalid argument.".to_string()),
            (ECODE_CRITICAL_ERROR, "Critical error.".to_string()),
        ]);
        Session {
            inner: Arc::new(SessionInner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                last_error: Mutex::new(LastError {
                    code: ECODE_SUCCESS,
                    description: "Success".to_string(),
                }),
                error_descriptions: RwLock::new(descriptions),
                live_benchmarks: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    // ---- error state -------------------------------------------------------

    pub fn set_last_error(&self, code: ErrorCode, description: impl Into<String>) {
        let mut last = self
            .inner
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last.code = code;
        last.description = description.into();
    }

    pub fn record_error(&self, err: &BridgeError) {
        self.set_last_error(err.code(), err.to_string());
    }

    pub fn last_error(&self) -> ErrorCode {
        self.inner
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .code
    }

    pub fn last_error_description(&self) -> String {
        self.inner
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .description
            .clone()
    }

    /// Registered description for `code`, or "Unknown Error".
    pub fn error_description(&self, code: ErrorCode) -> String {
        self.inner
            .error_descriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&code)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
    }

    pub fn add_error_code(&self, code: ErrorCode, description: impl Into<String>) -> BridgeResult<()> {
        let mut table = self
            .inner
            .error_descriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if table.contains_key(&code) {
            return Err(BridgeError::critical(format!(
                "error code {code} already specified"
            )));
        }
        table.insert(code, description.into());
        Ok(())
    }

    // ---- live benchmark accounting ----------------------------------------

    pub fn live_benchmarks(&self) -> usize {
        self.inner.live_benchmarks.load(Ordering::Acquire)
    }

    /// Reserves a slot for a new benchmark, failing once `limit` are live.
    pub(crate) fn acquire_benchmark_slot(&self, limit: Option<usize>) -> BridgeResult<LiveGuard> {
        let counter = &self.inner.live_benchmarks;
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if let Some(limit) = limit {
                if current >= limit {
                    return Err(BridgeError::invalid_args(format!(
                        "maximum number of live benchmarks reached ({limit})"
                    )));
                }
            }
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        Ok(LiveGuard {
            session: self.clone(),
        })
    }

    // ---- handle factory ----------------------------------------------------

    /// Wraps `value` and mints a handle tagged `ENGINE_OBJECT | extra_tags`.
    pub fn create_handle<T: Any + Send + Sync>(
        &self,
        size: u64,
        extra_tags: u64,
        value: T,
    ) -> BridgeResult<Handle> {
        tags::assert_no_reserved_bits(extra_tags)?;
        let h = EngineObject::wrap(self.id(), value).into_handle(size, ENGINE_OBJECT | extra_tags);
        debug!(session = self.id(), tag = h.tag, "minted object handle");
        Ok(h)
    }

    /// Verifies that `h` is an object handle carrying every bit of `required_tags`.
    pub fn check_handle_tags(&self, h: &Handle, required_tags: u64) -> BridgeResult<()> {
        tags::assert_no_reserved_bits(required_tags)?;
        if !tags::has_class(h.tag, ENGINE_OBJECT) {
            return Err(BridgeError::critical(format!(
                "invalid tag {:#x}: expected an engine object",
                h.tag
            )));
        }
        if !tags::has_class(h.tag, required_tags) {
            return Err(BridgeError::critical(format!(
                "invalid tag {:#x}: expected bits {required_tags:#x}",
                h.tag
            )));
        }
        Ok(())
    }

    fn resolve<'a>(&self, h: &Handle, required_tags: u64) -> BridgeResult<&'a EngineObject> {
        self.check_handle_tags(h, required_tags)?;
        // SAFETY: tag checked; a live object handle points at a boxed EngineObject.
        let obj = unsafe { EngineObject::from_handle(h)? };
        if obj.session_id() != self.id() {
            return Err(BridgeError::critical(
                "invalid handle: handle was not created by invoked engine",
            ));
        }
        Ok(obj)
    }

    /// Typed payload of `h`. Tag, session and type are all checked.
    pub fn retrieve<T: Any + Send + Sync>(&self, h: &Handle, required_tags: u64) -> BridgeResult<Arc<T>> {
        self.resolve(h, required_tags)?.downcast::<T>().ok_or_else(|| {
            BridgeError::critical(format!(
                "handle payload is not of type {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// New handle over the same payload. `None` keeps the source tag.
    pub fn duplicate_handle(
        &self,
        h: &Handle,
        new_tags: Option<u64>,
        required_tags: u64,
    ) -> BridgeResult<Handle> {
        let obj = self.resolve(h, required_tags)?;
        let tag = match new_tags {
            None => h.tag,
            Some(t) => {
                tags::assert_no_reserved_bits(t)?;
                ENGINE_OBJECT | t
            }
        };
        Ok(obj.duplicate().into_handle(h.size, tag))
    }

    /// Releases one reference held by an object handle of this session.
    pub fn destroy_handle(&self, h: Handle) -> BridgeResult<()> {
        self.resolve(&h, 0)?;
        // SAFETY: resolved above as a live object of this session.
        unsafe { EngineObject::release(h) }
    }

    /// Strong count behind an object handle; diagnostics only.
    pub fn ref_count(&self, h: &Handle) -> BridgeResult<usize> {
        Ok(self.resolve(h, 0)?.ref_count())
    }
}

/// Holds one live-benchmark slot until dropped.
#[derive(Debug)]
pub struct LiveGuard {
    session: Session,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.session.inner.live_benchmarks.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_error_descriptions() {
        let s = Session::new();
        assert_eq!(s.error_description(ECODE_SUCCESS), "Success");
        assert_eq!(s.error_description(ECODE_INVALID_ARGS), "Invalid argument.");
        assert_eq!(s.error_description(12345), "Unknown Error");
    }

    #[test]
    fn test_add_error_code_rejects_repeat() {
        let s = Session::new();
        s.add_error_code(5, "five").unwrap();
        assert_eq!(s.error_description(5), "five");
        assert!(s.add_error_code(5, "again").unwrap_err().is_critical());
        assert!(s.add_error_code(ECODE_CRITICAL_ERROR, "dup").is_err());
    }

    #[test]
    fn test_last_error_record() {
        let s = Session::new();
        assert_eq!(s.last_error(), ECODE_SUCCESS);
        s.record_error(&BridgeError::invalid_args("bad count"));
        assert_eq!(s.last_error(), ECODE_INVALID_ARGS);
        assert_eq!(s.last_error_description(), "bad count");
    }

    #[test]
    fn test_create_retrieve_duplicate() {
        let s = Session::new();
        let h = s.create_handle(4, 0x10, 7i32).unwrap();
        assert!(tags::has_class(h.tag, ENGINE_OBJECT | 0x10));
        assert_eq!(*s.retrieve::<i32>(&h, 0x10).unwrap(), 7);

        let dup = s.duplicate_handle(&h, Some(0x20), 0x10).unwrap();
        assert_eq!(dup.tag, ENGINE_OBJECT | 0x20);
        assert_eq!(s.ref_count(&dup).unwrap(), 2);
        s.destroy_handle(h).unwrap();
        assert_eq!(*s.retrieve::<i32>(&dup, 0x20).unwrap(), 7);
        assert_eq!(s.ref_count(&dup).unwrap(), 1);
        s.destroy_handle(dup).unwrap();
    }

    #[test]
    fn test_type_mismatch_is_critical() {
        let s = Session::new();
        let h = s.create_handle(0, 0, 1u8).unwrap();
        assert!(s.retrieve::<u64>(&h, 0).unwrap_err().is_critical());
        s.destroy_handle(h).unwrap();
    }

    #[test]
    fn test_foreign_session_rejected() {
        let a = Session::new();
        let b = Session::new();
        let h = a.create_handle(0, 0, ()).unwrap();
        assert!(b.retrieve::<()>(&h, 0).unwrap_err().is_critical());
        assert!(b.duplicate_handle(&h, None, 0).is_err());
        a.destroy_handle(h).unwrap();
    }

    #[test]
    fn test_live_slots_respect_limit() {
        let s = Session::new();
        let g1 = s.acquire_benchmark_slot(Some(1)).unwrap();
        assert_eq!(s.live_benchmarks(), 1);
        let err = s.acquire_benchmark_slot(Some(1)).unwrap_err();
        assert_eq!(err.code(), ECODE_INVALID_ARGS);
        drop(g1);
        assert_eq!(s.live_benchmarks(), 0);
        let _g2 = s.acquire_benchmark_slot(None).unwrap();
    }
}
