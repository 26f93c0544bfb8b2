//! Exported C entry points.
//!
//! Every function here follows the same shape: validate the raw arguments,
//! resolve the handles it was given, call into [`Engine`] or the benchmark
//! bundle, and turn the outcome into an [`ErrorCode`]. Failures are stored in
//! the owning session's last-error record when a session could be resolved,
//! and logged either way. Panics never unwind into the host: they are caught
//! here and reported as critical errors.
//!
//! Functions that return a string size report 0 on failure; the host then asks
//! for the last error.

use std::any::Any;
use std::ffi::{c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::{ptr, slice};

use tracing::{error, warn};

use crate::backend::default_backend;
use crate::benchmark::BenchmarkHandle;
use crate::benchmark::handle::BENCHMARK_HANDLE_TAG;
use crate::core::data::{PackedParams, PackedParamsMut};
use crate::core::params::{WorkloadParam, WorkloadParams};
use crate::core::strings::copy_string;
use crate::core::tags::{self, BENCHMARK_DESCRIPTOR, ENGINE, ENGINE_OBJECT};
use crate::core::types::{
    API_VERSION_MAJOR, API_VERSION_MINOR, API_VERSION_REVISION, BenchmarkDescriptor,
    DataPackCollection, ErrorCode, Handle, ParameterIndexer, RawBenchmarkDescriptor, Scheme,
    Security,
};
use crate::engine::{Engine, EngineConfig, EngineObject, Session};
use crate::{BridgeError, BridgeResult, ECODE_SUCCESS, logging};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn report(op: &'static str, session: Option<&Session>, err: &BridgeError) {
    if let Some(session) = session {
        session.record_error(err);
    }
    let code = err.code();
    if err.is_critical() {
        error!(op, code, error = %err, "boundary call failed");
    } else {
        warn!(op, code, error = %err, "boundary call failed");
    }
}

/// Runs `f`, catching panics. `f` stores the session it resolves so that a
/// failure can be recorded against it.
fn guarded<T>(
    op: &'static str,
    f: impl FnOnce(&mut Option<Session>) -> BridgeResult<T>,
) -> Result<T, ErrorCode> {
    let mut session = None;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&mut session))).unwrap_or_else(
        |payload| {
            Err(BridgeError::critical(format!(
                "panic in {op}: {}",
                panic_message(payload.as_ref())
            )))
        },
    );
    outcome.map_err(|err| {
        report(op, session.as_ref(), &err);
        err.code()
    })
}

fn call(op: &'static str, f: impl FnOnce(&mut Option<Session>) -> BridgeResult<()>) -> ErrorCode {
    match guarded(op, f) {
        Ok(()) => ECODE_SUCCESS,
        Err(code) => code,
    }
}

fn query(op: &'static str, f: impl FnOnce(&mut Option<Session>) -> BridgeResult<u64>) -> u64 {
    guarded(op, f).unwrap_or(0)
}

fn require<T>(p: *const T, name: &str) -> BridgeResult<()> {
    if p.is_null() {
        return Err(BridgeError::invalid_args(format!(
            "invalid null pointer argument '{name}'"
        )));
    }
    Ok(())
}

/// # Safety
///
/// A non-null `p` must be valid for reads of `count` elements.
unsafe fn host_slice<'a, T>(p: *const T, count: u64, name: &str) -> BridgeResult<&'a [T]> {
    if count == 0 {
        return Ok(&[]);
    }
    require(p, name)?;
    // SAFETY: non-null, length vouched for by the host.
    Ok(unsafe { slice::from_raw_parts(p, count as usize) })
}

/// # Safety
///
/// A non-null `p` must be valid for writes of `count` elements.
unsafe fn host_slice_mut<'a, T>(p: *mut T, count: u64, name: &str) -> BridgeResult<&'a mut [T]> {
    if count == 0 {
        return Ok(&mut []);
    }
    require(p.cast_const(), name)?;
    // SAFETY: non-null, length vouched for by the host.
    Ok(unsafe { slice::from_raw_parts_mut(p, count as usize) })
}

/// # Safety
///
/// A non-null `p` must be valid for writes of `size` bytes.
unsafe fn out_buffer<'a>(p: *mut c_char, size: u64) -> Option<&'a mut [u8]> {
    if p.is_null() || size == 0 {
        return None;
    }
    // SAFETY: non-null, length vouched for by the host.
    Some(unsafe { slice::from_raw_parts_mut(p.cast::<u8>(), size as usize) })
}

/// # Safety
///
/// A non-null `p` must point to a valid [`WorkloadParams`] whose array is
/// readable for `count` elements.
unsafe fn workload_params<'a>(p: *const WorkloadParams) -> BridgeResult<Option<&'a [WorkloadParam]>> {
    if p.is_null() {
        return Ok(None);
    }
    // SAFETY: non-null per the contract above.
    let wp = unsafe { &*p };
    // SAFETY: forwarded.
    let params = unsafe { host_slice(wp.params.cast_const(), wp.count, "params")? };
    for p in params {
        p.param_type()?;
    }
    Ok(Some(params))
}

/// Boxes `engine` into a handle the exported functions accept.
///
/// `init_engine` uses this with the built-in backend; hosts that link the
/// crate directly can use it to expose an engine built from any backend.
pub fn engine_handle(engine: Engine) -> Handle {
    Handle {
        p: Box::into_raw(Box::new(engine)).cast::<c_void>(),
        size: std::mem::size_of::<Engine>() as u64,
        tag: ENGINE,
    }
}

/// # Safety
///
/// `h` must come from [`engine_handle`] and not have been destroyed.
unsafe fn bind_engine<'a>(h: &Handle, session: &mut Option<Session>) -> BridgeResult<&'a Engine> {
    if h.p.is_null() || h.tag != ENGINE {
        return Err(BridgeError::critical(format!(
            "invalid handle not matching engine type (tag {:#x})",
            h.tag
        )));
    }
    // SAFETY: tag and non-null checked; validity per the contract above.
    let engine = unsafe { &*h.p.cast::<Engine>() };
    *session = Some(engine.session().clone());
    Ok(engine)
}

/// # Safety
///
/// `h` must come from `create_benchmark` and not have been destroyed.
unsafe fn bind_benchmark<'a>(
    h: &Handle,
    session: &mut Option<Session>,
) -> BridgeResult<&'a mut BenchmarkHandle> {
    // SAFETY: forwarded.
    let bundle = unsafe { BenchmarkHandle::from_handle(h)? };
    *session = Some(bundle.session().clone());
    Ok(bundle)
}

// ---- versioning and lifetime ----------------------------------------------

/// # Safety
///
/// Non-null pointers must be valid for a `u64` write.
#[unsafe(export_name = "bridge_api_version")]
pub unsafe extern "C" fn api_version(
    p_major: *mut u64,
    p_minor: *mut u64,
    p_revision: *mut u64,
) -> ErrorCode {
    call("api_version", |_| {
        require(p_major.cast_const(), "p_major")?;
        require(p_minor.cast_const(), "p_minor")?;
        require(p_revision.cast_const(), "p_revision")?;
        // SAFETY: checked non-null above.
        unsafe {
            p_major.write(API_VERSION_MAJOR);
            p_minor.write(API_VERSION_MINOR);
            p_revision.write(API_VERSION_REVISION);
        }
        Ok(())
    })
}

/// Creates the engine for the built-in backend.
///
/// `p_config` holds `size` bytes of TOML (see [`EngineConfig`]); null or empty
/// selects the defaults.
///
/// # Safety
///
/// `h_engine` must be valid for a [`Handle`] write; a non-null `p_config` must
/// be readable for `size` bytes.
#[unsafe(export_name = "bridge_init_engine")]
pub unsafe extern "C" fn init_engine(
    h_engine: *mut Handle,
    p_config: *const c_char,
    size: u64,
) -> ErrorCode {
    call("init_engine", |_| {
        if h_engine.is_null() {
            return Err(BridgeError::critical("invalid null engine handle output"));
        }
        let bytes = if p_config.is_null() {
            &[][..]
        } else {
            // SAFETY: per the function contract.
            unsafe { host_slice(p_config.cast::<u8>(), size, "p_config")? }
        };
        let config = EngineConfig::from_bytes(bytes)?;
        logging::init(config.log_filter.as_deref(), false);
        let backend = default_backend();
        let engine = Engine::with_backend(backend.as_ref(), config)?;
        // SAFETY: checked non-null above.
        unsafe { h_engine.write(engine_handle(engine)) };
        Ok(())
    })
}

/// Releases any handle: engine, benchmark or engine object.
///
/// Descriptor handles and null handles are accepted and ignored. Benchmarks
/// and objects outliving their engine stay valid until released.
///
/// # Safety
///
/// `h` must be a handle minted by this library that was not released yet.
#[unsafe(export_name = "bridge_destroy_handle")]
pub unsafe extern "C" fn destroy_handle(h: Handle) -> ErrorCode {
    call("destroy_handle", |session| {
        if h.p.is_null() {
            return Ok(());
        }
        if tags::has_class(h.tag, BENCHMARK_HANDLE_TAG) {
            // SAFETY: per the function contract.
            unsafe {
                bind_benchmark(&h, session)?;
                BenchmarkHandle::release(h)
            }
        } else if tags::has_class(h.tag, ENGINE_OBJECT) {
            // SAFETY: per the function contract.
            unsafe { EngineObject::release(h) }
        } else if h.tag == ENGINE {
            // SAFETY: exact engine tag; the box came from `engine_handle`.
            drop(unsafe { Box::from_raw(h.p.cast::<Engine>()) });
            Ok(())
        } else if h.tag == BENCHMARK_DESCRIPTOR {
            Ok(())
        } else {
            Err(BridgeError::critical(format!("invalid tag in handle: {:#x}", h.tag)))
        }
    })
}

// ---- catalog -----------------------------------------------------------------

/// # Safety
///
/// `h_engine` must be live; `p_count` must be valid for a `u64` write.
#[unsafe(export_name = "bridge_subscribe_benchmarks_count")]
pub unsafe extern "C" fn subscribe_benchmarks_count(h_engine: Handle, p_count: *mut u64) -> ErrorCode {
    call("subscribe_benchmarks_count", |session| {
        // SAFETY: per the function contract.
        let engine = unsafe { bind_engine(&h_engine, session)? };
        require(p_count.cast_const(), "p_count")?;
        // SAFETY: checked non-null above.
        unsafe { p_count.write(engine.subscribe_benchmarks_count()) };
        Ok(())
    })
}

/// # Safety
///
/// `h_engine` must be live; `p_h_bench_descs` must be writable for `count`
/// handles.
#[unsafe(export_name = "bridge_subscribe_benchmarks")]
pub unsafe extern "C" fn subscribe_benchmarks(
    h_engine: Handle,
    p_h_bench_descs: *mut Handle,
    count: u64,
) -> ErrorCode {
    call("subscribe_benchmarks", |session| {
        // SAFETY: per the function contract.
        let engine = unsafe { bind_engine(&h_engine, session)? };
        // SAFETY: per the function contract.
        let out = unsafe { host_slice_mut(p_h_bench_descs, count, "p_h_bench_descs")? };
        engine.subscribe_benchmarks(out)
    })
}

/// # Safety
///
/// `h_engine` must be live; both outputs must be valid for a `u64` write.
#[unsafe(export_name = "bridge_get_workload_params_details")]
pub unsafe extern "C" fn get_workload_params_details(
    h_engine: Handle,
    h_bench_desc: Handle,
    p_param_count: *mut u64,
    p_default_count: *mut u64,
) -> ErrorCode {
    call("get_workload_params_details", |session| {
        // SAFETY: per the function contract.
        let engine = unsafe { bind_engine(&h_engine, session)? };
        require(p_param_count.cast_const(), "p_param_count")?;
        require(p_default_count.cast_const(), "p_default_count")?;
        let params = engine.workload_params_count(&h_bench_desc)?;
        let defaults = engine.default_workload_params_count(&h_bench_desc)?;
        // SAFETY: checked non-null above.
        unsafe {
            p_param_count.write(params);
            p_default_count.write(defaults);
        }
        Ok(())
    })
}

/// Fills the descriptor and up to `default_count` default parameter sets.
///
/// Each host set must have room for the workload's full arity; sets beyond
/// what the workload defines are left untouched.
///
/// # Safety
///
/// `h_engine` must be live; `p_bench_desc` must be valid for a write; a
/// non-null `p_default_params` must point to `default_count` entries whose
/// arrays are writable for their `count`.
#[unsafe(export_name = "bridge_describe_benchmark")]
pub unsafe extern "C" fn describe_benchmark(
    h_engine: Handle,
    h_bench_desc: Handle,
    p_bench_desc: *mut RawBenchmarkDescriptor,
    p_default_params: *mut WorkloadParams,
    default_count: u64,
) -> ErrorCode {
    call("describe_benchmark", |session| {
        // SAFETY: per the function contract.
        let engine = unsafe { bind_engine(&h_engine, session)? };
        if p_bench_desc.is_null() {
            return Err(BridgeError::critical("invalid null benchmark descriptor output"));
        }
        let arity = engine.workload_params_count(&h_bench_desc)? as usize;
        let sets = engine.default_workload_params_count(&h_bench_desc)? as usize;
        let hosts = if p_default_params.is_null() {
            &[][..]
        } else {
            // SAFETY: per the function contract.
            unsafe { host_slice(p_default_params.cast_const(), default_count, "p_default_params")? }
        };

        // host memory may be uninitialized, so fill scratch sets and copy out
        let mut scratch = Vec::with_capacity(hosts.len().min(sets));
        for host in hosts.iter().take(sets) {
            let len = (host.count as usize).min(arity);
            if len > 0 {
                require(host.params.cast_const(), "params")?;
            }
            scratch.push(vec![WorkloadParam::from_u64("", 0); len]);
        }

        let mut descriptor = BenchmarkDescriptor::default();
        {
            let mut slots: Vec<&mut [WorkloadParam]> =
                scratch.iter_mut().map(Vec::as_mut_slice).collect();
            engine.describe_benchmark(&h_bench_desc, &mut descriptor, Some(slots.as_mut_slice()))?;
        }
        for (host, filled) in hosts.iter().zip(&scratch) {
            if !filled.is_empty() {
                // SAFETY: non-null checked above; the host array holds at
                // least `filled.len()` elements.
                unsafe { ptr::copy_nonoverlapping(filled.as_ptr(), host.params, filled.len()) };
            }
        }
        // SAFETY: checked non-null above.
        unsafe { p_bench_desc.write(RawBenchmarkDescriptor::from(&descriptor)) };
        Ok(())
    })
}

/// # Safety
///
/// `h_engine` must be live; `h_bench` must be valid for a [`Handle`] write; a
/// non-null `p_params` must be a valid parameter list.
#[unsafe(export_name = "bridge_create_benchmark")]
pub unsafe extern "C" fn create_benchmark(
    h_engine: Handle,
    h_bench_desc: Handle,
    p_params: *const WorkloadParams,
    h_bench: *mut Handle,
) -> ErrorCode {
    call("create_benchmark", |session| {
        // SAFETY: per the function contract.
        let engine = unsafe { bind_engine(&h_engine, session)? };
        require(h_bench.cast_const(), "h_bench")?;
        // SAFETY: per the function contract.
        let params = unsafe { workload_params(p_params)? };
        let created = engine.create_benchmark(&h_bench_desc, params)?;
        // SAFETY: checked non-null above.
        unsafe { h_bench.write(created) };
        Ok(())
    })
}

/// # Safety
///
/// `h_engine` must be live; a non-null `p_params` must be a valid parameter
/// list and `p_description` writable for `size` bytes.
#[unsafe(export_name = "bridge_get_benchmark_description_ex")]
pub unsafe extern "C" fn get_benchmark_description_ex(
    h_engine: Handle,
    h_bench_desc: Handle,
    p_params: *const WorkloadParams,
    p_description: *mut c_char,
    size: u64,
) -> u64 {
    query("get_benchmark_description_ex", |session| {
        // SAFETY: per the function contract.
        let engine = unsafe { bind_engine(&h_engine, session)? };
        // SAFETY: per the function contract.
        let params = unsafe { workload_params(p_params)? };
        let text = engine.benchmark_description_ex(&h_bench_desc, params)?;
        // SAFETY: per the function contract.
        Ok(copy_string(unsafe { out_buffer(p_description, size) }, &text))
    })
}

// ---- pipeline ----------------------------------------------------------------

/// # Safety
///
/// `h_bench` must be live; `p_bench_desc` must point to an initialized
/// descriptor. Enum fields are range-checked before use.
#[unsafe(export_name = "bridge_init_benchmark")]
pub unsafe extern "C" fn init_benchmark(
    h_bench: Handle,
    p_bench_desc: *const RawBenchmarkDescriptor,
) -> ErrorCode {
    call("init_benchmark", |session| {
        // SAFETY: per the function contract.
        let bundle = unsafe { bind_benchmark(&h_bench, session)? };
        require(p_bench_desc, "p_bench_desc")?;
        // SAFETY: checked non-null above; every field of the raw layout is
        // valid for any bit pattern.
        let concrete = BenchmarkDescriptor::try_from(unsafe { &*p_bench_desc })?;
        bundle.dispatch("initialize", |b, _| b.initialize(&concrete))
    })
}

/// # Safety
///
/// `h_bench` must be live; `p_parameters` must describe readable buffers;
/// `h_encoded` must be valid for a [`Handle`] write.
#[unsafe(export_name = "bridge_encode")]
pub unsafe extern "C" fn encode(
    h_bench: Handle,
    p_parameters: *const DataPackCollection,
    h_encoded: *mut Handle,
) -> ErrorCode {
    call("encode", |session| {
        // SAFETY: per the function contract.
        let bundle = unsafe { bind_benchmark(&h_bench, session)? };
        require(p_parameters, "p_parameters")?;
        require(h_encoded.cast_const(), "h_encoded")?;
        // SAFETY: checked non-null; buffers per the function contract.
        let packed = unsafe { PackedParams::from_raw(&*p_parameters)? };
        let encoded = bundle.dispatch("encode", |b, s| b.encode(s, &packed))?;
        // SAFETY: checked non-null above.
        unsafe { h_encoded.write(encoded) };
        Ok(())
    })
}

/// # Safety
///
/// `h_bench` must be live; `p_native` must describe writable, non-overlapping
/// buffers.
#[unsafe(export_name = "bridge_decode")]
pub unsafe extern "C" fn decode(
    h_bench: Handle,
    h_encoded: Handle,
    p_native: *mut DataPackCollection,
) -> ErrorCode {
    call("decode", |session| {
        // SAFETY: per the function contract.
        let bundle = unsafe { bind_benchmark(&h_bench, session)? };
        require(p_native.cast_const(), "p_native")?;
        // SAFETY: checked non-null; buffers per the function contract.
        let mut native = unsafe { PackedParamsMut::from_raw(&mut *p_native)? };
        bundle.dispatch("decode", |b, s| b.decode(s, h_encoded, &mut native))
    })
}

/// # Safety
///
/// `h_bench` must be live; `h_encrypted` must be valid for a write.
#[unsafe(export_name = "bridge_encrypt")]
pub unsafe extern "C" fn encrypt(
    h_bench: Handle,
    h_encoded: Handle,
    h_encrypted: *mut Handle,
) -> ErrorCode {
    call("encrypt", |session| {
        // SAFETY: per the function contract.
        let bundle = unsafe { bind_benchmark(&h_bench, session)? };
        require(h_encrypted.cast_const(), "h_encrypted")?;
        let encrypted = bundle.dispatch("encrypt", |b, s| b.encrypt(s, h_encoded))?;
        // SAFETY: checked non-null above.
        unsafe { h_encrypted.write(encrypted) };
        Ok(())
    })
}

/// # Safety
///
/// `h_bench` must be live; `h_decrypted` must be valid for a write.
#[unsafe(export_name = "bridge_decrypt")]
pub unsafe extern "C" fn decrypt(
    h_bench: Handle,
    h_encrypted: Handle,
    h_decrypted: *mut Handle,
) -> ErrorCode {
    call("decrypt", |session| {
        // SAFETY: per the function contract.
        let bundle = unsafe { bind_benchmark(&h_bench, session)? };
        require(h_decrypted.cast_const(), "h_decrypted")?;
        let decrypted = bundle.dispatch("decrypt", |b, s| b.decrypt(s, h_encrypted))?;
        // SAFETY: checked non-null above.
        unsafe { h_decrypted.write(decrypted) };
        Ok(())
    })
}

/// # Safety
///
/// `h_bench` must be live; `p_local` readable for `count` handles;
/// `h_remote` valid for a write.
#[unsafe(export_name = "bridge_load")]
pub unsafe extern "C" fn load(
    h_bench: Handle,
    p_local: *const Handle,
    count: u64,
    h_remote: *mut Handle,
) -> ErrorCode {
    call("load", |session| {
        // SAFETY: per the function contract.
        let bundle = unsafe { bind_benchmark(&h_bench, session)? };
        require(h_remote.cast_const(), "h_remote")?;
        // SAFETY: per the function contract.
        let local = unsafe { host_slice(p_local, count, "p_local")? };
        let remote = bundle.dispatch("load", |b, s| b.load(s, local))?;
        // SAFETY: checked non-null above.
        unsafe { h_remote.write(remote) };
        Ok(())
    })
}

/// # Safety
///
/// `h_bench` must be live; `p_local` writable for `count` handles.
#[unsafe(export_name = "bridge_store")]
pub unsafe extern "C" fn store(
    h_bench: Handle,
    h_remote: Handle,
    p_local: *mut Handle,
    count: u64,
) -> ErrorCode {
    call("store", |session| {
        // SAFETY: per the function contract.
        let bundle = unsafe { bind_benchmark(&h_bench, session)? };
        // SAFETY: per the function contract.
        let local = unsafe { host_slice_mut(p_local, count, "p_local")? };
        bundle.dispatch("store", |b, s| b.store(s, h_remote, local))
    })
}

/// # Safety
///
/// `h_bench` must be live; `p_indexers` readable for `count` entries;
/// `h_result` valid for a write.
#[unsafe(export_name = "bridge_operate")]
pub unsafe extern "C" fn operate(
    h_bench: Handle,
    h_remote: Handle,
    p_indexers: *const ParameterIndexer,
    count: u64,
    h_result: *mut Handle,
) -> ErrorCode {
    call("operate", |session| {
        // SAFETY: per the function contract.
        let bundle = unsafe { bind_benchmark(&h_bench, session)? };
        require(h_result.cast_const(), "h_result")?;
        // SAFETY: per the function contract.
        let indexers = unsafe { host_slice(p_indexers, count, "p_indexers")? };
        let result = bundle.dispatch("operate", |b, s| b.operate(s, h_remote, indexers))?;
        // SAFETY: checked non-null above.
        unsafe { h_result.write(result) };
        Ok(())
    })
}

// ---- names and errors --------------------------------------------------------

/// # Safety
///
/// `h_engine` must be live; a non-null `p_name` writable for `size` bytes.
#[unsafe(export_name = "bridge_get_scheme_name")]
pub unsafe extern "C" fn get_scheme_name(
    h_engine: Handle,
    scheme: Scheme,
    p_name: *mut c_char,
    size: u64,
) -> u64 {
    query("get_scheme_name", |session| {
        // SAFETY: per the function contract.
        let engine = unsafe { bind_engine(&h_engine, session)? };
        let name = engine.scheme_name(scheme)?;
        // SAFETY: per the function contract.
        Ok(copy_string(unsafe { out_buffer(p_name, size) }, name))
    })
}

/// # Safety
///
/// `h_engine` must be live; a non-null `p_name` writable for `size` bytes.
#[unsafe(export_name = "bridge_get_security_name")]
pub unsafe extern "C" fn get_security_name(
    h_engine: Handle,
    security: Security,
    p_name: *mut c_char,
    size: u64,
) -> u64 {
    query("get_security_name", |session| {
        // SAFETY: per the function contract.
        let engine = unsafe { bind_engine(&h_engine, session)? };
        let name = engine.security_name(security)?;
        // SAFETY: per the function contract.
        Ok(copy_string(unsafe { out_buffer(p_name, size) }, name))
    })
}

/// # Safety
///
/// `h_engine` must be live; a non-null `p_description` writable for `size`
/// bytes.
#[unsafe(export_name = "bridge_get_error_description")]
pub unsafe extern "C" fn get_error_description(
    h_engine: Handle,
    code: ErrorCode,
    p_description: *mut c_char,
    size: u64,
) -> u64 {
    query("get_error_description", |session| {
        // SAFETY: per the function contract.
        let engine = unsafe { bind_engine(&h_engine, session)? };
        let text = engine.session().error_description(code);
        // SAFETY: per the function contract.
        Ok(copy_string(unsafe { out_buffer(p_description, size) }, &text))
    })
}

/// Code of the most recent failure on this engine's session.
///
/// # Safety
///
/// `h_engine` must be live.
#[unsafe(export_name = "bridge_get_last_error")]
pub unsafe extern "C" fn get_last_error(h_engine: Handle) -> ErrorCode {
    guarded("get_last_error", |session| {
        // SAFETY: per the function contract.
        let engine = unsafe { bind_engine(&h_engine, session)? };
        Ok(engine.session().last_error())
    })
    .unwrap_or_else(|code| code)
}

/// # Safety
///
/// `h_engine` must be live; a non-null `p_description` writable for `size`
/// bytes.
#[unsafe(export_name = "bridge_get_last_error_description")]
pub unsafe extern "C" fn get_last_error_description(
    h_engine: Handle,
    p_description: *mut c_char,
    size: u64,
) -> u64 {
    query("get_last_error_description", |session| {
        // SAFETY: per the function contract.
        let engine = unsafe { bind_engine(&h_engine, session)? };
        let text = engine.session().last_error_description();
        // SAFETY: per the function contract.
        Ok(copy_string(unsafe { out_buffer(p_description, size) }, &text))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ECODE_CRITICAL_ERROR, ECODE_INVALID_ARGS};

    fn init() -> Handle {
        let mut h = Handle::null();
        let code = unsafe { init_engine(&mut h, ptr::null(), 0) };
        assert_eq!(code, ECODE_SUCCESS);
        h
    }

    #[test]
    fn test_api_version_reports_constants() {
        let (mut major, mut minor, mut rev) = (9u64, 9u64, 9u64);
        let code = unsafe { api_version(&mut major, &mut minor, &mut rev) };
        assert_eq!(code, ECODE_SUCCESS);
        assert_eq!((major, minor, rev), (API_VERSION_MAJOR, API_VERSION_MINOR, API_VERSION_REVISION));
        let code = unsafe { api_version(ptr::null_mut(), &mut minor, &mut rev) };
        assert_eq!(code, ECODE_INVALID_ARGS);
    }

    #[test]
    fn test_init_and_destroy_engine() {
        let h = init();
        assert_eq!(h.tag, ENGINE);
        assert!(!h.is_null());
        assert_eq!(unsafe { destroy_handle(h) }, ECODE_SUCCESS);
    }

    #[test]
    fn test_init_engine_rejects_bad_config() {
        let mut h = Handle::null();
        let cfg = b"max_live_benchmarks = \"many\"";
        let code = unsafe { init_engine(&mut h, cfg.as_ptr().cast(), cfg.len() as u64) };
        assert_eq!(code, ECODE_INVALID_ARGS);
        assert!(h.is_null());

        let code = unsafe { init_engine(ptr::null_mut(), ptr::null(), 0) };
        assert_eq!(code, ECODE_CRITICAL_ERROR);
    }

    #[test]
    fn test_destroy_unknown_tag_is_critical() {
        let mut x = 0u8;
        let bogus = Handle {
            p: (&mut x as *mut u8).cast(),
            size: 1,
            tag: 0x42,
        };
        assert_eq!(unsafe { destroy_handle(bogus) }, ECODE_CRITICAL_ERROR);
        assert_eq!(unsafe { destroy_handle(Handle::null()) }, ECODE_SUCCESS);
    }

    #[test]
    fn test_engine_handle_check() {
        let mut count = 0u64;
        let code = unsafe { subscribe_benchmarks_count(Handle::null(), &mut count) };
        assert_eq!(code, ECODE_CRITICAL_ERROR);
        assert_eq!(unsafe { get_last_error(Handle::null()) }, ECODE_CRITICAL_ERROR);
    }

    #[test]
    fn test_scheme_name_size_query_then_copy() {
        let h = init();
        let needed = unsafe { get_scheme_name(h, 0, ptr::null_mut(), 0) };
        assert_eq!(needed, "Plain".len() as u64 + 1);
        let mut buf = vec![0 as c_char; needed as usize];
        let written = unsafe { get_scheme_name(h, 0, buf.as_mut_ptr(), needed) };
        assert_eq!(written, needed);
        let text: Vec<u8> = buf.iter().map(|c| *c as u8).collect();
        assert_eq!(&text, b"Plain\0");

        assert_eq!(unsafe { get_scheme_name(h, 12345, ptr::null_mut(), 0) }, 0);
        assert_eq!(unsafe { get_last_error(h) }, ECODE_INVALID_ARGS);
        unsafe { destroy_handle(h) };
    }

    #[test]
    fn test_null_output_records_last_error() {
        let h = init();
        let code = unsafe { subscribe_benchmarks_count(h, ptr::null_mut()) };
        assert_eq!(code, ECODE_INVALID_ARGS);
        assert_eq!(unsafe { get_last_error(h) }, ECODE_INVALID_ARGS);
        let n = unsafe { get_last_error_description(h, ptr::null_mut(), 0) };
        assert!(n > 1);
        unsafe { destroy_handle(h) };
    }

    #[test]
    fn test_describe_catalog_entries() {
        let h = init();
        let mut count = 0u64;
        assert_eq!(unsafe { subscribe_benchmarks_count(h, &mut count) }, ECODE_SUCCESS);
        let mut descs = vec![Handle::null(); count as usize];
        assert_eq!(unsafe { subscribe_benchmarks(h, descs.as_mut_ptr(), count) }, ECODE_SUCCESS);

        for desc in descs {
            let (mut arity, mut sets) = (0u64, 0u64);
            let code = unsafe { get_workload_params_details(h, desc, &mut arity, &mut sets) };
            assert_eq!(code, ECODE_SUCCESS);
            let mut storage = vec![vec![WorkloadParam::from_u64("", 0); arity as usize]; sets as usize];
            let mut lists: Vec<WorkloadParams> = storage
                .iter_mut()
                .map(|v| WorkloadParams {
                    params: v.as_mut_ptr(),
                    count: v.len() as u64,
                })
                .collect();
            let mut out = RawBenchmarkDescriptor::default();
            let code = unsafe { describe_benchmark(h, desc, &mut out, lists.as_mut_ptr(), sets) };
            assert_eq!(code, ECODE_SUCCESS);
            assert!(storage.iter().all(|set| set.iter().all(|p| p.bits > 0)));
        }
        unsafe { destroy_handle(h) };
    }
}
