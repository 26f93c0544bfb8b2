//! Integration tests for the engine catalog and benchmark lifetime accounting.

use bench_bridge::backend::{ExampleBackend, MockBackend, MockConfig};
use bench_bridge::core::params::{GenericParams, MatrixMultiplyParams, WorkloadParam};
use bench_bridge::core::tags::{BENCHMARK, BENCHMARK_DESCRIPTOR};
use bench_bridge::core::types::{BenchmarkDescriptor, Handle, Workload};
use bench_bridge::engine::{Engine, EngineConfig};
use bench_bridge::{ECODE_CRITICAL_ERROR, ECODE_INVALID_ARGS};

fn blank(n: usize) -> Vec<WorkloadParam> {
    vec![WorkloadParam::from_u64("", 0); n]
}

#[test]
fn test_example_catalog_contents() {
    let e = Engine::with_backend(&ExampleBackend, EngineConfig::default()).unwrap();
    assert_eq!(e.subscribe_benchmarks_count(), 2);
    for h in e.list_descriptors() {
        assert_eq!(e.workload_params_count(&h).unwrap(), 3);
        let mut out = BenchmarkDescriptor::default();
        e.describe_benchmark(&h, &mut out, None).unwrap();
        assert_eq!(out.workload, Workload::MatrixMultiply);
    }
    assert_eq!(e.scheme_name(0).unwrap(), "Plain");
    assert_eq!(e.security_name(0).unwrap(), "None");
}

#[test]
fn test_describe_truncates_to_fewer_slots() {
    let e = Engine::with_backend(&ExampleBackend, EngineConfig::default()).unwrap();
    let h = e.list_descriptors()[0];
    assert_eq!(e.default_workload_params_count(&h).unwrap(), 2);

    let mut only = blank(3);
    let mut slots = [only.as_mut_slice()];
    let mut out = BenchmarkDescriptor::default();
    e.describe_benchmark(&h, &mut out, Some(&mut slots[..])).unwrap();
    let first = MatrixMultiplyParams::try_from(only.as_slice()).unwrap();
    assert_eq!(first, MatrixMultiplyParams::new(100, 100, 100));
}

#[test]
fn test_describe_short_slot_is_critical() {
    let e = Engine::with_backend(&ExampleBackend, EngineConfig::default()).unwrap();
    let h = e.list_descriptors()[0];
    let mut full = blank(3);
    let mut short = blank(2);
    let mut slots = [full.as_mut_slice(), short.as_mut_slice()];
    let mut out = BenchmarkDescriptor::default();
    let err = e.describe_benchmark(&h, &mut out, Some(&mut slots[..])).unwrap_err();
    assert_eq!(err.code(), ECODE_CRITICAL_ERROR);
}

#[test]
fn test_descriptor_handles_are_stable_and_inert() {
    let e = Engine::with_backend(&ExampleBackend, EngineConfig::default()).unwrap();
    let first = e.list_descriptors();
    let mut again = vec![Handle::null(); first.len()];
    e.subscribe_benchmarks(&mut again).unwrap();
    assert_eq!(first, again);
    for h in first {
        assert_eq!(h.tag, BENCHMARK_DESCRIPTOR);
        e.destroy_handle(h).unwrap();
    }
    // still usable after "destroying" them
    assert!(e.match_benchmark(&again[1]).is_ok());
}

#[test]
fn test_benchmark_handle_is_not_a_descriptor() {
    let e = Engine::with_backend(&MockBackend::default_mock(), EngineConfig::default()).unwrap();
    let desc = e.list_descriptors()[0];
    let h = e.create_benchmark(&desc, None).unwrap();
    assert_ne!(h.tag & BENCHMARK, 0);
    assert!(e.match_benchmark(&h).unwrap_err().is_critical());
    e.destroy_benchmark(h).unwrap();
}

#[test]
fn test_max_live_benchmarks_enforced() {
    let config = EngineConfig::from_bytes(b"max_live_benchmarks = 1").unwrap();
    let e = Engine::with_backend(&MockBackend::default_mock(), config).unwrap();
    let desc = e.list_descriptors()[0];

    let first = e.create_benchmark(&desc, None).unwrap();
    let err = e.create_benchmark(&desc, None).unwrap_err();
    assert_eq!(err.code(), ECODE_INVALID_ARGS);
    assert_eq!(e.session().live_benchmarks(), 1);

    e.destroy_benchmark(first).unwrap();
    let second = e.create_benchmark(&desc, None).unwrap();
    e.destroy_handle(second).unwrap();
    assert_eq!(e.session().live_benchmarks(), 0);
}

#[test]
fn test_benchmark_from_other_engine_rejected() {
    let a = Engine::with_backend(&MockBackend::default_mock(), EngineConfig::default()).unwrap();
    let b = Engine::with_backend(&MockBackend::default_mock(), EngineConfig::default()).unwrap();
    let h = a.create_benchmark(&a.list_descriptors()[0], None).unwrap();
    assert!(b.destroy_benchmark(h).unwrap_err().is_critical());
    assert!(b.encrypt(&h, Handle::null()).unwrap_err().is_critical());
    a.destroy_benchmark(h).unwrap();
}

#[test]
fn test_api_version_mismatch_fails_init() {
    let config = EngineConfig::from_bytes(b"api_version = \"2.0\"").unwrap();
    let err = Engine::with_backend(&ExampleBackend, config).unwrap_err();
    assert!(err.is_critical());
}

#[test]
fn test_description_text_uses_params() {
    let e = Engine::with_backend(&ExampleBackend, EngineConfig::default()).unwrap();
    let h = e.list_descriptors()[0];
    let params = MatrixMultiplyParams::new(2, 3, 4).to_params();
    let text = e.benchmark_description_ex(&h, Some(&params)).unwrap();
    assert!(!text.is_empty());
    let generic = GenericParams::new(1, 1).to_params();
    assert!(e.benchmark_description_ex(&h, Some(&generic)).is_ok());
}
