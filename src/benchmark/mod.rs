//! Workload descriptions and the benchmark instances they create.
//!
//! A [`BenchmarkDescription`] is registered once with the engine and acts as
//! a factory. Each [`Benchmark`] it creates drives the per-call pipeline:
//!
//! ```text
//! encode -> encrypt -> load -> operate -> store -> decrypt -> decode
//! ```
//!
//! Ordering is the caller's responsibility; instances keep no state machine.

pub mod description;
pub mod handle;
pub mod instance;

pub use description::{BenchmarkDescription, DescriptionCore};
pub use handle::BenchmarkHandle;
pub use instance::{Benchmark, BenchmarkCore};
