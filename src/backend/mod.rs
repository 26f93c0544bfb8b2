//! Backends register their workloads with an [`Engine`](crate::engine::Engine).
//!
//! The cdylib exposes [`default_backend`]; tests swap in [`MockBackend`].

pub mod example;
pub mod mock;
pub mod traits;

// Re-export key types
pub use example::{ExampleBackend, Matrix};
pub use mock::{MockBackend, MockConfig};
pub use traits::Backend;

/// Backend wired into the exported entry points.
pub fn default_backend() -> Box<dyn Backend> {
    Box::new(ExampleBackend)
}
