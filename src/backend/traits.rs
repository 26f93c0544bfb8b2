//! Backend trait.

use crate::BridgeResult;
use crate::engine::Engine;

/// A set of workloads compiled into this library.
pub trait Backend: Send + Sync {
    /// Returns the backend name (e.g., "example", "mock").
    fn name(&self) -> &str;

    /// Returns the backend version, if available.
    fn version(&self) -> Option<String>;

    /// Registers schemes, security levels, error codes and benchmark
    /// descriptions. Called exactly once, before the engine is shared.
    fn init(&self, engine: &mut Engine) -> BridgeResult<()>;
}
