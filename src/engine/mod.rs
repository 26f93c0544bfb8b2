//! Engine module: the registry a backend populates and the host talks to.
//!
//! # Architecture
//!
//! - **Engine** (`registry`): owns the descriptor catalog and the scheme and
//!   security name tables. Descriptor handles are catalog indices.
//!
//! - **Session** (`session`): per-engine identity, last-error record, error
//!   descriptions and the handle factory shared with every benchmark.
//!
//! - **EngineObject** (`object`): the reference-counted payload behind object
//!   handles. Duplicating a handle shares the payload; destroying one drops a
//!   reference.
//!
//! # Boundaries
//!
//! - The engine never interprets backend payloads; it only checks tags,
//!   session identity and payload type.
//! - Nothing in this module converts errors to codes. That is the `ffi` layer.

pub mod config;
pub mod object;
pub mod registry;
pub mod session;

// Re-export key types for convenience
pub use config::EngineConfig;
pub use object::EngineObject;
pub use registry::Engine;
pub use session::{LastError, Session};
