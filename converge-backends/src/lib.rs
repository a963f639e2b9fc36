//! Resource backends for the converge engine.
//!
//! Each backend implements the uniform [`ResourceBackend`] contract
//! (`diff` / `apply` / `notify`) for one resource kind. All I/O goes through
//! the port traits in [`ports`]; the [`adapters`] module provides live
//! implementations (std::fs plus shelling out to the init system) and
//! in-memory implementations for tests and embedding.

pub mod adapters;
pub mod backends;
pub mod error;
pub mod ports;
pub mod render;

pub use backends::{BackendSet, BackupPolicy, ChangeKind, ResourceBackend, ResourceDiff};
pub use error::ApplyError;
pub use render::RenderError;
