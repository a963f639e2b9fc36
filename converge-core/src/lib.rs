//! Embeddable convergence engine.
//!
//! Provides a clap-free, I/O-abstracted entry point suitable for linking
//! into a host process or driving from the CLI.
//!
//! # Port traits
//!
//! All I/O happens behind the backend and port traits of
//! `converge-backends`; the engine itself only walks the plan, asks each
//! backend for a diff, applies what is out of step, and fires notifications.
//!
//! # Entry points
//!
//! - [`run`](pipeline::run) — converge a validated plan and produce a run
//!   report plus a unified-diff preview.

pub mod pipeline;
pub mod settings;

pub use pipeline::{run, RunOutcome};
pub use settings::RunSettings;

// Re-export the backend surface so embedders don't need converge-backends
// directly.
pub use converge_backends::{BackendSet, BackupPolicy, ResourceBackend};
