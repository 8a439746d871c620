//! Server lifecycle control.
//!
//! [`LifecycleController`] is the operational surface of the crate: start,
//! stop, restart, graceful restart, and ping, each returning a
//! [`ControlOutcome`] describing what happened. Server-specific commands
//! live behind the [`ServerAdapter`] trait; [`ExecAdapter`] implements it
//! for servers controlled through external commands.
//!
//! Controllers never guess. Every decision is made against a fresh status
//! observation, and anything unexpected ends up in the outcome rather than
//! in a panic or a silent retry.

mod adapter;
mod controller;
mod diagnostics;
mod exec;

pub use adapter::ServerAdapter;
pub use controller::{ControlOutcome, LifecycleController, OutcomeKind};
pub use diagnostics::{DiagnosticsReporter, ErrorLogSnapshot, MAX_DIAGNOSTIC_BYTES};
pub use exec::{CommandSpec, ExecAdapter};
