//! Server descriptor handling.
//!
//! This module provides the [`ServerDescriptor`] type that identifies one
//! managed server: its name, the port it listens on, the pid file it
//! maintains, and the timing of lifecycle waits. Descriptors are built
//! either programmatically through [`ServerDescriptor::builder`] or loaded
//! from JSON with [`ServerDescriptor::from_file`].
//!
//! Validation is eager. A descriptor that builds successfully is complete
//! and internally consistent, so the status and control layers never have
//! to re-check it.
//!
//! # Examples
//!
//! ```
//! use serverctl::config::ServerDescriptor;
//!
//! let descriptor = ServerDescriptor::builder("cache")
//!     .port(11211)
//!     .pid_file("/var/run/cache.pid")
//!     .wait_for_status_secs(5)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(descriptor.description(), "server 'cache'");
//! ```

mod descriptor;
mod validator;

pub use descriptor::{
    DescriptorBuilder, ServerDescriptor, DEFAULT_BIND_ADDR, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_WAIT_FOR_STATUS_SECS,
};
pub use validator::validate_descriptor;
