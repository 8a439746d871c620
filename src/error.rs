//! Error handling module for serverctl.
//!
//! This module defines the error types used throughout the library.
//! Most runtime conditions (a server that is already running, an occupied
//! port, a poll timeout) are *not* errors: they are resolved into a
//! [`ControlOutcome`](crate::control::ControlOutcome) at the controller
//! boundary. Only conditions the controller cannot safely continue past
//! surface as `Err`.
//!
//! # Example
//!
//! ```
//! use serverctl::error::{Error, Result};
//!
//! fn handle_error(result: Result<()>) {
//!     match result {
//!         Ok(_) => println!("Operation succeeded"),
//!         Err(Error::DescriptorInvalid(msg)) => println!("Bad descriptor: {}", msg),
//!         Err(Error::PidFileCleanup { path, .. }) => {
//!             println!("Pid file {} could not be removed", path.display())
//!         }
//!         Err(e) => println!("Other error: {}", e),
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the serverctl library.
///
/// Each variant includes context to help diagnose the failure. Variants that
/// carry a `source` preserve the underlying I/O error for callers that want
/// to inspect it.
#[derive(Error, Debug)]
pub enum Error {
    /// The descriptor could not be constructed from the supplied values.
    ///
    /// This error occurs when:
    /// - A required field (name, port, pid_file) is missing
    /// - The port is 0
    /// - The poll interval is zero
    #[error("Invalid server descriptor: {0}")]
    DescriptorInvalid(String),

    /// A descriptor file or string could not be parsed.
    ///
    /// This error occurs when:
    /// - The file cannot be read
    /// - The contents are not valid JSON
    /// - The JSON does not conform to the expected schema
    #[error("Failed to parse server descriptor: {0}")]
    DescriptorParse(String),

    /// The pid file could not be written.
    #[error("Failed to write pid file {path}: {source}")]
    PidFileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A corrupt or stale pid file could not be removed.
    ///
    /// This is fatal: a pid file that cannot be cleaned up makes every
    /// future status check unreliable, so the condition is never swallowed.
    #[error("Failed to remove pid file {path}: {source}")]
    PidFileCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Starting, signaling, or otherwise manipulating the server process
    /// failed.
    ///
    /// This error occurs when:
    /// - The start command cannot be spawned
    /// - A termination signal cannot be delivered
    #[error("Server process error: {0}")]
    Process(String),

    /// The server's own configuration failed the adapter's syntax check.
    #[error("Server configuration check failed: {0}")]
    ConfigCheck(String),

    /// The requested operation is not supported by the adapter or platform.
    ///
    /// This error occurs when:
    /// - A graceful restart is requested from an adapter without one
    /// - Signal delivery is requested on a platform without unix signals
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Result type for serverctl operations.
///
/// A convenience alias for `std::result::Result` with this module's `Error`.
pub type Result<T> = std::result::Result<T, Error>;
