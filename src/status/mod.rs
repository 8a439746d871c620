//! Server status detection.
//!
//! A managed server's state is derived from two independent observations:
//!
//! * Does the pid file name a process that is alive? ([`PidFileStore`] and
//!   [`ProcessTable`])
//! * Does anything accept TCP connections on the configured port?
//!   ([`PortProbe`])
//!
//! [`StatusEngine`] combines both into a [`StatusReport`] and repairs
//! corrupt or stale pid files on the way. The four-state [`Status`] it
//! produces drives every lifecycle decision in the control layer.

mod engine;
mod pid_file;
mod probe;
mod process;

pub use engine::{Status, StatusEngine, StatusReport};
pub use pid_file::{PidFileRecord, PidFileStore};
pub use probe::{PortProbe, DEFAULT_PROBE_TIMEOUT};
pub use process::{ProcessHandle, ProcessTable};
