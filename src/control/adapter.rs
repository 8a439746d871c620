use crate::config::ServerDescriptor;
use crate::error::Result;
use crate::status::ProcessHandle;
use async_trait::async_trait;

/// Server-specific lifecycle commands.
///
/// The controller knows *when* to act; an adapter knows *how* a particular
/// server is launched, stopped, and reloaded. Implementations wrap whatever
/// mechanism the server ships with, from a plain binary invocation to a
/// vendor control tool. [`ExecAdapter`](crate::control::ExecAdapter) covers
/// the common command-driven case.
///
/// All methods take the descriptor so adapters can honor its settings, for
/// example `use_sudo` for servers on privileged ports.
///
/// Adapters must be cheap to call repeatedly. The controller retries
/// nothing on their behalf; a returned error ends the operation and is
/// reported in the outcome.
#[async_trait]
pub trait ServerAdapter: Send + Sync {
    /// Launches the server in the background.
    ///
    /// Returns once the launch has been initiated. The server is usually
    /// still starting at that point; the controller polls status until
    /// the port answers or the wait expires.
    async fn do_start(&self, descriptor: &ServerDescriptor) -> Result<()>;

    /// Stops the server process.
    ///
    /// The default sends SIGTERM to the recorded pid and treats an
    /// already-gone process as success. Override for servers with their
    /// own shutdown command.
    async fn do_stop(&self, _descriptor: &ServerDescriptor, handle: &ProcessHandle) -> Result<()> {
        send_terminate(handle.pid)
    }

    /// Validates the server's configuration without touching the process.
    ///
    /// Called before a graceful restart so a broken configuration aborts
    /// the operation while the old server is still serving. The default
    /// accepts everything.
    async fn check_config_syntax(&self, _descriptor: &ServerDescriptor) -> Result<()> {
        Ok(())
    }

    /// Whether [`do_graceful_restart`](Self::do_graceful_restart) is
    /// implemented for this server.
    fn supports_graceful_restart(&self) -> bool {
        false
    }

    /// Reloads the server without dropping in-flight connections,
    /// typically by signalling the master process.
    ///
    /// The default refuses with [`Error::Unsupported`](crate::Error::Unsupported).
    async fn do_graceful_restart(
        &self,
        _descriptor: &ServerDescriptor,
        _handle: &ProcessHandle,
    ) -> Result<()> {
        Err(crate::error::Error::Unsupported(
            "this server does not support graceful restart".to_string(),
        ))
    }
}

/// SIGTERM to `pid`. A pid that no longer exists counts as stopped.
#[cfg(unix)]
pub(crate) fn send_terminate(pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // A negative raw pid would address a process group, so a value that
    // does not fit i32 must never reach kill().
    let raw = i32::try_from(pid).map_err(|_| {
        crate::error::Error::Process(format!("pid {} is out of signalling range", pid))
    })?;

    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => Ok(()),
        // The process exited between observation and signal.
        Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(crate::error::Error::Process(format!(
            "failed to signal pid {}: {}",
            pid, e
        ))),
    }
}

#[cfg(not(unix))]
pub(crate) fn send_terminate(pid: u32) -> Result<()> {
    Err(crate::error::Error::Unsupported(format!(
        "no default stop mechanism for pid {} on this platform",
        pid
    )))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_terminate_missing_process_is_ok() {
        // Far above any real pid_max, so nothing can be signalled.
        assert!(send_terminate(2_000_000_000).is_ok());
    }

    #[test]
    fn test_terminate_out_of_range_pid_is_an_error() {
        assert!(send_terminate(u32::MAX).is_err());
    }
}
