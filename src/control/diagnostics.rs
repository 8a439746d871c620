use crate::config::ServerDescriptor;
use crate::status::{PidFileRecord, PidFileStore, ProcessHandle, ProcessTable, StatusReport};

/// Upper bound on error log content quoted in diagnostics.
pub const MAX_DIAGNOSTIC_BYTES: usize = 32 * 1024;

/// Error log position recorded before an operation acts.
///
/// [`DiagnosticsReporter::collect`] quotes only what the server wrote
/// after this point, so a failed start is not blamed for errors that were
/// already in the log. The default snapshot marks position zero and makes
/// `collect` quote the whole log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorLogSnapshot {
    len: u64,
}

/// Renders operator-facing diagnostics for one server.
///
/// Two kinds of output: an [`overview`](Self::overview) of everything the
/// controller can observe, and [`collect`](Self::collect), the content the
/// server appended to its own error log since a [`snapshot`](Self::snapshot)
/// taken before the operation. Both are plain text intended to be printed
/// or logged verbatim.
#[derive(Debug)]
pub struct DiagnosticsReporter {
    descriptor: ServerDescriptor,
    pid_file: PidFileStore,
}

impl DiagnosticsReporter {
    /// Creates a reporter for the given server.
    pub fn new(descriptor: ServerDescriptor) -> Self {
        let pid_file = PidFileStore::new(descriptor.pid_file());
        Self {
            descriptor,
            pid_file,
        }
    }

    /// Records the error log's current length. Zero when no log is
    /// configured or it does not exist yet.
    pub fn snapshot(&self) -> ErrorLogSnapshot {
        let len = self
            .descriptor
            .error_log()
            .and_then(|path| std::fs::metadata(path).ok())
            .map(|metadata| metadata.len())
            .unwrap_or(0);

        ErrorLogSnapshot { len }
    }

    /// Multi-line summary of the controller's view: status line, pid file
    /// content, and port probe result.
    pub fn overview(&self, report: &StatusReport) -> String {
        let record = match self.pid_file.read() {
            PidFileRecord::Absent => "absent".to_string(),
            PidFileRecord::Corrupt(detail) => format!("corrupt: {}", detail),
            PidFileRecord::Valid(pid) => format!("contains pid {}", pid),
        };

        let probe = if report.status().is_listening() {
            "accepting connections"
        } else {
            "not accepting connections"
        };

        format!(
            "{}\npid file: {} ({})\nport: {} on {} ({})",
            report.describe(&self.descriptor),
            self.pid_file.path().display(),
            record,
            self.descriptor.port(),
            self.descriptor.bind_addr(),
            probe
        )
    }

    /// Content appended to the error log after `since`, capped at the
    /// final [`MAX_DIAGNOSTIC_BYTES`].
    ///
    /// Returns `None` when no log is configured, the log cannot be read,
    /// or nothing of substance was written. A log shorter than the
    /// snapshot was rotated or truncated in between, and all of its
    /// current content counts as new. When the cap truncates, the excerpt
    /// resumes at the next line boundary so no torn line is shown.
    pub fn collect(&self, since: &ErrorLogSnapshot) -> Option<String> {
        let path = self.descriptor.error_log()?;
        let bytes = std::fs::read(path).ok()?;

        let from = usize::try_from(since.len).unwrap_or(usize::MAX);
        let mut appended = if from <= bytes.len() {
            &bytes[from..]
        } else {
            &bytes[..]
        };

        if appended.len() > MAX_DIAGNOSTIC_BYTES {
            appended = &appended[appended.len() - MAX_DIAGNOSTIC_BYTES..];
            if let Some(pos) = appended.iter().position(|&b| b == b'\n') {
                appended = &appended[pos + 1..];
            }
        }

        let text = String::from_utf8_lossy(appended);
        if text.trim().is_empty() {
            None
        } else {
            Some(text.into_owned())
        }
    }

    /// Warning for a process owned by a different user, or `None` when
    /// ownership raises no concern.
    ///
    /// No note is produced when elevation is configured, when the platform
    /// does not expose ownership, or when the owner matches the current
    /// user. Unknown ownership is deliberately silent; guessing would
    /// produce false alarms on platforms that hide other users' processes.
    pub fn ownership_note(handle: &ProcessHandle, use_sudo: bool) -> Option<String> {
        if use_sudo {
            return None;
        }

        let owner = handle.owner_uid?;
        let current = ProcessTable::current_uid()?;
        if owner == current {
            return None;
        }

        Some(format!(
            "process {} belongs to uid {}, but this controller runs as uid {}; signals may be refused",
            handle.pid, owner, current
        ))
    }
}
