use crate::config::ServerDescriptor;
use crate::error::Result;
use crate::status::{PidFileRecord, PidFileStore, PortProbe, ProcessHandle, ProcessTable};

/// Observed state of a managed server.
///
/// The state is the combination of two independent observations, one bit
/// each: whether the pid file names a live process (bit 0) and whether the
/// configured port accepts connections (bit 1). All four combinations are
/// legal and meaningful. `Running` without `Listening` is typical for a
/// server still starting up, while `Listening` without `Running` means a
/// foreign process occupies the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No process, port free.
    Inactive,
    /// The pid file names a live process, but the port is not accepting
    /// connections.
    Running,
    /// Something accepts connections on the port, but the pid file does
    /// not name a live process.
    Listening,
    /// Process alive and port accepting connections.
    Active,
}

impl Status {
    /// Combines the two observations into a status.
    pub fn from_flags(process_running: bool, port_listening: bool) -> Self {
        match (process_running, port_listening) {
            (false, false) => Status::Inactive,
            (true, false) => Status::Running,
            (false, true) => Status::Listening,
            (true, true) => Status::Active,
        }
    }

    /// Bitmask form: bit 0 is the process, bit 1 is the port.
    pub fn bits(self) -> u8 {
        match self {
            Status::Inactive => 0,
            Status::Running => 1,
            Status::Listening => 2,
            Status::Active => 3,
        }
    }

    /// True when the pid file names a live process.
    pub fn is_running(self) -> bool {
        self.bits() & 1 != 0
    }

    /// True when the port accepts connections.
    pub fn is_listening(self) -> bool {
        self.bits() & 2 != 0
    }

    /// True when both observations hold.
    pub fn is_active(self) -> bool {
        self == Status::Active
    }

    /// True when neither observation holds.
    pub fn is_inactive(self) -> bool {
        self == Status::Inactive
    }
}

/// One status observation, with the process handle when there is one.
///
/// Reports are constructed so that the handle is present exactly when the
/// status has its process bit set. [`describe`](Self::describe) renders
/// the observation as the one-line summary shown to operators.
#[derive(Debug, Clone)]
pub struct StatusReport {
    status: Status,
    handle: Option<ProcessHandle>,
}

impl StatusReport {
    pub(crate) fn new(handle: Option<ProcessHandle>, listening: bool) -> Self {
        Self {
            status: Status::from_flags(handle.is_some(), listening),
            handle,
        }
    }

    /// The observed status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Pid of the live server process, if one was found.
    pub fn pid(&self) -> Option<u32> {
        self.handle.map(|handle| handle.pid)
    }

    /// Handle of the live server process, if one was found.
    pub fn handle(&self) -> Option<ProcessHandle> {
        self.handle
    }

    /// Renders the observation as a status line.
    ///
    /// The four possible lines, with `<description>` from the descriptor:
    ///
    /// * `<description> is not running`
    /// * `<description> is running (pid <N>), but not listening to port <P>`
    /// * `<description> is not running, but something is listening to port <P>`
    /// * `<description> is running (pid <N>) and listening to port <P>`
    pub fn describe(&self, descriptor: &ServerDescriptor) -> String {
        let description = descriptor.description();
        let port = descriptor.port();

        match (self.handle, self.status.is_listening()) {
            (None, false) => format!("{} is not running", description),
            (None, true) => format!(
                "{} is not running, but something is listening to port {}",
                description, port
            ),
            (Some(handle), false) => format!(
                "{} is running (pid {}), but not listening to port {}",
                description, handle.pid, port
            ),
            (Some(handle), true) => format!(
                "{} is running (pid {}) and listening to port {}",
                description, handle.pid, port
            ),
        }
    }
}

/// Derives the current [`StatusReport`] for one server.
///
/// The engine owns no state beyond its collaborators; every call to
/// [`status`](Self::status) observes the world fresh. It also performs the
/// two self-repairs that keep the pid file trustworthy:
///
/// * A corrupt pid file is removed, with a warning, before reporting.
/// * A pid file naming a dead process is removed the same way. A stale
///   file left behind by a killed server misleads exactly like a
///   malformed one.
///
/// Failure to remove a file that needs removing is a hard error. Leaving
/// a poisoned pid file in place would make every later status lie.
#[derive(Debug)]
pub struct StatusEngine {
    descriptor: ServerDescriptor,
    pid_file: PidFileStore,
    probe: PortProbe,
    table: ProcessTable,
}

impl StatusEngine {
    /// Creates an engine for the given server.
    pub fn new(descriptor: ServerDescriptor) -> Self {
        let pid_file = PidFileStore::new(descriptor.pid_file());
        Self {
            descriptor,
            pid_file,
            probe: PortProbe::new(),
            table: ProcessTable::new(),
        }
    }

    /// Replaces the default port probe, e.g. to shorten its timeout.
    pub fn with_probe(mut self, probe: PortProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Observes the server and returns its current status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PidFileCleanup`](crate::Error::PidFileCleanup) if a
    /// corrupt or stale pid file needs removing and the removal fails. All
    /// other conditions, including a missing process or an occupied port,
    /// are states, not errors.
    pub async fn status(&self) -> Result<StatusReport> {
        let listening = self
            .probe
            .is_listening(self.descriptor.bind_addr(), self.descriptor.port())
            .await;

        let handle = match self.pid_file.read() {
            PidFileRecord::Absent => None,
            PidFileRecord::Corrupt(detail) => {
                tracing::warn!(
                    path = %self.pid_file.path().display(),
                    detail,
                    "Removing corrupt pid file"
                );
                self.pid_file.remove()?;
                None
            }
            PidFileRecord::Valid(pid) => match self.table.lookup(pid) {
                Some(handle) => Some(handle),
                None => {
                    // A pid file naming a dead process misleads every later
                    // check, exactly like a corrupt one. Removal tolerates
                    // the file disappearing concurrently.
                    tracing::warn!(
                        pid,
                        path = %self.pid_file.path().display(),
                        "Removing stale pid file for dead process"
                    );
                    self.pid_file.remove()?;
                    None
                }
            },
        };

        Ok(StatusReport::new(handle, listening))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(port: u16) -> ServerDescriptor {
        ServerDescriptor::builder("x")
            .port(port)
            .pid_file("/tmp/unused.pid")
            .build()
            .unwrap()
    }

    #[test]
    fn test_status_bits() {
        assert_eq!(Status::Inactive.bits(), 0);
        assert_eq!(Status::Running.bits(), 1);
        assert_eq!(Status::Listening.bits(), 2);
        assert_eq!(Status::Active.bits(), 3);
    }

    #[test]
    fn test_from_flags_covers_all_combinations() {
        assert_eq!(Status::from_flags(false, false), Status::Inactive);
        assert_eq!(Status::from_flags(true, false), Status::Running);
        assert_eq!(Status::from_flags(false, true), Status::Listening);
        assert_eq!(Status::from_flags(true, true), Status::Active);
    }

    #[test]
    fn test_flag_predicates() {
        assert!(Status::Active.is_running());
        assert!(Status::Active.is_listening());
        assert!(Status::Running.is_running());
        assert!(!Status::Running.is_listening());
        assert!(Status::Listening.is_listening());
        assert!(!Status::Listening.is_running());
        assert!(Status::Inactive.is_inactive());
        assert!(!Status::Inactive.is_active());
    }

    #[test]
    fn test_describe_inactive() {
        let report = StatusReport::new(None, false);
        assert_eq!(
            report.describe(&descriptor(15432)),
            "server 'x' is not running"
        );
    }

    #[test]
    fn test_describe_foreign_listener() {
        let report = StatusReport::new(None, true);
        assert_eq!(
            report.describe(&descriptor(15432)),
            "server 'x' is not running, but something is listening to port 15432"
        );
    }

    #[test]
    fn test_describe_running_and_active() {
        let handle = ProcessHandle {
            pid: 4242,
            owner_uid: None,
        };

        let running = StatusReport::new(Some(handle), false);
        assert_eq!(
            running.describe(&descriptor(15432)),
            "server 'x' is running (pid 4242), but not listening to port 15432"
        );

        let active = StatusReport::new(Some(handle), true);
        assert_eq!(
            active.describe(&descriptor(15432)),
            "server 'x' is running (pid 4242) and listening to port 15432"
        );
    }

    #[test]
    fn test_describe_uses_configured_description() {
        let descriptor = ServerDescriptor::builder("pg")
            .description("PostgreSQL 16")
            .port(5432)
            .pid_file("/tmp/pg.pid")
            .build()
            .unwrap();

        let report = StatusReport::new(None, false);
        assert_eq!(report.describe(&descriptor), "PostgreSQL 16 is not running");
    }
}
