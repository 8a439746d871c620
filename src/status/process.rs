use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// A live process found in the system process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    /// Process id as read from the pid file.
    pub pid: u32,
    /// Uid of the process owner, when the platform exposes it.
    pub owner_uid: Option<u32>,
}

/// Lookup of live processes by pid.
///
/// Existence is the question being answered, not health: a process that
/// exists but never opened its port is still reported, and the status
/// engine combines both signals. Ownership information rides along so the
/// control layer can warn when it is about to signal a process belonging
/// to another user.
#[derive(Debug, Clone, Default)]
pub struct ProcessTable;

impl ProcessTable {
    pub fn new() -> Self {
        Self
    }

    /// Looks up `pid`, returning a handle if the process is alive.
    ///
    /// Zombies count as alive here. That matches signal semantics: a pid
    /// with an unreaped child still occupies its slot and still owns the
    /// pid file it wrote.
    pub fn lookup(&self, pid: u32) -> Option<ProcessHandle> {
        // Pid 0 is the kernel on some platforms, never a managed server.
        if pid == 0 {
            return None;
        }

        if let Some(handle) = lookup_in_table(pid) {
            Some(handle)
        } else {
            lookup_in_procfs(pid)
        }
    }

    /// Effective uid of the calling process, where the platform has one.
    pub fn current_uid() -> Option<u32> {
        current_uid_impl()
    }
}

/// Single-pid refresh. Loading the whole process table to answer a point
/// query is the expensive default; restricting the update to one pid and
/// skipping everything but ownership keeps status checks cheap.
fn lookup_in_table(pid: u32) -> Option<ProcessHandle> {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::nothing().with_user(UpdateKind::Always),
    );

    let process = system.process(target)?;
    Some(ProcessHandle {
        pid,
        owner_uid: owner_uid(process),
    })
}

#[cfg(unix)]
fn owner_uid(process: &sysinfo::Process) -> Option<u32> {
    process.user_id().map(|uid| **uid)
}

#[cfg(not(unix))]
fn owner_uid(_process: &sysinfo::Process) -> Option<u32> {
    None
}

/// Procfs fallback for builds or environments where the process table
/// is filtered. An entry under `/proc` is authoritative on Linux.
#[cfg(target_os = "linux")]
fn lookup_in_procfs(pid: u32) -> Option<ProcessHandle> {
    use std::os::unix::fs::MetadataExt;

    let metadata = std::fs::metadata(format!("/proc/{}", pid)).ok()?;
    Some(ProcessHandle {
        pid,
        owner_uid: Some(metadata.uid()),
    })
}

#[cfg(not(target_os = "linux"))]
fn lookup_in_procfs(_pid: u32) -> Option<ProcessHandle> {
    None
}

#[cfg(unix)]
fn current_uid_impl() -> Option<u32> {
    Some(nix::unistd::geteuid().as_raw())
}

#[cfg(not(unix))]
fn current_uid_impl() -> Option<u32> {
    None
}
