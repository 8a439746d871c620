use crate::config::ServerDescriptor;
use crate::control::adapter::{send_terminate, ServerAdapter};
use crate::error::{Error, Result};
use crate::status::{PidFileStore, ProcessHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;

/// A program invocation: executable, arguments, extra environment.
///
/// # Examples
///
/// ```
/// use serverctl::control::CommandSpec;
///
/// let spec = CommandSpec::new("pg_ctl")
///     .args(["start", "-D", "/var/lib/postgres/data"])
///     .env("PGPORT", "5432");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables added to the child's environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    /// Creates a spec that runs `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    /// Appends a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Command-driven [`ServerAdapter`].
///
/// Covers servers controlled through external commands: a launch command
/// plus optional stop, configuration check, and graceful reload commands.
/// Anything left unconfigured falls back to the trait defaults, so the
/// minimal adapter is just a start command and SIGTERM for stop.
///
/// When the descriptor sets `use_sudo`, every command is run through
/// `sudo`.
///
/// # Examples
///
/// ```
/// use serverctl::control::{CommandSpec, ExecAdapter};
///
/// let adapter = ExecAdapter::new(CommandSpec::new("my-server").arg("--daemon"))
///     .check_command(CommandSpec::new("my-server").arg("--check-config"))
///     .write_pid_file(true);
/// ```
#[derive(Debug, Clone)]
pub struct ExecAdapter {
    start: CommandSpec,
    stop: Option<CommandSpec>,
    check: Option<CommandSpec>,
    graceful: Option<CommandSpec>,
    write_pid_file: bool,
}

impl ExecAdapter {
    /// Creates an adapter that launches the server with `start`.
    pub fn new(start: CommandSpec) -> Self {
        Self {
            start,
            stop: None,
            check: None,
            graceful: None,
            write_pid_file: false,
        }
    }

    /// Command that stops the server. Without one, stop sends SIGTERM to
    /// the recorded pid.
    pub fn stop_command(mut self, spec: CommandSpec) -> Self {
        self.stop = Some(spec);
        self
    }

    /// Command that validates the server configuration before a graceful
    /// restart goes ahead. Nonzero exit aborts the reload.
    pub fn check_command(mut self, spec: CommandSpec) -> Self {
        self.check = Some(spec);
        self
    }

    /// Command that reloads the server in place. Configuring one makes
    /// the adapter report graceful restart support.
    pub fn graceful_command(mut self, spec: CommandSpec) -> Self {
        self.graceful = Some(spec);
        self
    }

    /// Whether to record the launched child's pid in the descriptor's pid
    /// file. Defaults to `false` for servers that write their own, which
    /// is the common daemon convention.
    ///
    /// Enable this only when the start command *is* the server process.
    /// Recording the pid of a short-lived launcher would poison status.
    pub fn write_pid_file(mut self, write: bool) -> Self {
        self.write_pid_file = write;
        self
    }
}

#[async_trait]
impl ServerAdapter for ExecAdapter {
    async fn do_start(&self, descriptor: &ServerDescriptor) -> Result<()> {
        let mut command = build_command(&self.start, descriptor.use_sudo());
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(stderr_destination(descriptor)?);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // New session: the server must survive this process and never
            // see its terminal's signals.
            unsafe {
                command.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        let child = command.spawn().map_err(|e| {
            Error::Process(format!("failed to launch '{}': {}", self.start.program, e))
        })?;

        if self.write_pid_file {
            PidFileStore::new(descriptor.pid_file()).write(child.id())?;
        }

        tracing::info!(
            program = %self.start.program,
            pid = child.id(),
            "Launched server process"
        );

        // Not reaped. The server is expected to outlive this process.
        drop(child);
        Ok(())
    }

    async fn do_stop(&self, descriptor: &ServerDescriptor, handle: &ProcessHandle) -> Result<()> {
        match &self.stop {
            Some(spec) => {
                let output = run_to_completion(spec, descriptor.use_sudo()).await?;
                if output.status.success() {
                    Ok(())
                } else {
                    Err(Error::Process(summarize_failure("stop command", &output)))
                }
            }
            None => send_terminate(handle.pid),
        }
    }

    async fn check_config_syntax(&self, descriptor: &ServerDescriptor) -> Result<()> {
        let Some(spec) = &self.check else {
            return Ok(());
        };

        let output = run_to_completion(spec, descriptor.use_sudo()).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::ConfigCheck(summarize_failure(
                "configuration check",
                &output,
            )))
        }
    }

    fn supports_graceful_restart(&self) -> bool {
        self.graceful.is_some()
    }

    async fn do_graceful_restart(
        &self,
        descriptor: &ServerDescriptor,
        _handle: &ProcessHandle,
    ) -> Result<()> {
        let Some(spec) = &self.graceful else {
            return Err(Error::Unsupported(
                "no graceful restart command configured".to_string(),
            ));
        };

        let output = run_to_completion(spec, descriptor.use_sudo()).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Process(summarize_failure(
                "graceful restart command",
                &output,
            )))
        }
    }
}

fn build_command(spec: &CommandSpec, use_sudo: bool) -> std::process::Command {
    let mut command = if use_sudo {
        let mut elevated = std::process::Command::new("sudo");
        elevated.arg(&spec.program);
        elevated
    } else {
        std::process::Command::new(&spec.program)
    };
    command.args(&spec.args);
    command.envs(&spec.env);
    command
}

/// Runs a command to completion, capturing its output.
async fn run_to_completion(spec: &CommandSpec, use_sudo: bool) -> Result<std::process::Output> {
    let mut command = tokio::process::Command::from(build_command(spec, use_sudo));
    command.stdin(Stdio::null());

    command
        .output()
        .await
        .map_err(|e| Error::Process(format!("failed to run '{}': {}", spec.program, e)))
}

fn summarize_failure(what: &str, output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("{} exited with {}", what, output.status)
    } else {
        format!("{} exited with {}: {}", what, output.status, stderr)
    }
}

/// Child stderr goes to the configured error log so start failures leave
/// something to diagnose. Without a log it is discarded.
fn stderr_destination(descriptor: &ServerDescriptor) -> Result<Stdio> {
    let Some(path) = descriptor.error_log() else {
        return Ok(Stdio::null());
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::Process(format!(
                "failed to create log directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            Error::Process(format!(
                "failed to open error log {}: {}",
                path.display(),
                e
            ))
        })?;

    Ok(Stdio::from(file))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::status::PidFileRecord;

    fn descriptor_in(dir: &tempfile::TempDir) -> ServerDescriptor {
        ServerDescriptor::builder("x")
            .port(15432)
            .pid_file(dir.path().join("x.pid"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_can_record_child_pid() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = descriptor_in(&dir);

        let adapter = ExecAdapter::new(CommandSpec::new("true")).write_pid_file(true);
        adapter.do_start(&descriptor).await.unwrap();

        let store = PidFileStore::new(descriptor.pid_file());
        assert!(matches!(store.read(), PidFileRecord::Valid(_)));
    }

    #[tokio::test]
    async fn test_start_failure_reports_the_program() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = descriptor_in(&dir);

        let adapter = ExecAdapter::new(CommandSpec::new("/nonexistent/server-binary"));
        let err = adapter.do_start(&descriptor).await.unwrap_err();

        assert!(err.to_string().contains("/nonexistent/server-binary"));
    }

    #[tokio::test]
    async fn test_config_check_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = descriptor_in(&dir);

        let adapter = ExecAdapter::new(CommandSpec::new("true")).check_command(
            CommandSpec::new("sh").args(["-c", "echo bad directive >&2; exit 1"]),
        );

        let err = adapter.check_config_syntax(&descriptor).await.unwrap_err();
        match err {
            Error::ConfigCheck(msg) => assert!(msg.contains("bad directive")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_config_check_passes_without_a_command() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = descriptor_in(&dir);

        let adapter = ExecAdapter::new(CommandSpec::new("true"));
        assert!(adapter.check_config_syntax(&descriptor).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_prefers_the_configured_command() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = descriptor_in(&dir);
        let handle = ProcessHandle {
            pid: 2_000_000_000,
            owner_uid: None,
        };

        let adapter =
            ExecAdapter::new(CommandSpec::new("true")).stop_command(CommandSpec::new("true"));
        assert!(adapter.do_stop(&descriptor, &handle).await.is_ok());
    }

    #[tokio::test]
    async fn test_graceful_restart_requires_a_command() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = descriptor_in(&dir);
        let handle = ProcessHandle {
            pid: 2_000_000_000,
            owner_uid: None,
        };

        let adapter = ExecAdapter::new(CommandSpec::new("true"));
        assert!(!adapter.supports_graceful_restart());

        let err = adapter
            .do_graceful_restart(&descriptor, &handle)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
