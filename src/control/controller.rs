use crate::config::ServerDescriptor;
use crate::control::adapter::ServerAdapter;
use crate::control::diagnostics::{DiagnosticsReporter, ErrorLogSnapshot};
use crate::error::{Error, Result};
use crate::status::{PortProbe, Status, StatusEngine, StatusReport};
use std::sync::Arc;
use std::time::Instant;

/// How a lifecycle operation concluded.
///
/// Every expected situation is a kind of its own rather than an error,
/// so callers can map outcomes to exit codes or retries without parsing
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// The operation did its work and reached the target state.
    Done,
    /// Start was requested but a server process already exists.
    AlreadyRunning,
    /// Stop was requested but there is no server process.
    NotRunning,
    /// A process outside our control occupies the port, so the operation
    /// refused to act.
    PortConflict,
    /// An adapter command failed.
    AdapterFailed,
    /// The wait for the target state expired.
    Timeout,
    /// The server does not support the requested operation.
    Unsupported,
    /// A pre-flight check failed and the server was left untouched.
    Aborted,
}

/// Result of one lifecycle operation.
///
/// Carries the machine-readable [`OutcomeKind`], a one-line human message,
/// the final observed [`StatusReport`], any warnings collected on the way,
/// and, after a failure, whatever the server wrote to its error log while
/// the operation ran.
#[derive(Debug, Clone)]
pub struct ControlOutcome {
    kind: OutcomeKind,
    message: String,
    status: StatusReport,
    warnings: Vec<String>,
    diagnostics: Option<String>,
}

impl ControlOutcome {
    fn new(kind: OutcomeKind, message: impl Into<String>, status: StatusReport) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
            warnings: Vec::new(),
            diagnostics: None,
        }
    }

    fn warn(mut self, note: impl Into<String>) -> Self {
        self.warnings.push(note.into());
        self
    }

    fn with_diagnostics(mut self, diagnostics: Option<String>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// The outcome classification.
    pub fn kind(&self) -> OutcomeKind {
        self.kind
    }

    /// One-line human-readable summary.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status observed when the operation concluded.
    pub fn status(&self) -> &StatusReport {
        &self.status
    }

    /// Warnings that did not stop the operation, in the order they arose.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Error log excerpt collected after a failure, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        self.diagnostics.as_deref()
    }

    /// Whether the operation left the world as requested.
    ///
    /// Idempotent outcomes count: starting an already-running server and
    /// stopping an already-stopped one both succeed.
    pub fn succeeded(&self) -> bool {
        matches!(
            self.kind,
            OutcomeKind::Done | OutcomeKind::AlreadyRunning | OutcomeKind::NotRunning
        )
    }
}

/// Drives a server through its lifecycle.
///
/// The controller owns the decision logic: it observes status through a
/// [`StatusEngine`], decides whether an operation applies, delegates the
/// server-specific commands to a [`ServerAdapter`], and polls status until
/// the target state is reached or the descriptor's wait expires.
///
/// Operations return `Ok(ControlOutcome)` for every expected situation,
/// including failures of the managed server. `Err` is reserved for faults
/// of the controller's own machinery, such as a pid file that cannot be
/// repaired.
///
/// # Examples
///
/// ```no_run
/// use serverctl::control::{CommandSpec, ExecAdapter};
/// use serverctl::{LifecycleController, ServerDescriptor};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let descriptor = ServerDescriptor::builder("web")
///         .port(8080)
///         .pid_file("/var/run/web.pid")
///         .build()?;
///
///     let adapter = ExecAdapter::new(CommandSpec::new("/usr/sbin/web-server"))
///         .write_pid_file(true);
///
///     let controller = LifecycleController::new(descriptor, adapter);
///     let outcome = controller.start().await?;
///     println!("{}", outcome.message());
///     Ok(())
/// }
/// ```
pub struct LifecycleController {
    descriptor: ServerDescriptor,
    engine: StatusEngine,
    adapter: Arc<dyn ServerAdapter>,
    diagnostics: DiagnosticsReporter,
}

impl LifecycleController {
    /// Creates a controller for `descriptor` driven by `adapter`.
    pub fn new(descriptor: ServerDescriptor, adapter: impl ServerAdapter + 'static) -> Self {
        Self::with_adapter(descriptor, Arc::new(adapter))
    }

    /// Creates a controller from an already-shared adapter.
    pub fn with_adapter(descriptor: ServerDescriptor, adapter: Arc<dyn ServerAdapter>) -> Self {
        let engine = StatusEngine::new(descriptor.clone());
        let diagnostics = DiagnosticsReporter::new(descriptor.clone());
        Self {
            descriptor,
            engine,
            adapter,
            diagnostics,
        }
    }

    /// Replaces the port probe, e.g. to shorten its connect timeout.
    pub fn with_probe(mut self, probe: PortProbe) -> Self {
        self.engine = self.engine.with_probe(probe);
        self
    }

    /// The descriptor this controller manages.
    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Observes the server without acting on it.
    #[tracing::instrument(skip(self), fields(server = %self.descriptor.name()))]
    pub async fn status(&self) -> Result<StatusReport> {
        self.engine.status().await
    }

    /// Reports the status line without acting on the server.
    ///
    /// Ping is pure observation and always concludes
    /// [`OutcomeKind::Done`]. Liveness decisions read the outcome's
    /// [`status()`](ControlOutcome::status) rather than the kind; the
    /// operation-shaped kinds have no honest name for a server that is
    /// half up.
    #[tracing::instrument(skip(self), fields(server = %self.descriptor.name()))]
    pub async fn ping(&self) -> Result<ControlOutcome> {
        let report = self.engine.status().await?;
        let message = report.describe(&self.descriptor);

        tracing::debug!(status = ?report.status(), "Ping");
        Ok(ControlOutcome::new(OutcomeKind::Done, message, report))
    }

    /// Starts the server and waits until it is active.
    ///
    /// A server that is already running is left alone. A port occupied by
    /// a process the pid file does not account for refuses the start, so
    /// two servers never fight over one port.
    #[tracing::instrument(skip(self), fields(server = %self.descriptor.name()))]
    pub async fn start(&self) -> Result<ControlOutcome> {
        let report = self.engine.status().await?;

        match report.status() {
            Status::Active | Status::Running => {
                let message = match report.pid() {
                    Some(pid) => format!(
                        "{} is already running (pid {})",
                        self.descriptor.description(),
                        pid
                    ),
                    None => format!("{} is already running", self.descriptor.description()),
                };
                tracing::info!(pid = ?report.pid(), "Server is already running");

                let listening = report.status().is_listening();
                let mut outcome = ControlOutcome::new(OutcomeKind::AlreadyRunning, message, report);
                if !listening {
                    outcome = outcome.warn(format!(
                        "the process is not listening to port {} yet",
                        self.descriptor.port()
                    ));
                }
                Ok(outcome)
            }
            Status::Listening => {
                tracing::warn!(
                    port = self.descriptor.port(),
                    "Port is held by a process we do not manage, refusing to start"
                );
                Ok(ControlOutcome::new(
                    OutcomeKind::PortConflict,
                    report.describe(&self.descriptor),
                    report,
                ))
            }
            Status::Inactive => {
                tracing::info!("Starting server");
                let snapshot = self.diagnostics.snapshot();
                if let Err(e) = self.adapter.do_start(&self.descriptor).await {
                    tracing::error!(error = %e, "Start command failed");
                    let report = self.engine.status().await?;
                    let message =
                        format!("failed to start {}: {}", self.descriptor.description(), e);
                    return Ok(
                        ControlOutcome::new(OutcomeKind::AdapterFailed, message, report)
                            .with_diagnostics(self.diagnostics.collect(&snapshot)),
                    );
                }

                self.await_active(snapshot).await
            }
        }
    }

    /// Stops the server and waits until it is fully inactive.
    ///
    /// Stopping a server that is not running succeeds without acting. If
    /// the recorded process belongs to another user and no elevation is
    /// configured, the attempt proceeds but the outcome carries a warning,
    /// since the signal will likely be refused.
    #[tracing::instrument(skip(self), fields(server = %self.descriptor.name()))]
    pub async fn stop(&self) -> Result<ControlOutcome> {
        let report = self.engine.status().await?;

        let Some(handle) = report.handle() else {
            tracing::info!("No server process to stop");
            let message = report.describe(&self.descriptor);
            return Ok(ControlOutcome::new(OutcomeKind::NotRunning, message, report));
        };

        let mut warnings = Vec::new();
        if let Some(note) = DiagnosticsReporter::ownership_note(&handle, self.descriptor.use_sudo())
        {
            tracing::warn!(pid = handle.pid, "Signalling a process owned by another user");
            warnings.push(note);
        }

        tracing::info!(pid = handle.pid, "Stopping server");
        let snapshot = self.diagnostics.snapshot();
        if let Err(e) = self.adapter.do_stop(&self.descriptor, &handle).await {
            tracing::error!(error = %e, "Stop command failed");
            let report = self.engine.status().await?;
            let message = format!("failed to stop {}: {}", self.descriptor.description(), e);
            let mut outcome = ControlOutcome::new(OutcomeKind::AdapterFailed, message, report)
                .with_diagnostics(self.diagnostics.collect(&snapshot));
            outcome.warnings = warnings;
            return Ok(outcome);
        }

        self.await_stopped(warnings, snapshot).await
    }

    /// Restarts the server: stop, then start.
    ///
    /// The start phase only runs once the old process is gone. A process
    /// that survives the stop aborts the restart. Warnings from the stop
    /// phase are carried into the final outcome.
    #[tracing::instrument(skip(self), fields(server = %self.descriptor.name()))]
    pub async fn restart(&self) -> Result<ControlOutcome> {
        let stopped = self.stop().await?;
        if stopped.status().status().is_running() {
            tracing::warn!(kind = ?stopped.kind(), "Restart abandoned in its stop phase");
            let mut outcome = stopped;
            outcome.kind = OutcomeKind::Aborted;
            outcome.message = format!("restart aborted: {}", outcome.message);
            return Ok(outcome);
        }

        let mut started = self.start().await?;
        let mut combined = stopped.warnings;
        combined.append(&mut started.warnings);
        started.warnings = combined;
        if started.diagnostics.is_none() {
            started.diagnostics = stopped.diagnostics;
        }
        Ok(started)
    }

    /// Reloads the server without dropping connections, where supported.
    ///
    /// Follows the classic httpd behavior: a graceful restart of a server
    /// that is not running simply starts it. Adapters that do not support
    /// graceful restart produce [`OutcomeKind::Unsupported`].
    #[tracing::instrument(skip(self), fields(server = %self.descriptor.name()))]
    pub async fn graceful_restart(&self) -> Result<ControlOutcome> {
        if !self.adapter.supports_graceful_restart() {
            let report = self.engine.status().await?;
            let message = format!(
                "{} does not support graceful restart",
                self.descriptor.description()
            );
            tracing::info!("Graceful restart is not supported by this adapter");
            return Ok(ControlOutcome::new(
                OutcomeKind::Unsupported,
                message,
                report,
            ));
        }

        if let Some(outcome) = self.abort_on_bad_config().await? {
            return Ok(outcome);
        }

        let report = self.engine.status().await?;
        let Some(handle) = report.handle() else {
            tracing::info!("Server is not running, graceful restart becomes a start");
            return self.start().await;
        };

        let mut warnings = Vec::new();
        if let Some(note) = DiagnosticsReporter::ownership_note(&handle, self.descriptor.use_sudo())
        {
            tracing::warn!(pid = handle.pid, "Signalling a process owned by another user");
            warnings.push(note);
        }

        tracing::info!(pid = handle.pid, "Gracefully restarting server");
        let snapshot = self.diagnostics.snapshot();
        if let Err(e) = self.adapter.do_graceful_restart(&self.descriptor, &handle).await {
            let report = self.engine.status().await?;
            let outcome = match e {
                Error::Unsupported(reason) => {
                    let message = format!(
                        "{} does not support graceful restart: {}",
                        self.descriptor.description(),
                        reason
                    );
                    ControlOutcome::new(OutcomeKind::Unsupported, message, report)
                }
                other => {
                    tracing::error!(error = %other, "Graceful restart command failed");
                    let message = format!(
                        "failed to gracefully restart {}: {}",
                        self.descriptor.description(),
                        other
                    );
                    ControlOutcome::new(OutcomeKind::AdapterFailed, message, report)
                        .with_diagnostics(self.diagnostics.collect(&snapshot))
                }
            };
            let mut outcome = outcome;
            outcome.warnings = warnings;
            return Ok(outcome);
        }

        let mut outcome = self.await_active(snapshot).await?;
        let mut combined = warnings;
        combined.append(&mut outcome.warnings);
        outcome.warnings = combined;
        Ok(outcome)
    }

    /// Full diagnostic text: status overview plus the error log tail.
    #[tracing::instrument(skip(self), fields(server = %self.descriptor.name()))]
    pub async fn diagnose(&self) -> Result<String> {
        let report = self.engine.status().await?;
        let mut text = self.diagnostics.overview(&report);
        if let Some(tail) = self.diagnostics.collect(&ErrorLogSnapshot::default()) {
            text.push_str("\nrecent error log:\n");
            text.push_str(&tail);
        }
        Ok(text)
    }

    /// Runs the adapter's configuration check; on failure produces the
    /// outcome that aborts the surrounding operation.
    async fn abort_on_bad_config(&self) -> Result<Option<ControlOutcome>> {
        let Err(e) = self.adapter.check_config_syntax(&self.descriptor).await else {
            return Ok(None);
        };

        tracing::error!(error = %e, "Configuration check failed, server left untouched");
        let report = self.engine.status().await?;
        let message = format!(
            "{} was left untouched: {}",
            self.descriptor.description(),
            e
        );
        Ok(Some(ControlOutcome::new(
            OutcomeKind::Aborted,
            message,
            report,
        )))
    }

    /// Polls status until the server is active or the wait expires.
    ///
    /// The timeout message quotes the status line observed at the
    /// deadline, so a server that came up without opening its port reads
    /// differently from one that never appeared at all.
    async fn await_active(&self, snapshot: ErrorLogSnapshot) -> Result<ControlOutcome> {
        let description = self.descriptor.description();
        let deadline = Instant::now() + self.descriptor.wait_for_status();

        loop {
            let report = self.engine.status().await?;

            if report.status().is_active() {
                let message = match report.pid() {
                    Some(pid) => format!(
                        "{} is now running (pid {}) and listening to port {}",
                        description,
                        pid,
                        self.descriptor.port()
                    ),
                    None => format!(
                        "{} is now running and listening to port {}",
                        description,
                        self.descriptor.port()
                    ),
                };
                tracing::info!(pid = ?report.pid(), "Server is active");
                return Ok(ControlOutcome::new(OutcomeKind::Done, message, report));
            }

            if Instant::now() >= deadline {
                tracing::warn!(
                    waited = ?self.descriptor.wait_for_status(),
                    status = ?report.status(),
                    "Server did not become active within the wait"
                );
                let message = format!(
                    "{} did not become active within {:?}; {}",
                    description,
                    self.descriptor.wait_for_status(),
                    report.describe(&self.descriptor)
                );
                return Ok(ControlOutcome::new(OutcomeKind::Timeout, message, report)
                    .with_diagnostics(self.diagnostics.collect(&snapshot)));
            }

            tokio::time::sleep(self.descriptor.poll_interval()).await;
        }
    }

    /// Polls status until the server is fully inactive or the wait expires.
    ///
    /// The deadline distinguishes two failure shapes: a process that
    /// survived the signal, and a process that is gone while something,
    /// likely a child it left behind, still holds the port.
    async fn await_stopped(
        &self,
        warnings: Vec<String>,
        snapshot: ErrorLogSnapshot,
    ) -> Result<ControlOutcome> {
        let description = self.descriptor.description();
        let deadline = Instant::now() + self.descriptor.wait_for_status();

        loop {
            let report = self.engine.status().await?;

            if report.status().is_inactive() {
                tracing::info!("Server stopped");
                let mut outcome = ControlOutcome::new(
                    OutcomeKind::Done,
                    format!("{} has stopped", description),
                    report,
                );
                outcome.warnings = warnings.clone();
                return Ok(outcome);
            }

            if Instant::now() >= deadline {
                tracing::warn!(
                    waited = ?self.descriptor.wait_for_status(),
                    status = ?report.status(),
                    "Server did not go inactive within the wait"
                );
                let message = if report.status().is_running() {
                    match report.pid() {
                        Some(pid) => format!(
                            "{} could not be stopped gracefully; process {} is still running",
                            description, pid
                        ),
                        None => format!("{} could not be stopped gracefully", description),
                    }
                } else {
                    format!(
                        "{} has stopped, but something is still listening to port {} (possibly a child process)",
                        description,
                        self.descriptor.port()
                    )
                };
                let mut outcome = ControlOutcome::new(OutcomeKind::Timeout, message, report)
                    .with_diagnostics(self.diagnostics.collect(&snapshot));
                outcome.warnings = warnings.clone();
                return Ok(outcome);
            }

            tokio::time::sleep(self.descriptor.poll_interval()).await;
        }
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
