use async_trait::async_trait;
use mockall::mock;
use mockall::Sequence;
use serverctl::config::ServerDescriptor;
use serverctl::control::{LifecycleController, OutcomeKind, ServerAdapter};
use serverctl::error::{Error, Result};
use serverctl::status::{PidFileRecord, PidFileStore, PortProbe, ProcessHandle, Status};
use std::net::TcpListener;
use std::process::{Child, Command};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// Mock for the adapter trait so tests can script server behavior.
mock! {
    pub ServerAdapterMock {}

    #[async_trait]
    impl ServerAdapter for ServerAdapterMock {
        async fn do_start(&self, descriptor: &ServerDescriptor) -> Result<()>;
        async fn do_stop(&self, descriptor: &ServerDescriptor, handle: &ProcessHandle) -> Result<()>;
        async fn check_config_syntax(&self, descriptor: &ServerDescriptor) -> Result<()>;
        fn supports_graceful_restart(&self) -> bool;
        async fn do_graceful_restart(&self, descriptor: &ServerDescriptor, handle: &ProcessHandle) -> Result<()>;
    }
}

/// Binds an ephemeral port and releases it, yielding a port that is
/// currently free.
fn reserve_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn descriptor(dir: &tempfile::TempDir, port: u16) -> ServerDescriptor {
    ServerDescriptor::builder("x")
        .bind_addr("127.0.0.1")
        .port(port)
        .pid_file(dir.path().join("x.pid"))
        .wait_for_status_secs(2)
        .poll_interval_ms(25)
        .build()
        .unwrap()
}

fn write_pid(descriptor: &ServerDescriptor, pid: u32) {
    PidFileStore::new(descriptor.pid_file()).write(pid).unwrap();
}

/// What a successful launch looks like from the outside: a pid file naming
/// a live process (ours) and a listener on the port. The listener is
/// intentionally leaked so it stays open for the rest of the test process.
fn activate(descriptor: &ServerDescriptor) {
    write_pid(descriptor, std::process::id());
    let listener = TcpListener::bind(("127.0.0.1", descriptor.port())).unwrap();
    std::mem::forget(listener);
}

/// A real child process the stop path can make disappear.
fn spawn_sleeper() -> Child {
    Command::new("sleep").arg("30").spawn().unwrap()
}

/// Appends one line to the error log, the way a starting server would.
fn append_line(log: &std::path::Path, line: &str) {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(log)
        .unwrap();
    writeln!(file, "{line}").unwrap();
}

#[tokio::test]
async fn test_start_launches_and_waits_until_active() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(&dir, reserve_port());

    let mut adapter = MockServerAdapterMock::new();
    let launched = descriptor.clone();
    adapter
        .expect_do_start()
        .times(1)
        .returning(move |_| {
            activate(&launched);
            Ok(())
        });

    let controller = LifecycleController::new(descriptor.clone(), adapter);
    let outcome = controller.start().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Done);
    assert!(outcome.succeeded());
    assert_eq!(
        outcome.message(),
        format!(
            "server 'x' is now running (pid {}) and listening to port {}",
            std::process::id(),
            descriptor.port()
        )
    );
    assert_eq!(outcome.status().status(), Status::Active);
}

#[tokio::test]
async fn test_start_is_idempotent_when_already_running() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let descriptor = descriptor(&dir, port);
    write_pid(&descriptor, std::process::id());

    let mut adapter = MockServerAdapterMock::new();
    adapter.expect_do_start().times(0);

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.start().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::AlreadyRunning);
    assert!(outcome.succeeded());
    assert_eq!(
        outcome.message(),
        format!("server 'x' is already running (pid {})", std::process::id())
    );

    drop(listener);
}

#[tokio::test]
async fn test_start_refuses_an_occupied_port() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    // No pid file: whatever listens on the port is not ours.
    let descriptor = descriptor(&dir, port);

    let mut adapter = MockServerAdapterMock::new();
    adapter.expect_do_start().times(0);

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.start().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::PortConflict);
    assert!(!outcome.succeeded());
    assert_eq!(
        outcome.message(),
        format!("server 'x' is not running, but something is listening to port {port}")
    );

    drop(listener);
}

#[tokio::test]
async fn test_start_reports_adapter_failure_with_fresh_log_content() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("error.log");
    std::fs::write(&log, "noise from a previous run\n").unwrap();

    let descriptor = ServerDescriptor::builder("x")
        .bind_addr("127.0.0.1")
        .port(reserve_port())
        .pid_file(dir.path().join("x.pid"))
        .error_log(&log)
        .wait_for_status_secs(2)
        .poll_interval_ms(25)
        .build()
        .unwrap();

    let mut adapter = MockServerAdapterMock::new();
    let written = log.clone();
    adapter.expect_do_start().times(1).returning(move |_| {
        append_line(&written, "cannot bind socket: permission denied");
        Err(Error::Process("exec format error".to_string()))
    });

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.start().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::AdapterFailed);
    assert!(!outcome.succeeded());
    assert!(outcome.message().contains("failed to start server 'x'"));
    assert!(outcome.message().contains("exec format error"));

    // Only what this start attempt produced, not the old noise.
    let diagnostics = outcome.diagnostics().unwrap();
    assert!(diagnostics.contains("cannot bind socket"));
    assert!(!diagnostics.contains("previous run"));
}

#[tokio::test]
async fn test_start_times_out_within_the_configured_wait() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("error.log");

    let descriptor = ServerDescriptor::builder("x")
        .bind_addr("127.0.0.1")
        .port(reserve_port())
        .pid_file(dir.path().join("x.pid"))
        .error_log(&log)
        .wait_for_status_secs(1)
        .poll_interval_ms(50)
        .build()
        .unwrap();

    let mut adapter = MockServerAdapterMock::new();
    // The launch "succeeds", logs one line, and the server never appears.
    let written = log.clone();
    adapter.expect_do_start().times(1).returning(move |_| {
        append_line(&written, "listen queue init failed");
        Ok(())
    });

    let controller = LifecycleController::new(descriptor, adapter)
        .with_probe(PortProbe::with_timeout(Duration::from_millis(250)));

    let began = Instant::now();
    let outcome = controller.start().await.unwrap();
    let elapsed = began.elapsed();

    assert_eq!(outcome.kind(), OutcomeKind::Timeout);
    assert!(!outcome.succeeded());
    assert!(outcome.message().contains("did not become active"));
    // The deadline message quotes the status observed at expiry.
    assert!(outcome.message().contains("server 'x' is not running"));
    assert!(outcome
        .diagnostics()
        .unwrap()
        .contains("listen queue init failed"));

    // Bounded wait: one configured wait plus one poll interval, with
    // slack for scheduling.
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

#[tokio::test]
async fn test_start_timeout_quotes_the_partial_status() {
    let dir = tempfile::tempdir().unwrap();
    let port = reserve_port();
    let descriptor = ServerDescriptor::builder("x")
        .bind_addr("127.0.0.1")
        .port(port)
        .pid_file(dir.path().join("x.pid"))
        .wait_for_status_secs(1)
        .poll_interval_ms(50)
        .build()
        .unwrap();

    // The launched process comes up but never opens its port.
    let launched = descriptor.clone();
    let mut adapter = MockServerAdapterMock::new();
    adapter.expect_do_start().times(1).returning(move |_| {
        write_pid(&launched, std::process::id());
        Ok(())
    });

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.start().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Timeout);
    assert!(outcome.message().contains("did not become active"));
    assert!(outcome.message().contains(&format!(
        "server 'x' is running (pid {}), but not listening to port {port}",
        std::process::id()
    )));
    assert_eq!(outcome.status().status(), Status::Running);
}

#[tokio::test]
async fn test_stop_waits_until_the_process_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(&dir, reserve_port());

    let child = Arc::new(Mutex::new(Some(spawn_sleeper())));
    let pid = child.lock().unwrap().as_ref().map(|c| c.id()).unwrap();
    write_pid(&descriptor, pid);

    let stopper = Arc::clone(&child);
    let mut adapter = MockServerAdapterMock::new();
    adapter.expect_do_stop().times(1).returning(move |_, _| {
        // Kill and reap, so the pid really disappears.
        if let Some(mut c) = stopper.lock().unwrap().take() {
            let _ = c.kill();
            let _ = c.wait();
        }
        Ok(())
    });

    let controller = LifecycleController::new(descriptor.clone(), adapter);
    let outcome = controller.stop().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Done);
    assert!(outcome.succeeded());
    assert_eq!(outcome.message(), "server 'x' has stopped");
    // The stale pid file was cleaned up during the wait.
    assert_eq!(
        PidFileStore::new(descriptor.pid_file()).read(),
        PidFileRecord::Absent
    );
}

#[tokio::test]
async fn test_stop_is_idempotent_when_not_running() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(&dir, reserve_port());

    let mut adapter = MockServerAdapterMock::new();
    adapter.expect_do_stop().times(0);

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.stop().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::NotRunning);
    assert!(outcome.succeeded());
    assert_eq!(outcome.message(), "server 'x' is not running");
}

#[tokio::test]
async fn test_stop_reports_a_failed_stop_command() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(&dir, reserve_port());
    write_pid(&descriptor, std::process::id());

    let mut adapter = MockServerAdapterMock::new();
    adapter
        .expect_do_stop()
        .times(1)
        .returning(|_, _| Err(Error::Process("Operation not permitted".to_string())));

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.stop().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::AdapterFailed);
    assert!(!outcome.succeeded());
    assert!(outcome.message().contains("failed to stop server 'x'"));
    assert!(outcome.message().contains("Operation not permitted"));
}

#[tokio::test]
async fn test_stop_reports_a_lingering_listener_at_the_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let descriptor = ServerDescriptor::builder("x")
        .bind_addr("127.0.0.1")
        .port(port)
        .pid_file(dir.path().join("x.pid"))
        .wait_for_status_secs(1)
        .poll_interval_ms(25)
        .build()
        .unwrap();

    let child = Arc::new(Mutex::new(Some(spawn_sleeper())));
    let pid = child.lock().unwrap().as_ref().map(|c| c.id()).unwrap();
    write_pid(&descriptor, pid);

    let stopper = Arc::clone(&child);
    let mut adapter = MockServerAdapterMock::new();
    adapter.expect_do_stop().times(1).returning(move |_, _| {
        if let Some(mut c) = stopper.lock().unwrap().take() {
            let _ = c.kill();
            let _ = c.wait();
        }
        Ok(())
    });

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.stop().await.unwrap();

    // The process is gone, but the port never cleared, so the wait ran
    // its full course and reported the leftover listener.
    assert_eq!(outcome.kind(), OutcomeKind::Timeout);
    assert!(!outcome.succeeded());
    assert!(outcome.message().contains("has stopped, but something is still listening"));
    assert!(outcome.message().contains("possibly a child process"));
    assert_eq!(outcome.status().status(), Status::Listening);

    drop(listener);
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_warns_about_a_foreign_owner() {
    // Pid 1 belongs to root. Meaningless when the tests themselves run
    // as root, so skip in that case.
    if serverctl::status::ProcessTable::current_uid() == Some(0) {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(&dir, reserve_port());
    write_pid(&descriptor, 1);

    let mut adapter = MockServerAdapterMock::new();
    adapter
        .expect_do_stop()
        .times(1)
        .returning(|_, _| Err(Error::Process("Operation not permitted".to_string())));

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.stop().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::AdapterFailed);
    assert!(outcome
        .warnings()
        .iter()
        .any(|w| w.contains("belongs to uid")));
}

#[tokio::test]
async fn test_restart_stops_then_starts() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(&dir, reserve_port());

    let child = Arc::new(Mutex::new(Some(spawn_sleeper())));
    let pid = child.lock().unwrap().as_ref().map(|c| c.id()).unwrap();
    write_pid(&descriptor, pid);

    let mut adapter = MockServerAdapterMock::new();
    let mut seq = Sequence::new();

    let stopper = Arc::clone(&child);
    adapter
        .expect_do_stop()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_, _| {
            if let Some(mut c) = stopper.lock().unwrap().take() {
                let _ = c.kill();
                let _ = c.wait();
            }
            Ok(())
        });

    let launched = descriptor.clone();
    adapter
        .expect_do_start()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_| {
            activate(&launched);
            Ok(())
        });

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.restart().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Done);
    assert!(outcome.succeeded());
    assert!(outcome.message().contains("is now running"));
}

#[tokio::test]
async fn test_restart_aborts_when_the_process_survives_the_stop() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = ServerDescriptor::builder("x")
        .bind_addr("127.0.0.1")
        .port(reserve_port())
        .pid_file(dir.path().join("x.pid"))
        .wait_for_status_secs(1)
        .poll_interval_ms(25)
        .build()
        .unwrap();

    let mut child = spawn_sleeper();
    write_pid(&descriptor, child.id());

    let mut adapter = MockServerAdapterMock::new();
    // The stop command reports success but the process shrugs it off.
    adapter.expect_do_stop().times(1).returning(|_, _| Ok(()));
    adapter.expect_do_start().times(0);

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.restart().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Aborted);
    assert!(!outcome.succeeded());
    assert!(outcome.message().starts_with("restart aborted:"));
    assert!(outcome.message().contains("could not be stopped gracefully"));

    let _ = child.kill();
    let _ = child.wait();
}

#[tokio::test]
async fn test_restart_of_a_stopped_server_just_starts_it() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(&dir, reserve_port());

    let mut adapter = MockServerAdapterMock::new();
    adapter.expect_do_stop().times(0);

    let launched = descriptor.clone();
    adapter
        .expect_do_start()
        .times(1)
        .returning(move |_| {
            activate(&launched);
            Ok(())
        });

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.restart().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Done);
    assert!(outcome.succeeded());
}

#[tokio::test]
async fn test_graceful_restart_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(&dir, reserve_port());

    let mut adapter = MockServerAdapterMock::new();
    adapter
        .expect_supports_graceful_restart()
        .return_const(false);
    adapter.expect_do_graceful_restart().times(0);

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.graceful_restart().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Unsupported);
    assert!(!outcome.succeeded());
    assert_eq!(
        outcome.message(),
        "server 'x' does not support graceful restart"
    );
}

#[tokio::test]
async fn test_graceful_restart_aborts_when_the_config_check_fails() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let descriptor = descriptor(&dir, port);
    write_pid(&descriptor, std::process::id());

    let mut adapter = MockServerAdapterMock::new();
    adapter.expect_supports_graceful_restart().return_const(true);
    adapter
        .expect_check_config_syntax()
        .times(1)
        .returning(|_| Err(Error::ConfigCheck("bad directive at line 3".to_string())));
    adapter.expect_do_graceful_restart().times(0);

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.graceful_restart().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Aborted);
    assert!(!outcome.succeeded());
    assert!(outcome.message().contains("left untouched"));
    assert!(outcome.message().contains("bad directive at line 3"));

    // The running server must not have been signalled.
    let report = controller.status().await.unwrap();
    assert_eq!(report.status(), Status::Active);

    drop(listener);
}

#[tokio::test]
async fn test_graceful_restart_reloads_the_running_server() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let descriptor = descriptor(&dir, port);
    write_pid(&descriptor, std::process::id());

    let mut adapter = MockServerAdapterMock::new();
    adapter.expect_supports_graceful_restart().return_const(true);
    adapter
        .expect_check_config_syntax()
        .times(1)
        .returning(|_| Ok(()));
    adapter
        .expect_do_graceful_restart()
        .times(1)
        .returning(|_, _| Ok(()));

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.graceful_restart().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Done);
    assert!(outcome.message().contains("is now running (pid"));

    drop(listener);
}

#[tokio::test]
async fn test_graceful_restart_starts_a_stopped_server() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = descriptor(&dir, reserve_port());

    let mut adapter = MockServerAdapterMock::new();
    adapter.expect_supports_graceful_restart().return_const(true);
    adapter
        .expect_check_config_syntax()
        .times(1)
        .returning(|_| Ok(()));
    adapter.expect_do_graceful_restart().times(0);

    let launched = descriptor.clone();
    adapter
        .expect_do_start()
        .times(1)
        .returning(move |_| {
            activate(&launched);
            Ok(())
        });

    let controller = LifecycleController::new(descriptor, adapter);
    let outcome = controller.graceful_restart().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Done);
    assert!(outcome.succeeded());
}

#[tokio::test]
async fn test_ping_reports_the_exact_status_lines() {
    // Not running.
    let dir = tempfile::tempdir().unwrap();
    let idle = descriptor(&dir, reserve_port());
    let controller = LifecycleController::new(idle, MockServerAdapterMock::new());
    let outcome = controller.ping().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Done);
    assert_eq!(outcome.status().status(), Status::Inactive);
    assert_eq!(outcome.message(), "server 'x' is not running");

    // Fully active.
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let active = descriptor(&dir, port);
    write_pid(&active, std::process::id());

    let controller = LifecycleController::new(active, MockServerAdapterMock::new());
    let outcome = controller.ping().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Done);
    assert_eq!(outcome.status().status(), Status::Active);
    assert_eq!(
        outcome.message(),
        format!(
            "server 'x' is running (pid {}) and listening to port {port}",
            std::process::id()
        )
    );

    drop(listener);
}

#[tokio::test]
async fn test_ping_is_observational_for_a_half_up_server() {
    // A live process that never opened its port. The kind stays Done;
    // the state lives in the report and the message.
    let dir = tempfile::tempdir().unwrap();
    let half_up = descriptor(&dir, reserve_port());
    write_pid(&half_up, std::process::id());

    let controller = LifecycleController::new(half_up.clone(), MockServerAdapterMock::new());
    let outcome = controller.ping().await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Done);
    assert_eq!(outcome.status().status(), Status::Running);
    assert_eq!(
        outcome.message(),
        format!(
            "server 'x' is running (pid {}), but not listening to port {}",
            std::process::id(),
            half_up.port()
        )
    );
}

#[tokio::test]
async fn test_diagnose_includes_snapshot_and_log_tail() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("error.log");
    std::fs::write(&log, "boom at startup\n").unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let descriptor = ServerDescriptor::builder("x")
        .bind_addr("127.0.0.1")
        .port(port)
        .pid_file(dir.path().join("x.pid"))
        .error_log(&log)
        .build()
        .unwrap();
    write_pid(&descriptor, std::process::id());

    let controller = LifecycleController::new(descriptor, MockServerAdapterMock::new());
    let text = controller.diagnose().await.unwrap();

    assert!(text.contains("is running (pid"));
    assert!(text.contains("pid file:"));
    assert!(text.contains("accepting connections"));
    assert!(text.contains("recent error log:"));
    assert!(text.contains("boom at startup"));

    drop(listener);
}
