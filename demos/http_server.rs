use serverctl::control::{CommandSpec, ExecAdapter};
use serverctl::error::Result;
use serverctl::{LifecycleController, ServerDescriptor};
use tracing_subscriber::{fmt, EnvFilter};

const DEMO_PORT: u16 = 8018;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    // `with_env_filter` reads the RUST_LOG environment variable to set the log level.
    // `with_target(true)` includes the module path in the log output.
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    tracing::info!("Starting http_server demo");

    // Everything the demo touches lives under one scratch directory.
    let scratch = std::env::temp_dir().join("serverctl-demo");
    let descriptor = ServerDescriptor::builder("demo-http")
        .description("demo HTTP server")
        .bind_addr("127.0.0.1")
        .port(DEMO_PORT)
        .pid_file(scratch.join("http.pid"))
        .error_log(scratch.join("http.log"))
        .wait_for_status_secs(5)
        .build()?;

    // python3's built-in file server plays the managed process: it listens
    // on the port but never writes a pid file, so the adapter records the
    // pid of the child it launched.
    let adapter = ExecAdapter::new(
        CommandSpec::new("python3")
            .arg("-m")
            .arg("http.server")
            .arg(DEMO_PORT.to_string())
            .args(["--bind", "127.0.0.1"]),
    )
    .write_pid_file(true);

    let controller = LifecycleController::new(descriptor, adapter);
    println!(
        "Managing {} (pid file {})",
        controller.descriptor().description(),
        controller.descriptor().pid_file().display()
    );

    println!("Starting the demo server...");
    let started = controller.start().await?;
    println!("{}", started.message());
    for warning in started.warnings() {
        println!("warning: {}", warning);
    }
    if !started.succeeded() {
        if let Some(diagnostics) = started.diagnostics() {
            println!("--- diagnostics ---");
            println!("{}", diagnostics);
        }
        return Ok(());
    }

    // One-line status, the apachectl way.
    let ping = controller.ping().await?;
    println!("{}", ping.message());

    // The full observable state, including the error log tail.
    println!("\n=== diagnose ===");
    println!("{}", controller.diagnose().await?);

    // No reload command was configured, so this reports Unsupported.
    let graceful = controller.graceful_restart().await?;
    println!("\n{}", graceful.message());

    println!("\nStopping the demo server...");
    let stopped = controller.stop().await?;
    println!("{}", stopped.message());
    for warning in stopped.warnings() {
        println!("warning: {}", warning);
    }

    tracing::info!("http_server demo finished");
    Ok(())
}
