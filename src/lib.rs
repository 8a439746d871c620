/*!
 # serverctl

 A Rust library for apachectl-style lifecycle control of background server
 processes.

 ## Overview

 serverctl provides functionality to:
 - Determine whether a server is running by combining its pid file with a
   TCP probe of its listening port
 - Start, stop, restart, and gracefully restart servers through pluggable
   adapters
 - Repair corrupt and stale pid files instead of tripping over them
 - Produce operator-friendly status lines and failure diagnostics

 ## Basic Usage

 ```no_run
 use serverctl::control::{CommandSpec, ExecAdapter};
 use serverctl::{LifecycleController, Result, ServerDescriptor};

 #[tokio::main]
 async fn main() -> Result<()> {
     // Describe the server under management
     let descriptor = ServerDescriptor::builder("web")
         .port(8080)
         .pid_file("/var/run/web.pid")
         .error_log("/var/log/web/error.log")
         .build()?;

     // Wire up how it is launched and checked
     let adapter = ExecAdapter::new(CommandSpec::new("/usr/sbin/web-server"))
         .check_command(CommandSpec::new("/usr/sbin/web-server").arg("--check-config"))
         .write_pid_file(true);

     let controller = LifecycleController::new(descriptor, adapter);

     // Start the server and wait until its port answers
     let outcome = controller.start().await?;
     println!("{}", outcome.message());

     // Later: one-line status
     let ping = controller.ping().await?;
     println!("{}", ping.message());

     Ok(())
 }
 ```

 ## Features

 - **Status Detection**: Four-state status derived from the pid file and a
   port probe, including the degraded combinations
 - **Lifecycle Operations**: Start, stop, restart, graceful restart, and
   ping with bounded waits
 - **Self-Repair**: Corrupt and stale pid files are removed before they can
   mislead an operation
 - **Pluggable Adapters**: Server-specific commands behind a small trait,
   with a ready-made command-driven implementation
 - **Diagnostics**: Status snapshots and error log excerpts for failed
   starts
 - **Async Support**: Full async/await support

 ## License

 This project is licensed under the terms in the LICENSE file.
*/

pub mod config;
pub mod control;
pub mod error;
pub mod status;

pub use config::ServerDescriptor;
pub use control::{ControlOutcome, LifecycleController, OutcomeKind, ServerAdapter};
pub use error::{Error, Result};
pub use status::{Status, StatusReport};
