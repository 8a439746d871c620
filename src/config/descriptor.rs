use crate::config::validator::validate_descriptor;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bind address probed for liveness.
pub const DEFAULT_BIND_ADDR: &str = "localhost";
/// Default number of seconds a lifecycle operation waits for its target state.
pub const DEFAULT_WAIT_FOR_STATUS_SECS: u64 = 10;
/// Default delay between status polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Identity and configuration for one managed server instance.
///
/// A descriptor is fully resolved at construction time: every default
/// (bind address, sudo policy, timeouts) is computed eagerly by
/// [`DescriptorBuilder::build`], and the resulting value is immutable for
/// the lifetime of the controller that owns it. Nothing is deferred into
/// accessors, so two reads of the same field always agree.
///
/// # Examples
///
/// Building a descriptor programmatically:
///
/// ```
/// use serverctl::config::ServerDescriptor;
///
/// let descriptor = ServerDescriptor::builder("postgres")
///     .port(5432)
///     .pid_file("/var/run/postgres.pid")
///     .build()
///     .unwrap();
///
/// assert_eq!(descriptor.port(), 5432);
/// assert_eq!(descriptor.bind_addr(), "localhost");
/// assert!(!descriptor.use_sudo());
/// ```
///
/// Loading one from JSON:
///
/// ```
/// use serverctl::config::ServerDescriptor;
///
/// let descriptor = ServerDescriptor::from_json_str(r#"{
///     "name": "web",
///     "port": 8080,
///     "pid_file": "/tmp/web.pid",
///     "error_log": "/tmp/web.log"
/// }"#).unwrap();
///
/// assert_eq!(descriptor.description(), "server 'web'");
/// ```
#[derive(Debug, Clone)]
pub struct ServerDescriptor {
    name: String,
    description: Option<String>,
    bind_addr: String,
    port: u16,
    pid_file: PathBuf,
    error_log: Option<PathBuf>,
    use_sudo: bool,
    wait_for_status: Duration,
    poll_interval: Duration,
}

impl ServerDescriptor {
    /// Start building a descriptor for the server with the given name.
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            name: Some(name.into()),
            ..DescriptorBuilder::default()
        }
    }

    /// Loads a descriptor from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The contents are not valid JSON
    /// * Required fields are missing or invalid
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::DescriptorParse(format!("Failed to read descriptor file: {}", e)))?;

        Self::from_json_str(&content)
    }

    /// Parses a descriptor from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid JSON or the resulting
    /// descriptor fails validation.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let builder: DescriptorBuilder = serde_json::from_str(content)
            .map_err(|e| Error::DescriptorParse(format!("Failed to parse JSON descriptor: {}", e)))?;

        builder.build()
    }

    /// Server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description used in status lines.
    ///
    /// Defaults to `server '<name>'` when no override was configured.
    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("server '{}'", self.name))
    }

    /// Address the liveness probe connects to.
    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    /// Port the managed server is expected to listen on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path to the pid file the managed server maintains.
    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// Path to the server's error log, if one is configured.
    pub fn error_log(&self) -> Option<&Path> {
        self.error_log.as_deref()
    }

    /// Whether stop/start commands are expected to run elevated.
    pub fn use_sudo(&self) -> bool {
        self.use_sudo
    }

    /// How long lifecycle operations wait for their target state.
    pub fn wait_for_status(&self) -> Duration {
        self.wait_for_status
    }

    /// Delay between status polls inside a wait loop.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Builder for [`ServerDescriptor`], doubling as its JSON schema.
///
/// Every field is optional at this stage; [`build`](Self::build) resolves
/// defaults and rejects incomplete or inconsistent input. The serialized
/// form uses the same field names:
///
/// ```json
/// {
///   "name": "web",
///   "bind_addr": "127.0.0.1",
///   "port": 8080,
///   "pid_file": "/var/run/web.pid",
///   "error_log": "/var/log/web/error.log",
///   "use_sudo": false,
///   "wait_for_status_secs": 10,
///   "poll_interval_ms": 200
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorBuilder {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    bind_addr: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    pid_file: Option<PathBuf>,
    #[serde(default)]
    error_log: Option<PathBuf>,
    #[serde(default)]
    use_sudo: Option<bool>,
    #[serde(default)]
    wait_for_status_secs: Option<u64>,
    #[serde(default)]
    poll_interval_ms: Option<u64>,
}

impl DescriptorBuilder {
    /// Override the description used in status lines.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Address the liveness probe connects to. Defaults to `localhost`.
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    /// Port the server listens on. Required, must be non-zero.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Path to the server's pid file. Required; there is no default that is
    /// safe to assume for an arbitrary server.
    pub fn pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = Some(path.into());
        self
    }

    /// Path to the server's error log, used for failure diagnostics.
    pub fn error_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_log = Some(path.into());
        self
    }

    /// Whether start/stop commands should run elevated.
    /// Defaults to `true` for privileged ports (below 1024).
    pub fn use_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = Some(use_sudo);
        self
    }

    /// Seconds a lifecycle operation waits for its target state. Default 10.
    pub fn wait_for_status_secs(mut self, secs: u64) -> Self {
        self.wait_for_status_secs = Some(secs);
        self
    }

    /// Milliseconds between status polls. Default 200, must be non-zero.
    pub fn poll_interval_ms(mut self, millis: u64) -> Self {
        self.poll_interval_ms = Some(millis);
        self
    }

    /// Resolve defaults and produce an immutable [`ServerDescriptor`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::DescriptorInvalid`] if name, port, or pid_file is
    /// missing, the port is 0, or the poll interval is zero.
    pub fn build(self) -> Result<ServerDescriptor> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::DescriptorInvalid("missing required field: name".to_string()))?;

        let port = self
            .port
            .ok_or_else(|| Error::DescriptorInvalid("missing required field: port".to_string()))?;

        let pid_file = self.pid_file.ok_or_else(|| {
            Error::DescriptorInvalid("missing required field: pid_file".to_string())
        })?;

        let descriptor = ServerDescriptor {
            name,
            description: self.description,
            bind_addr: self
                .bind_addr
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            port,
            pid_file,
            error_log: self.error_log,
            // Privileged ports need elevation unless the caller says otherwise.
            use_sudo: self.use_sudo.unwrap_or(port < 1024),
            wait_for_status: Duration::from_secs(
                self.wait_for_status_secs
                    .unwrap_or(DEFAULT_WAIT_FOR_STATUS_SECS),
            ),
            poll_interval: Duration::from_millis(
                self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
        };

        validate_descriptor(&descriptor)?;
        Ok(descriptor)
    }
}
