use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default connect timeout for a liveness probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// TCP liveness probe for a server's listening port.
///
/// The probe attempts a plain TCP connect and reports only whether it
/// succeeded. Handshake success means *something* accepts connections on
/// that address and port; it says nothing about which process. Refused,
/// unreachable, and timed-out connections all count as "not listening",
/// which keeps the probe usable against firewalled hosts where packets are
/// silently dropped instead of rejected.
///
/// # Examples
///
/// ```no_run
/// use serverctl::status::PortProbe;
///
/// #[tokio::main]
/// async fn main() {
///     let probe = PortProbe::new();
///     if probe.is_listening("localhost", 5432).await {
///         println!("port 5432 is in use");
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PortProbe {
    timeout: Duration,
}

impl PortProbe {
    /// Creates a probe with the default 1 second connect timeout.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Creates a probe with a custom connect timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Returns `true` if a TCP connection to `addr:port` succeeds within
    /// the probe timeout.
    ///
    /// Hostnames are resolved through the system resolver, so `localhost`
    /// works whether it maps to IPv4, IPv6, or both.
    pub async fn is_listening(&self, addr: &str, port: u16) -> bool {
        match timeout(self.timeout, TcpStream::connect((addr, port))).await {
            Ok(Ok(stream)) => {
                // The handshake is the whole test. Close immediately so the
                // probed server sees nothing but an empty connection.
                drop(stream);
                true
            }
            Ok(Err(e)) => {
                tracing::trace!(addr, port, error = %e, "Probe connect failed");
                false
            }
            Err(_) => {
                tracing::trace!(addr, port, timeout = ?self.timeout, "Probe timed out");
                false
            }
        }
    }
}

impl Default for PortProbe {
    fn default() -> Self {
        Self::new()
    }
}
