use crate::config::ServerDescriptor;
use crate::error::{Error, Result};

/// Validates a resolved server descriptor.
///
/// Checks that:
/// * The server name is not empty
/// * The bind address is not empty
/// * The port is non-zero
/// * The poll interval is non-zero (a zero interval would spin)
///
/// # Errors
///
/// Returns [`Error::DescriptorInvalid`] describing the first violated rule.
pub fn validate_descriptor(descriptor: &ServerDescriptor) -> Result<()> {
    if descriptor.name().trim().is_empty() {
        return Err(Error::DescriptorInvalid(
            "server name must not be empty".to_string(),
        ));
    }

    if descriptor.bind_addr().trim().is_empty() {
        return Err(Error::DescriptorInvalid(format!(
            "server '{}' has an empty bind address",
            descriptor.name()
        )));
    }

    if descriptor.port() == 0 {
        return Err(Error::DescriptorInvalid(format!(
            "server '{}' must use a non-zero port",
            descriptor.name()
        )));
    }

    if descriptor.poll_interval().is_zero() {
        return Err(Error::DescriptorInvalid(format!(
            "server '{}' has a zero poll interval",
            descriptor.name()
        )));
    }

    Ok(())
}
