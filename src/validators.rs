//! Input validation for connection attempts
//!
//! Everything a caller types (host, ports) is checked here before it reaches
//! the analyzer. Failures are reported as [`Error::Validation`] naming the field.

use crate::core::error::{Error, Result};
use std::net::IpAddr;

/// Maximum DNS name length
const MAX_HOST_LEN: usize = 253;

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16, field: &str) -> Result<u16> {
    if port == 0 {
        Err(Error::validation(field, "Port must be between 1 and 65535"))
    } else {
        Ok(port)
    }
}

/// Parses a port typed by the user.
///
/// # Errors
///
/// Returns `Err` if the input is not an integer in 1-65535.
///
/// # Examples
///
/// ```
/// use fwcheck::validators::parse_port;
///
/// assert_eq!(parse_port(" 21412 ", "remote_port").unwrap(), 21412);
/// assert!(parse_port("70000", "remote_port").is_err());
/// ```
pub fn parse_port(input: &str, field: &str) -> Result<u16> {
    let port = input
        .trim()
        .parse::<u16>()
        .map_err(|_| Error::validation(field, format!("'{}' is not a valid port", input.trim())))?;
    validate_port(port, field)
}

/// Parses a port that may be left open: empty, `*` or `any` yield `None`.
///
/// # Errors
///
/// Returns `Err` if a concrete port is given and it is invalid.
pub fn parse_optional_port(input: &str, field: &str) -> Result<Option<u16>> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "*" || trimmed.eq_ignore_ascii_case("any") {
        Ok(None)
    } else {
        parse_port(trimmed, field).map(Some)
    }
}

/// Validates a remote host: an IP literal or a DNS-style name.
///
/// Returns the trimmed host.
///
/// # Errors
///
/// Returns `Err` if:
/// - Host is empty
/// - Host exceeds 253 characters
/// - Host contains characters other than ASCII alphanumerics, `.`, `-`, `_`
pub fn validate_host(input: &str) -> Result<String> {
    let host = input.trim();

    if host.is_empty() {
        return Err(Error::validation("remote_host", "Host cannot be empty"));
    }

    if host.parse::<IpAddr>().is_ok() {
        return Ok(host.to_string());
    }

    if host.len() > MAX_HOST_LEN {
        return Err(Error::validation(
            "remote_host",
            format!("Host too long (max {MAX_HOST_LEN} characters)"),
        ));
    }

    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(Error::validation(
            "remote_host",
            "Host contains invalid characters",
        ));
    }

    Ok(host.to_string())
}
