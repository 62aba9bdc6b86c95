//! Redaction of connection details from failure reasons
//!
//! Operational failures are surfaced to callers and logs as
//! `<Operation>: Failed - <reason>`. Driver messages routinely embed the
//! connection string, credentials or server addresses, which are removed here.

use once_cell::sync::Lazy;
use regex::Regex;

static CONNECTION_STRING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"mongodb(\+srv)?://[^\s,;]+").expect("valid regex"));

static CREDENTIALS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"://[^:/\s]+:[^@\s]+@").expect("valid regex"));

static IP_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}(:\d+)?\b").expect("valid regex")
});

/// Removes connection strings, credentials and IP addresses from `message`.
///
/// With `debug_mode` set the message is returned unchanged.
pub fn sanitize_error(message: &str, debug_mode: bool) -> String {
    if debug_mode {
        return message.to_string();
    }

    let sanitized = CONNECTION_STRING_RE.replace_all(message, "[CONNECTION_STRING_REDACTED]");
    let sanitized = CREDENTIALS_RE.replace_all(&sanitized, "://[CREDENTIALS_REDACTED]@");
    let sanitized = IP_ADDRESS_RE.replace_all(&sanitized, "[IP_REDACTED]");

    sanitized.into_owned()
}
