//! Client configuration.
//!
//! Defaults come from the environment:
//! - `CPBRIDGE_CONNECT_TIMEOUT`: seconds to wait for the worker connection (default 10)
//! - `CPBRIDGE_REQUEST_TIMEOUT`: seconds to wait for each reply (default: wait forever)
//! - `CPBRIDGE_MAX_FRAME_MB`: largest message accepted or sent, in MiB (default 1024)

use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_FRAME_MB: usize = 1024;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    /// `None` waits for a reply indefinitely; runs on large images can take minutes.
    pub request_timeout: Option<Duration>,
    pub max_frame_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let env = |key: &str| std::env::var(key).ok();
        Self {
            connect_timeout: parse_secs(env("CPBRIDGE_CONNECT_TIMEOUT").as_deref())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            request_timeout: parse_secs(env("CPBRIDGE_REQUEST_TIMEOUT").as_deref()),
            max_frame_length: parse_mib(env("CPBRIDGE_MAX_FRAME_MB").as_deref())
                .unwrap_or(DEFAULT_MAX_FRAME_MB * 1024 * 1024),
        }
    }
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_frame_length(mut self, bytes: usize) -> Self {
        self.max_frame_length = bytes;
        self
    }
}

/// Fractional seconds; zero, negative, unrepresentable and unparsable
/// values are ignored.
fn parse_secs(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|s| *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
}

fn parse_mib(value: Option<&str>) -> Option<usize> {
    value
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|mb| *mb > 0)
        .and_then(|mb| mb.checked_mul(1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_secs_accepts_fractions() {
        assert_eq!(parse_secs(Some("2.5")), Some(Duration::from_millis(2500)));
        assert_eq!(parse_secs(Some(" 30 ")), Some(Duration::from_secs(30)));
    }

    #[test]
    fn parse_secs_rejects_garbage() {
        assert_eq!(parse_secs(None), None);
        assert_eq!(parse_secs(Some("soon")), None);
        assert_eq!(parse_secs(Some("0")), None);
        assert_eq!(parse_secs(Some("-4")), None);
        assert_eq!(parse_secs(Some("inf")), None);
        assert_eq!(parse_secs(Some("NaN")), None);
        assert_eq!(parse_secs(Some("1e30")), None);
    }

    #[test]
    fn parse_mib_scales() {
        assert_eq!(parse_mib(Some("16")), Some(16 * 1024 * 1024));
        assert_eq!(parse_mib(Some("0")), None);
        assert_eq!(parse_mib(Some("lots")), None);
    }

    #[test]
    fn builder_overrides() {
        let config = ClientConfig::default()
            .with_connect_timeout(Duration::from_secs(1))
            .with_request_timeout(Some(Duration::from_secs(5)))
            .with_max_frame_length(4096);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.max_frame_length, 4096);
    }
}
