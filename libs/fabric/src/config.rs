//! Relay configuration.
//!
//! Both queue addresses are mandatory and checked up front, so a
//! misconfigured process fails at startup rather than on its first call.

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;
use crate::poll::PollPolicy;
use crate::transport::{ChannelAddress, SendRetry};

pub const DEFAULT_REGION: &str = "us-west-2";

pub const REQUEST_QUEUE_VAR: &str = "IBKR_REQUEST_QUEUE_URL";
pub const RESPONSE_QUEUE_VAR: &str = "IBKR_RESPONSE_QUEUE_URL";
pub const REGION_VAR: &str = "AWS_REGION";
pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";
pub const POLL_WAIT_VAR: &str = "IBKR_RELAY_POLL_WAIT_MS";
pub const SEND_ATTEMPTS_VAR: &str = "IBKR_RELAY_SEND_ATTEMPTS";

/// Value that never shows up in `Debug` or `Display` output
// No Clone: copies of secrets should be deliberate.
pub struct Secret<T> {
    inner: T,
}

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    pub fn expose_secret(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Static queue credentials
#[derive(Debug)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: Secret<String>,
    pub session_token: Option<Secret<String>>,
}

#[derive(Debug)]
pub struct RelayConfig {
    pub request_queue: ChannelAddress,
    pub response_queue: ChannelAddress,
    pub region: String,
    /// `None` defers to the ambient provider chain
    pub credentials: Option<Credentials>,
    pub poll: PollPolicy,
    pub send_retry: SendRetry,
}

impl RelayConfig {
    pub fn new(
        request_queue: impl Into<String>,
        response_queue: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let request_queue = non_empty(request_queue.into()).ok_or(ConfigError::Missing(REQUEST_QUEUE_VAR))?;
        let response_queue =
            non_empty(response_queue.into()).ok_or(ConfigError::Missing(RESPONSE_QUEUE_VAR))?;

        Ok(Self {
            request_queue: ChannelAddress::new(request_queue),
            response_queue: ChannelAddress::new(response_queue),
            region: DEFAULT_REGION.to_string(),
            credentials: None,
            poll: PollPolicy::default(),
            send_retry: SendRetry::default(),
        })
    }

    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).and_then(non_empty);

        let mut config = Self::new(
            get(REQUEST_QUEUE_VAR).unwrap_or_default(),
            get(RESPONSE_QUEUE_VAR).unwrap_or_default(),
        )?;

        if let Some(region) = get(REGION_VAR) {
            config.region = region;
        }

        config.credentials = match (get(ACCESS_KEY_VAR), get(SECRET_KEY_VAR)) {
            (Some(access_key_id), Some(secret)) => Some(Credentials {
                access_key_id,
                secret_access_key: Secret::new(secret),
                session_token: get(SESSION_TOKEN_VAR).map(Secret::new),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(SECRET_KEY_VAR)),
            (None, Some(_)) => return Err(ConfigError::Missing(ACCESS_KEY_VAR)),
        };

        if let Some(wait) = get(POLL_WAIT_VAR) {
            let millis = parse_number(POLL_WAIT_VAR, &wait)?;
            config.poll.receive_wait = Duration::from_millis(millis);
        }

        if let Some(attempts) = get(SEND_ATTEMPTS_VAR) {
            let attempts = parse_number(SEND_ATTEMPTS_VAR, &attempts)?;
            if attempts == 0 {
                return Err(ConfigError::Invalid {
                    name: SEND_ATTEMPTS_VAR,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.send_retry =
                SendRetry::new(u32::try_from(attempts).unwrap_or(u32::MAX));
        }

        Ok(config)
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_number(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|e| ConfigError::Invalid {
        name,
        reason: format!("{value:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const QUEUES: [(&str, &str); 2] = [
        (REQUEST_QUEUE_VAR, "https://sqs.us-west-2.amazonaws.com/123/ibkr-requests"),
        (RESPONSE_QUEUE_VAR, "https://sqs.us-west-2.amazonaws.com/123/ibkr-responses"),
    ];

    #[test]
    fn missing_queue_fails_fast() {
        let err = RelayConfig::from_lookup(lookup(&[QUEUES[1]])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(REQUEST_QUEUE_VAR));

        let err = RelayConfig::from_lookup(lookup(&[QUEUES[0], (RESPONSE_QUEUE_VAR, "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(RESPONSE_QUEUE_VAR));
    }

    #[test]
    fn defaults_apply() {
        let config = RelayConfig::from_lookup(lookup(&QUEUES)).unwrap();
        assert_eq!(config.region, DEFAULT_REGION);
        assert!(config.credentials.is_none());
        assert_eq!(config.poll, PollPolicy::default());
        assert_eq!(config.send_retry, SendRetry::default());
        assert_eq!(config.request_queue.as_str(), QUEUES[0].1);
    }

    #[test]
    fn reads_overrides() {
        let mut vars = QUEUES.to_vec();
        vars.extend([
            (REGION_VAR, "eu-central-1"),
            (POLL_WAIT_VAR, "1500"),
            (SEND_ATTEMPTS_VAR, "5"),
        ]);
        let config = RelayConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.poll.receive_wait, Duration::from_millis(1500));
        assert_eq!(config.send_retry.max_attempts, 5);
    }

    #[test]
    fn rejects_bad_numbers() {
        let mut vars = QUEUES.to_vec();
        vars.push((SEND_ATTEMPTS_VAR, "0"));
        assert!(matches!(
            RelayConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid { .. })
        ));

        let mut vars = QUEUES.to_vec();
        vars.push((POLL_WAIT_VAR, "soon"));
        assert!(matches!(
            RelayConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn half_configured_credentials_are_rejected() {
        let mut vars = QUEUES.to_vec();
        vars.push((ACCESS_KEY_VAR, "AKIA123"));
        assert_eq!(
            RelayConfig::from_lookup(lookup(&vars)).unwrap_err(),
            ConfigError::Missing(SECRET_KEY_VAR)
        );
    }

    #[test]
    fn credentials_never_print() {
        let mut vars = QUEUES.to_vec();
        vars.extend([(ACCESS_KEY_VAR, "AKIA123"), (SECRET_KEY_VAR, "hunter2")]);
        let config = RelayConfig::from_lookup(lookup(&vars)).unwrap();

        let printed = format!("{config:?}");
        assert!(printed.contains("AKIA123"));
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("[REDACTED]"));

        let credentials = config.credentials.as_ref().unwrap();
        assert_eq!(credentials.secret_access_key.expose_secret(), "hunter2");
    }
}
