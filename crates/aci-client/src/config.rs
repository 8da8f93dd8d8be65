//! Session configuration
//!
//! Settings are plain values with sensible defaults; [`SessionConfig::from_env`]
//! reads overrides from `ACI_*` environment variables.

use crate::address::GatewayRule;
use crate::error::AciError;
use std::env;
use std::fmt;
use std::time::Duration;

/// Connection and authentication settings for a [`Session`](crate::Session)
#[derive(Clone)]
pub struct SessionConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Log in again automatically when a request is rejected with 403
    pub auto_login: bool,
    pub request_timeout: Duration,
    /// Timeout of the reachability probe made when a session is opened
    pub probe_timeout: Duration,
    /// APICs ship with self-signed certificates
    pub accept_invalid_certs: bool,
    pub gateway_rule: GatewayRule,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            auto_login: true,
            request_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            accept_invalid_certs: true,
            gateway_rule: GatewayRule::default(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auto_login", &self.auto_login)
            .field("request_timeout", &self.request_timeout)
            .field("probe_timeout", &self.probe_timeout)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("gateway_rule", &self.gateway_rule)
            .finish()
    }
}

impl SessionConfig {
    /// Load configuration from environment variables
    ///
    /// * `ACI_USERNAME`, `ACI_PASSWORD`
    /// * `ACI_AUTO_LOGIN` (bool)
    /// * `ACI_TIMEOUT_SECS`, `ACI_PROBE_TIMEOUT_SECS`
    /// * `ACI_ACCEPT_INVALID_CERTS` (bool)
    /// * `ACI_GATEWAY_RULE` (`first` or `last`)
    pub fn from_env() -> Result<Self, AciError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AciError> {
        let mut config = Self::default();

        config.username = lookup("ACI_USERNAME").filter(|v| !v.is_empty());
        config.password = lookup("ACI_PASSWORD").filter(|v| !v.is_empty());
        if let Some(value) = lookup("ACI_AUTO_LOGIN") {
            config.auto_login = parse_bool("ACI_AUTO_LOGIN", &value)?;
        }
        if let Some(value) = lookup("ACI_TIMEOUT_SECS") {
            config.request_timeout = parse_secs("ACI_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("ACI_PROBE_TIMEOUT_SECS") {
            config.probe_timeout = parse_secs("ACI_PROBE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("ACI_ACCEPT_INVALID_CERTS") {
            config.accept_invalid_certs = parse_bool("ACI_ACCEPT_INVALID_CERTS", &value)?;
        }
        if let Some(value) = lookup("ACI_GATEWAY_RULE") {
            config.gateway_rule = value.parse()?;
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AciError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AciError::InvalidRequest(format!(
            "{key} must be a boolean, got {value:?}"
        ))),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, AciError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| AciError::InvalidRequest(format!("{key} must be a number of seconds, got {value:?}")))
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
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.auto_login);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert!(config.username.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = SessionConfig::from_lookup(lookup(&[
            ("ACI_USERNAME", "admin"),
            ("ACI_PASSWORD", "secret"),
            ("ACI_AUTO_LOGIN", "false"),
            ("ACI_TIMEOUT_SECS", "12"),
            ("ACI_GATEWAY_RULE", "first"),
        ]))
        .unwrap();
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert!(!config.auto_login);
        assert_eq!(config.request_timeout, Duration::from_secs(12));
        assert_eq!(config.gateway_rule, GatewayRule::First);
    }

    #[test]
    fn test_invalid_values() {
        assert!(SessionConfig::from_lookup(lookup(&[("ACI_AUTO_LOGIN", "maybe")])).is_err());
        assert!(SessionConfig::from_lookup(lookup(&[("ACI_TIMEOUT_SECS", "-1")])).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = SessionConfig {
            password: Some("hunter2".to_string()),
            ..SessionConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
