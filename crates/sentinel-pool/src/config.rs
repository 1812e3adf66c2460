//! Pool configuration and validation.

use crate::types::Endpoint;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Default client-side connect/read timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default wait before reconnecting a failed sentinel listener
pub const DEFAULT_SUBSCRIBE_RETRY_WAIT: Duration = Duration::from_millis(5000);

/// Construction parameters for a [`crate::SentinelPool`]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PoolConfig {
    /// Name of the monitored primary, as known to the sentinels
    #[validate(length(min = 1))]
    pub primary_name: String,

    /// Sentinel quorum to poll and listen to
    #[validate(length(min = 1))]
    pub sentinels: Vec<Endpoint>,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub connection_timeout: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub read_timeout: Duration,

    /// Credential for the primary
    #[serde(default)]
    pub password: Option<String>,

    /// Credential for the sentinels (may differ from the primary's)
    #[serde(default)]
    pub sentinel_password: Option<String>,

    /// Logical database selected on every primary connection
    #[serde(default)]
    pub database: u32,

    /// Name announced with `CLIENT SETNAME`
    #[serde(default)]
    #[validate(custom = "validate_client_name")]
    pub client_name: Option<String>,

    #[serde(default)]
    pub tls: TlsSettings,

    #[serde(default)]
    #[validate]
    pub pool: PoolSettings,

    #[serde(default = "default_retry_wait", with = "humantime_serde")]
    #[validate(custom = "validate_retry_wait")]
    pub subscribe_retry_wait: Duration,
}

/// Transport security settings, shared by sentinel and primary connections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    #[serde(default)]
    pub enabled: bool,

    /// PEM bundle of trusted CAs; webpki roots are used when absent
    #[serde(default)]
    pub ca_path: Option<String>,

    /// Name verified against the server certificate instead of the endpoint host
    #[serde(default)]
    pub server_name: Option<String>,
}

/// Generic object pool sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PoolSettings {
    #[validate(range(min = 1, max = 10000))]
    pub max_size: usize,

    /// How long a borrow waits for a free slot
    #[serde(with = "humantime_serde")]
    pub borrow_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 8,
            borrow_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with defaults for everything but the name and quorum
    pub fn new(primary_name: impl Into<String>, sentinels: Vec<Endpoint>) -> Self {
        Self {
            primary_name: primary_name.into(),
            sentinels,
            connection_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            password: None,
            sentinel_password: None,
            database: 0,
            client_name: None,
            tls: TlsSettings::default(),
            pool: PoolSettings::default(),
            subscribe_retry_wait: DEFAULT_SUBSCRIBE_RETRY_WAIT,
        }
    }
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_retry_wait() -> Duration {
    DEFAULT_SUBSCRIBE_RETRY_WAIT
}

// Custom validators

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if millis < 1 || millis > 300_000 {
        return Err(ValidationError::new("timeout_out_of_range"));
    }
    Ok(())
}

fn validate_retry_wait(wait: &Duration) -> Result<(), ValidationError> {
    let millis = wait.as_millis();
    if millis < 1 || millis > 600_000 {
        return Err(ValidationError::new("retry_wait_out_of_range"));
    }
    Ok(())
}

fn validate_client_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(ValidationError::new("client_name_invalid"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentinels() -> Vec<Endpoint> {
        vec![Endpoint::new("10.0.0.1", 26379), Endpoint::new("10.0.0.2", 26379)]
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = PoolConfig::new("mymaster", sentinels());
        assert!(config.validate().is_ok());
        assert_eq!(config.subscribe_retry_wait, Duration::from_millis(5000));
        assert_eq!(config.pool.max_size, 8);
    }

    #[test]
    fn test_valid_yaml_parsing() {
        let yaml = r#"
primary_name: mymaster
sentinels:
  - "10.0.0.1:26379"
  - "10.0.0.2:26379"
connection_timeout: 500ms
read_timeout: 1s
sentinel_password: s3cret
database: 2
client_name: billing
tls:
  enabled: true
  server_name: kv.internal
pool:
  max_size: 32
  borrow_timeout: 250ms
subscribe_retry_wait: 2s
"#;

        let config: PoolConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sentinels.len(), 2);
        assert_eq!(config.sentinels[1], Endpoint::new("10.0.0.2", 26379));
        assert_eq!(config.connection_timeout, Duration::from_millis(500));
        assert_eq!(config.sentinel_password.as_deref(), Some("s3cret"));
        assert!(config.password.is_none());
        assert_eq!(config.database, 2);
        assert!(config.tls.enabled);
        assert_eq!(config.pool.max_size, 32);
        assert_eq!(config.subscribe_retry_wait, Duration::from_secs(2));
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
primary_name: mymaster
sentinels: ["sentinel:26379"]
"#;

        let config: PoolConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.read_timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.pool, PoolSettings::default());
        assert_eq!(config.tls, TlsSettings::default());
    }

    #[test]
    fn test_invalid_sentinel_address() {
        let yaml = r#"
primary_name: mymaster
sentinels: ["no-port-here"]
"#;
        assert!(serde_yaml::from_str::<PoolConfig>(yaml).is_err());
    }

    #[test]
    fn test_empty_name_or_quorum_rejected() {
        let config = PoolConfig::new("", sentinels());
        assert!(config.validate().is_err());

        let config = PoolConfig::new("mymaster", vec![]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_pool_size() {
        let mut config = PoolConfig::new("mymaster", sentinels());
        config.pool.max_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_durations() {
        let mut config = PoolConfig::new("mymaster", sentinels());
        config.connection_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = PoolConfig::new("mymaster", sentinels());
        config.subscribe_retry_wait = Duration::from_secs(3600);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_name_validation() {
        assert!(validate_client_name("billing-worker").is_ok());
        assert!(validate_client_name("").is_err());
        assert!(validate_client_name("has space").is_err());
    }
}
