//! Endpoint, notification and state types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Channel on which sentinels announce primary switches.
pub const SWITCH_MASTER_CHANNEL: &str = "+switch-master";

/// A host/port pair identifying a primary or a sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build an endpoint from a `get-master-addr-by-name` style reply.
    ///
    /// Only a two-element reply with a numeric port is well-formed.
    pub fn from_reply(reply: &[String]) -> Option<Self> {
        match reply {
            [host, port] if !host.is_empty() => {
                port.parse::<u16>().ok().map(|port| Self::new(host.clone(), port))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| common::Error::config(format!("endpoint '{}' has no port", s)))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(common::Error::config(format!("endpoint '{}' has no host", s)));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| common::Error::config(format!("endpoint '{}' has invalid port: {}", s, e)))?;

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = common::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

/// Parsed `+switch-master` payload.
///
/// Wire layout: `<name> <oldHost> <oldPort> <newHost> <newPort>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverNotification {
    pub primary_name: String,
    pub new_endpoint: Endpoint,
}

impl FailoverNotification {
    /// Parse a notification payload, returning `None` when it is malformed.
    pub fn parse(payload: &str) -> Option<Self> {
        let tokens: Vec<&str> = payload.split(' ').collect();
        if tokens.len() <= 3 {
            return None;
        }

        let port = tokens.get(4)?.parse::<u16>().ok()?;
        Some(Self {
            primary_name: tokens[0].to_string(),
            new_endpoint: Endpoint::new(tokens[3], port),
        })
    }
}

/// Lifecycle state of a failover listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerState {
    /// Not running (initial and terminal state)
    Stopped,
    /// Opening a link to the sentinel
    Connecting,
    /// Actively querying the current primary
    Refreshing,
    /// Waiting for switch notifications
    Subscribed,
    /// Sleeping after a link failure
    Backoff,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerState::Stopped => write!(f, "STOPPED"),
            ListenerState::Connecting => write!(f, "CONNECTING"),
            ListenerState::Refreshing => write!(f, "REFRESHING"),
            ListenerState::Subscribed => write!(f, "SUBSCRIBED"),
            ListenerState::Backoff => write!(f, "BACKOFF"),
        }
    }
}

/// Pool statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Endpoint changes applied to the pool
    pub retargets: u64,

    /// Borrowed connections discarded because they pointed at a stale primary
    pub stale_discarded: u64,

    /// Connections handed out to callers
    pub acquired: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    retargets: AtomicU64,
    stale_discarded: AtomicU64,
    acquired: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_retarget(&self) {
        self.retargets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acquired(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            retargets: self.retargets.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            acquired: self.acquired.load(Ordering::Relaxed),
        }
    }
}
