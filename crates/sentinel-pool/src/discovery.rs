//! One-shot primary discovery across the sentinel quorum.

use crate::error::{PoolError, Result};
use crate::link::{SentinelConnector, SentinelLink};
use crate::types::Endpoint;
use tracing::{debug, info, warn};

enum Answer {
    Found(Endpoint),
    Unknown,
}

/// Ask each sentinel in turn for the current primary of `primary_name`.
///
/// The first well-formed answer wins and no further sentinels are queried.
/// A sentinel that fails is skipped. When nothing is found, the error tells
/// apart "some sentinel answered but does not monitor the name"
/// ([`PoolError::NotMonitored`]) from "no sentinel could be reached"
/// ([`PoolError::SentinelsUnreachable`]).
pub async fn discover_primary(
    connector: &dyn SentinelConnector,
    sentinels: &[Endpoint],
    primary_name: &str,
    sentinel_password: Option<&str>,
) -> Result<Endpoint> {
    info!(primary = primary_name, "Trying to find primary from available sentinels");

    let mut sentinel_available = false;

    for sentinel in sentinels {
        debug!(sentinel = %sentinel, "Connecting to sentinel");

        let mut link = match connector.connect(sentinel).await {
            Ok(link) => link,
            Err(e) => {
                warn!(sentinel = %sentinel, error = %e, "Cannot connect to sentinel, trying next one");
                continue;
            }
        };

        let answer = query(link.as_mut(), primary_name, sentinel_password).await;
        link.close().await;

        match answer {
            Ok(Answer::Found(primary)) => {
                info!(primary = %primary, sentinel = %sentinel, "Found primary");
                return Ok(primary);
            }
            Ok(Answer::Unknown) => {
                sentinel_available = true;
                warn!(
                    primary = primary_name,
                    sentinel = %sentinel,
                    "Can not get primary address from sentinel"
                );
            }
            Err(e) => {
                warn!(
                    sentinel = %sentinel,
                    error = %e,
                    "Cannot get primary address from sentinel, trying next one"
                );
            }
        }
    }

    let primary_name = primary_name.to_string();
    if sentinel_available {
        Err(PoolError::NotMonitored { primary_name })
    } else {
        Err(PoolError::SentinelsUnreachable { primary_name })
    }
}

async fn query(
    link: &mut dyn SentinelLink,
    primary_name: &str,
    sentinel_password: Option<&str>,
) -> common::Result<Answer> {
    if let Some(password) = sentinel_password {
        link.authenticate(password).await?;
    }

    let reply = link.primary_address(primary_name).await?;
    Ok(match reply.as_deref().and_then(Endpoint::from_reply) {
        Some(primary) => Answer::Found(primary),
        None => Answer::Unknown,
    })
}
