//! RESP-over-TCP implementations of the sentinel link and the primary
//! connection factory.

use crate::config::PoolConfig;
use crate::link::{PublishedMessage, SentinelConnector, SentinelLink};
use crate::pool::{Connection, ConnectionFactory};
use crate::resp::RespValue;
use crate::transport::{RespConnection, TlsClient};
use crate::types::Endpoint;
use async_trait::async_trait;
use common::{Error, Result};
use std::time::Duration;
use tracing::{debug, trace};

/// Opens [`TcpSentinelLink`]s
#[derive(Debug, Clone)]
pub struct TcpSentinelConnector {
    connection_timeout: Duration,
    read_timeout: Duration,
    tls: Option<TlsClient>,
}

impl TcpSentinelConnector {
    pub fn new(connection_timeout: Duration, read_timeout: Duration, tls: Option<TlsClient>) -> Self {
        Self {
            connection_timeout,
            read_timeout,
            tls,
        }
    }
}

#[async_trait]
impl SentinelConnector for TcpSentinelConnector {
    async fn connect(&self, sentinel: &Endpoint) -> Result<Box<dyn SentinelLink>> {
        let conn = RespConnection::connect(
            sentinel,
            self.connection_timeout,
            self.read_timeout,
            self.tls.as_ref(),
        )
        .await?;

        Ok(Box::new(TcpSentinelLink {
            conn: Some(conn),
            read_timeout: self.read_timeout,
        }))
    }
}

/// A RESP connection to one sentinel.
///
/// Once subscribed, reads wait without a deadline: a quiet channel is not a
/// failure.
pub struct TcpSentinelLink {
    conn: Option<RespConnection>,
    read_timeout: Duration,
}

impl TcpSentinelLink {
    fn conn(&mut self) -> Result<&mut RespConnection> {
        self.conn.as_mut().ok_or(Error::Closed)
    }
}

#[async_trait]
impl SentinelLink for TcpSentinelLink {
    async fn authenticate(&mut self, password: &str) -> Result<()> {
        authenticate(self.conn()?, password).await
    }

    async fn primary_address(&mut self, primary_name: &str) -> Result<Option<Vec<String>>> {
        self.conn()?
            .request(&["SENTINEL", "get-master-addr-by-name", primary_name])
            .await?
            .into_string_array()
    }

    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        let read_timeout = self.read_timeout;
        let conn = self.conn()?;
        conn.send(&["SUBSCRIBE", channel]).await?;

        let reply = conn.read_reply(Some(read_timeout)).await?.into_result()?;
        match push_frame(reply)? {
            (kind, items) if kind == "subscribe" => {
                trace!(sentinel = %conn.endpoint(), channel, count = ?items.get(2), "Subscribed");
                Ok(())
            }
            (kind, _) => Err(Error::protocol(format!(
                "unexpected reply to SUBSCRIBE: {}",
                kind
            ))),
        }
    }

    async fn next_message(&mut self) -> Result<Option<PublishedMessage>> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(None);
        };

        loop {
            let frame = conn.read_reply(None).await?.into_result()?;
            let (kind, items) = push_frame(frame)?;

            match kind.as_str() {
                "message" => {
                    let text = |idx: usize| {
                        items
                            .get(idx)
                            .and_then(RespValue::as_text)
                            .ok_or_else(|| Error::protocol("malformed message push"))
                    };
                    return Ok(Some(PublishedMessage {
                        channel: text(1)?,
                        payload: text(2)?,
                    }));
                }
                "unsubscribe" => {
                    let remaining = matches!(items.get(2), Some(RespValue::Integer(n)) if *n > 0);
                    if !remaining {
                        return Ok(None);
                    }
                }
                other => debug!(sentinel = %conn.endpoint(), kind = other, "Ignoring push"),
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown().await;
        }
    }
}

/// Split a pub/sub push into its kind and the full element list
fn push_frame(value: RespValue) -> Result<(String, Vec<RespValue>)> {
    let RespValue::Array(Some(items)) = value else {
        return Err(Error::protocol(format!("expected push array, got {:?}", value)));
    };
    let kind = items
        .first()
        .and_then(RespValue::as_text)
        .ok_or_else(|| Error::protocol("push without kind"))?;
    Ok((kind.to_ascii_lowercase(), items))
}

async fn authenticate(conn: &mut RespConnection, password: &str) -> Result<()> {
    match conn.request(&["AUTH", password]).await {
        Ok(_) => Ok(()),
        Err(Error::Server(msg)) => Err(Error::auth(msg)),
        Err(e) => Err(e),
    }
}

/// Opens [`KvConnection`]s to the current primary
#[derive(Debug, Clone)]
pub struct TcpConnectionFactory {
    connection_timeout: Duration,
    read_timeout: Duration,
    password: Option<String>,
    database: u32,
    client_name: Option<String>,
    tls: Option<TlsClient>,
}

impl TcpConnectionFactory {
    pub fn from_config(config: &PoolConfig, tls: Option<TlsClient>) -> Self {
        Self {
            connection_timeout: config.connection_timeout,
            read_timeout: config.read_timeout,
            password: config.password.clone(),
            database: config.database,
            client_name: config.client_name.clone(),
            tls,
        }
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnectionFactory {
    type Connection = KvConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<KvConnection> {
        let mut conn = RespConnection::connect(
            endpoint,
            self.connection_timeout,
            self.read_timeout,
            self.tls.as_ref(),
        )
        .await?;

        if let Some(password) = &self.password {
            authenticate(&mut conn, password).await?;
        }
        if self.database != 0 {
            let database = self.database.to_string();
            conn.request(&["SELECT", database.as_str()]).await?;
        }
        if let Some(name) = &self.client_name {
            conn.request(&["CLIENT", "SETNAME", name.as_str()]).await?;
        }

        Ok(KvConnection { conn })
    }
}

/// An initialized connection to a primary
pub struct KvConnection {
    conn: RespConnection,
}

impl KvConnection {
    /// Run a raw command. Error replies are returned as [`Error::Server`].
    pub async fn command(&mut self, args: &[&str]) -> Result<RespValue> {
        self.conn.request(args).await
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self.command(&["PING"]).await? {
            RespValue::Simple(s) if s == "PONG" => Ok(()),
            other => Err(Error::protocol(format!("unexpected PING reply {:?}", other))),
        }
    }
}

impl Connection for KvConnection {
    fn endpoint(&self) -> &Endpoint {
        self.conn.endpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> RespValue {
        RespValue::Bulk(Some(s.as_bytes().to_vec()))
    }

    #[test]
    fn test_push_frame_kind() {
        let frame = RespValue::Array(Some(vec![bulk("MESSAGE"), bulk("+switch-master"), bulk("x")]));
        let (kind, items) = push_frame(frame).unwrap();
        assert_eq!(kind, "message");
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_push_frame_rejects_non_array() {
        assert!(push_frame(RespValue::Simple("OK".into())).is_err());
        assert!(push_frame(RespValue::Array(Some(vec![]))).is_err());
    }

    #[tokio::test]
    async fn test_closed_link() {
        let mut link = TcpSentinelLink {
            conn: None,
            read_timeout: Duration::from_millis(10),
        };
        assert!(matches!(link.primary_address("mymaster").await, Err(Error::Closed)));
        assert_eq!(link.next_message().await.unwrap(), None);
        link.close().await;
        link.close().await;
    }
}
