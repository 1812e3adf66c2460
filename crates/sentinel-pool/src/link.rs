//! The sentinel link seam.
//!
//! A [`SentinelLink`] is one connection to one sentinel. Discovery and the
//! failover listeners only talk to sentinels through this trait, so the wire
//! client can be swapped out (see [`crate::tcp`] for the RESP implementation).

use crate::types::Endpoint;
use async_trait::async_trait;
use common::Result;

/// A message received on a subscribed channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: String,
}

/// One connection to one sentinel
#[async_trait]
pub trait SentinelLink: Send {
    /// Authenticate with the sentinel credential
    async fn authenticate(&mut self, password: &str) -> Result<()>;

    /// Query the primary address for `primary_name`.
    ///
    /// Returns the raw reply elements, or `None` when the sentinel does not
    /// know the name.
    async fn primary_address(&mut self, primary_name: &str) -> Result<Option<Vec<String>>>;

    /// Subscribe to `channel`. Messages are then read with [`Self::next_message`].
    async fn subscribe(&mut self, channel: &str) -> Result<()>;

    /// Wait for the next published message.
    ///
    /// Blocks until a message arrives, the link fails (`Err`), or the
    /// subscription ends (`Ok(None)`).
    async fn next_message(&mut self) -> Result<Option<PublishedMessage>>;

    /// Close the link. Idempotent.
    async fn close(&mut self);
}

/// Opens links to sentinels
#[async_trait]
pub trait SentinelConnector: Send + Sync {
    async fn connect(&self, sentinel: &Endpoint) -> Result<Box<dyn SentinelLink>>;
}
