//! Per-sentinel failover listener.
//!
//! Each listener is a long-lived task bound to one sentinel. On every
//! (re)connect it actively asks for the current primary, then subscribes to
//! `+switch-master` and forwards matching switches to its [`PrimaryTarget`].
//! Link failures are retried after a fixed wait; only shutdown stops it.

use crate::coordinator::PrimaryTarget;
use crate::link::{SentinelConnector, SentinelLink};
use crate::types::{Endpoint, FailoverNotification, ListenerState, SWITCH_MASTER_CHANNEL};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Monitors one sentinel for primary switches
pub struct FailoverListener {
    sentinel: Endpoint,
    primary_name: String,
    sentinel_password: Option<String>,
    retry_wait: Duration,
    connector: Arc<dyn SentinelConnector>,
    target: Arc<dyn PrimaryTarget>,
    cancel: CancellationToken,
    state: watch::Sender<ListenerState>,
}

impl FailoverListener {
    /// Create a listener
    ///
    /// # Arguments
    /// * `sentinel` - Sentinel this listener is bound to
    /// * `primary_name` - Name of the monitored primary
    /// * `sentinel_password` - Credential sent before every query
    /// * `retry_wait` - Wait between reconnect attempts after a failure
    /// * `connector` - Opens links to the sentinel
    /// * `target` - Receives every observed primary
    pub fn new(
        sentinel: Endpoint,
        primary_name: impl Into<String>,
        sentinel_password: Option<String>,
        retry_wait: Duration,
        connector: Arc<dyn SentinelConnector>,
        target: Arc<dyn PrimaryTarget>,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Stopped);
        Self {
            sentinel,
            primary_name: primary_name.into(),
            sentinel_password,
            retry_wait,
            connector,
            target,
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Start the listener on the current tokio runtime
    pub fn spawn(self) -> ListenerHandle {
        let sentinel = self.sentinel.clone();
        let cancel = self.cancel.clone();
        let state = self.state.subscribe();
        let task = tokio::spawn(self.run());

        ListenerHandle {
            sentinel,
            cancel,
            state,
            task,
        }
    }

    async fn run(self) {
        info!(
            sentinel = %self.sentinel,
            primary = %self.primary_name,
            "Starting sentinel listener"
        );

        while !self.cancel.is_cancelled() {
            self.state.send_replace(ListenerState::Connecting);

            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                connected = self.connector.connect(&self.sentinel) => connected,
            };

            let outcome = match connected {
                Ok(mut link) => {
                    let outcome = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => Ok(()),
                        outcome = self.session(link.as_mut()) => outcome,
                    };
                    link.close().await;
                    outcome
                }
                Err(e) => Err(e),
            };

            if self.cancel.is_cancelled() {
                debug!(sentinel = %self.sentinel, "Unsubscribing from sentinel");
                break;
            }

            if let Err(e) = outcome {
                let retry_ms = self.retry_wait.as_millis() as u64;
                if e.is_connection_loss() {
                    error!(
                        sentinel = %self.sentinel,
                        error = %e,
                        retry_ms,
                        "Lost connection to sentinel, sleeping and retrying"
                    );
                } else {
                    error!(
                        sentinel = %self.sentinel,
                        error = %e,
                        retry_ms,
                        "Sentinel session failed, sleeping and retrying"
                    );
                }
                self.state.send_replace(ListenerState::Backoff);

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = sleep(self.retry_wait) => {}
                }
            }
        }

        self.state.send_replace(ListenerState::Stopped);
        debug!(sentinel = %self.sentinel, "Sentinel listener stopped");
    }

    /// One connected session: refresh, then follow notifications until the
    /// subscription ends or the link fails.
    async fn session(&self, link: &mut dyn SentinelLink) -> common::Result<()> {
        self.state.send_replace(ListenerState::Refreshing);

        if let Some(password) = &self.sentinel_password {
            link.authenticate(password).await?;
        }

        let reply = link.primary_address(&self.primary_name).await?;
        match reply.as_deref().and_then(Endpoint::from_reply) {
            Some(primary) => self.apply(primary),
            None => warn!(
                primary = %self.primary_name,
                sentinel = %self.sentinel,
                "Can not get primary address from sentinel"
            ),
        }

        link.subscribe(SWITCH_MASTER_CHANNEL).await?;
        self.state.send_replace(ListenerState::Subscribed);

        while let Some(message) = link.next_message().await? {
            self.on_message(&message.payload);
        }

        debug!(sentinel = %self.sentinel, "Subscription ended");
        Ok(())
    }

    fn on_message(&self, payload: &str) {
        debug!(sentinel = %self.sentinel, payload, "Sentinel published");

        let Some(notification) = FailoverNotification::parse(payload) else {
            error!(
                sentinel = %self.sentinel,
                channel = SWITCH_MASTER_CHANNEL,
                payload,
                "Invalid message received"
            );
            return;
        };

        if notification.primary_name == self.primary_name {
            self.apply(notification.new_endpoint);
        } else {
            debug!(
                name = %notification.primary_name,
                primary = %self.primary_name,
                "Ignoring switch for another primary"
            );
        }
    }

    fn apply(&self, candidate: Endpoint) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.target.retarget(candidate);
    }
}

/// Handle to a running [`FailoverListener`]
pub struct ListenerHandle {
    sentinel: Endpoint,
    cancel: CancellationToken,
    state: watch::Receiver<ListenerState>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn sentinel(&self) -> &Endpoint {
        &self.sentinel
    }

    /// Last state published by the listener
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Receiver for state changes
    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state.clone()
    }

    /// Signal the listener to stop and unblock it. Does not wait.
    pub fn shutdown(&self) {
        debug!(sentinel = %self.sentinel, "Shutting down sentinel listener");
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the listener task to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(sentinel = %self.sentinel, error = %e, "Sentinel listener task failed");
        }
    }
}
