//! In-memory sentinels, primary connections and targets shared by the
//! integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sentinel_pool::{
    Connection, ConnectionFactory, Endpoint, PrimaryTarget, PublishedMessage, SentinelConnector,
    SentinelLink,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const PRIMARY_NAME: &str = "mymaster";

pub fn sentinel_endpoint(n: usize) -> Endpoint {
    Endpoint::new(format!("sentinel-{}", n), 26379)
}

pub fn reply(host: &str, port: u16) -> Option<Vec<String>> {
    Some(vec![host.to_string(), port.to_string()])
}

pub fn switch_payload(name: &str, old: &Endpoint, new: &Endpoint) -> String {
    format!("{} {} {} {} {}", name, old.host, old.port, new.host, new.port)
}

/// Install a debug subscriber once per test binary
pub fn init_logging() {
    let _ = common::logging::try_init("debug");
}

/// Poll `cond` until it holds or two seconds have passed
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Scripted behaviour of one sentinel
#[derive(Default)]
pub struct FakeSentinel {
    reachable: AtomicBool,
    fail_query: AtomicBool,
    reply: Mutex<Option<Vec<String>>>,
    passwords: Mutex<Vec<String>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Option<String>>>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    queries: AtomicUsize,
}

impl FakeSentinel {
    pub fn answering(reply: Option<Vec<String>>) -> Arc<Self> {
        let sentinel = Self::default();
        sentinel.reachable.store(true, Ordering::SeqCst);
        *sentinel.reply.lock().unwrap() = reply;
        Arc::new(sentinel)
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_fail_query(&self, fail: bool) {
        self.fail_query.store(fail, Ordering::SeqCst);
    }

    pub fn set_reply(&self, reply: Option<Vec<String>>) {
        *self.reply.lock().unwrap() = reply;
    }

    /// Publish a `+switch-master` payload to every live subscription
    pub fn publish(&self, payload: &str) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(Some(payload.to_string())).is_ok());
    }

    /// End every subscription cleanly
    pub fn end_subscriptions(&self) {
        for tx in self.subscribers.lock().unwrap().drain(..) {
            let _ = tx.send(None);
        }
    }

    /// Fail every subscribed link
    pub fn break_links(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn passwords(&self) -> Vec<String> {
        self.passwords.lock().unwrap().clone()
    }
}

/// Routes connects to [`FakeSentinel`]s by endpoint
#[derive(Default)]
pub struct FakeConnector {
    sentinels: HashMap<Endpoint, Arc<FakeSentinel>>,
    order: Mutex<Vec<Endpoint>>,
}

impl FakeConnector {
    pub fn new(sentinels: Vec<(Endpoint, Arc<FakeSentinel>)>) -> Arc<Self> {
        Arc::new(Self {
            sentinels: sentinels.into_iter().collect(),
            order: Mutex::new(Vec::new()),
        })
    }

    /// Endpoints in the order connects were attempted
    pub fn connect_order(&self) -> Vec<Endpoint> {
        self.order.lock().unwrap().clone()
    }
}

#[async_trait]
impl SentinelConnector for FakeConnector {
    async fn connect(&self, sentinel: &Endpoint) -> common::Result<Box<dyn SentinelLink>> {
        self.order.lock().unwrap().push(sentinel.clone());

        let fake = self
            .sentinels
            .get(sentinel)
            .ok_or_else(|| common::Error::other(format!("unknown sentinel {}", sentinel)))?;
        fake.connects.fetch_add(1, Ordering::SeqCst);

        if !fake.reachable.load(Ordering::SeqCst) {
            return Err(common::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        Ok(Box::new(FakeLink {
            sentinel: fake.clone(),
            messages: None,
            closed: false,
        }))
    }
}

pub struct FakeLink {
    sentinel: Arc<FakeSentinel>,
    messages: Option<mpsc::UnboundedReceiver<Option<String>>>,
    closed: bool,
}

#[async_trait]
impl SentinelLink for FakeLink {
    async fn authenticate(&mut self, password: &str) -> common::Result<()> {
        self.sentinel
            .passwords
            .lock()
            .unwrap()
            .push(password.to_string());
        Ok(())
    }

    async fn primary_address(&mut self, _primary_name: &str) -> common::Result<Option<Vec<String>>> {
        self.sentinel.queries.fetch_add(1, Ordering::SeqCst);
        if self.sentinel.fail_query.load(Ordering::SeqCst) {
            return Err(common::Error::Closed);
        }
        Ok(self.sentinel.reply.lock().unwrap().clone())
    }

    async fn subscribe(&mut self, _channel: &str) -> common::Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sentinel.subscribers.lock().unwrap().push(tx);
        self.messages = Some(rx);
        Ok(())
    }

    async fn next_message(&mut self) -> common::Result<Option<PublishedMessage>> {
        let Some(messages) = self.messages.as_mut() else {
            return Err(common::Error::protocol("not subscribed"));
        };
        match messages.recv().await {
            Some(Some(payload)) => Ok(Some(PublishedMessage {
                channel: "+switch-master".to_string(),
                payload,
            })),
            Some(None) => Ok(None),
            None => Err(common::Error::Closed),
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.messages = None;
            self.sentinel.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Records every retarget request
#[derive(Default)]
pub struct RecordingTarget {
    seen: Mutex<Vec<Endpoint>>,
}

impl RecordingTarget {
    pub fn seen(&self) -> Vec<Endpoint> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Endpoint> {
        self.seen.lock().unwrap().last().cloned()
    }
}

impl PrimaryTarget for RecordingTarget {
    fn retarget(&self, candidate: Endpoint) {
        self.seen.lock().unwrap().push(candidate);
    }
}

pub struct FakeConn {
    pub endpoint: Endpoint,
    pub id: usize,
}

impl Connection for FakeConn {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// Hands out [`FakeConn`]s, failing for hosts marked down
#[derive(Clone, Default)]
pub struct FakeFactory {
    opened: Arc<Mutex<Vec<Endpoint>>>,
    down: Arc<Mutex<HashSet<Endpoint>>>,
}

impl FakeFactory {
    pub fn opened(&self) -> Vec<Endpoint> {
        self.opened.lock().unwrap().clone()
    }

    pub fn set_down(&self, endpoint: Endpoint) {
        self.down.lock().unwrap().insert(endpoint);
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    type Connection = FakeConn;

    async fn connect(&self, endpoint: &Endpoint) -> common::Result<FakeConn> {
        if self.down.lock().unwrap().contains(endpoint) {
            return Err(common::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "primary down",
            )));
        }
        let mut opened = self.opened.lock().unwrap();
        opened.push(endpoint.clone());
        Ok(FakeConn {
            endpoint: endpoint.clone(),
            id: opened.len(),
        })
    }
}
