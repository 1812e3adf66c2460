//! Byte transport for sentinel and primary connections.
//!
//! A [`Transport`] is a plain TCP stream or a rustls client stream over one.
//! [`RespConnection`] frames RESP commands and replies on top of it.

use crate::config::TlsSettings;
use crate::error::PoolError;
use crate::resp::{self, RespValue};
use crate::types::Endpoint;
use bytes::{Buf, BytesMut};
use common::{Error, Result};
use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, ServerName};
use std::fs::File;
use std::io::BufReader;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const READ_CHUNK: usize = 4096;

/// Client-side TLS context shared by every connection of a pool
#[derive(Clone)]
pub struct TlsClient {
    connector: tokio_rustls::TlsConnector,
    server_name: Option<String>,
}

impl std::fmt::Debug for TlsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsClient")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl TlsClient {
    /// Build a TLS client from settings.
    ///
    /// Trusts the CAs in `ca_path` when given, the webpki roots otherwise.
    pub fn from_settings(settings: &TlsSettings) -> std::result::Result<Self, PoolError> {
        let mut root_store = RootCertStore::empty();

        if let Some(ca_path) = &settings.ca_path {
            let ca_file = File::open(ca_path)
                .map_err(|e| PoolError::Tls(format!("{}: {}", ca_path, e)))?;
            let mut ca_reader = BufReader::new(ca_file);
            let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut ca_reader)
                .filter_map(|r| r.ok())
                .collect();

            if certs.is_empty() {
                return Err(PoolError::Tls(format!("no certificates found in {}", ca_path)));
            }
            for cert in certs {
                root_store
                    .add(cert)
                    .map_err(|e| PoolError::Tls(format!("failed to add CA: {}", e)))?;
            }
        } else {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let client_config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| PoolError::Tls(format!("failed to build config: {}", e)))?
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Ok(Self {
            connector: tokio_rustls::TlsConnector::from(Arc::new(client_config)),
            server_name: settings.server_name.clone(),
        })
    }

    async fn handshake(
        &self,
        endpoint: &Endpoint,
        stream: TcpStream,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
        let host = self.server_name.as_deref().unwrap_or(&endpoint.host);
        let name = ServerName::try_from(host.to_string())
            .map_err(|e| Error::tls(format!("invalid server name '{}': {}", host, e)))?;

        self.connector
            .connect(name, stream)
            .await
            .map_err(|e| Error::tls(format!("handshake with {} failed: {}", endpoint, e)))
    }
}

/// A connected byte stream, optionally encrypted
pub enum Transport {
    Tcp(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Transport {
    /// Open a stream to `endpoint`, bounded by `connect_timeout` including
    /// the TLS handshake.
    pub async fn connect(
        endpoint: &Endpoint,
        connect_timeout: Duration,
        tls: Option<&TlsClient>,
    ) -> Result<Self> {
        timeout(connect_timeout, Self::open(endpoint, tls))
            .await
            .map_err(|_| Error::Timeout(connect_timeout))?
    }

    async fn open(endpoint: &Endpoint, tls: Option<&TlsClient>) -> Result<Self> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        stream.set_nodelay(true)?;

        match tls {
            Some(tls) => Ok(Transport::Tls(Box::new(tls.handshake(endpoint, stream).await?))),
            None => Ok(Transport::Tcp(stream)),
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// RESP request/reply framing over a [`Transport`]
pub struct RespConnection {
    endpoint: Endpoint,
    stream: Transport,
    buffer: BytesMut,
    read_timeout: Duration,
}

impl RespConnection {
    pub async fn connect(
        endpoint: &Endpoint,
        connect_timeout: Duration,
        read_timeout: Duration,
        tls: Option<&TlsClient>,
    ) -> Result<Self> {
        let stream = Transport::connect(endpoint, connect_timeout, tls).await?;
        debug!(endpoint = %endpoint, tls = tls.is_some(), "Connected");

        Ok(Self {
            endpoint: endpoint.clone(),
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            read_timeout,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send a command and wait for its reply. Error replies become `Err`.
    pub async fn request(&mut self, args: &[&str]) -> Result<RespValue> {
        self.send(args).await?;
        self.read_reply(Some(self.read_timeout)).await?.into_result()
    }

    pub async fn send(&mut self, args: &[&str]) -> Result<()> {
        let mut frame = BytesMut::new();
        resp::encode_command(args, &mut frame);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read the next reply. `None` waits without a deadline.
    pub async fn read_reply(&mut self, deadline: Option<Duration>) -> Result<RespValue> {
        loop {
            if let Some((value, used)) = resp::parse_reply(&self.buffer)? {
                self.buffer.advance(used);
                return Ok(value);
            }

            let read = self.stream.read_buf(&mut self.buffer);
            let n = match deadline {
                Some(limit) => timeout(limit, read)
                    .await
                    .map_err(|_| Error::Timeout(limit))??,
                None => read.await?,
            };

            if n == 0 {
                return Err(Error::Closed);
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(endpoint = %self.endpoint, error = %e, "Error closing connection");
        }
    }
}
