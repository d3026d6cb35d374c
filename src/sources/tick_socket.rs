//! Raw socket client for the services host
//!
//! One fresh connection per call: connect, send nothing, read until the peer
//! closes, decode JSON. The stream is owned by the call and released on every
//! exit path, including a timed-out connect.

use crate::errors::SourceError;
use crate::snapshot::TickCount;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Revenue share as served on the revenues port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueShare {
    pub id: String,
    pub revenue: f64,
}

/// Byte stream returned by a [`Connector`]
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

/// Opens the connection for one request
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addr: &str) -> std::io::Result<Box<dyn ByteStream>>;
}

/// Plain TCP
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &str) -> std::io::Result<Box<dyn ByteStream>> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Box::new(stream))
    }
}

#[derive(Clone)]
pub struct SocketClient {
    addr: String,
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl SocketClient {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self::with_connector(addr, Arc::new(TcpConnector), connect_timeout, read_timeout)
    }

    pub fn with_connector(
        addr: impl Into<String>,
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            addr: addr.into(),
            connector,
            connect_timeout,
            read_timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Read the whole response stream
    pub async fn fetch_raw(&self) -> Result<Vec<u8>, SourceError> {
        let mut stream = match timeout(self.connect_timeout, self.connector.connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(SourceError::Connect(format!("{}: {}", self.addr, e))),
            Err(_) => {
                return Err(SourceError::Connect(format!(
                    "{}: no connection within {:?}",
                    self.addr, self.connect_timeout
                )))
            }
        };

        let mut payload = Vec::new();
        let read = timeout(self.read_timeout, stream.read_to_end(&mut payload)).await;

        // Best effort; the stream is dropped right after either way
        let _ = stream.shutdown().await;
        drop(stream);

        match read {
            Ok(Ok(_)) => Ok(payload),
            Ok(Err(e)) => Err(SourceError::Read(format!("{}: {}", self.addr, e))),
            Err(_) => Err(SourceError::ReadTimeout(format!(
                "{}: stream still open after {:?}",
                self.addr, self.read_timeout
            ))),
        }
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self) -> Result<T, SourceError> {
        let payload = self.fetch_raw().await?;
        if payload.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(SourceError::Empty(format!("{} closed without data", self.addr)));
        }
        Ok(serde_json::from_slice(&payload)?)
    }

    /// `[{"tick": .., "amount": ..}, ...]` from the tick port
    pub async fn fetch_ticks(&self) -> Result<Vec<TickCount>, SourceError> {
        self.fetch_json().await
    }

    /// `[{"id": .., "revenue": ..}, ...]` from the revenues port
    pub async fn fetch_revenue_shares(&self) -> Result<Vec<RevenueShare>, SourceError> {
        self.fetch_json().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;
    use tokio::net::TcpListener;

    async fn serve_once(body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        addr
    }

    fn client(addr: &str) -> SocketClient {
        SocketClient::new(addr, Duration::from_secs(2), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_fetch_ticks_reads_until_eof() {
        let addr = serve_once(br#"[{"tick": 12, "amount": 600}, {"tick": 11, "amount": 76}]"#).await;
        let ticks = client(&addr).fetch_ticks().await.unwrap();
        assert_eq!(
            ticks,
            vec![TickCount { tick: 12, amount: 600 }, TickCount { tick: 11, amount: 76 }]
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_is_decode_failure() {
        let addr = serve_once(b"{\"tick\": ").await;
        let err = client(&addr).fetch_ticks().await.unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let addr = serve_once(b"").await;
        let err = client(&addr).fetch_ticks().await.unwrap_err();
        assert!(matches!(err, SourceError::Empty(_)));
    }

    #[tokio::test]
    async fn test_revenue_shares() {
        let addr = serve_once(br#"[{"id": "AB", "revenue": 97.5}]"#).await;
        let shares = client(&addr).fetch_revenue_shares().await.unwrap();
        assert_eq!(shares[0].id, "AB");
        assert_eq!(shares[0].revenue, 97.5);
    }

    /// Counts how many times a held resource is released
    struct Released(Arc<AtomicUsize>);

    impl Drop for Released {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Connect that never completes, like a peer that never accepts
    struct StalledConnector {
        released: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for StalledConnector {
        async fn connect(&self, _addr: &str) -> std::io::Result<Box<dyn ByteStream>> {
            let _guard = Released(self.released.clone());
            std::future::pending().await
        }
    }

    /// Stream whose reads fail after a successful connect
    struct BrokenStream {
        released: Arc<AtomicUsize>,
    }

    impl Drop for BrokenStream {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl AsyncRead for BrokenStream {
        fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")))
        }
    }

    impl AsyncWrite for BrokenStream {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct BrokenConnector {
        released: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for BrokenConnector {
        async fn connect(&self, _addr: &str) -> std::io::Result<Box<dyn ByteStream>> {
            Ok(Box::new(BrokenStream { released: self.released.clone() }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_is_connect_failure() {
        let released = Arc::new(AtomicUsize::new(0));
        let client = SocketClient::with_connector(
            "services:21846",
            Arc::new(StalledConnector { released: released.clone() }),
            Duration::from_secs(5),
            Duration::from_secs(5),
        );

        let started = tokio::time::Instant::now();
        let err = client.fetch_ticks().await.unwrap_err();

        assert!(matches!(err, SourceError::Connect(_)), "got {:?}", err);
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_error_after_connect() {
        let released = Arc::new(AtomicUsize::new(0));
        let client = SocketClient::with_connector(
            "services:21846",
            Arc::new(BrokenConnector { released: released.clone() }),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        let err = client.fetch_ticks().await.unwrap_err();
        assert!(matches!(err, SourceError::Read(_)), "got {:?}", err);
        assert_eq!(err.kind(), "read");
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = client(&addr).fetch_raw().await.unwrap_err();
        assert!(matches!(err, SourceError::Connect(_)));
    }
}
