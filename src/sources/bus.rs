//! Publish/subscribe feeds (ticks, scores, revenues)
//!
//! Each feed has a handler that decodes one payload and swaps the matching
//! snapshot. A bad message is logged and skipped; the subscription stays up.

use crate::errors::SourceError;
use crate::snapshot::{FeedSnapshots, RevenueSample, ScoreBoard, TickSnapshot};
use crate::sources::backoff::ExponentialBackoff;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Minimal view of a message bus
#[async_trait]
pub trait MessageBus: Send + Sync {
    fn is_disconnected(&self) -> bool;

    async fn subscribe(&self, subject: &str) -> Result<BoxStream<'static, Vec<u8>>, SourceError>;
}

/// NATS-backed [`MessageBus`]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Create the client without waiting for the server
    ///
    /// The client keeps connecting in the background; until it succeeds the
    /// bus reports itself disconnected and feeds retry later. Only an invalid
    /// address is an error here.
    pub async fn connect(url: &str) -> Result<Self, SourceError> {
        let client = async_nats::ConnectOptions::new()
            .retry_on_initial_connect()
            .connect(url)
            .await
            .map_err(|e| SourceError::Connect(format!("{}: {}", url, e)))?;
        log::info!("🔗 Message bus client started for {}", url);
        Ok(Self { client })
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    /// Anything but an established connection, including the initial attempt
    fn is_disconnected(&self) -> bool {
        !matches!(
            self.client.connection_state(),
            async_nats::connection::State::Connected
        )
    }

    async fn subscribe(&self, subject: &str) -> Result<BoxStream<'static, Vec<u8>>, SourceError> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| SourceError::Connect(format!("subscribe {}: {}", subject, e)))?;

        Ok(subscriber.map(|msg| msg.payload.to_vec()).boxed())
    }
}

/// Decoder for one subject
pub trait FeedHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn subject(&self) -> &str;

    /// Decode one payload and publish it as the new snapshot
    fn handle(&self, payload: &[u8]) -> Result<(), SourceError>;
}

pub struct TickFeed {
    subject: String,
    feeds: Arc<FeedSnapshots>,
}

impl TickFeed {
    pub fn new(subject: impl Into<String>, feeds: Arc<FeedSnapshots>) -> Self {
        Self { subject: subject.into(), feeds }
    }
}

impl FeedHandler for TickFeed {
    fn name(&self) -> &'static str {
        "ticks"
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    fn handle(&self, payload: &[u8]) -> Result<(), SourceError> {
        let ticks: TickSnapshot = serde_json::from_slice(payload)?;
        self.feeds.replace_ticks(ticks);
        Ok(())
    }
}

pub struct ScoreFeed {
    subject: String,
    feeds: Arc<FeedSnapshots>,
}

impl ScoreFeed {
    pub fn new(subject: impl Into<String>, feeds: Arc<FeedSnapshots>) -> Self {
        Self { subject: subject.into(), feeds }
    }
}

impl FeedHandler for ScoreFeed {
    fn name(&self) -> &'static str {
        "scores"
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    fn handle(&self, payload: &[u8]) -> Result<(), SourceError> {
        let raw: Map<String, Value> = serde_json::from_slice(payload)?;
        let mut board = ScoreBoard::with_capacity(raw.len());
        for (id, value) in raw {
            let score = value
                .as_i64()
                .ok_or_else(|| SourceError::Decode(format!("score of {} is not an integer", id)))?;
            board.push((id, score));
        }
        self.feeds.replace_scores(board);
        Ok(())
    }
}

/// Revenues arrive zstd-compressed
pub struct RevenueFeed {
    subject: String,
    feeds: Arc<FeedSnapshots>,
}

impl RevenueFeed {
    pub fn new(subject: impl Into<String>, feeds: Arc<FeedSnapshots>) -> Self {
        Self { subject: subject.into(), feeds }
    }
}

impl FeedHandler for RevenueFeed {
    fn name(&self) -> &'static str {
        "revenues"
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    fn handle(&self, payload: &[u8]) -> Result<(), SourceError> {
        let json = zstd::decode_all(payload)
            .map_err(|e| SourceError::Decode(format!("zstd: {}", e)))?;
        let raw: Map<String, Value> = serde_json::from_slice(&json)?;

        let mut revenues = Vec::with_capacity(raw.len());
        for (id, value) in raw {
            let samples: Vec<i64> = serde_json::from_value(value)?;
            revenues.push(RevenueSample { id, samples });
        }
        self.feeds.replace_revenues(revenues);
        Ok(())
    }
}

/// Subscribe unless the bus reports itself disconnected
///
/// `None` means "no subscription this time"; the caller retries later.
pub async fn get_subscription(
    bus: &dyn MessageBus,
    handler: &dyn FeedHandler,
) -> Option<BoxStream<'static, Vec<u8>>> {
    if bus.is_disconnected() {
        log::warn!("⚠️  Bus disconnected, not subscribing to {}", handler.subject());
        return None;
    }

    match bus.subscribe(handler.subject()).await {
        Ok(stream) => Some(stream),
        Err(e) => {
            log::warn!("⚠️  Subscription to {} refused: {}", handler.subject(), e);
            None
        }
    }
}

/// Drain a subscription until it ends; returns the number of applied messages
pub async fn consume(mut stream: BoxStream<'static, Vec<u8>>, handler: &dyn FeedHandler) -> u64 {
    let mut applied = 0u64;

    while let Some(payload) = stream.next().await {
        if payload.is_empty() {
            continue;
        }

        match handler.handle(&payload) {
            Ok(()) => {
                applied += 1;
                log::info!("📥 Got the {}", handler.name());
            }
            Err(e) => {
                log::error!("❌ Dropped {} message: {}", handler.name(), e);
            }
        }
    }

    applied
}

/// Keep one feed subscribed for the lifetime of the process
pub async fn run_feed(bus: Arc<dyn MessageBus>, handler: Arc<dyn FeedHandler>) {
    let mut backoff = ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(60));

    log::info!("📡 Starting {} feed on '{}'", handler.name(), handler.subject());

    loop {
        if let Some(stream) = get_subscription(bus.as_ref(), handler.as_ref()).await {
            backoff.reset();
            let applied = consume(stream, handler.as_ref()).await;
            log::warn!(
                "⚠️  {} subscription ended after {} messages",
                handler.name(),
                applied
            );
        }

        backoff.sleep().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeBus {
        disconnected: AtomicBool,
        subscribe_calls: AtomicUsize,
        messages: Vec<Vec<u8>>,
    }

    #[async_trait]
    impl MessageBus for FakeBus {
        fn is_disconnected(&self) -> bool {
            self.disconnected.load(Ordering::SeqCst)
        }

        async fn subscribe(&self, _subject: &str) -> Result<BoxStream<'static, Vec<u8>>, SourceError> {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(stream::iter(self.messages.clone()).boxed())
        }
    }

    fn bus(disconnected: bool, messages: Vec<Vec<u8>>) -> FakeBus {
        FakeBus {
            disconnected: AtomicBool::new(disconnected),
            subscribe_calls: AtomicUsize::new(0),
            messages,
        }
    }

    #[tokio::test]
    async fn test_disconnected_bus_is_not_subscribed() {
        let feeds = Arc::new(FeedSnapshots::new());
        let handler = TickFeed::new("data.ticks", feeds);
        let bus = bus(true, vec![]);

        assert!(get_subscription(&bus, &handler).await.is_none());
        assert_eq!(bus.subscribe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_message_does_not_stop_feed() {
        let feeds = Arc::new(FeedSnapshots::new());
        let handler = TickFeed::new("data.ticks", feeds.clone());
        let bus = bus(
            false,
            vec![
                br#"{"A": 3}"#.to_vec(),
                b"garbage".to_vec(),
                Vec::new(),
                br#"{"A": 4, "B": 4}"#.to_vec(),
            ],
        );

        let stream = get_subscription(&bus, &handler).await.unwrap();
        let applied = consume(stream, &handler).await;

        assert_eq!(applied, 2);
        let ticks = feeds.ticks();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks["B"], 4);
    }

    #[tokio::test]
    async fn test_unreachable_bus_starts_disconnected() {
        // Nothing listens on port 1; the client is still created
        let bus = NatsBus::connect("nats://127.0.0.1:1").await.unwrap();
        assert!(bus.is_disconnected());

        let feeds = Arc::new(FeedSnapshots::new());
        let handler = TickFeed::new("data.ticks", feeds);
        assert!(get_subscription(&bus, &handler).await.is_none());
    }

    #[test]
    fn test_score_feed_keeps_payload_order() {
        let feeds = Arc::new(FeedSnapshots::new());
        let handler = ScoreFeed::new("data.scores", feeds.clone());
        handler.handle(br#"{"ZED": 10, "ALPHA": 30, "MID": 20}"#).unwrap();

        let ids: Vec<String> = feeds.scores().iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec!["ZED", "ALPHA", "MID"]);

        assert!(handler.handle(br#"{"X": "high"}"#).is_err());
        // Failed decode leaves the previous snapshot in place
        assert_eq!(feeds.scores().len(), 3);
    }

    #[test]
    fn test_revenue_feed_decompresses() {
        let feeds = Arc::new(FeedSnapshots::new());
        let handler = RevenueFeed::new("data.revenues", feeds.clone());
        let packed = zstd::encode_all(&br#"{"A": [3, 1, 2], "B": []}"#[..], 3).unwrap();

        handler.handle(&packed).unwrap();
        let revenues = feeds.revenues();
        assert_eq!(revenues[0], RevenueSample { id: "A".into(), samples: vec![3, 1, 2] });
        assert!(revenues[1].samples.is_empty());

        // Uncompressed JSON on the revenue subject is rejected
        assert!(matches!(handler.handle(br#"{"A": [1]}"#), Err(SourceError::Decode(_))));
    }
}
