//! Integration tests for the render loop
//!
//! Wires real tasks to an in-memory output channel, a fake document store and
//! loopback sockets, and checks:
//! - a dead source only blanks its own item
//! - items are edited in place on later cycles
//! - socket timeouts surface as the right error kind

#[cfg(test)]
mod engine_integration_tests {
    use async_trait::async_trait;
    use mongodb::bson::{doc, Document};
    use qubic_stats::presentation::memory::MemoryChannel;
    use qubic_stats::presentation::{MetricKey, PresentationSync, Rendering};
    use qubic_stats::sources::doc_store::AggregateRequest;
    use qubic_stats::sources::{DocumentStore, ScoreRepository, SocketClient};
    use qubic_stats::tasks::{CycleScores, MinMaxTask, RankingTask, TickInput, TickTask};
    use qubic_stats::{Scheduler, SourceError};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Answers every aggregation with the same admin score records
    struct StaticStore {
        docs: Vec<Document>,
    }

    #[async_trait]
    impl DocumentStore for StaticStore {
        async fn aggregate(&self, _request: AggregateRequest) -> Result<Vec<Document>, SourceError> {
            Ok(self.docs.clone())
        }
    }

    fn cycle_scores() -> Arc<CycleScores> {
        let store = Arc::new(StaticStore {
            docs: vec![
                doc! { "id": "ALPHA", "score": 900_i64, "timestamp": 1_700_000_000_i64 },
                doc! { "id": "BETA", "score": 450_i64, "timestamp": 1_700_000_100_i64 },
            ],
        });
        Arc::new(CycleScores::new(Arc::new(ScoreRepository::new(
            store,
            "latestScore",
            "latestAdminScore",
            Duration::from_secs(1),
        ))))
    }

    /// Accepts connections and never writes a byte
    async fn silent_listener() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_dead_tick_source_does_not_block_other_items() {
        let (addr, server) = silent_listener().await;

        let channel = Arc::new(MemoryChannel::new());
        let sync = Arc::new(PresentationSync::new(channel.clone()));
        let scores = cycle_scores();

        let tick_client = SocketClient::new(addr, Duration::from_secs(1), Duration::from_millis(200));

        let mut scheduler = Scheduler::new(Duration::from_secs(30), Duration::from_secs(5));
        scheduler.register(Arc::new(MinMaxTask::new(scores.clone(), sync.clone())));
        scheduler.register(Arc::new(TickTask::new(TickInput::Socket(tick_client), sync.clone())));
        scheduler.register(Arc::new(RankingTask::new(scores, sync)));

        let report = scheduler.run_cycle().await;

        assert_eq!(report.synced, vec!["send_min_max", "send_ranking"]);
        assert_eq!(report.skipped, vec!["send_tick"]);
        assert!(report.is_clean());

        assert!(channel.content_of(MetricKey::Tick).is_none());
        match channel.content_of(MetricKey::MinMax).unwrap().rendering {
            Rendering::Inline { title, body, .. } => {
                assert_eq!(title, "Scores");
                assert_eq!(body, "[450..900]");
            }
            other => panic!("unexpected rendering {:?}", other),
        }
        match channel.content_of(MetricKey::Ranking).unwrap().rendering {
            Rendering::Attachment { content, .. } => {
                assert!(content.starts_with("[450..900]\n   1. ALPHA - 900 - "));
            }
            other => panic!("unexpected rendering {:?}", other),
        }

        server.abort();
    }

    #[tokio::test]
    async fn test_second_cycle_edits_in_place() {
        let channel = Arc::new(MemoryChannel::new());
        let sync = Arc::new(PresentationSync::new(channel.clone()));

        let mut scheduler = Scheduler::new(Duration::from_secs(30), Duration::from_secs(5));
        scheduler.register(Arc::new(MinMaxTask::new(cycle_scores(), sync)));

        scheduler.run_cycle().await;
        let after_first = channel.calls();
        scheduler.run_cycle().await;
        let after_second = channel.calls();

        assert_eq!(after_first.sends, 1);
        assert_eq!(after_second.sends, 1, "No new item on the second cycle");
        assert_eq!(after_second.edits, after_first.edits + 1);
        assert_eq!(channel.items().len(), 1);
    }

    #[tokio::test]
    async fn test_socket_read_timeout_kind() {
        let (addr, server) = silent_listener().await;
        let client = SocketClient::new(addr, Duration::from_secs(1), Duration::from_millis(100));

        let err = client.fetch_ticks().await.unwrap_err();
        assert!(matches!(err, SourceError::ReadTimeout(_)), "got {:?}", err);

        server.abort();
    }

    #[tokio::test]
    async fn test_socket_refused_is_connect_error() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let client = SocketClient::new(addr, Duration::from_millis(500), Duration::from_millis(500));

        let err = client.fetch_revenue_shares().await.unwrap_err();
        assert!(matches!(err, SourceError::Connect(_)), "got {:?}", err);
    }
}
