//! Stats Runtime - background aggregation and sync engine
//!
//! - Connects the document store, message bus and output channel
//! - Spawns the three bus feeds (ticks, scores, revenues)
//! - Runs the render loop until CTRL+C
//!
//! Usage:
//!   cargo run --release --bin stats_runtime
//!
//! Environment variables (see `StatsConfig`):
//!   STATS_CHANNEL_ID - Output channel (required)
//!   ACCESS_TOKEN - Bot token (required)
//!   MONGO_URI - Document store (or MONGO_USERNAME / MONGO_PSWD / MONGO_URL)
//!   NATS_URL - Message bus (default: nats://127.0.0.1:4222)
//!   POLL_INTERVAL_SECS - Sleep between cycles (default: 30)

use dotenv::dotenv;
use log::{error, info};
use qubic_stats::config::{StatsConfig, TickSource};
use qubic_stats::presentation::discord::DiscordChannel;
use qubic_stats::presentation::PresentationSync;
use qubic_stats::scheduler::Scheduler;
use qubic_stats::snapshot::FeedSnapshots;
use qubic_stats::sources::bus::{run_feed, FeedHandler, MessageBus};
use qubic_stats::sources::{MongoDocumentStore, NatsBus, RevenueFeed, ScoreFeed, ScoreRepository, SocketClient, TickFeed};
use qubic_stats::tasks::{CycleScores, MinMaxTask, RankingTask, RevenuesTask, ScoresTask, TickInput, TickTask};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Stats Runtime");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    // Missing output channel or credentials abort here
    let config = StatsConfig::from_env()?;
    let token = config
        .access_token
        .clone()
        .ok_or("ACCESS_TOKEN must be set")?;

    info!("✅ Configuration loaded");
    info!("   ├─ Channel: {}", config.stats_channel_id);
    info!("   ├─ Database: {}", config.mongo_db);
    info!("   ├─ Bus: {}", config.nats_url);
    info!("   ├─ Tick source: {:?}", config.tick_source);
    info!("   └─ Interval: {:?} (deadline {:?})", config.poll_interval, config.cycle_deadline);

    let channel = Arc::new(DiscordChannel::connect(&token, config.stats_channel_id).await?);
    let sync = Arc::new(PresentationSync::new(channel));

    let store = Arc::new(
        MongoDocumentStore::connect(&config.mongo_uri, &config.mongo_db, config.connect_timeout).await?,
    );
    let scores = Arc::new(CycleScores::new(Arc::new(ScoreRepository::new(
        store,
        config.scores_collection.clone(),
        config.admin_scores_collection.clone(),
        config.read_timeout,
    ))));

    let feeds = Arc::new(FeedSnapshots::new());

    // Bus: the client connects in the background, feeds wait until it is up
    let bus: Arc<dyn MessageBus> = Arc::new(NatsBus::connect(&config.nats_url).await?);

    info!("🚀 Spawning bus feeds...");
    let handlers: Vec<Arc<dyn FeedHandler>> = vec![
        Arc::new(TickFeed::new(config.subject_ticks.clone(), feeds.clone())),
        Arc::new(ScoreFeed::new(config.subject_scores.clone(), feeds.clone())),
        Arc::new(RevenueFeed::new(config.subject_revenues.clone(), feeds.clone())),
    ];
    for handler in handlers {
        tokio::spawn(run_feed(bus.clone(), handler));
    }

    let tick_input = match config.tick_source {
        TickSource::Bus => TickInput::Bus(feeds.clone()),
        TickSource::Socket => TickInput::Socket(SocketClient::new(
            config.tick_addr(),
            config.connect_timeout,
            config.read_timeout,
        )),
    };

    info!("🚀 Building scheduler...");
    let mut scheduler = Scheduler::new(config.poll_interval, config.cycle_deadline);
    scheduler.register(Arc::new(MinMaxTask::new(scores.clone(), sync.clone())));
    scheduler.register(Arc::new(TickTask::new(tick_input, sync.clone())));
    scheduler.register(Arc::new(RevenuesTask::new(feeds.clone(), sync.clone())));
    scheduler.register(Arc::new(ScoresTask::new(feeds.clone(), sync.clone())));
    scheduler.register(Arc::new(RankingTask::new(scores, sync.clone())));
    if config.cleanup_on_start {
        scheduler = scheduler.with_cleanup(sync);
    }

    let engine = tokio::spawn(scheduler.run());

    info!("🔄 Press CTRL+C to shutdown");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }

    engine.abort();
    info!("✅ Stats runtime stopped");
    Ok(())
}
