//! Metric tasks run by the scheduler every cycle
//!
//! Each task reads its source once, computes, renders and hands the item to
//! the presentation sync. Source failures become "no data this cycle".

use crate::presentation::{MetricKey, PresentationSync};
use crate::render;
use crate::scheduler::{MetricTask, TaskError, TaskStatus};
use crate::snapshot::{FeedSnapshots, ParticipantScore};
use crate::sources::{ScoreRepository, SocketClient};
use crate::stats;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Aggregated admin scores, fetched at most once per cycle
///
/// The min-max and ranking tasks read the same list, so the band in the
/// ranking file always matches the inline band.
pub struct CycleScores {
    repo: Arc<ScoreRepository>,
    latest: Mutex<Option<(u64, Arc<Vec<ParticipantScore>>)>>,
}

impl CycleScores {
    pub fn new(repo: Arc<ScoreRepository>) -> Self {
        Self {
            repo,
            latest: Mutex::new(None),
        }
    }

    pub async fn for_cycle(&self, cycle: u64) -> Arc<Vec<ParticipantScore>> {
        // Held across the fetch so the second task waits for the first one's result
        let mut latest = self.latest.lock().await;
        if let Some((fetched_in, scores)) = latest.as_ref() {
            if *fetched_in == cycle {
                return scores.clone();
            }
        }

        let scores = Arc::new(self.repo.admin_scores().await);
        *latest = Some((cycle, scores.clone()));
        scores
    }
}

/// Where the tick task gets its numbers
pub enum TickInput {
    Bus(Arc<FeedSnapshots>),
    Socket(SocketClient),
}

pub struct TickTask {
    input: TickInput,
    sync: Arc<PresentationSync>,
}

impl TickTask {
    pub fn new(input: TickInput, sync: Arc<PresentationSync>) -> Self {
        Self { input, sync }
    }
}

#[async_trait]
impl MetricTask for TickTask {
    fn name(&self) -> &'static str {
        "send_tick"
    }

    async fn run(&self, _cycle: u64) -> Result<TaskStatus, TaskError> {
        let buckets = match &self.input {
            TickInput::Bus(feeds) => {
                let ticks = feeds.ticks();
                stats::tick_histogram(ticks.values().copied())
            }
            TickInput::Socket(client) => match client.fetch_ticks().await {
                Ok(counts) => stats::tick_histogram_from_counts(&counts),
                Err(e) => {
                    log::warn!("⚠️  Tick fetch from {} failed ({}): {}", client.addr(), e.kind(), e);
                    Vec::new()
                }
            },
        };

        if buckets.is_empty() {
            return Ok(TaskStatus::NoData);
        }

        let item = render::inline(MetricKey::Tick, render::tick_lines(&buckets), Utc::now());
        Ok(TaskStatus::Synced(self.sync.publish(&item).await?))
    }
}

/// Score band of the aggregated document-store scores
pub struct MinMaxTask {
    scores: Arc<CycleScores>,
    sync: Arc<PresentationSync>,
}

impl MinMaxTask {
    pub fn new(scores: Arc<CycleScores>, sync: Arc<PresentationSync>) -> Self {
        Self { scores, sync }
    }
}

#[async_trait]
impl MetricTask for MinMaxTask {
    fn name(&self) -> &'static str {
        "send_min_max"
    }

    async fn run(&self, cycle: u64) -> Result<TaskStatus, TaskError> {
        let scores = self.scores.for_cycle(cycle).await;
        let values: Vec<i64> = scores.iter().map(|s| s.score).collect();

        let Some(band) = stats::min_max_band(&values) else {
            return Ok(TaskStatus::NoData);
        };

        let item = render::inline(MetricKey::MinMax, render::band_line(&band), Utc::now());
        Ok(TaskStatus::Synced(self.sync.publish(&item).await?))
    }
}

/// Full ranking of the aggregated scores as a file
pub struct RankingTask {
    scores: Arc<CycleScores>,
    sync: Arc<PresentationSync>,
}

impl RankingTask {
    pub fn new(scores: Arc<CycleScores>, sync: Arc<PresentationSync>) -> Self {
        Self { scores, sync }
    }
}

#[async_trait]
impl MetricTask for RankingTask {
    fn name(&self) -> &'static str {
        "send_ranking"
    }

    async fn run(&self, cycle: u64) -> Result<TaskStatus, TaskError> {
        let scores = self.scores.for_cycle(cycle).await;
        if scores.is_empty() {
            return Ok(TaskStatus::NoData);
        }

        let item = render::attachment(MetricKey::Ranking, render::ranking_lines(&scores), Utc::now());
        Ok(TaskStatus::Synced(self.sync.publish(&item).await?))
    }
}

/// Score feed listing as a file
pub struct ScoresTask {
    feeds: Arc<FeedSnapshots>,
    sync: Arc<PresentationSync>,
}

impl ScoresTask {
    pub fn new(feeds: Arc<FeedSnapshots>, sync: Arc<PresentationSync>) -> Self {
        Self { feeds, sync }
    }
}

#[async_trait]
impl MetricTask for ScoresTask {
    fn name(&self) -> &'static str {
        "send_scores"
    }

    async fn run(&self, _cycle: u64) -> Result<TaskStatus, TaskError> {
        let board = self.feeds.scores();
        if board.is_empty() {
            return Ok(TaskStatus::NoData);
        }

        let item = render::attachment(MetricKey::Scores, render::score_lines(&board), Utc::now());
        Ok(TaskStatus::Synced(self.sync.publish(&item).await?))
    }
}

/// Quorum revenue per participant as a file
pub struct RevenuesTask {
    feeds: Arc<FeedSnapshots>,
    sync: Arc<PresentationSync>,
}

impl RevenuesTask {
    pub fn new(feeds: Arc<FeedSnapshots>, sync: Arc<PresentationSync>) -> Self {
        Self { feeds, sync }
    }
}

#[async_trait]
impl MetricTask for RevenuesTask {
    fn name(&self) -> &'static str {
        "send_revenues"
    }

    async fn run(&self, _cycle: u64) -> Result<TaskStatus, TaskError> {
        let revenues = self.feeds.revenues();
        if revenues.is_empty() {
            return Ok(TaskStatus::NoData);
        }

        let quorums = stats::revenue_quorums(&revenues);
        let item = render::attachment(MetricKey::Revenues, render::revenue_lines(&quorums), Utc::now());
        Ok(TaskStatus::Synced(self.sync.publish(&item).await?))
    }
}
