//! In-memory snapshots of the live feeds
//!
//! Each feed owns one slot. Writers (subscription handlers) replace the whole
//! `Arc` in one atomic store; readers take a single `load_full()` per task and
//! work on that value for the rest of the render.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Best score of a participant as produced by the document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantScore {
    pub id: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub timestamp: i64,
}

/// Revenue samples of one participant from the latest revenues message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevenueSample {
    pub id: String,
    pub samples: Vec<i64>,
}

/// Pre-counted tick record as served by the tick socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickCount {
    pub tick: i64,
    pub amount: u64,
}

/// Participant id to current tick
pub type TickSnapshot = HashMap<String, i64>;

/// Participant id and score in feed order
pub type ScoreBoard = Vec<(String, i64)>;

/// Latest known state of the three bus feeds
pub struct FeedSnapshots {
    ticks: ArcSwap<TickSnapshot>,
    scores: ArcSwap<ScoreBoard>,
    revenues: ArcSwap<Vec<RevenueSample>>,
}

impl FeedSnapshots {
    pub fn new() -> Self {
        Self {
            ticks: ArcSwap::from_pointee(TickSnapshot::new()),
            scores: ArcSwap::from_pointee(ScoreBoard::new()),
            revenues: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn ticks(&self) -> Arc<TickSnapshot> {
        self.ticks.load_full()
    }

    pub fn scores(&self) -> Arc<ScoreBoard> {
        self.scores.load_full()
    }

    pub fn revenues(&self) -> Arc<Vec<RevenueSample>> {
        self.revenues.load_full()
    }

    pub fn replace_ticks(&self, ticks: TickSnapshot) {
        self.ticks.store(Arc::new(ticks));
    }

    pub fn replace_scores(&self, scores: ScoreBoard) {
        self.scores.store(Arc::new(scores));
    }

    pub fn replace_revenues(&self, revenues: Vec<RevenueSample>) {
        self.revenues.store(Arc::new(revenues));
    }
}

impl Default for FeedSnapshots {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_keeps_its_snapshot() {
        let feeds = FeedSnapshots::new();
        feeds.replace_ticks(HashMap::from([("A".to_string(), 5)]));

        let held = feeds.ticks();
        feeds.replace_ticks(HashMap::from([("A".to_string(), 9), ("B".to_string(), 9)]));

        // The earlier read is unaffected by the later write
        assert_eq!(held.len(), 1);
        assert_eq!(held["A"], 5);
        assert_eq!(feeds.ticks().len(), 2);
    }

    #[test]
    fn test_revenues_replaced_not_accumulated() {
        let feeds = FeedSnapshots::new();
        feeds.replace_revenues(vec![RevenueSample { id: "A".into(), samples: vec![1, 2] }]);
        feeds.replace_revenues(vec![RevenueSample { id: "A".into(), samples: vec![3] }]);
        assert_eq!(feeds.revenues()[0].samples, vec![3]);
    }
}
