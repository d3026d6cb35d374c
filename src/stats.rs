//! Derived statistics over immutable snapshots
//!
//! Everything here is pure: no I/O, no clocks, no shared state.

use crate::snapshot::{RevenueSample, TickCount};
use std::collections::BTreeMap;

/// Number of recognized top-tier participants
pub const NUMBER_OF_COMPUTORS: usize = 676;

/// Samples needed for a revenue value to be considered agreed on
pub const QUORUM: usize = 451;

/// Revenue reported for a participant with a perfect round
pub const MAX_REVENUE_VALUE: i64 = 1_479_289_940;

/// Score range bounded by the best and the 676th best participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBand {
    pub min: i64,
    pub max: i64,
}

/// Compute the min/max band of a score list sorted descending
///
/// The minimum sits at index `min(675, len - 1)`; an empty list has no band.
pub fn min_max_band(sorted_desc: &[i64]) -> Option<ScoreBand> {
    let max = *sorted_desc.first()?;
    let min_index = (NUMBER_OF_COMPUTORS - 1).min(sorted_desc.len() - 1);
    Some(ScoreBand {
        min: sorted_desc[min_index],
        max,
    })
}

/// Quorum-rank revenue of a single participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevenueQuorum {
    pub id: String,
    pub value: i64,
    pub percent: i64,
    pub samples: usize,
}

/// Pick the quorum-th smallest sample and express it against the maximum revenue
///
/// Falls back to the largest sample when fewer than `quorum` exist.
pub fn quorum_value(samples: &[i64], quorum: usize) -> (i64, i64) {
    if samples.is_empty() || quorum == 0 {
        return (0, 0);
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let index = (quorum - 1).min(sorted.len() - 1);
    let value = sorted[index];
    let percent = (value as i128 * 100 / MAX_REVENUE_VALUE as i128) as i64;
    (value, percent)
}

pub fn revenue_quorums(revenues: &[RevenueSample]) -> Vec<RevenueQuorum> {
    revenues
        .iter()
        .map(|r| {
            let (value, percent) = quorum_value(&r.samples, QUORUM);
            RevenueQuorum {
                id: r.id.clone(),
                value,
                percent,
                samples: r.samples.len(),
            }
        })
        .collect()
}

/// One line of the tick histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickBucket {
    /// Externally reported tick (internal round number minus one)
    pub tick: i64,
    pub count: u64,
}

/// Group per-participant tick values, highest tick first
pub fn tick_histogram<I>(ticks: I) -> Vec<TickBucket>
where
    I: IntoIterator<Item = i64>,
{
    fold_buckets(ticks.into_iter().map(|t| (t, 1)))
}

/// Same as [`tick_histogram`] for pre-counted `{tick, amount}` records
pub fn tick_histogram_from_counts(counts: &[TickCount]) -> Vec<TickBucket> {
    fold_buckets(counts.iter().map(|c| (c.tick, c.amount)))
}

fn fold_buckets<I>(pairs: I) -> Vec<TickBucket>
where
    I: Iterator<Item = (i64, u64)>,
{
    let mut grouped: BTreeMap<i64, u64> = BTreeMap::new();
    for (tick, amount) in pairs {
        *grouped.entry(tick).or_default() += amount;
    }

    grouped
        .into_iter()
        .rev()
        .map(|(tick, count)| TickBucket { tick: tick - 1, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_single_element() {
        assert_eq!(min_max_band(&[17]), Some(ScoreBand { min: 17, max: 17 }));
    }

    #[test]
    fn test_band_short_list_uses_last() {
        let scores = vec![90, 80, 70, 60];
        assert_eq!(min_max_band(&scores), Some(ScoreBand { min: 60, max: 90 }));
    }

    #[test]
    fn test_band_clamps_at_676th() {
        let scores: Vec<i64> = (0..1000).rev().collect();
        let band = min_max_band(&scores).unwrap();
        assert_eq!(band.max, 999);
        assert_eq!(band.min, scores[675]);

        let exact: Vec<i64> = (0..676).rev().collect();
        assert_eq!(min_max_band(&exact).unwrap().min, 0);
    }

    #[test]
    fn test_band_empty() {
        assert_eq!(min_max_band(&[]), None);
    }

    #[test]
    fn test_quorum_index() {
        // Fewer samples than quorum: the largest one
        assert_eq!(quorum_value(&[5, 1, 3], 451).0, 5);
        // Quorum of 2 over 4 samples: second smallest
        assert_eq!(quorum_value(&[40, 10, 30, 20], 2).0, 20);
        assert_eq!(quorum_value(&[], 451), (0, 0));
    }

    #[test]
    fn test_quorum_percent_truncates() {
        let half = MAX_REVENUE_VALUE / 2;
        assert_eq!(quorum_value(&[half], QUORUM), (half, 50));
        assert_eq!(quorum_value(&[half - 1], QUORUM), (half - 1, 49));
        assert_eq!(quorum_value(&[MAX_REVENUE_VALUE], QUORUM).1, 100);
    }

    #[test]
    fn test_revenue_quorums_keep_order() {
        let revenues = vec![
            RevenueSample { id: "B".into(), samples: vec![] },
            RevenueSample { id: "A".into(), samples: vec![MAX_REVENUE_VALUE, 0] },
        ];
        let out = revenue_quorums(&revenues);
        assert_eq!(out[0].id, "B");
        assert_eq!((out[0].value, out[0].percent, out[0].samples), (0, 0, 0));
        assert_eq!((out[1].value, out[1].percent, out[1].samples), (MAX_REVENUE_VALUE, 100, 2));
    }

    #[test]
    fn test_tick_histogram_groups_and_decrements() {
        let buckets = tick_histogram(vec![5, 5, 7, 3, 3, 3]);
        assert_eq!(
            buckets,
            vec![
                TickBucket { tick: 6, count: 1 },
                TickBucket { tick: 4, count: 2 },
                TickBucket { tick: 2, count: 3 },
            ]
        );
    }

    #[test]
    fn test_tick_histogram_from_counts_merges() {
        let counts = vec![
            TickCount { tick: 10, amount: 400 },
            TickCount { tick: 11, amount: 200 },
            TickCount { tick: 10, amount: 76 },
        ];
        assert_eq!(
            tick_histogram_from_counts(&counts),
            vec![TickBucket { tick: 10, count: 200 }, TickBucket { tick: 9, count: 476 }]
        );
    }
}
