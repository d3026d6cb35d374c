//! Text contract of the published items

use crate::presentation::{MetricKey, OutputItem, Rendering};
use crate::snapshot::{ParticipantScore, ScoreBoard};
use crate::stats::{min_max_band, RevenueQuorum, ScoreBand, TickBucket, MAX_REVENUE_VALUE, NUMBER_OF_COMPUTORS};
use chrono::{DateTime, Utc};

/// `2026-10-17 12:00:00`, the staleness footer
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Attachment name carrying the key tag, e.g. `scores_1760702400.txt`
pub fn attachment_name(key: MetricKey, now: DateTime<Utc>) -> String {
    format!("{}_{}.txt", key.as_str(), now.timestamp())
}

fn unix_to_string(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(timestamp)
        .unwrap_or_else(|| ts.to_string())
}

pub fn tick_lines(buckets: &[TickBucket]) -> String {
    buckets
        .iter()
        .map(|b| format!("{} {:>2}", b.tick, b.count))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn band_line(band: &ScoreBand) -> String {
    format!("[{}..{}]", band.min, band.max)
}

pub fn score_lines(board: &ScoreBoard) -> String {
    board
        .iter()
        .map(|(id, score)| format!("{} {}", id, score))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn revenue_lines(quorums: &[RevenueQuorum]) -> String {
    let width = MAX_REVENUE_VALUE.to_string().len();
    quorums
        .iter()
        .map(|q| {
            format!(
                "{} {:>width$} {:>3}% (NoV: {:>3})",
                q.id,
                q.value,
                q.percent,
                q.samples,
                width = width
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Band header followed by one numbered line per participant
///
/// Scores outside the top tier, or not positive, are shown as `None`.
pub fn ranking_lines(scores: &[ParticipantScore]) -> String {
    let values: Vec<i64> = scores.iter().map(|s| s.score).collect();
    let Some(band) = min_max_band(&values) else {
        return String::new();
    };

    let mut lines = Vec::with_capacity(scores.len() + 1);
    lines.push(band_line(&band));

    for (index, entry) in scores.iter().enumerate() {
        let when = unix_to_string(entry.timestamp);
        if entry.score > 0 && index < NUMBER_OF_COMPUTORS {
            lines.push(format!("{:>4}. {} - {} - {}", index + 1, entry.id, entry.score, when));
        } else {
            lines.push(format!("{:>4}. {} - None - {}", index + 1, entry.id, when));
        }
    }

    lines.join("\n")
}

/// `ID - score - time` line for score lookups
pub fn score_line(entry: &ParticipantScore) -> String {
    format!("{} - {:<4} - {}", entry.id, entry.score, unix_to_string(entry.timestamp))
}

pub fn inline(key: MetricKey, body: String, now: DateTime<Utc>) -> OutputItem {
    OutputItem {
        key,
        rendering: Rendering::Inline {
            title: key.title().to_string(),
            body,
            footer: timestamp(now),
        },
    }
}

pub fn attachment(key: MetricKey, content: String, now: DateTime<Utc>) -> OutputItem {
    OutputItem {
        key,
        rendering: Rendering::Attachment {
            file_name: attachment_name(key, now),
            content,
            caption: timestamp(now),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_tick_lines_pad_counts() {
        let buckets = vec![TickBucket { tick: 6, count: 1 }, TickBucket { tick: 4, count: 675 }];
        assert_eq!(tick_lines(&buckets), "6  1\n4 675");
    }

    #[test]
    fn test_revenue_line_alignment() {
        let q = RevenueQuorum { id: "AB".into(), value: 1234, percent: 0, samples: 7 };
        assert_eq!(revenue_lines(&[q]), "AB       1234   0% (NoV:   7)");
    }

    #[test]
    fn test_ranking_lines() {
        let scores = vec![
            ParticipantScore { id: "A".into(), score: 50, timestamp: 0 },
            ParticipantScore { id: "B".into(), score: 0, timestamp: 0 },
        ];
        let text = ranking_lines(&scores);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[0..50]");
        assert_eq!(lines[1], "   1. A - 50 - 1970-01-01 00:00:00");
        assert_eq!(lines[2], "   2. B - None - 1970-01-01 00:00:00");
        assert_eq!(ranking_lines(&[]), "");
    }

    #[test]
    fn test_items_carry_key_markers() {
        let item = attachment(MetricKey::Scores, "A 1".into(), at_noon());
        match item.rendering {
            Rendering::Attachment { file_name, caption, .. } => {
                assert_eq!(MetricKey::from_file_name(&file_name), Some(MetricKey::Scores));
                assert_eq!(caption, "2026-10-17 12:00:00");
            }
            other => panic!("unexpected rendering {:?}", other),
        }

        let item = inline(MetricKey::MinMax, "[1..2]".into(), at_noon());
        assert!(matches!(item.rendering, Rendering::Inline { ref title, .. } if title == "Scores"));
        assert_eq!(score_line(&ParticipantScore { id: "X".into(), score: 7, timestamp: 0 }), "X - 7    - 1970-01-01 00:00:00");
    }
}
