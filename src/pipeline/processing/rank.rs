use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::constants::DEFAULT_TOP_N;
use crate::pipeline::processing::derive::EnrichedAdRecord;
use crate::types::MediaMix;

/// One row of the top-ads report. Field order is the report column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedReportRow {
    pub ad_id: String,
    pub ad_link: String,
    pub is_active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub hours_passed: f64,
    pub media_mix: MediaMix,
    pub ad_text: String,
    /// ISO 639-3 code (`eng`, `spa`), not the two-letter ISO 639-1 form
    pub ad_lang_code: Option<String>,
}

/// Orders live ads by how long they have been running.
///
/// Elapsed active time is the only signal: the source exposes no
/// impressions or clicks.
#[derive(Debug, Clone, Copy)]
pub struct Ranker {
    top_n: usize,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_N)
    }
}

impl Ranker {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Active, rankable records in rank order, at most `top_n` of them
    pub fn select<'a>(&self, records: &'a [EnrichedAdRecord]) -> Vec<&'a EnrichedAdRecord> {
        let mut candidates: Vec<(&EnrichedAdRecord, f64)> = records
            .iter()
            .filter(|r| r.is_active)
            .filter_map(|r| r.hours_passed.map(|hours| (r, hours)))
            .collect();

        candidates.sort_by(|(a, a_hours), (b, b_hours)| {
            b_hours
                .total_cmp(a_hours)
                .then_with(|| compare_start(a.start_date, b.start_date))
                .then_with(|| a.ad_id.cmp(&b.ad_id))
        });
        candidates.truncate(self.top_n);

        candidates.into_iter().map(|(record, _)| record).collect()
    }

    pub fn rank(&self, records: &[EnrichedAdRecord]) -> Vec<RankedReportRow> {
        self.select(records)
            .into_iter()
            .filter_map(RankedReportRow::from_record)
            .collect()
    }
}

impl RankedReportRow {
    /// Project a record onto the report columns; `None` when it has no elapsed time
    pub fn from_record(record: &EnrichedAdRecord) -> Option<Self> {
        Some(Self {
            ad_id: record.ad_id.clone(),
            ad_link: record.ad_link.clone(),
            is_active: record.is_active,
            start_date: record.start_date,
            end_date: record.end_date,
            hours_passed: record.hours_passed?,
            media_mix: record.media_mix,
            ad_text: record.ad_text().to_string(),
            ad_lang_code: record.ad_lang_code.clone(),
        })
    }
}

fn compare_start(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::derive::FieldDeriver;
    use crate::types::{RawAdRecord, RawTimestamp};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn record(id: &str, hours_ago: i64, ended_hours_ago: Option<i64>) -> EnrichedAdRecord {
        let raw = RawAdRecord {
            ad_id: Some(id.to_string()),
            start_date: Some(RawTimestamp::Epoch((now() - Duration::hours(hours_ago)).timestamp())),
            end_date: ended_hours_ago
                .map(|h| RawTimestamp::Epoch((now() - Duration::hours(h)).timestamp())),
            ad_text: format!("Creative {}", id),
            ..Default::default()
        };
        FieldDeriver::default().derive(&raw, now()).unwrap()
    }

    #[test]
    fn test_returns_top_ten_of_fifteen_descending() {
        let records: Vec<EnrichedAdRecord> = (1..=15)
            .map(|i| record(&format!("ad{:02}", i), i * 10, None))
            .collect();

        let rows = Ranker::default().rank(&records);
        assert_eq!(rows.len(), 10);
        let hours: Vec<f64> = rows.iter().map(|r| r.hours_passed).collect();
        let expected: Vec<f64> = (6..=15).rev().map(|i| (i * 10) as f64).collect();
        assert_eq!(hours, expected);
        assert_eq!(rows[0].ad_id, "ad15");
    }

    #[test]
    fn test_inactive_records_never_ranked() {
        let records = vec![
            record("ended", 10_000, Some(1)),
            record("live", 5, None),
        ];
        let rows = Ranker::default().rank(&records);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ad_id, "live");
        assert!(rows[0].is_active);
    }

    #[test]
    fn test_unrankable_records_are_skipped() {
        let mut undated = record("undated", 1, None);
        undated.hours_passed = None;
        let rows = Ranker::default().rank(&[undated, record("dated", 2, None)]);
        let ids: Vec<&str> = rows.iter().map(|r| r.ad_id.as_str()).collect();
        assert_eq!(ids, vec!["dated"]);
    }

    #[test]
    fn test_fewer_than_top_n_returns_all() {
        let records = vec![record("a", 1, None), record("b", 2, None)];
        assert_eq!(Ranker::new(10).rank(&records).len(), 2);
        assert!(Ranker::new(10).rank(&[]).is_empty());
    }

    #[test]
    fn test_ties_break_on_start_then_id() {
        let mut later = record("a-later", 10, None);
        later.hours_passed = Some(50.0);
        let mut earlier = record("z-earlier", 20, None);
        earlier.hours_passed = Some(50.0);
        let twin_b = record("b", 30, None);
        let twin_a = record("a", 30, None);

        let records = vec![later, twin_b, earlier, twin_a];
        let first = Ranker::default().rank(&records);
        let ids: Vec<&str> = first.iter().map(|r| r.ad_id.as_str()).collect();
        assert_eq!(ids, vec!["z-earlier", "a-later", "a", "b"]);

        // Same input, same order on every run
        for _ in 0..5 {
            assert_eq!(Ranker::default().rank(&records), first);
        }
    }
}
