use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::DEFAULT_AD_LIBRARY_URL;
use crate::error::{RankerError, Result};
use crate::pipeline::ingestion::ad_library::ad_link_for;
use crate::pipeline::processing::dedup::fingerprint;
use crate::pipeline::processing::language::detect_language;
use crate::pipeline::processing::media::classify_media_mix;
use crate::types::{MediaMix, RawAdRecord, RawTimestamp, RejectedRecord};

const DERIVATION_STAGE: &str = "derivation";
const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// A raw ad record with its derived attributes, one per parsed raw record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedAdRecord {
    /// The source record, untouched
    pub raw: RawAdRecord,
    pub ad_id: String,
    pub ad_link: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// True iff the ad had no end date at evaluation time
    pub is_active: bool,
    /// Elapsed hours, `None` when the record cannot be ranked
    pub hours_passed: Option<f64>,
    pub media_mix: MediaMix,
    pub ad_lang_code: Option<String>,
    pub dedup_key: String,
    /// Non-fatal notes from derivation
    pub warnings: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl EnrichedAdRecord {
    pub fn is_rankable(&self) -> bool {
        self.hours_passed.is_some()
    }

    pub fn ad_text(&self) -> &str {
        &self.raw.ad_text
    }
}

/// Computes derived attributes for raw ad records.
///
/// Holds only immutable settings so one instance can be shared across
/// worker threads.
#[derive(Debug, Clone)]
pub struct FieldDeriver {
    ad_library_url: String,
}

impl Default for FieldDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_AD_LIBRARY_URL)
    }
}

impl FieldDeriver {
    pub fn new(ad_library_url: impl Into<String>) -> Self {
        Self {
            ad_library_url: ad_library_url.into(),
        }
    }

    pub fn derive(&self, raw: &RawAdRecord, now: DateTime<Utc>) -> Result<EnrichedAdRecord> {
        let ad_id = raw
            .ad_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RankerError::malformed("missing ad_id"))?
            .to_string();

        let mut warnings = Vec::new();

        let ad_link = raw
            .ad_link
            .clone()
            .filter(|link| !link.trim().is_empty())
            .unwrap_or_else(|| ad_link_for(&self.ad_library_url, &ad_id));

        let start_date = match &raw.start_date {
            None => {
                warnings.push("missing start_date".to_string());
                None
            }
            Some(ts) => {
                let parsed = parse_timestamp(ts);
                if parsed.is_none() {
                    warnings.push(format!("unparseable start_date {:?}", ts));
                }
                parsed
            }
        };

        // (end_date, is_active, end usable for elapsed time)
        let (end_date, is_active, end_known) = match &raw.end_date {
            None => (None, true, true),
            Some(ts) => match parse_timestamp(ts) {
                Some(end) => (Some(end), false, true),
                None => {
                    warnings.push(format!("unparseable end_date {:?}", ts));
                    (None, false, false)
                }
            },
        };

        let hours_passed = match start_date {
            Some(start) if end_known => {
                let until = end_date.unwrap_or(now);
                let hours = (until - start).num_milliseconds() as f64 / MILLIS_PER_HOUR;
                if hours < 0.0 {
                    warnings.push("end of activity precedes start_date".to_string());
                }
                Some(hours.max(0.0))
            }
            _ => None,
        };

        let media_mix = classify_media_mix(&raw.media_refs);

        let ad_lang_code = detect_language(&raw.ad_text);
        if ad_lang_code.is_none() && !raw.ad_text.trim().is_empty() {
            warnings.push("language detection inconclusive".to_string());
        }

        let dedup_key = fingerprint(&raw.ad_text, media_mix, raw.advertiser_id.as_deref());

        Ok(EnrichedAdRecord {
            raw: raw.clone(),
            ad_id,
            ad_link,
            start_date,
            end_date,
            is_active,
            hours_passed,
            media_mix,
            ad_lang_code,
            dedup_key,
            warnings,
            evaluated_at: now,
        })
    }
}

/// Enriched records plus the records dropped as malformed
#[derive(Debug, Clone, Default)]
pub struct DerivedBatch {
    pub records: Vec<EnrichedAdRecord>,
    pub rejected: Vec<RejectedRecord>,
}

/// Derive every record of a batch. Output keeps input order; a malformed
/// record is logged and skipped without aborting the batch.
pub fn derive_batch(
    deriver: &FieldDeriver,
    records: &[RawAdRecord],
    now: DateTime<Utc>,
    parallel: bool,
) -> DerivedBatch {
    let results: Vec<Result<EnrichedAdRecord>> = if parallel {
        records.par_iter().map(|raw| deriver.derive(raw, now)).collect()
    } else {
        records.iter().map(|raw| deriver.derive(raw, now)).collect()
    };

    let mut batch = DerivedBatch::default();
    for (index, (raw, result)) in records.iter().zip(results).enumerate() {
        match result {
            Ok(record) => {
                if !record.warnings.is_empty() {
                    debug!("Ad {} derived with warnings: {:?}", record.ad_id, record.warnings);
                }
                batch.records.push(record);
            }
            Err(e) => {
                warn!("Dropping record {}: {}", index, e);
                let reason = match e {
                    RankerError::MalformedRecord { reason } => reason,
                    other => other.to_string(),
                };
                batch.rejected.push(RejectedRecord {
                    stage: DERIVATION_STAGE.to_string(),
                    index,
                    ad_id: raw.ad_id.clone(),
                    reason,
                });
            }
        }
    }
    batch
}

/// Parse a source timestamp: unix seconds, RFC 3339, or a naive
/// `YYYY-MM-DD[ HH:MM:SS]` taken as UTC.
pub fn parse_timestamp(ts: &RawTimestamp) -> Option<DateTime<Utc>> {
    match ts {
        RawTimestamp::Epoch(secs) => Utc.timestamp_opt(*secs, 0).single(),
        RawTimestamp::Fractional(secs) if secs.is_finite() => {
            Utc.timestamp_millis_opt((secs * 1000.0).round() as i64).single()
        }
        RawTimestamp::Fractional(_) => None,
        RawTimestamp::Text(text) => parse_text_timestamp(text.trim()),
    }
}

fn parse_text_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(secs) = text.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaRef;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn raw_record(id: &str, start_hours_ago: i64) -> RawAdRecord {
        RawAdRecord {
            ad_id: Some(id.to_string()),
            start_date: Some(RawTimestamp::Epoch(
                (now() - Duration::hours(start_hours_ago)).timestamp(),
            )),
            ad_text: "Buy now!".to_string(),
            media_refs: vec![MediaRef::video(None)],
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_ad_id_is_malformed() {
        let deriver = FieldDeriver::default();
        let mut raw = raw_record("x", 10);
        raw.ad_id = None;
        assert!(matches!(
            deriver.derive(&raw, now()),
            Err(RankerError::MalformedRecord { .. })
        ));

        raw.ad_id = Some("   ".to_string());
        assert!(deriver.derive(&raw, now()).is_err());
    }

    #[test]
    fn test_active_record_elapsed_until_now() {
        let deriver = FieldDeriver::default();
        let record = deriver.derive(&raw_record("1", 100), now()).unwrap();

        assert!(record.is_active);
        assert!(record.is_rankable());
        assert_eq!(record.hours_passed, Some(100.0));
        assert_eq!(record.media_mix, MediaMix::Video);
        assert_eq!(record.ad_link, "https://www.facebook.com/ads/library/?id=1");
        assert_eq!(record.evaluated_at, now());
    }

    #[test]
    fn test_ended_record_is_inactive_and_uses_end_date() {
        let deriver = FieldDeriver::default();
        let mut raw = raw_record("2", 48);
        raw.end_date = Some(RawTimestamp::Epoch((now() - Duration::hours(12)).timestamp()));

        let record = deriver.derive(&raw, now()).unwrap();
        assert!(!record.is_active);
        assert_eq!(record.hours_passed, Some(36.0));
    }

    #[test]
    fn test_end_before_start_is_floored_at_zero() {
        let deriver = FieldDeriver::default();
        let mut raw = raw_record("3", 5);
        raw.end_date = Some(RawTimestamp::Epoch((now() - Duration::hours(10)).timestamp()));

        let record = deriver.derive(&raw, now()).unwrap();
        assert_eq!(record.hours_passed, Some(0.0));
        assert!(!record.warnings.is_empty());
    }

    #[test]
    fn test_start_in_future_is_floored_at_zero() {
        let deriver = FieldDeriver::default();
        let record = deriver.derive(&raw_record("4", -3), now()).unwrap();
        assert_eq!(record.hours_passed, Some(0.0));
    }

    #[test]
    fn test_missing_or_bad_start_date_is_unrankable() {
        let deriver = FieldDeriver::default();
        let mut raw = raw_record("5", 1);
        raw.start_date = None;
        let record = deriver.derive(&raw, now()).unwrap();
        assert!(!record.is_rankable());
        assert!(record.is_active);

        raw.start_date = Some(RawTimestamp::Text("not a date".to_string()));
        let record = deriver.derive(&raw, now()).unwrap();
        assert!(!record.is_rankable());
    }

    #[test]
    fn test_unparseable_end_date_is_inactive_and_unrankable() {
        let deriver = FieldDeriver::default();
        let mut raw = raw_record("6", 20);
        raw.end_date = Some(RawTimestamp::Text("soon".to_string()));

        let record = deriver.derive(&raw, now()).unwrap();
        assert!(!record.is_active);
        assert!(!record.is_rankable());
    }

    #[test]
    fn test_empty_text_has_null_language() {
        let deriver = FieldDeriver::default();
        let mut raw = raw_record("7", 1);
        raw.ad_text = String::new();
        raw.media_refs.clear();

        let record = deriver.derive(&raw, now()).unwrap();
        assert_eq!(record.ad_lang_code, None);
        assert_eq!(record.media_mix, MediaMix::None);
    }

    #[test]
    fn test_source_link_is_preserved() {
        let deriver = FieldDeriver::new("https://ads.example/library/");
        let mut raw = raw_record("8", 1);
        assert_eq!(
            deriver.derive(&raw, now()).unwrap().ad_link,
            "https://ads.example/library/?id=8"
        );

        raw.ad_link = Some("https://ads.example/custom/8".to_string());
        assert_eq!(
            deriver.derive(&raw, now()).unwrap().ad_link,
            "https://ads.example/custom/8"
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let inputs = [
            RawTimestamp::Epoch(expected.timestamp()),
            RawTimestamp::Fractional(expected.timestamp() as f64),
            RawTimestamp::Text(expected.timestamp().to_string()),
            RawTimestamp::Text("2024-03-01T10:00:00Z".to_string()),
            RawTimestamp::Text("2024-03-01T12:00:00+02:00".to_string()),
            RawTimestamp::Text("2024-03-01 10:00:00".to_string()),
        ];
        for input in &inputs {
            assert_eq!(parse_timestamp(input), Some(expected), "input {:?}", input);
        }
        assert_eq!(
            parse_timestamp(&RawTimestamp::Text("2024-03-01".to_string())),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp(&RawTimestamp::Text("".to_string())), None);
        assert_eq!(parse_timestamp(&RawTimestamp::Fractional(f64::NAN)), None);
    }

    #[test]
    fn test_derive_batch_isolates_malformed_records() {
        let deriver = FieldDeriver::default();
        let mut broken = raw_record("ignored", 3);
        broken.ad_id = None;
        let records = vec![raw_record("a", 3), broken, raw_record("b", 4)];

        for parallel in [false, true] {
            let batch = derive_batch(&deriver, &records, now(), parallel);
            let ids: Vec<&str> = batch.records.iter().map(|r| r.ad_id.as_str()).collect();
            assert_eq!(ids, vec!["a", "b"]);
            assert_eq!(batch.rejected.len(), 1);
            assert_eq!(batch.rejected[0].index, 1);
            assert_eq!(batch.rejected[0].stage, "derivation");
            assert_eq!(batch.rejected[0].reason, "missing ad_id");
        }
    }
}
