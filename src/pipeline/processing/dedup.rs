use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::pipeline::processing::derive::EnrichedAdRecord;
use crate::types::MediaMix;

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("valid punctuation pattern"));

const KEY_SEPARATOR: char = '\u{1f}';

/// Case-fold, strip punctuation and collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let folded = text.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&folded, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fingerprint of a creative: exact match on normalized copy, media shape and
/// advertiser. Media content and near-identical wording are not compared.
pub fn fingerprint(ad_text: &str, media_mix: MediaMix, advertiser_id: Option<&str>) -> String {
    let composite = format!(
        "{}{sep}{}{sep}{}",
        normalize_text(ad_text),
        media_mix.as_str(),
        advertiser_id.unwrap_or_default(),
        sep = KEY_SEPARATOR
    );
    hex::encode(Sha256::digest(composite.as_bytes()))
}

/// Result of collapsing a batch
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// One representative per ad id and fingerprint, in first-occurrence order
    pub records: Vec<EnrichedAdRecord>,
    pub duplicates_removed: usize,
}

/// Collapses near-duplicate creatives into one representative per `dedup_key`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deduplicator;

impl Deduplicator {
    pub fn new() -> Self {
        Self
    }

    /// Collapse repeated scrapes of the same `ad_id`, then creatives sharing a
    /// fingerprint. Both passes keep the preferred record of each group.
    pub fn deduplicate(&self, records: Vec<EnrichedAdRecord>) -> DedupOutcome {
        let input_len = records.len();
        let by_id = collapse(records, |r| r.ad_id.as_str());
        let same_id = input_len - by_id.len();
        let kept = collapse(by_id, |r| r.dedup_key.as_str());

        let duplicates_removed = input_len - kept.len();
        info!(
            "Duplicates removed: {} of {} records ({} repeated ad ids), {} left",
            duplicates_removed,
            input_len,
            same_id,
            kept.len()
        );

        DedupOutcome {
            records: kept,
            duplicates_removed,
        }
    }
}

/// One record per group key, in first-occurrence order of the group
fn collapse<F>(records: Vec<EnrichedAdRecord>, key: F) -> Vec<EnrichedAdRecord>
where
    F: Fn(&EnrichedAdRecord) -> &str,
{
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<EnrichedAdRecord> = Vec::new();

    for record in records {
        match slots.get(key(&record)) {
            Some(&slot) => {
                if prefer(&record, &kept[slot]) == Ordering::Less {
                    debug!(
                        "Ad {} replaces {} as representative of its duplicate group",
                        record.ad_id, kept[slot].ad_id
                    );
                    kept[slot] = record;
                } else {
                    debug!("Ad {} collapsed into {}", record.ad_id, kept[slot].ad_id);
                }
            }
            None => {
                slots.insert(key(&record).to_string(), kept.len());
                kept.push(record);
            }
        }
    }
    kept
}

/// Survivor order within a duplicate group: greatest `hours_passed`
/// (unrankable last), then earliest `start_date` (missing last), then
/// smallest `ad_id`. `Less` means `a` is kept.
fn prefer(a: &EnrichedAdRecord, b: &EnrichedAdRecord) -> Ordering {
    let by_hours = match (a.hours_passed, b.hours_passed) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    let by_start = match (a.start_date, b.start_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_hours
        .then(by_start)
        .then_with(|| a.ad_id.cmp(&b.ad_id))
}
