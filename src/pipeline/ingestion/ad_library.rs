use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::error::{RankerError, Result};
use crate::types::{MediaRef, RawAdRecord, RawTimestamp, RejectedRecord};

const DISPLAY_FORMAT_VIDEO: &str = "VIDEO";
const DISPLAY_FORMAT_IMAGE: &str = "IMAGE";
const DISPLAY_FORMAT_DCO: &str = "DCO";
const DISPLAY_FORMAT_CAROUSEL: &str = "CAROUSEL";
const INGESTION_STAGE: &str = "ingestion";

/// Top-level library keys mapped onto `RawAdRecord` fields
const LIBRARY_KEYS: [&str; 10] = [
    "ad_archive_id",
    "ad_id",
    "ad_link",
    "start_date",
    "end_date",
    "is_active",
    "collation_id",
    "collation_count",
    "page_id",
    "snapshot",
];

/// Raw records flattened out of one scraper artifact
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub records: Vec<RawAdRecord>,
    /// Number of ad groups (collations) in the artifact
    pub groups: usize,
    /// Entries that could not be read as an ad object at all
    pub rejected: Vec<RejectedRecord>,
}

impl RawBatch {
    pub fn from_records(records: Vec<RawAdRecord>) -> Self {
        Self {
            groups: records.len(),
            records,
            rejected: Vec::new(),
        }
    }
}

/// Per-group state: the Ad Library reports the collation count on some
/// members only, so the running maximum is carried across the group.
#[derive(Debug, Default)]
struct GroupContext {
    max_collation_count: Option<i64>,
}

/// Read and flatten a raw artifact written by the scraper
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_raw_artifact(path: &Path, ad_library_url: &str) -> Result<RawBatch> {
    let content = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    let batch = parse_raw_artifact(&value, ad_library_url)?;
    info!(
        "Loaded {} ads from {} ad groups ({} unreadable entries)",
        batch.records.len(),
        batch.groups,
        batch.rejected.len()
    );
    Ok(batch)
}

/// Flatten the artifact: a JSON array of ad groups, each an array of ad objects.
/// A bare object at the top level counts as a single-ad group.
pub fn parse_raw_artifact(value: &Value, ad_library_url: &str) -> Result<RawBatch> {
    let groups = value
        .as_array()
        .ok_or_else(|| RankerError::RawArtifact("top level must be a JSON array".to_string()))?;

    let mut batch = RawBatch::default();
    let mut index = 0usize;

    for group in groups {
        let members: Vec<&Value> = match group {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![group],
            other => {
                warn!("Skipping raw entry {} that is not an ad group: {}", index, other);
                batch.rejected.push(RejectedRecord {
                    stage: INGESTION_STAGE.to_string(),
                    index,
                    ad_id: None,
                    reason: "not an object".to_string(),
                });
                index += 1;
                continue;
            }
        };
        batch.groups += 1;

        let mut ctx = GroupContext::default();
        for member in members {
            match member.as_object() {
                Some(ad) if !ad.contains_key("snapshot") => match record_from_flat_json(ad, ad_library_url) {
                    Ok(record) => batch.records.push(record),
                    Err(e) => {
                        warn!("Skipping raw entry {} with unreadable fields: {}", index, e);
                        batch.rejected.push(RejectedRecord {
                            stage: INGESTION_STAGE.to_string(),
                            index,
                            ad_id: ad.get("ad_id").or_else(|| ad.get("ad_archive_id")).and_then(id_string),
                            reason: format!("unreadable record: {}", e),
                        });
                    }
                },
                Some(ad) => {
                    batch
                        .records
                        .push(record_from_library_json(ad, &mut ctx, ad_library_url));
                }
                None => {
                    warn!("Skipping raw entry {} that is not an object", index);
                    batch.rejected.push(RejectedRecord {
                        stage: INGESTION_STAGE.to_string(),
                        index,
                        ad_id: None,
                        reason: "not an object".to_string(),
                    });
                }
            }
            index += 1;
        }
    }

    debug!("Flattened {} groups into {} records", batch.groups, batch.records.len());
    Ok(batch)
}

fn record_from_library_json(
    ad: &Map<String, Value>,
    ctx: &mut GroupContext,
    ad_library_url: &str,
) -> RawAdRecord {
    let ad_id = ad
        .get("ad_archive_id")
        .and_then(id_string)
        .or_else(|| ad.get("ad_id").and_then(id_string));

    let ad_link = ad
        .get("ad_link")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| ad_id.as_ref().map(|id| ad_link_for(ad_library_url, id)));

    let start_date = ad.get("start_date").and_then(timestamp);
    // For running ads the source end_date is a last-seen stamp, not an end
    let source_active = ad.get("is_active").and_then(Value::as_bool).unwrap_or(false);
    let end_date = if source_active {
        None
    } else {
        ad.get("end_date").and_then(timestamp)
    };

    let collation_count = ad.get("collation_count").and_then(Value::as_i64);
    let grouped_ads_count = match (ctx.max_collation_count, collation_count) {
        (Some(seen), Some(count)) => Some(seen.max(count)),
        (seen, count) => seen.or(count),
    };
    ctx.max_collation_count = grouped_ads_count;

    let snapshot = ad.get("snapshot").and_then(Value::as_object);
    let display_format = snapshot
        .and_then(|s| s.get("display_format"))
        .and_then(Value::as_str)
        .map(|f| f.to_uppercase());
    let cards: &[Value] = snapshot
        .and_then(|s| s.get("cards"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let advertiser_id = snapshot
        .and_then(|s| s.get("page_id"))
        .and_then(id_string)
        .or_else(|| ad.get("page_id").and_then(id_string));

    let ad_text = extract_text(snapshot, cards, display_format.as_deref());
    if ad_text.is_empty() {
        debug!("No ad text found for ad {:?}", ad_id);
    }
    let media_refs = extract_media(snapshot, cards, display_format.as_deref());

    let mut extra: Map<String, Value> = ad
        .iter()
        .filter(|(key, _)| !LIBRARY_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if let Some(page_name) = snapshot.and_then(|s| s.get("page_name")) {
        extra
            .entry("page_name".to_string())
            .or_insert_with(|| page_name.clone());
    }

    RawAdRecord {
        ad_id,
        ad_link,
        start_date,
        end_date,
        ad_text,
        media_refs,
        advertiser_id,
        display_format,
        ad_group_id: ad.get("collation_id").and_then(id_string),
        grouped_ads_count,
        extra,
    }
}

/// An object already shaped like `RawAdRecord`. Unknown keys land in `extra`;
/// `ad_archive_id` and `is_active` are honoured the same way as for library objects.
fn record_from_flat_json(ad: &Map<String, Value>, ad_library_url: &str) -> Result<RawAdRecord> {
    let mut fields = ad.clone();
    // Identifiers may arrive as JSON numbers
    for key in ["ad_id", "advertiser_id", "ad_group_id"] {
        if let Some(id) = fields.get(key).and_then(id_string) {
            fields.insert(key.to_string(), Value::String(id));
        }
    }
    let mut record: RawAdRecord = serde_json::from_value(Value::Object(fields))?;

    if record.ad_id.is_none() {
        record.ad_id = record.extra.remove("ad_archive_id").as_ref().and_then(id_string);
    }
    if record.extra.get("is_active").and_then(Value::as_bool) == Some(true) {
        record.end_date = None;
    }
    record.extra.remove("is_active");
    if record.ad_link.is_none() {
        record.ad_link = record.ad_id.as_ref().map(|id| ad_link_for(ad_library_url, id));
    }
    Ok(record)
}

pub fn ad_link_for(ad_library_url: &str, ad_id: &str) -> String {
    format!("{}?id={}", ad_library_url, ad_id)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp(value: &Value) -> Option<RawTimestamp> {
    match value {
        Value::Null => None,
        Value::Number(n) => match n.as_i64() {
            Some(secs) => Some(RawTimestamp::Epoch(secs)),
            None => n.as_f64().map(RawTimestamp::Fractional),
        },
        Value::String(s) => Some(RawTimestamp::Text(s.clone())),
        // Kept so derivation reports it as unparseable
        other => Some(RawTimestamp::Text(other.to_string())),
    }
}

fn body_text(body: Option<&Value>) -> Option<String> {
    match body? {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o.get("text").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn extract_text(snapshot: Option<&Map<String, Value>>, cards: &[Value], format: Option<&str>) -> String {
    let text = match format {
        Some(DISPLAY_FORMAT_DCO) | Some(DISPLAY_FORMAT_CAROUSEL) => {
            cards.first().and_then(|card| body_text(card.get("body")))
        }
        _ => snapshot.and_then(|s| body_text(s.get("body"))),
    };
    text.unwrap_or_default()
}

fn url_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

fn extract_media(snapshot: Option<&Map<String, Value>>, cards: &[Value], format: Option<&str>) -> Vec<MediaRef> {
    let list = |key: &str| -> Vec<Value> {
        snapshot
            .and_then(|s| s.get(key))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    match format {
        Some(DISPLAY_FORMAT_VIDEO) => {
            let mut refs: Vec<MediaRef> = list("videos")
                .iter()
                .map(|v| MediaRef::video(url_field(v, &["video_hd_url", "video_sd_url"])))
                .collect();
            if refs.is_empty() {
                refs.push(MediaRef::video(None));
            }
            refs
        }
        Some(DISPLAY_FORMAT_IMAGE) => {
            let mut refs: Vec<MediaRef> = list("images")
                .iter()
                .map(|i| MediaRef::image(url_field(i, &["original_image_url", "resized_image_url"])))
                .collect();
            if refs.is_empty() {
                refs.push(MediaRef::image(None));
            }
            refs
        }
        Some(DISPLAY_FORMAT_DCO) | Some(DISPLAY_FORMAT_CAROUSEL) => {
            let mut refs = Vec::new();
            for card in cards {
                if let Some(url) = url_field(card, &["video_hd_url"]) {
                    refs.push(MediaRef::video(Some(url)));
                }
                if let Some(url) = url_field(card, &["original_image_url"]) {
                    refs.push(MediaRef::image(Some(url)));
                }
            }
            refs
        }
        _ => Vec::new(),
    }
}
