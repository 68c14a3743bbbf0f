use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag carried by every media descriptor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

/// One media attachment of an ad creative
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaRef {
    pub kind: MediaKind,
    #[serde(default)]
    pub url: Option<String>,
}

impl MediaRef {
    pub fn video(url: Option<String>) -> Self {
        Self { kind: MediaKind::Video, url }
    }

    pub fn image(url: Option<String>) -> Self {
        Self { kind: MediaKind::Image, url }
    }
}

/// Classification of an ad's attached media
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaMix {
    Video,
    Image,
    Both,
    None,
}

impl MediaMix {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaMix::Video => "video",
            MediaMix::Image => "image",
            MediaMix::Both => "both",
            MediaMix::None => "none",
        }
    }
}

impl fmt::Display for MediaMix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp exactly as the source delivered it; parsed during derivation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawTimestamp {
    Epoch(i64),
    Fractional(f64),
    Text(String),
}

/// Raw ad record as supplied by the scraper. Never mutated after ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawAdRecord {
    pub ad_id: Option<String>,
    pub ad_link: Option<String>,
    pub start_date: Option<RawTimestamp>,
    pub end_date: Option<RawTimestamp>,
    #[serde(default)]
    pub ad_text: String,
    #[serde(default)]
    pub media_refs: Vec<MediaRef>,
    /// Advertiser (page) identity, part of the duplicate fingerprint
    pub advertiser_id: Option<String>,
    pub display_format: Option<String>,
    pub ad_group_id: Option<String>,
    pub grouped_ads_count: Option<i64>,
    /// Source fields the core does not consume
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A record dropped from the batch, kept for the validation artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedRecord {
    /// Stage that dropped the record ("ingestion" or "derivation")
    pub stage: String,
    /// Position of the record in that stage's input
    pub index: usize,
    pub ad_id: Option<String>,
    pub reason: String,
}
