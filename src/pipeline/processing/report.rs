use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::pipeline::processing::derive::EnrichedAdRecord;
use crate::pipeline::processing::rank::RankedReportRow;
use crate::storage::ArtifactStore;
use crate::types::MediaMix;

/// One row of the cleaned (deduplicated) record set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanedRow {
    pub ad_id: String,
    pub ad_link: String,
    pub is_active: bool,
    /// Unix seconds
    pub start_date_ts: Option<i64>,
    pub end_date_ts: Option<i64>,
    pub hours_passed: Option<f64>,
    pub media_mix: MediaMix,
    pub ad_text: String,
    /// ISO 639-3, same as the report
    pub ad_lang_code: Option<String>,
    pub rankable: bool,
    pub advertiser_id: Option<String>,
    pub display_format: Option<String>,
    pub ad_group_id: Option<String>,
    pub grouped_ads_count: Option<i64>,
    pub media_ref_count: i64,
    pub dedup_key: String,
}

impl From<&EnrichedAdRecord> for CleanedRow {
    fn from(record: &EnrichedAdRecord) -> Self {
        Self {
            ad_id: record.ad_id.clone(),
            ad_link: record.ad_link.clone(),
            is_active: record.is_active,
            start_date_ts: record.start_date.map(|d| d.timestamp()),
            end_date_ts: record.end_date.map(|d| d.timestamp()),
            hours_passed: record.hours_passed,
            media_mix: record.media_mix,
            ad_text: record.ad_text().to_string(),
            ad_lang_code: record.ad_lang_code.clone(),
            rankable: record.is_rankable(),
            advertiser_id: record.raw.advertiser_id.clone(),
            display_format: record.raw.display_format.clone(),
            ad_group_id: record.raw.ad_group_id.clone(),
            grouped_ads_count: record.raw.grouped_ads_count,
            media_ref_count: record.raw.media_refs.len() as i64,
            dedup_key: record.dedup_key.clone(),
        }
    }
}

/// Both tabular outputs of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub cleaned: Vec<CleanedRow>,
    pub top: Vec<RankedReportRow>,
}

/// Locations of the persisted report artifacts
#[derive(Debug, Clone, Serialize)]
pub struct ReportArtifacts {
    pub cleaned: String,
    pub report: String,
}

/// Formats the cleaned set and the ranked subset. Computes nothing new.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportBuilder;

impl ReportBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, cleaned: &[EnrichedAdRecord], ranked: Vec<RankedReportRow>) -> Report {
        Report {
            cleaned: cleaned.iter().map(CleanedRow::from).collect(),
            top: ranked,
        }
    }

    /// Write the cleaned set, then the top-N report. The first failure aborts.
    pub async fn persist(
        &self,
        report: &Report,
        store: &dyn ArtifactStore,
        run_id: &str,
    ) -> Result<ReportArtifacts> {
        let cleaned = store.write_cleaned(run_id, &report.cleaned).await?;
        info!("Cleaned set of {} ads written to {}", report.cleaned.len(), cleaned);

        let top = store.write_report(run_id, &report.top).await?;
        info!("Report with top {} ads written to {}", report.top.len(), top);

        Ok(ReportArtifacts {
            cleaned,
            report: top,
        })
    }
}
