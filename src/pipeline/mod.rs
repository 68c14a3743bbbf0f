// Data processing pipeline: ingestion of the raw artifact, processing, and artifact output

pub mod ingestion;
pub mod processing;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::constants::run_id_for;
use crate::error::Result;
use crate::pipeline::ingestion::{load_raw_artifact, RawBatch};
use crate::pipeline::processing::{derive_batch, Deduplicator, EnrichedAdRecord, FieldDeriver, Ranker, ReportBuilder};
use crate::storage::ArtifactStore;
use crate::types::RejectedRecord;

/// Settings for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub top_n: usize,
    pub parallel_derive: bool,
    pub ad_library_url: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            top_n: config.top_n,
            parallel_derive: config.parallel_derive,
            ad_library_url: config.ad_library_url.clone(),
        }
    }
}

/// The cleaned, deduplicated set of a run before anything is written
#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    /// Every entry of the raw artifact, including those rejected at ingestion
    pub raw_records: usize,
    pub records: Vec<EnrichedAdRecord>,
    /// Dropped during ingestion or derivation
    pub rejected: Vec<RejectedRecord>,
    pub duplicates_removed: usize,
}

impl TransformOutcome {
    /// Cleaned records eligible for the report
    pub fn active_rankable(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.is_active && r.is_rankable())
            .count()
    }
}

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub raw_records: usize,
    pub rejected: usize,
    /// Records that made it through derivation, before duplicates are collapsed
    pub enriched: usize,
    pub duplicates_removed: usize,
    pub cleaned: usize,
    pub ranked: usize,
    pub validation_artifact: String,
    pub cleaned_artifact: String,
    pub report_artifact: String,
}

pub struct Pipeline;

impl Pipeline {
    /// Derive and deduplicate a raw batch. Malformed records are dropped and reported.
    pub fn transform(batch: RawBatch, options: &PipelineOptions, now: DateTime<Utc>) -> TransformOutcome {
        // Entries rejected at ingestion were raw input too
        let raw_records = batch.records.len() + batch.rejected.len();
        let deriver = FieldDeriver::new(options.ad_library_url.clone());

        let t_derive = std::time::Instant::now();
        let derived = derive_batch(&deriver, &batch.records, now, options.parallel_derive);
        histogram!("ad_ranker_derive_duration_seconds").record(t_derive.elapsed().as_secs_f64());
        info!(
            "Derived {} ads ({} malformed)",
            derived.records.len(),
            derived.rejected.len()
        );

        let mut rejected = batch.rejected;
        rejected.extend(derived.rejected);
        for record in &rejected {
            warn!(
                "Rejected {} record {} (ad_id {:?}): {}",
                record.stage, record.index, record.ad_id, record.reason
            );
        }

        let dedup = Deduplicator::new().deduplicate(derived.records);

        counter!("ad_ranker_records_rejected_total").increment(rejected.len() as u64);
        counter!("ad_ranker_duplicates_removed_total").increment(dedup.duplicates_removed as u64);

        TransformOutcome {
            raw_records,
            records: dedup.records,
            rejected,
            duplicates_removed: dedup.duplicates_removed,
        }
    }

    /// Run the complete pipeline over a raw batch, writing every artifact of the run.
    /// Per-record problems never abort; any artifact write failure does.
    #[instrument(skip_all, fields(run_id = %run_id_for(now)))]
    pub async fn run(
        batch: RawBatch,
        store: &dyn ArtifactStore,
        options: &PipelineOptions,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let run_id = run_id_for(now);
        info!("🚀 Starting pipeline run over {} raw ads", batch.records.len());
        counter!("ad_ranker_runs_total").increment(1);
        let t_pipeline = std::time::Instant::now();

        let outcome = Self::transform(batch, options, now);

        let validation_artifact = store.write_validation(&run_id, &outcome.rejected).await?;
        info!("Validation report could be found here: {}", validation_artifact);

        let ranker = Ranker::new(options.top_n);
        let ranked = ranker.rank(&outcome.records);
        info!(
            "Ranked {} of {} cleaned ads (top {})",
            ranked.len(),
            outcome.records.len(),
            ranker.top_n()
        );

        let builder = ReportBuilder::new();
        let report = builder.build(&outcome.records, ranked);
        let artifacts = builder.persist(&report, store, &run_id).await?;

        histogram!("ad_ranker_pipeline_duration_seconds").record(t_pipeline.elapsed().as_secs_f64());
        counter!("ad_ranker_ads_ranked_total").increment(report.top.len() as u64);

        Ok(RunSummary {
            run_id,
            raw_records: outcome.raw_records,
            rejected: outcome.rejected.len(),
            enriched: outcome.records.len() + outcome.duplicates_removed,
            duplicates_removed: outcome.duplicates_removed,
            cleaned: report.cleaned.len(),
            ranked: report.top.len(),
            validation_artifact,
            cleaned_artifact: artifacts.cleaned,
            report_artifact: artifacts.report,
        })
    }

    /// Load a raw artifact from disk and run the pipeline over it
    pub async fn run_artifact(
        raw_artifact: &Path,
        store: &dyn ArtifactStore,
        options: &PipelineOptions,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let batch = load_raw_artifact(raw_artifact, &options.ad_library_url)?;
        Self::run(batch, store, options, now).await
    }
}
