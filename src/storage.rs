use crate::error::Result;
use crate::pipeline::processing::rank::RankedReportRow;
use crate::pipeline::processing::report::CleanedRow;
use crate::types::RejectedRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub mod fs_store;
pub mod parquet_out;

pub use fs_store::FsArtifactStore;

/// Destination for the artifacts of a run, each named with the run id.
///
/// Implementations return the location of the written artifact and report
/// any failure as `RankerError::Serialization`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist the deduplicated record set (columnar)
    async fn write_cleaned(&self, run_id: &str, rows: &[CleanedRow]) -> Result<String>;

    /// Persist the ranked top-N report (delimited text)
    async fn write_report(&self, run_id: &str, rows: &[RankedReportRow]) -> Result<String>;

    /// Persist the records dropped during ingestion and derivation
    async fn write_validation(&self, run_id: &str, rejected: &[RejectedRecord]) -> Result<String>;
}

/// In-memory artifact store for development/testing
#[derive(Default)]
pub struct InMemoryArtifactStore {
    cleaned: Arc<Mutex<HashMap<String, Vec<CleanedRow>>>>,
    reports: Arc<Mutex<HashMap<String, Vec<RankedReportRow>>>>,
    validations: Arc<Mutex<HashMap<String, Vec<RejectedRecord>>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cleaned(&self, run_id: &str) -> Option<Vec<CleanedRow>> {
        self.cleaned.lock().unwrap().get(run_id).cloned()
    }

    pub fn report(&self, run_id: &str) -> Option<Vec<RankedReportRow>> {
        self.reports.lock().unwrap().get(run_id).cloned()
    }

    pub fn validation(&self, run_id: &str) -> Option<Vec<RejectedRecord>> {
        self.validations.lock().unwrap().get(run_id).cloned()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn write_cleaned(&self, run_id: &str, rows: &[CleanedRow]) -> Result<String> {
        let mut cleaned = self.cleaned.lock().unwrap();
        cleaned.insert(run_id.to_string(), rows.to_vec());

        debug!("Stored {} cleaned rows for run {}", rows.len(), run_id);
        Ok(format!("memory://cleaned/{}", run_id))
    }

    async fn write_report(&self, run_id: &str, rows: &[RankedReportRow]) -> Result<String> {
        let mut reports = self.reports.lock().unwrap();
        reports.insert(run_id.to_string(), rows.to_vec());

        debug!("Stored {} report rows for run {}", rows.len(), run_id);
        Ok(format!("memory://report/{}", run_id))
    }

    async fn write_validation(&self, run_id: &str, rejected: &[RejectedRecord]) -> Result<String> {
        let mut validations = self.validations.lock().unwrap();
        validations.insert(run_id.to_string(), rejected.to_vec());
        Ok(format!("memory://validation/{}", run_id))
    }
}
