use async_trait::async_trait;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

use crate::constants::{
    RAW_DATA_FILENAME, RAW_DIR, REPORTS_DIR, REPORT_COLUMNS, REPORT_FILENAME,
    TRANSFORMED_DATA_FILENAME, TRANSFORMED_DIR, VALIDATION_DIR, VALIDATION_REPORT_FILENAME,
};
use crate::error::{RankerError, Result};
use crate::pipeline::processing::rank::RankedReportRow;
use crate::pipeline::processing::report::CleanedRow;
use crate::storage::parquet_out::write_cleaned_parquet;
use crate::storage::ArtifactStore;
use crate::types::RejectedRecord;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const CLEANED_ARTIFACT: &str = "cleaned";
const REPORT_ARTIFACT: &str = "report";
const VALIDATION_ARTIFACT: &str = "validation";

/// Artifact store rooted at a data directory:
/// `transformed/`, `reports/` and `validation/` per run, `raw/` as input.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    data_dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn artifact_path(&self, dir: &str, prefix: &str, run_id: &str, extension: &str) -> PathBuf {
        self.data_dir
            .join(dir)
            .join(format!("{}_{}.{}", prefix, run_id, extension))
    }

    /// Newest `raw/raw_ads_<ts>.json`; the timestamp suffix sorts chronologically
    pub fn latest_raw_artifact(&self) -> Result<Option<PathBuf>> {
        let raw_dir = self.data_dir.join(RAW_DIR);
        if !raw_dir.exists() {
            return Ok(None);
        }

        let prefix = format!("{}_", RAW_DATA_FILENAME);
        let mut candidates = Vec::new();
        for entry in fs::read_dir(&raw_dir)? {
            let path = entry?.path();
            let is_raw = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&prefix) && n.ends_with(".json"))
                .unwrap_or(false);
            if is_raw {
                candidates.push(path);
            }
        }
        candidates.sort();
        Ok(candidates.pop())
    }
}

/// Write through a `.tmp` sibling and rename, so a failed write never
/// leaves a partial artifact under the final name.
fn write_atomic<F>(path: &Path, artifact: &str, write: F) -> Result<String>
where
    F: FnOnce(&Path) -> std::result::Result<(), BoxError>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RankerError::serialization(artifact, e))?;
    }

    let tmp_path = PathBuf::from(format!("{}.tmp", path.display()));
    if let Err(e) = write(&tmp_path).and_then(|_| fs::rename(&tmp_path, path).map_err(BoxError::from)) {
        error!("Writing {} artifact to {} failed: {}", artifact, path.display(), e);
        let _ = fs::remove_file(&tmp_path);
        return Err(RankerError::Serialization {
            artifact: artifact.to_string(),
            source: e,
        });
    }

    debug!("Wrote {} artifact {}", artifact, path.display());
    Ok(path.to_string_lossy().to_string())
}

async fn run_blocking<F>(artifact: &'static str, job: F) -> Result<String>
where
    F: FnOnce() -> Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| RankerError::serialization(artifact, e))?
}

fn write_report_csv(rows: &[RankedReportRow], path: &Path) -> std::result::Result<(), BoxError> {
    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        writer.write_record(REPORT_COLUMNS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_validation_json(rejected: &[RejectedRecord], path: &Path) -> std::result::Result<(), BoxError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, rejected)?;
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn write_cleaned(&self, run_id: &str, rows: &[CleanedRow]) -> Result<String> {
        let path = self.artifact_path(TRANSFORMED_DIR, TRANSFORMED_DATA_FILENAME, run_id, "parquet");
        let rows = rows.to_vec();
        run_blocking(CLEANED_ARTIFACT, move || {
            write_atomic(&path, CLEANED_ARTIFACT, |tmp| {
                write_cleaned_parquet(&rows, tmp).map_err(BoxError::from)
            })
        })
        .await
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn write_report(&self, run_id: &str, rows: &[RankedReportRow]) -> Result<String> {
        let path = self.artifact_path(REPORTS_DIR, REPORT_FILENAME, run_id, "csv");
        let rows = rows.to_vec();
        run_blocking(REPORT_ARTIFACT, move || {
            write_atomic(&path, REPORT_ARTIFACT, |tmp| write_report_csv(&rows, tmp))
        })
        .await
    }

    #[instrument(skip(self, rejected), fields(rejected = rejected.len()))]
    async fn write_validation(&self, run_id: &str, rejected: &[RejectedRecord]) -> Result<String> {
        let path = self.artifact_path(VALIDATION_DIR, VALIDATION_REPORT_FILENAME, run_id, "json");
        let rejected = rejected.to_vec();
        run_blocking(VALIDATION_ARTIFACT, move || {
            write_atomic(&path, VALIDATION_ARTIFACT, |tmp| write_validation_json(&rejected, tmp))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaMix;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn report_row(id: &str, hours: f64) -> RankedReportRow {
        RankedReportRow {
            ad_id: id.to_string(),
            ad_link: format!("https://www.facebook.com/ads/library/?id={}", id),
            is_active: true,
            start_date: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            end_date: None,
            hours_passed: hours,
            media_mix: MediaMix::Video,
            ad_text: "Buy now, learn, grow".to_string(),
            ad_lang_code: None,
        }
    }

    #[tokio::test]
    async fn test_report_csv_has_documented_columns() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());

        let path = store
            .write_report("20240601_120000", &[report_row("1", 744.0)])
            .await
            .unwrap();
        assert!(path.ends_with("reports/top_ads_report_20240601_120000.csv"));

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some(REPORT_COLUMNS.join(",").as_str()));
        let first = lines.next().unwrap();
        assert!(first.starts_with("1,https://www.facebook.com/ads/library/?id=1,true,2024-05-01T00:00:00Z,,744.0,video,"));
        assert!(first.contains("\"Buy now, learn, grow\""));
        assert!(!Path::new(&format!("{}.tmp", path)).exists());
    }

    #[tokio::test]
    async fn test_empty_report_still_has_header() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let path = store.write_report("run", &[]).await.unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.trim_end(), REPORT_COLUMNS.join(","));
    }

    #[tokio::test]
    async fn test_unwritable_data_dir_is_serialization_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"occupied").unwrap();
        let store = FsArtifactStore::new(&blocker);

        let err = store.write_report("run", &[report_row("1", 1.0)]).await.unwrap_err();
        assert!(matches!(err, RankerError::Serialization { ref artifact, .. } if artifact == "report"));
    }

    #[tokio::test]
    async fn test_validation_report_round_trips() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let rejected = vec![RejectedRecord {
            stage: "derivation".to_string(),
            index: 3,
            ad_id: None,
            reason: "missing ad_id".to_string(),
        }];

        let path = store.write_validation("run", &rejected).await.unwrap();
        let stored: Vec<RejectedRecord> =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(stored, rejected);
    }

    #[test]
    fn test_latest_raw_artifact_picks_newest_timestamp() {
        let dir = tempdir().unwrap();
        let raw_dir = dir.path().join(RAW_DIR);
        fs::create_dir_all(&raw_dir).unwrap();
        for name in [
            "raw_ads_20240101_000000.json",
            "raw_ads_20240301_093000.json",
            "raw_ads_20240201_120000.json",
            "notes.txt",
        ] {
            fs::write(raw_dir.join(name), b"[]").unwrap();
        }

        let store = FsArtifactStore::new(dir.path());
        let latest = store.latest_raw_artifact().unwrap().unwrap();
        assert!(latest.ends_with("raw_ads_20240301_093000.json"));

        let empty = FsArtifactStore::new(dir.path().join("missing"));
        assert_eq!(empty.latest_raw_artifact().unwrap(), None);
    }
}
