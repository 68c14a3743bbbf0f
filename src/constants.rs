//! Artifact names and defaults shared by the pipeline, the store and the CLI.

pub const DEFAULT_AD_LIBRARY_URL: &str = "https://www.facebook.com/ads/library/";
pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_CONFIG_PATH: &str = "ad_ranker.toml";
pub const CONFIG_PATH_ENV: &str = "AD_RANKER_CONFIG";

// Artifact file name prefixes, suffixed with the run timestamp
pub const RAW_DATA_FILENAME: &str = "raw_ads";
pub const TRANSFORMED_DATA_FILENAME: &str = "transformed_ads";
pub const REPORT_FILENAME: &str = "top_ads_report";
pub const VALIDATION_REPORT_FILENAME: &str = "validation_report";

// Artifact subdirectories under the data dir
pub const RAW_DIR: &str = "raw";
pub const TRANSFORMED_DIR: &str = "transformed";
pub const REPORTS_DIR: &str = "reports";
pub const VALIDATION_DIR: &str = "validation";

/// Run timestamp format used in every artifact name
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Column order of the top-N report
pub const REPORT_COLUMNS: [&str; 9] = [
    "ad_id",
    "ad_link",
    "is_active",
    "start_date",
    "end_date",
    "hours_passed",
    "media_mix",
    "ad_text",
    "ad_lang_code",
];

/// Build the run identifier embedded in artifact names
pub fn run_id_for(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format(RUN_TIMESTAMP_FORMAT).to_string()
}
