// Pipeline ingestion: reading the scraper's raw artifact into raw ad records

pub mod ad_library;

pub use ad_library::{load_raw_artifact, parse_raw_artifact, RawBatch};
