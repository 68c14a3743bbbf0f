// Pipeline processing: field derivation, duplicate collapsing, ranking and report assembly

pub mod dedup;
pub mod derive;
pub mod language;
pub mod media;
pub mod rank;
pub mod report;

pub use dedup::{DedupOutcome, Deduplicator};
pub use derive::{derive_batch, DerivedBatch, EnrichedAdRecord, FieldDeriver};
pub use rank::{RankedReportRow, Ranker};
pub use report::{CleanedRow, Report, ReportBuilder};
