//! Rule evidence catalogs for versioned XLSX compliance templates.
//!
//! A template root holds one folder per template family, each with files named
//! `<anything>_<major>(.<minor>)*.xlsx`. For every family the scan builds a [`RuleCatalog`]
//! (all versions, newest as baseline), diffs each sheet against the baseline and along the
//! adjacent version chain, and writes CSV/JSON Lines reports.
//!
//! Worksheet parsing lives in [`rulescan_xlsx`]; this crate owns discovery, version ordering,
//! cataloging, diffing and reporting.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod diff;
pub mod discovery;
pub mod evidence;
pub mod report;
pub mod scan;
pub mod version;

pub use catalog::{
    CatalogBuilder, Metric, MixedSourceRange, Presence, RuleCatalog, SheetEntry, SheetSnapshot,
    VersionSnapshot,
};
pub use config::ScanConfig;
pub use diff::{
    adjacent_chain, baseline_diffs, cf_range_drift, diff_rules, DiffCounts, DiffRecord,
    DiffStatus, RangeChange, RangeDrift, ReferenceKind,
};
pub use discovery::{discover_templates, Discovery, DiscoveryError, ExcludedFile, TemplateFile};
pub use evidence::{read_evidence, write_evidence, EvidenceError, EvidenceRecord, EVIDENCE_SCHEMA_VERSION};
pub use report::ReportError;
pub use scan::{collect_catalogs, run_scan, ScanOutcome, ScanSummary, SkippedItem};
pub use version::{Version, VersionError};
