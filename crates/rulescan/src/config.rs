use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// Settings for one scan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Directory whose subdirectories are template families.
    pub template_root: PathBuf,
    /// Where every report is written. Created if missing.
    pub out_dir: PathBuf,
    /// Skip the CF evidence stream, its summary, range drift and review flags.
    pub skip_xml_cf: bool,
    /// Extract files on a thread pool. Only honored when built with the `parallel` feature.
    pub parallel: bool,
}

impl ScanConfig {
    pub fn new(template_root: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_root: template_root.into(),
            out_dir: out_dir.into(),
            skip_xml_cf: false,
            parallel: false,
        }
    }

    /// `<base>/scan-YYYY-MM-DD`.
    pub fn dated_out_dir(base: &Path, date: NaiveDate) -> PathBuf {
        base.join(format!("scan-{}", date.format("%Y-%m-%d")))
    }
}
