//! Scan driver: discovery, per-file extraction, catalogs, reports.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rulescan_xlsx::{extract_workbook_rules, RulesError, WorkbookExtraction};

use crate::catalog::{error_message, CatalogBuilder, RuleCatalog};
use crate::config::ScanConfig;
use crate::discovery::{discover_templates, DiscoveryError, ExcludedFile, TemplateFile};
use crate::report;

/// A file or a single sheet that could not be read. `sheet` is `None` when the whole
/// package was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub path: PathBuf,
    pub sheet: Option<String>,
    pub error_class: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ScanOutcome {
    /// One catalog per template family with at least one readable version, by name.
    pub catalogs: Vec<RuleCatalog>,
    pub excluded: Vec<ExcludedFile>,
    pub skipped: Vec<SkippedItem>,
    pub files_scanned: usize,
}

#[derive(Debug)]
pub struct ScanSummary {
    pub templates: usize,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub sheets_skipped: usize,
    pub reports: Vec<PathBuf>,
}

type Extracted<'a> = (&'a TemplateFile, Result<WorkbookExtraction, RulesError>);

fn extract_files<'a>(files: &[&'a TemplateFile], parallel: bool) -> Vec<Extracted<'a>> {
    #[cfg(feature = "parallel")]
    if parallel {
        use rayon::prelude::*;
        // `collect` keeps input order.
        return files
            .par_iter()
            .map(|file| (*file, extract_workbook_rules(&file.path)))
            .collect();
    }
    #[cfg(not(feature = "parallel"))]
    if parallel {
        log::warn!("built without the `parallel` feature; extracting sequentially");
    }

    files
        .iter()
        .map(|file| (*file, extract_workbook_rules(&file.path)))
        .collect()
}

/// Discover and extract every template version under `config.template_root`.
///
/// Package-level failures skip the file; sheet-level failures skip only that sheet, which
/// stays in its catalog as unreadable.
pub fn collect_catalogs(config: &ScanConfig) -> Result<ScanOutcome, DiscoveryError> {
    let discovery = discover_templates(&config.template_root)?;
    log::info!(
        "found {} template file(s) in {} family(ies); {} excluded",
        discovery.file_count(),
        discovery.templates.len(),
        discovery.excluded.len()
    );

    let files: Vec<&TemplateFile> = discovery.templates.values().flatten().collect();
    let extracted = extract_files(&files, config.parallel);

    let mut skipped = Vec::new();
    let mut builders: BTreeMap<&str, CatalogBuilder> = BTreeMap::new();
    for (file, result) in extracted {
        let extraction = match result {
            Ok(extraction) => extraction,
            Err(err) => {
                log::warn!("skipping {}: {err}", file.path.display());
                skipped.push(SkippedItem {
                    path: file.path.clone(),
                    sheet: None,
                    error_class: err.class().to_string(),
                    message: error_message(&err),
                });
                continue;
            }
        };

        for sheet in &extraction.sheets {
            if let Err(err) = &sheet.rules {
                skipped.push(SkippedItem {
                    path: file.path.clone(),
                    sheet: Some(sheet.sheet.name.clone()),
                    error_class: err.class().to_string(),
                    message: error_message(err),
                });
            }
        }

        builders
            .entry(file.template.as_str())
            .or_insert_with(|| CatalogBuilder::new(file.template.clone()))
            .add_version(file.version.clone(), file.path.clone(), extraction);
    }

    for template in discovery.templates.keys() {
        if !builders.contains_key(template.as_str()) {
            log::warn!("template {template}: no readable versions");
        }
    }

    Ok(ScanOutcome {
        catalogs: builders
            .into_values()
            .filter_map(CatalogBuilder::build)
            .collect(),
        excluded: discovery.excluded,
        skipped,
        files_scanned: files.len(),
    })
}

/// Run a full scan and write every report into `config.out_dir`.
pub fn run_scan(config: &ScanConfig) -> Result<ScanSummary> {
    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("create output directory {}", config.out_dir.display()))?;

    let outcome = collect_catalogs(config)
        .with_context(|| format!("discover templates under {}", config.template_root.display()))?;

    let mut reports = Vec::new();
    for catalog in &outcome.catalogs {
        log::info!(
            "{}: {} version(s), baseline {}",
            catalog.template(),
            catalog.versions().len(),
            catalog.baseline().version
        );
        reports.extend(
            report::write_template_reports(&config.out_dir, catalog, !config.skip_xml_cf)
                .with_context(|| format!("write reports for {}", catalog.template()))?,
        );
    }

    if !outcome.catalogs.is_empty() {
        reports.extend(
            report::write_cross_template_reports(&config.out_dir, &outcome.catalogs)
                .context("write cross-template reports")?,
        );
    }

    if config.skip_xml_cf {
        log::info!("skipping XML CF evidence");
    } else {
        reports.extend(
            report::write_cf_evidence(&config.out_dir, &outcome.catalogs)
                .context("write CF evidence")?,
        );
    }

    reports.extend(
        report::write_skipped(&config.out_dir, &outcome.skipped, &outcome.excluded)
            .context("write skipped files")?,
    );

    let files_skipped = outcome.skipped.iter().filter(|s| s.sheet.is_none()).count();
    let summary = ScanSummary {
        templates: outcome.catalogs.len(),
        files_scanned: outcome.files_scanned,
        files_skipped,
        sheets_skipped: outcome.skipped.len() - files_skipped,
        reports,
    };
    log::info!(
        "scanned {} file(s) across {} template(s); {} file(s) and {} sheet(s) skipped",
        summary.files_scanned,
        summary.templates,
        summary.files_skipped,
        summary.sheets_skipped
    );
    Ok(summary)
}
