//! Tabular outputs of a scan.
//!
//! Per template family (file names use the lowercased template name):
//! `_rule_catalog_{formulas,dv,cf}.csv`, `_rules_summary.csv`, `_sheet_list.csv`,
//! `_sheet_diff_summary.csv`, `_sheet_diff_chain.csv` and, when extension CF is present,
//! `_cf_extension_warnings.csv`, plus tab-separated per-sheet dumps under
//! `analysis_<template>_<sheet>/`. The XML CF family (`xml-cf-report.jsonl`,
//! `xml-cf-report-summary.csv`, `_cf_range_drift.csv`, `_cf_review_flags.csv`) can be skipped.
//! Every table starts with its header row, also when it has no data rows.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use rulescan_xlsx::CfRule;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::{Metric, Presence, RuleCatalog};
use crate::diff::{
    adjacent_chain, baseline_diffs, cf_range_drift, DiffCounts, DiffRecord, ReferenceKind,
};
use crate::discovery::ExcludedFile;
use crate::evidence::{write_evidence, EvidenceError, EvidenceRecord};
use crate::scan::SkippedItem;
use crate::version::Version;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("write {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("write {path}: {source}")]
    Evidence {
        path: PathBuf,
        #[source]
        source: EvidenceError,
    },
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn template_file(out_dir: &Path, template: &str, suffix: &str) -> PathBuf {
    out_dir.join(format!("{}_{suffix}.csv", template.to_lowercase()))
}

/// Rows with a fixed column set. `HEADER` lists the serialized field names in order.
trait Row: Serialize {
    const HEADER: &'static [&'static str];
}

/// Open a delimited writer and write `header`, so an empty table still names its columns.
fn open_table(
    path: &Path,
    delimiter: u8,
    header: &[impl AsRef<str>],
) -> Result<csv::Writer<File>, ReportError> {
    let csv_err = |source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .from_path(path)
        .map_err(csv_err)?;
    writer
        .write_record(header.iter().map(|h| h.as_ref()))
        .map_err(csv_err)?;
    Ok(writer)
}

fn write_delimited<T: Serialize>(
    path: &Path,
    delimiter: u8,
    header: &[impl AsRef<str>],
    rows: impl IntoIterator<Item = T>,
) -> Result<PathBuf, ReportError> {
    let mut writer = open_table(path, delimiter, header)?;
    for row in rows {
        writer.serialize(row).map_err(|source| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    }
    writer.flush().map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}

/// A CSV whose columns depend on the data (versions, templates); rows are plain records.
fn write_rows(
    path: &Path,
    header: &[String],
    rows: impl IntoIterator<Item = Vec<String>>,
) -> Result<PathBuf, ReportError> {
    write_delimited(path, b',', header, rows)
}

fn write_table<T: Row>(
    path: &Path,
    rows: impl IntoIterator<Item = T>,
) -> Result<PathBuf, ReportError> {
    write_delimited(path, b',', T::HEADER, rows)
}

fn write_tsv<T: Row>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<PathBuf, ReportError> {
    write_delimited(path, b'\t', T::HEADER, rows)
}

#[derive(Serialize)]
struct FormulaRow<'a> {
    version: &'a str,
    sheet: &'a str,
    cell: String,
    formula: &'a str,
}

impl Row for FormulaRow<'_> {
    const HEADER: &'static [&'static str] = &["version", "sheet", "cell", "formula"];
}

#[derive(Serialize)]
struct DvRow<'a> {
    version: &'a str,
    sheet: &'a str,
    range: &'a str,
    source: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    operator: &'a str,
    #[serde(rename = "allowBlank")]
    allow_blank: &'static str,
    #[serde(rename = "showErrorMessage")]
    show_error_message: &'static str,
    #[serde(rename = "showInputMessage")]
    show_input_message: &'static str,
    #[serde(rename = "errorTitle")]
    error_title: &'a str,
    error: &'a str,
    #[serde(rename = "promptTitle")]
    prompt_title: &'a str,
    prompt: &'a str,
    formula1: &'a str,
    formula2: &'a str,
}

impl Row for DvRow<'_> {
    const HEADER: &'static [&'static str] = &[
        "version",
        "sheet",
        "range",
        "source",
        "type",
        "operator",
        "allowBlank",
        "showErrorMessage",
        "showInputMessage",
        "errorTitle",
        "error",
        "promptTitle",
        "prompt",
        "formula1",
        "formula2",
    ];
}

#[derive(Serialize)]
struct CfRow<'a> {
    version: &'a str,
    sheet: &'a str,
    range: &'a str,
    source: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    operator: &'a str,
    priority: String,
    style_ref: &'a str,
    formulas: String,
}

impl Row for CfRow<'_> {
    const HEADER: &'static [&'static str] = &[
        "version",
        "sheet",
        "range",
        "source",
        "type",
        "operator",
        "priority",
        "style_ref",
        "formulas",
    ];
}

#[derive(Serialize)]
struct TemplateSheetRow<'a> {
    template: &'a str,
    version: &'a str,
    sheet: &'a str,
    note: &'static str,
}

impl Row for TemplateSheetRow<'_> {
    const HEADER: &'static [&'static str] = &["template", "version", "sheet", "note"];
}

#[derive(Serialize)]
struct RangeRow<'a> {
    template: &'a str,
    version: &'a str,
    sheet: &'a str,
    range: &'a str,
}

impl Row for RangeRow<'_> {
    const HEADER: &'static [&'static str] = &["template", "version", "sheet", "range"];
}

#[derive(Serialize)]
struct DriftRow<'a> {
    template: &'a str,
    sheet: &'a str,
    from_version: &'a str,
    to_version: &'a str,
    change: &'static str,
    range: &'a str,
}

impl Row for DriftRow<'_> {
    const HEADER: &'static [&'static str] = &[
        "template",
        "sheet",
        "from_version",
        "to_version",
        "change",
        "range",
    ];
}

#[derive(Serialize)]
struct RuleCountRow<'a> {
    template: &'a str,
    version: &'a str,
    sheet: &'a str,
    source: &'a str,
    rule_count: usize,
}

impl Row for RuleCountRow<'_> {
    const HEADER: &'static [&'static str] = &["template", "version", "sheet", "source", "rule_count"];
}

#[derive(Serialize)]
struct SkippedRow<'a> {
    path: String,
    sheet: &'a str,
    error_class: &'a str,
    message: &'a str,
}

impl Row for SkippedRow<'_> {
    const HEADER: &'static [&'static str] = &["path", "sheet", "error_class", "message"];
}

#[derive(Serialize)]
struct ExcludedRow<'a> {
    path: String,
    reason: &'a str,
}

impl Row for ExcludedRow<'_> {
    const HEADER: &'static [&'static str] = &["path", "reason"];
}

/// Per-sheet dumps: one file per (template, sheet, version), so no identity columns.
#[derive(Serialize)]
struct SheetFormulaRow<'a> {
    cell: String,
    formula: &'a str,
}

impl Row for SheetFormulaRow<'_> {
    const HEADER: &'static [&'static str] = &["cell", "formula"];
}

#[derive(Serialize)]
struct SheetDvRow<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    operator: &'a str,
    #[serde(rename = "allowBlank")]
    allow_blank: &'static str,
    #[serde(rename = "showErrorMessage")]
    show_error_message: &'static str,
    #[serde(rename = "showInputMessage")]
    show_input_message: &'static str,
    #[serde(rename = "errorTitle")]
    error_title: &'a str,
    error: &'a str,
    #[serde(rename = "promptTitle")]
    prompt_title: &'a str,
    prompt: &'a str,
    formula1: &'a str,
    formula2: &'a str,
    sqref: &'a str,
}

impl Row for SheetDvRow<'_> {
    const HEADER: &'static [&'static str] = &[
        "type",
        "operator",
        "allowBlank",
        "showErrorMessage",
        "showInputMessage",
        "errorTitle",
        "error",
        "promptTitle",
        "prompt",
        "formula1",
        "formula2",
        "sqref",
    ];
}

#[derive(Serialize)]
struct SheetCfRow<'a> {
    sqref: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    operator: &'a str,
    #[serde(rename = "dxfId")]
    style_ref: &'a str,
    formulas: String,
}

impl Row for SheetCfRow<'_> {
    const HEADER: &'static [&'static str] = &["sqref", "type", "operator", "dxfId", "formulas"];
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

/// The parsed priority, or the attribute text when it was not a number.
fn priority_text(cf: &CfRule) -> String {
    match (cf.priority, &cf.priority_raw) {
        (Some(priority), _) => priority.to_string(),
        (None, raw) => opt(raw).to_string(),
    }
}

/// Lowercase, runs of anything but `[a-z0-9]` collapsed to `_`, trimmed; `sheet` if empty.
fn sanitize_sheet(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        "sheet".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Diff rows: identity columns followed by the seven counters, empty when not compared.
fn diff_records(records: &[DiffRecord], header: &[&str]) -> (Vec<String>, Vec<Vec<String>>) {
    let header = header
        .iter()
        .map(|h| h.to_string())
        .chain(
            [
                "formula_added",
                "formula_removed",
                "formula_changed",
                "dv_added",
                "dv_removed",
                "cf_added",
                "cf_removed",
            ]
            .into_iter()
            .map(String::from),
        )
        .collect();
    let rows = records
        .iter()
        .map(|record| {
            // Baseline rows lead with the compared version; chain rows read from → to.
            let (first, second) = match record.reference_kind {
                ReferenceKind::Baseline => (&record.version, &record.reference),
                ReferenceKind::Prior => (&record.reference, &record.version),
            };
            let mut row = vec![
                record.sheet.clone(),
                first.to_string(),
                second.to_string(),
                record.status.as_str().to_string(),
            ];
            row.extend(counter_cells(record.counts));
            row
        })
        .collect();
    (header, rows)
}

fn counter_cells(counts: Option<DiffCounts>) -> Vec<String> {
    match counts {
        Some(c) => [
            c.formula_added,
            c.formula_removed,
            c.formula_changed,
            c.dv_added,
            c.dv_removed,
            c.cf_added,
            c.cf_removed,
        ]
        .iter()
        .map(|n| n.to_string())
        .collect(),
        None => vec![String::new(); 7],
    }
}

/// Tab-separated dumps of each readable sheet, one folder per sheet:
/// `analysis_<template>_<sheet>/<version>.{formulas,dv,cf}.tsv`.
fn write_sheet_dumps(out_dir: &Path, catalog: &RuleCatalog) -> Result<Vec<PathBuf>, ReportError> {
    let template = catalog.template().to_lowercase();
    let mut written = Vec::new();
    let mut owners: BTreeMap<String, &str> = BTreeMap::new();

    for snapshot in catalog.versions() {
        for (sheet, snap) in snapshot.present_sheets() {
            let dir_name = format!("analysis_{template}_{}", sanitize_sheet(sheet));
            match owners.get(&dir_name) {
                Some(owner) if *owner != sheet => log::warn!(
                    "{}: sheets {owner:?} and {sheet:?} share the dump folder {dir_name}",
                    catalog.template()
                ),
                Some(_) => {}
                None => {
                    owners.insert(dir_name.clone(), sheet);
                }
            }

            let dir = out_dir.join(&dir_name);
            fs::create_dir_all(&dir).map_err(|source| ReportError::Io {
                path: dir.clone(),
                source,
            })?;
            let version = snapshot.version.as_str();
            let rules = &snap.rules;

            let rows = rules.formulas.iter().map(|(cell, f)| SheetFormulaRow {
                cell: cell.to_a1(),
                formula: &f.formula,
            });
            written.push(write_tsv(&dir.join(format!("{version}.formulas.tsv")), rows)?);

            let rows = rules.data_validations.iter().map(|dv| SheetDvRow {
                kind: dv.kind.raw(),
                operator: opt(&dv.operator),
                allow_blank: flag(dv.allow_blank),
                show_error_message: flag(dv.show_error_message),
                show_input_message: flag(dv.show_input_message),
                error_title: opt(&dv.error_title),
                error: opt(&dv.error),
                prompt_title: opt(&dv.prompt_title),
                prompt: opt(&dv.prompt),
                formula1: opt(&dv.formula1),
                formula2: opt(&dv.formula2),
                sqref: &dv.range,
            });
            written.push(write_tsv(&dir.join(format!("{version}.dv.tsv")), rows)?);

            let rows = rules.conditional_formats.iter().map(|cf| SheetCfRow {
                sqref: &cf.range,
                kind: cf.kind.raw(),
                operator: opt(&cf.operator),
                style_ref: opt(&cf.style_ref),
                formulas: cf.formulas.join("|"),
            });
            written.push(write_tsv(&dir.join(format!("{version}.cf.tsv")), rows)?);
        }
    }
    Ok(written)
}

/// Write every per-template table for `catalog` into `out_dir`. Returns the files written.
pub fn write_template_reports(
    out_dir: &Path,
    catalog: &RuleCatalog,
    include_xml_cf: bool,
) -> Result<Vec<PathBuf>, ReportError> {
    let template = catalog.template();
    let mut written = Vec::new();

    let formulas = catalog.versions().iter().flat_map(|snapshot| {
        snapshot.present_sheets().flat_map(move |(sheet, snap)| {
            snap.rules.formulas.iter().map(move |(cell, f)| FormulaRow {
                version: snapshot.version.as_str(),
                sheet,
                cell: cell.to_a1(),
                formula: &f.formula,
            })
        })
    });
    written.push(write_table(
        &template_file(out_dir, template, "rule_catalog_formulas"),
        formulas,
    )?);

    let dvs = catalog.versions().iter().flat_map(|snapshot| {
        snapshot.present_sheets().flat_map(move |(sheet, snap)| {
            snap.rules.data_validations.iter().map(move |dv| DvRow {
                version: snapshot.version.as_str(),
                sheet,
                range: &dv.range,
                source: dv.source.as_str(),
                kind: dv.kind.raw(),
                operator: opt(&dv.operator),
                allow_blank: flag(dv.allow_blank),
                show_error_message: flag(dv.show_error_message),
                show_input_message: flag(dv.show_input_message),
                error_title: opt(&dv.error_title),
                error: opt(&dv.error),
                prompt_title: opt(&dv.prompt_title),
                prompt: opt(&dv.prompt),
                formula1: opt(&dv.formula1),
                formula2: opt(&dv.formula2),
            })
        })
    });
    written.push(write_table(
        &template_file(out_dir, template, "rule_catalog_dv"),
        dvs,
    )?);

    let cfs = catalog.versions().iter().flat_map(|snapshot| {
        snapshot.present_sheets().flat_map(move |(sheet, snap)| {
            snap.rules.conditional_formats.iter().map(move |cf| CfRow {
                version: snapshot.version.as_str(),
                sheet,
                range: &cf.range,
                source: cf.source.as_str(),
                kind: cf.kind.raw(),
                operator: opt(&cf.operator),
                priority: priority_text(cf),
                style_ref: opt(&cf.style_ref),
                formulas: cf.formulas.join("|"),
            })
        })
    });
    written.push(write_table(
        &template_file(out_dir, template, "rule_catalog_cf"),
        cfs,
    )?);

    written.extend(write_sheet_dumps(out_dir, catalog)?);

    let extension_sheets = catalog.extension_cf_sheets();
    if !extension_sheets.is_empty() {
        let rows = extension_sheets
            .iter()
            .map(|(version, sheet)| TemplateSheetRow {
                template,
                version: version.as_str(),
                sheet,
                note: "cf_extension_detected",
            });
        written.push(write_table(
            &template_file(out_dir, template, "cf_extension_warnings"),
            rows,
        )?);
    }

    // Sheet list of the baseline.
    let baseline = catalog.baseline();
    let header = vec![
        "sheet".to_string(),
        format!("state_{}", baseline.version),
    ];
    let rows = baseline
        .sheets
        .iter()
        .map(|(name, entry)| vec![name.clone(), entry.state().as_str().to_string()]);
    written.push(write_rows(
        &template_file(out_dir, template, "sheet_list"),
        &header,
        rows,
    )?);

    // Metrics pivot; absent and unreadable sheets stay empty.
    let mut header = vec!["sheet".to_string(), "metric".to_string()];
    header.extend(catalog.versions().iter().map(|v| v.version.to_string()));
    let mut rows = Vec::new();
    for sheet in catalog.sheet_names() {
        for metric in Metric::ALL {
            let mut row = vec![sheet.to_string(), metric.as_str().to_string()];
            row.extend(catalog.versions().iter().map(|snapshot| {
                snapshot
                    .metric(sheet, metric)
                    .map(|n| n.to_string())
                    .unwrap_or_default()
            }));
            rows.push(row);
        }
    }
    written.push(write_rows(
        &template_file(out_dir, template, "rules_summary"),
        &header,
        rows,
    )?);

    let (header, rows) = diff_records(
        &baseline_diffs(catalog),
        &["sheet", "version", "baseline", "status"],
    );
    written.push(write_rows(
        &template_file(out_dir, template, "sheet_diff_summary"),
        &header,
        rows,
    )?);

    let (header, rows) = diff_records(
        &adjacent_chain(catalog),
        &["sheet", "from_version", "to_version", "status"],
    );
    written.push(write_rows(
        &template_file(out_dir, template, "sheet_diff_chain"),
        &header,
        rows,
    )?);

    if include_xml_cf {
        let drift = cf_range_drift(catalog);
        let rows = drift.iter().map(|d| DriftRow {
            template,
            sheet: &d.sheet,
            from_version: d.from.as_str(),
            to_version: d.to.as_str(),
            change: d.change.as_str(),
            range: &d.range,
        });
        written.push(write_table(
            &template_file(out_dir, template, "cf_range_drift"),
            rows,
        )?);

        let flags = catalog.mixed_source_ranges();
        let rows = flags.iter().map(|f| RangeRow {
            template,
            version: f.version.as_str(),
            sheet: &f.sheet,
            range: &f.range,
        });
        written.push(write_table(
            &template_file(out_dir, template, "cf_review_flags"),
            rows,
        )?);
    }

    Ok(written)
}

/// Baseline sheet states and metrics side by side for every template family.
pub fn write_cross_template_reports(
    out_dir: &Path,
    catalogs: &[RuleCatalog],
) -> Result<Vec<PathBuf>, ReportError> {
    let mut catalogs: Vec<&RuleCatalog> = catalogs.iter().collect();
    catalogs.sort_by(|a, b| a.template().cmp(b.template()));

    let mut sheets: Vec<&str> = catalogs
        .iter()
        .flat_map(|c| c.baseline().sheets.iter().map(|(name, _)| name.as_str()))
        .collect();
    sheets.sort_unstable();
    sheets.dedup();

    let mut written = Vec::new();

    let mut header = vec!["sheet".to_string()];
    header.extend(
        catalogs
            .iter()
            .map(|c| format!("{}_state", c.template().to_lowercase())),
    );
    let rows = sheets.iter().map(|sheet| {
        let mut row = vec![sheet.to_string()];
        row.extend(catalogs.iter().map(|c| {
            c.baseline()
                .sheet(sheet)
                .map(|entry| entry.state().as_str().to_string())
                .unwrap_or_default()
        }));
        row
    });
    written.push(write_rows(
        &out_dir.join("cross_template_sheet_presence.csv"),
        &header,
        rows,
    )?);

    let mut header = vec!["sheet".to_string(), "metric".to_string()];
    header.extend(catalogs.iter().map(|c| {
        format!(
            "{}_{}",
            c.template().to_lowercase(),
            c.baseline().version
        )
    }));
    let mut rows = Vec::new();
    for sheet in &sheets {
        for metric in Metric::ALL {
            let mut row = vec![sheet.to_string(), metric.as_str().to_string()];
            row.extend(catalogs.iter().map(|c| {
                c.baseline()
                    .metric(sheet, metric)
                    .map(|n| n.to_string())
                    .unwrap_or_default()
            }));
            rows.push(row);
        }
    }
    written.push(write_rows(
        &out_dir.join("cross_template_metrics_baseline.csv"),
        &header,
        rows,
    )?);

    const COMPARED: [Metric; 3] = [
        Metric::FormulaDefs,
        Metric::DataValidations,
        Metric::ConditionalFormats,
    ];
    let baseline_metric = |c: &RuleCatalog, sheet: &str, metric: Metric| {
        c.baseline()
            .metric(sheet, metric)
            .map(|n| n.to_string())
            .unwrap_or_default()
    };

    let mut header = vec!["sheet".to_string(), "metric".to_string()];
    header.extend(catalogs.iter().map(|c| c.template().to_lowercase()));
    let mut rows = Vec::new();
    for sheet in &sheets {
        for metric in COMPARED {
            let mut row = vec![sheet.to_string(), metric.as_str().to_string()];
            row.extend(catalogs.iter().map(|&c| baseline_metric(c, *sheet, metric)));
            rows.push(row);
        }
    }
    written.push(write_rows(
        &out_dir.join("cross_template_diff_highlights.csv"),
        &header,
        rows,
    )?);

    // One row per sheet: states, then each compared metric across templates, then notes.
    let mut header = vec!["sheet".to_string()];
    header.extend(
        catalogs
            .iter()
            .map(|c| format!("{}_state", c.template().to_lowercase())),
    );
    for metric in COMPARED {
        header.extend(
            catalogs
                .iter()
                .map(|c| format!("{}_{}", c.template().to_lowercase(), metric.as_str())),
        );
    }
    header.push("notes".to_string());
    let rows = sheets.iter().map(|sheet| {
        let mut row = vec![sheet.to_string()];
        row.extend(catalogs.iter().map(|c| {
            c.baseline()
                .sheet(sheet)
                .map(|entry| entry.state().as_str().to_string())
                .unwrap_or_default()
        }));
        for metric in COMPARED {
            row.extend(catalogs.iter().map(|&c| baseline_metric(c, *sheet, metric)));
        }
        row.push(presence_notes(&catalogs, sheet));
        row
    });
    written.push(write_rows(
        &out_dir.join("cross_template_diff_report.csv"),
        &header,
        rows,
    )?);

    Ok(written)
}

/// `absent: a|b; unreadable: c` for the baselines that lack a readable `sheet`.
fn presence_notes(catalogs: &[&RuleCatalog], sheet: &str) -> String {
    let mut absent = Vec::new();
    let mut unreadable = Vec::new();
    for catalog in catalogs {
        match catalog.baseline().presence(sheet) {
            Presence::Absent => absent.push(catalog.template().to_lowercase()),
            Presence::Unreadable => unreadable.push(catalog.template().to_lowercase()),
            Presence::Present(_) => {}
        }
    }
    let mut notes = Vec::new();
    if !absent.is_empty() {
        notes.push(format!("absent: {}", absent.join("|")));
    }
    if !unreadable.is_empty() {
        notes.push(format!("unreadable: {}", unreadable.join("|")));
    }
    notes.join("; ")
}

/// CF evidence for every template as JSON Lines, plus per-(template, version, sheet, source)
/// rule counts.
pub fn write_cf_evidence(
    out_dir: &Path,
    catalogs: &[RuleCatalog],
) -> Result<Vec<PathBuf>, ReportError> {
    let mut records = Vec::new();
    let mut counts: BTreeMap<(String, Version, String, &'static str), usize> = BTreeMap::new();
    for catalog in catalogs {
        for snapshot in catalog.versions() {
            for (sheet, snap) in snapshot.present_sheets() {
                for rule in &snap.rules.conditional_formats {
                    records.push(EvidenceRecord::from_rule(
                        catalog.template(),
                        &snapshot.version,
                        sheet,
                        rule,
                    ));
                    *counts
                        .entry((
                            catalog.template().to_string(),
                            snapshot.version.clone(),
                            sheet.to_string(),
                            rule.source.as_str(),
                        ))
                        .or_default() += 1;
                }
            }
        }
    }

    let jsonl = out_dir.join("xml-cf-report.jsonl");
    let file = File::create(&jsonl).map_err(|source| ReportError::Io {
        path: jsonl.clone(),
        source,
    })?;
    let count = write_evidence(BufWriter::new(file), &records).map_err(|source| {
        ReportError::Evidence {
            path: jsonl.clone(),
            source,
        }
    })?;
    log::info!("wrote {count} CF evidence records to {}", jsonl.display());

    let rows = counts
        .iter()
        .map(|((template, version, sheet, source), n)| RuleCountRow {
            template,
            version: version.as_str(),
            sheet,
            source,
            rule_count: *n,
        });
    let summary = write_table(&out_dir.join("xml-cf-report-summary.csv"), rows)?;

    Ok(vec![jsonl, summary])
}

pub fn write_skipped(
    out_dir: &Path,
    skipped: &[SkippedItem],
    excluded: &[ExcludedFile],
) -> Result<Vec<PathBuf>, ReportError> {
    let rows = skipped.iter().map(|item| SkippedRow {
        path: item.path.display().to_string(),
        sheet: item.sheet.as_deref().unwrap_or_default(),
        error_class: &item.error_class,
        message: &item.message,
    });
    let skipped_path = write_table(&out_dir.join("skipped.csv"), rows)?;

    let rows = excluded.iter().map(|file| ExcludedRow {
        path: file.path.display().to_string(),
        reason: &file.reason,
    });
    let excluded_path = write_table(&out_dir.join("excluded.csv"), rows)?;

    Ok(vec![skipped_path, excluded_path])
}
