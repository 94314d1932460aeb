//! Per-template rule catalog: every version's sheets, oldest to newest.
//!
//! A sheet name that a version does not declare is *absent*. That is different from a sheet
//! that is declared but carries no rules, and it never counts as zero in metrics or diffs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use rulescan_xlsx::{RuleSource, RulesError, SheetState, WorkbookExtraction, WorksheetRules};

use crate::version::Version;

/// A declared sheet whose worksheet part parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSnapshot {
    pub state: SheetState,
    pub part: String,
    pub rules: WorksheetRules,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetEntry {
    Present(SheetSnapshot),
    /// Declared, but its worksheet part could not be read.
    Unreadable {
        state: SheetState,
        part: String,
        error_class: &'static str,
        message: String,
    },
}

impl SheetEntry {
    pub fn state(&self) -> SheetState {
        match self {
            SheetEntry::Present(snapshot) => snapshot.state,
            SheetEntry::Unreadable { state, .. } => *state,
        }
    }
}

/// How a sheet name relates to one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence<'a> {
    Absent,
    Unreadable,
    Present(&'a SheetSnapshot),
}

#[derive(Debug, Clone)]
pub struct VersionSnapshot {
    pub version: Version,
    pub path: PathBuf,
    /// Declared sheets in workbook order.
    pub sheets: Vec<(String, SheetEntry)>,
}

impl VersionSnapshot {
    pub fn sheet(&self, name: &str) -> Option<&SheetEntry> {
        self.sheets
            .iter()
            .find(|(sheet, _)| sheet == name)
            .map(|(_, entry)| entry)
    }

    pub fn presence(&self, name: &str) -> Presence<'_> {
        match self.sheet(name) {
            None => Presence::Absent,
            Some(SheetEntry::Unreadable { .. }) => Presence::Unreadable,
            Some(SheetEntry::Present(snapshot)) => Presence::Present(snapshot),
        }
    }

    /// Metric value for a sheet; `None` when the sheet is absent or unreadable.
    pub fn metric(&self, sheet: &str, metric: Metric) -> Option<usize> {
        match self.presence(sheet) {
            Presence::Present(sheet) => Some(metric.measure(&sheet.rules)),
            Presence::Absent | Presence::Unreadable => None,
        }
    }

    pub fn present_sheets(&self) -> impl Iterator<Item = (&str, &SheetSnapshot)> {
        self.sheets.iter().filter_map(|(name, entry)| match entry {
            SheetEntry::Present(snapshot) => Some((name.as_str(), snapshot)),
            SheetEntry::Unreadable { .. } => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    FormulaCells,
    FormulaDefs,
    DataValidations,
    ConditionalFormats,
    CfStandard,
    CfExtension,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::FormulaCells,
        Metric::FormulaDefs,
        Metric::DataValidations,
        Metric::ConditionalFormats,
        Metric::CfStandard,
        Metric::CfExtension,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::FormulaCells => "formulaCells",
            Metric::FormulaDefs => "formulaDefs",
            Metric::DataValidations => "dataValidations",
            Metric::ConditionalFormats => "conditionalFormats",
            Metric::CfStandard => "cfStandard",
            Metric::CfExtension => "cfExtension",
        }
    }

    pub fn measure(self, rules: &WorksheetRules) -> usize {
        match self {
            Metric::FormulaCells => rules.formulas.len(),
            Metric::FormulaDefs => rules.distinct_formula_count(),
            Metric::DataValidations => rules.data_validations.len(),
            Metric::ConditionalFormats => rules.conditional_formats.len(),
            Metric::CfStandard => rules.standard_cf_count(),
            Metric::CfExtension => rules.extension_cf_count(),
        }
    }
}

/// A range on one sheet that carries CF rules from both the standard and the extension form.
///
/// The two forms are ordered independently, so their combined evaluation order on that range
/// needs a human to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixedSourceRange {
    pub version: Version,
    pub sheet: String,
    pub range: String,
}

/// Immutable snapshot of one template family for a single run.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    template: String,
    versions: Vec<VersionSnapshot>,
}

impl RuleCatalog {
    pub fn template(&self) -> &str {
        &self.template
    }

    /// All versions, oldest first.
    pub fn versions(&self) -> &[VersionSnapshot] {
        &self.versions
    }

    /// The newest version.
    pub fn baseline(&self) -> &VersionSnapshot {
        // `CatalogBuilder::build` refuses to produce an empty catalog.
        &self.versions[self.versions.len() - 1]
    }

    pub fn version(&self, version: &Version) -> Option<&VersionSnapshot> {
        self.versions.iter().find(|v| &v.version == version)
    }

    /// Every sheet name seen in any version: baseline sheets in workbook order first, then the
    /// rest as they are met walking back through older versions.
    pub fn sheet_names(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        let mut names = Vec::new();
        for snapshot in self.versions.iter().rev() {
            for (name, _) in &snapshot.sheets {
                if seen.insert(name.as_str()) {
                    names.push(name.as_str());
                }
            }
        }
        names
    }

    /// Sheets that carry at least one extension-form CF rule, per version.
    pub fn extension_cf_sheets(&self) -> Vec<(&Version, &str)> {
        self.versions
            .iter()
            .flat_map(|snapshot| {
                snapshot
                    .present_sheets()
                    .filter(|(_, sheet)| sheet.rules.extension_cf_count() > 0)
                    .map(move |(name, _)| (&snapshot.version, name))
            })
            .collect()
    }

    pub fn mixed_source_ranges(&self) -> Vec<MixedSourceRange> {
        let mut out = Vec::new();
        for snapshot in &self.versions {
            for (name, sheet) in snapshot.present_sheets() {
                let mut by_range: BTreeMap<&str, (bool, bool)> = BTreeMap::new();
                for rule in &sheet.rules.conditional_formats {
                    let seen = by_range.entry(rule.range.as_str()).or_default();
                    match rule.source {
                        RuleSource::Standard => seen.0 = true,
                        RuleSource::Extension { .. } => seen.1 = true,
                    }
                }
                out.extend(
                    by_range
                        .into_iter()
                        .filter(|(_, (standard, extension))| *standard && *extension)
                        .map(|(range, _)| MixedSourceRange {
                            version: snapshot.version.clone(),
                            sheet: name.to_string(),
                            range: range.to_string(),
                        }),
                );
            }
        }
        out
    }
}

/// Collects per-version extraction results and orders them into a [`RuleCatalog`].
#[derive(Debug)]
pub struct CatalogBuilder {
    template: String,
    versions: Vec<VersionSnapshot>,
}

impl CatalogBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            versions: Vec::new(),
        }
    }

    pub fn add_version(&mut self, version: Version, path: PathBuf, extraction: WorkbookExtraction) {
        let sheets = extraction
            .sheets
            .into_iter()
            .map(|extracted| {
                let state = extracted.sheet.state;
                let part = extracted.sheet.part;
                let entry = match extracted.rules {
                    Ok(rules) => SheetEntry::Present(SheetSnapshot { state, part, rules }),
                    Err(err) => SheetEntry::Unreadable {
                        state,
                        part,
                        error_class: err.class(),
                        message: error_message(&err),
                    },
                };
                (extracted.sheet.name, entry)
            })
            .collect();
        self.versions.push(VersionSnapshot {
            version,
            path,
            sheets,
        });
    }

    /// Order versions by their numeric tuple. `None` when no version was added.
    pub fn build(mut self) -> Option<RuleCatalog> {
        if self.versions.is_empty() {
            return None;
        }
        self.versions.sort_by(|a, b| a.version.cmp(&b.version));
        Some(RuleCatalog {
            template: self.template,
            versions: self.versions,
        })
    }
}

pub(crate) fn error_message(err: &RulesError) -> String {
    match err {
        RulesError::MalformedPart { part, source }
        | RulesError::MalformedWorkbook { part, source } => format!("{part}: {source}"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulescan_xlsx::{CfKind, CfRule, ExtractedSheet, SheetPart};

    fn sheet(name: &str, rules: WorksheetRules) -> ExtractedSheet {
        ExtractedSheet {
            sheet: SheetPart {
                name: name.to_string(),
                sheet_id: None,
                state: SheetState::Visible,
                part: format!("xl/worksheets/{}.xml", name.to_lowercase()),
            },
            rules: Ok(rules),
        }
    }

    fn cf(range: &str, source: RuleSource) -> CfRule {
        CfRule {
            range: range.to_string(),
            source,
            rule_index: 0,
            kind: CfKind::Expression,
            priority: Some(1),
            priority_raw: None,
            style_ref: None,
            operator: None,
            formulas: vec!["TRUE".to_string()],
            rule_id: None,
            linked_extension_id: None,
            payload: None,
        }
    }

    fn v(raw: &str) -> Version {
        Version::parse(raw).expect("version")
    }

    #[test]
    fn newest_version_is_baseline_and_absent_is_not_zero() {
        let mut builder = CatalogBuilder::new("CMRT");
        builder.add_version(
            v("6.10"),
            PathBuf::from("CMRT_6.10.xlsx"),
            WorkbookExtraction {
                sheets: vec![
                    sheet("Declaration", WorksheetRules::default()),
                    sheet("Checker", WorksheetRules::default()),
                ],
            },
        );
        builder.add_version(
            v("6.9"),
            PathBuf::from("CMRT_6.9.xlsx"),
            WorkbookExtraction {
                sheets: vec![sheet("Declaration", WorksheetRules::default())],
            },
        );
        let catalog = builder.build().expect("non-empty");

        assert_eq!(catalog.baseline().version.as_str(), "6.10");
        assert_eq!(catalog.sheet_names(), vec!["Declaration", "Checker"]);

        let older = &catalog.versions()[0];
        assert_eq!(older.presence("Checker"), Presence::Absent);
        assert_eq!(older.metric("Checker", Metric::ConditionalFormats), None);
        assert_eq!(older.metric("Declaration", Metric::ConditionalFormats), Some(0));
    }

    #[test]
    fn flags_ranges_with_both_sources() {
        let rules = WorksheetRules {
            conditional_formats: vec![
                cf("A1:A5", RuleSource::Standard),
                cf(
                    "A1:A5",
                    RuleSource::Extension {
                        uri: rulescan_xlsx::EXT_URI_X14_CONDITIONAL_FORMATTINGS.to_string(),
                    },
                ),
                cf("B1", RuleSource::Standard),
            ],
            ..WorksheetRules::default()
        };
        let mut builder = CatalogBuilder::new("EMRT");
        builder.add_version(
            v("1.0"),
            PathBuf::from("EMRT_1.0.xlsx"),
            WorkbookExtraction {
                sheets: vec![sheet("Declaration", rules)],
            },
        );
        let catalog = builder.build().expect("non-empty");

        let flags = catalog.mixed_source_ranges();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].range, "A1:A5");
        assert_eq!(catalog.extension_cf_sheets().len(), 1);
    }

    #[test]
    fn empty_builder_builds_nothing() {
        assert!(CatalogBuilder::new("X").build().is_none());
    }
}
