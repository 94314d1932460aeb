//! Structural differences between rule snapshots.
//!
//! Rules have no stable identity across edits, so a rule *is* its structural tuple
//! ([`RuleKey`]): range, kind, operator and operands. Comparison uses set semantics on those
//! tuples, which means a range change shows up as one removal plus one addition. Formulas are
//! the exception: they are keyed by cell, so an edited formula is a change.

use std::collections::{BTreeSet, HashSet};

use rulescan_xlsx::{RuleKey, WorksheetRules};
use serde::Serialize;

use crate::catalog::{Presence, RuleCatalog, VersionSnapshot};
use crate::version::Version;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiffCounts {
    pub formula_added: usize,
    pub formula_removed: usize,
    pub formula_changed: usize,
    pub dv_added: usize,
    pub dv_removed: usize,
    pub cf_added: usize,
    pub cf_removed: usize,
}

impl DiffCounts {
    pub fn is_zero(&self) -> bool {
        *self == DiffCounts::default()
    }
}

fn set_delta(reference: &HashSet<RuleKey>, current: &HashSet<RuleKey>) -> (usize, usize) {
    (
        current.difference(reference).count(),
        reference.difference(current).count(),
    )
}

/// Compare `current` against `reference`. "Added" means present in `current` only.
pub fn diff_rules(reference: &WorksheetRules, current: &WorksheetRules) -> DiffCounts {
    let mut counts = DiffCounts::default();

    for (cell, formula) in &current.formulas {
        match reference.formulas.get(cell) {
            None => counts.formula_added += 1,
            Some(previous) if previous.formula != formula.formula => counts.formula_changed += 1,
            Some(_) => {}
        }
    }
    counts.formula_removed = reference
        .formulas
        .keys()
        .filter(|cell| !current.formulas.contains_key(cell))
        .count();

    let dv_reference: HashSet<RuleKey> = reference.data_validations.iter().map(|r| r.key()).collect();
    let dv_current: HashSet<RuleKey> = current.data_validations.iter().map(|r| r.key()).collect();
    (counts.dv_added, counts.dv_removed) = set_delta(&dv_reference, &dv_current);

    let cf_reference: HashSet<RuleKey> =
        reference.conditional_formats.iter().map(|r| r.key()).collect();
    let cf_current: HashSet<RuleKey> = current.conditional_formats.iter().map(|r| r.key()).collect();
    (counts.cf_added, counts.cf_removed) = set_delta(&cf_reference, &cf_current);

    counts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Compared against the newest version.
    Baseline,
    /// Compared against the immediately preceding version.
    Prior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Compared,
    /// The sheet exists in the compared version but not in the reference.
    AbsentInReference,
    /// The sheet exists in the reference but not in the compared version.
    AbsentInCurrent,
    /// One side declares the sheet but its part could not be read.
    Unreadable,
}

impl DiffStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DiffStatus::Compared => "compared",
            DiffStatus::AbsentInReference => "absent_in_reference",
            DiffStatus::AbsentInCurrent => "absent_in_current",
            DiffStatus::Unreadable => "unreadable",
        }
    }
}

/// One (sheet, version) comparison. Counters are only present for [`DiffStatus::Compared`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRecord {
    pub template: String,
    pub sheet: String,
    pub version: Version,
    pub reference: Version,
    pub reference_kind: ReferenceKind,
    pub status: DiffStatus,
    pub counts: Option<DiffCounts>,
}

fn compare_sheet(
    template: &str,
    sheet: &str,
    reference: &VersionSnapshot,
    current: &VersionSnapshot,
    reference_kind: ReferenceKind,
) -> Option<DiffRecord> {
    let (status, counts) = match (reference.presence(sheet), current.presence(sheet)) {
        (Presence::Absent, Presence::Absent) => return None,
        (Presence::Present(r), Presence::Present(c)) => {
            (DiffStatus::Compared, Some(diff_rules(&r.rules, &c.rules)))
        }
        (Presence::Unreadable, _) | (_, Presence::Unreadable) => (DiffStatus::Unreadable, None),
        (Presence::Absent, Presence::Present(_)) => (DiffStatus::AbsentInReference, None),
        (Presence::Present(_), Presence::Absent) => (DiffStatus::AbsentInCurrent, None),
    };
    Some(DiffRecord {
        template: template.to_string(),
        sheet: sheet.to_string(),
        version: current.version.clone(),
        reference: reference.version.clone(),
        reference_kind,
        status,
        counts,
    })
}

/// Every version (the baseline included) against the baseline, per sheet.
pub fn baseline_diffs(catalog: &RuleCatalog) -> Vec<DiffRecord> {
    let baseline = catalog.baseline();
    let sheets = catalog.sheet_names();
    let mut out = Vec::new();
    for sheet in &sheets {
        for current in catalog.versions() {
            out.extend(compare_sheet(
                catalog.template(),
                sheet,
                baseline,
                current,
                ReferenceKind::Baseline,
            ));
        }
    }
    out
}

/// Each version against its predecessor (v1→v2, v2→v3, ...), per sheet.
///
/// Unlike [`baseline_diffs`] this surfaces rules that disappear and later return.
pub fn adjacent_chain(catalog: &RuleCatalog) -> Vec<DiffRecord> {
    let sheets = catalog.sheet_names();
    let mut out = Vec::new();
    for sheet in &sheets {
        for pair in catalog.versions().windows(2) {
            out.extend(compare_sheet(
                catalog.template(),
                sheet,
                &pair[0],
                &pair[1],
                ReferenceKind::Prior,
            ));
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeChange {
    Added,
    Removed,
}

impl RangeChange {
    pub fn as_str(self) -> &'static str {
        match self {
            RangeChange::Added => "added",
            RangeChange::Removed => "removed",
        }
    }
}

/// A CF target range that appeared or disappeared between two adjacent versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeDrift {
    pub template: String,
    pub sheet: String,
    pub from: Version,
    pub to: Version,
    pub change: RangeChange,
    pub range: String,
}

/// CF range drift along the adjacent chain, for sheets readable on both sides.
pub fn cf_range_drift(catalog: &RuleCatalog) -> Vec<RangeDrift> {
    let sheets = catalog.sheet_names();
    let mut out = Vec::new();
    for sheet in &sheets {
        for pair in catalog.versions().windows(2) {
            let (Presence::Present(from), Presence::Present(to)) =
                (pair[0].presence(sheet), pair[1].presence(sheet))
            else {
                continue;
            };
            let ranges = |rules: &WorksheetRules| -> BTreeSet<String> {
                rules
                    .conditional_formats
                    .iter()
                    .map(|r| r.range.clone())
                    .collect()
            };
            let before = ranges(&from.rules);
            let after = ranges(&to.rules);
            let record = |change, range: &String| RangeDrift {
                template: catalog.template().to_string(),
                sheet: sheet.to_string(),
                from: pair[0].version.clone(),
                to: pair[1].version.clone(),
                change,
                range: range.clone(),
            };
            out.extend(after.difference(&before).map(|r| record(RangeChange::Added, r)));
            out.extend(before.difference(&after).map(|r| record(RangeChange::Removed, r)));
        }
    }
    out
}
