//! Conditional-formatting evidence stream (JSON Lines).
//!
//! One [`EvidenceRecord`] per rule per line. The stream is versioned through
//! `schema_version`; [`read_evidence`] is the consumer-side gate and rejects anything it does not
//! fully understand instead of guessing.

use std::io::{BufRead, Write};

use rulescan_xlsx::{CfPayload, CfRule, CfVisual};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::Version;

pub const EVIDENCE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "line {line}: unsupported schema_version {found} (expected {expected})",
        expected = EVIDENCE_SCHEMA_VERSION
    )]
    UnsupportedSchema { line: usize, found: u32 },
    #[error("line {line}: field `{field}` must not be empty")]
    EmptyField { line: usize, field: &'static str },
    #[error("line {line}: {value:?} is not a version")]
    InvalidVersion { line: usize, value: String },
    #[error("line {line}: unknown rule source {value:?}")]
    InvalidSource { line: usize, value: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceRecord {
    pub schema_version: u32,
    pub template: String,
    pub version: String,
    pub sheet: String,
    /// `standard` or `extension`.
    pub source: String,
    pub extension_uri: String,
    pub extension_known: bool,
    pub range: String,
    pub rule_index: usize,
    /// Normalized kind; `unknown` for unrecognized tags (see `raw_kind`).
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_kind: Option<String>,
    pub priority: Option<u32>,
    /// `priority` attribute text that did not parse as a number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_raw: Option<String>,
    pub style_ref: Option<String>,
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Extension rule a standard rule points at through its own `extLst`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_extension_id: Option<String>,
    pub formulas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_scale: Option<CfVisual>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_bar: Option<CfVisual>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_set: Option<CfVisual>,
}

impl EvidenceRecord {
    pub fn from_rule(template: &str, version: &Version, sheet: &str, rule: &CfRule) -> Self {
        let (mut color_scale, mut data_bar, mut icon_set) = (None, None, None);
        match &rule.payload {
            Some(CfPayload::ColorScale(visual)) => color_scale = Some(visual.clone()),
            Some(CfPayload::DataBar(visual)) => data_bar = Some(visual.clone()),
            Some(CfPayload::IconSet(visual)) => icon_set = Some(visual.clone()),
            None => {}
        }

        Self {
            schema_version: EVIDENCE_SCHEMA_VERSION,
            template: template.to_string(),
            version: version.as_str().to_string(),
            sheet: sheet.to_string(),
            source: rule.source.as_str().to_string(),
            extension_uri: rule.source.uri().to_string(),
            extension_known: rule.source.is_known(),
            range: rule.range.clone(),
            rule_index: rule.rule_index,
            kind: rule.kind.as_str().to_string(),
            raw_kind: rule.kind.is_unknown().then(|| rule.kind.raw().to_string()),
            priority: rule.priority,
            priority_raw: rule.priority_raw.clone(),
            style_ref: rule.style_ref.clone(),
            operator: rule.operator.clone(),
            rule_id: rule.rule_id.clone(),
            linked_extension_id: rule.linked_extension_id.clone(),
            formulas: rule.formulas.clone(),
            color_scale,
            data_bar,
            icon_set,
        }
    }

    fn validate(&self, line: usize) -> Result<(), EvidenceError> {
        if self.schema_version != EVIDENCE_SCHEMA_VERSION {
            return Err(EvidenceError::UnsupportedSchema {
                line,
                found: self.schema_version,
            });
        }
        for (field, value) in [
            ("template", &self.template),
            ("version", &self.version),
            ("sheet", &self.sheet),
        ] {
            if value.trim().is_empty() {
                return Err(EvidenceError::EmptyField { line, field });
            }
        }
        if Version::parse(&self.version).is_err() {
            return Err(EvidenceError::InvalidVersion {
                line,
                value: self.version.clone(),
            });
        }
        if !matches!(self.source.as_str(), "standard" | "extension") {
            return Err(EvidenceError::InvalidSource {
                line,
                value: self.source.clone(),
            });
        }
        Ok(())
    }
}

pub fn write_evidence<'a, W: Write>(
    mut writer: W,
    records: impl IntoIterator<Item = &'a EvidenceRecord>,
) -> Result<usize, EvidenceError> {
    let mut written = 0;
    for record in records {
        serde_json::to_writer(&mut writer, record)
            .map_err(|source| EvidenceError::Json { line: written + 1, source })?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Read and validate an evidence stream. Blank lines are skipped; line numbers are 1-based.
pub fn read_evidence<R: BufRead>(reader: R) -> Result<Vec<EvidenceRecord>, EvidenceError> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EvidenceRecord = serde_json::from_str(&line)
            .map_err(|source| EvidenceError::Json { line: line_no, source })?;
        record.validate(line_no)?;
        out.push(record);
    }
    Ok(out)
}
