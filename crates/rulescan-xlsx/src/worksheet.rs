use thiserror::Error;

use crate::conditional_formatting::parse_worksheet_conditional_formatting;
use crate::data_validations::read_data_validations_from_worksheet_xml;
use crate::formulas::{read_formula_cells, SheetFormulas};
use crate::rules::{CfRule, DvRule};

/// Why a single XML part could not be read.
#[derive(Debug, Error)]
pub enum PartError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error(transparent)]
    Dom(#[from] roxmltree::Error),
    #[error("part is not valid UTF-8: {0}")]
    Utf8(std::str::Utf8Error),
    #[error("part has no root element")]
    MissingRoot,
    #[error("{0}")]
    Invalid(&'static str),
}

/// Everything extracted from one worksheet part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorksheetRules {
    pub conditional_formats: Vec<CfRule>,
    pub data_validations: Vec<DvRule>,
    pub formulas: SheetFormulas,
}

impl WorksheetRules {
    pub fn standard_cf_count(&self) -> usize {
        self.conditional_formats
            .iter()
            .filter(|r| r.source.as_str() == "standard")
            .count()
    }

    pub fn extension_cf_count(&self) -> usize {
        self.conditional_formats.len() - self.standard_cf_count()
    }

    /// Number of distinct formula texts on the sheet.
    pub fn distinct_formula_count(&self) -> usize {
        let mut texts: Vec<&str> = self.formulas.values().map(|f| f.formula.as_str()).collect();
        texts.sort_unstable();
        texts.dedup();
        texts.len()
    }
}

/// Parse a worksheet part.
///
/// The formula pass runs first and covers the whole part, so a part that is not well formed is
/// rejected before any rule records are produced.
pub fn parse_worksheet(xml: &str) -> Result<WorksheetRules, PartError> {
    let formulas = read_formula_cells(xml)?;
    let conditional_formats = parse_worksheet_conditional_formatting(xml)?;
    let data_validations = read_data_validations_from_worksheet_xml(xml)?;
    Ok(WorksheetRules {
        conditional_formats,
        data_validations,
        formulas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_worksheet_has_no_rules() {
        let rules = parse_worksheet(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#,
        )
        .expect("parse");
        assert_eq!(rules, WorksheetRules::default());
    }

    #[test]
    fn mismatched_tags_are_rejected() {
        let err = parse_worksheet("<worksheet><sheetData></row></worksheet>").unwrap_err();
        assert!(matches!(err, PartError::Xml(_)), "unexpected error {err:?}");
    }
}
