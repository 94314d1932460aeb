//! Rule evidence straight from XLSX/XLSM worksheet parts.
//!
//! The crate works below the level of spreadsheet object models: it opens the Open Packaging
//! Convention (OPC) ZIP container, follows `xl/workbook.xml` sheet declarations through
//! `xl/_rels/workbook.xml.rels` to their worksheet parts, and reads those parts directly.
//!
//! - [`RulePackage`]: read-only view of one package (sheet name → worksheet part).
//! - [`parse_worksheet`]: one worksheet part → conditional-formatting rules (standard and
//!   `extLst` extension forms), data validations and formula cells.
//! - [`cell_values`]: the boundary through which list-validation references are resolved by
//!   a caller-supplied reader.

pub mod cell_values;
pub mod conditional_formatting;
pub mod data_validations;
pub mod formulas;
pub mod openxml;
mod package;
pub mod path;
pub mod rules;
pub mod sheet_metadata;
pub mod worksheet;
mod zip_util;

pub use cell_values::{classify_list_source, resolve_list_values, CellValueReader, ListSource};
pub use formulas::{CellRef, FormulaCell, FormulaKind, SheetFormulas};
pub use package::{
    extract_workbook_rules, extract_workbook_rules_from_bytes, ExtractedSheet, RulePackage,
    RulesError, SheetPart, WorkbookExtraction, WORKBOOK_PART,
};
pub use rules::{
    CfKind, CfPayload, CfRule, CfVisual, ColorRef, DvKind, DvRule, RuleKey, RuleSource, ValueStop,
    EXT_URI_X14_CF_RULE_ID, EXT_URI_X14_CONDITIONAL_FORMATTINGS, EXT_URI_X14_DATA_VALIDATIONS,
};
pub use sheet_metadata::{SheetState, WorkbookSheetInfo};
pub use worksheet::{parse_worksheet, PartError, WorksheetRules};
pub use zip_util::DEFAULT_MAX_PART_BYTES;
