use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use thiserror::Error;
use zip::ZipArchive;

use crate::openxml::{parse_relationships, rels_part_name, Relationship};
use crate::path::resolve_target;
use crate::sheet_metadata::{parse_workbook_sheets, SheetState, WorkbookSheetInfo};
use crate::worksheet::{parse_worksheet, PartError, WorksheetRules};
use crate::zip_util::{index_part_names, read_part_optional, DEFAULT_MAX_PART_BYTES};

pub const WORKBOOK_PART: &str = "xl/workbook.xml";

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("malformed archive: {0}")]
    MalformedArchive(#[from] zip::result::ZipError),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("sheet {sheet:?} declares relationship {rel_id:?} with no matching target")]
    UnresolvedRelationship { sheet: String, rel_id: String },
    /// `xl/workbook.xml` or its relationships could not be parsed; no sheet can be resolved.
    #[error("malformed workbook part {part}: {source}")]
    MalformedWorkbook {
        part: String,
        #[source]
        source: PartError,
    },
    /// A worksheet part could not be parsed; only that sheet is lost.
    #[error("malformed part {part}: {source}")]
    MalformedPart {
        part: String,
        #[source]
        source: PartError,
    },
    #[error("xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)")]
    PartTooLarge { part: String, size: u64, max: u64 },
}

impl From<std::io::Error> for RulesError {
    fn from(err: std::io::Error) -> Self {
        RulesError::MalformedArchive(zip::result::ZipError::Io(err))
    }
}

impl RulesError {
    /// Stable class name used when reporting skipped files and sheets.
    pub fn class(&self) -> &'static str {
        match self {
            RulesError::MalformedArchive(_) => "MalformedArchive",
            RulesError::MissingPart(_) => "MissingPart",
            RulesError::UnresolvedRelationship { .. } => "UnresolvedRelationship",
            RulesError::MalformedWorkbook { .. } => "MalformedWorkbook",
            RulesError::MalformedPart { .. } => "MalformedPart",
            RulesError::PartTooLarge { .. } => "PartTooLarge",
        }
    }

    /// Whether this error only invalidates a single sheet (siblings keep processing).
    pub fn is_sheet_scoped(&self) -> bool {
        matches!(self, RulesError::MalformedPart { .. })
    }
}

/// A sheet declared by the workbook, with its worksheet part already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetPart {
    pub name: String,
    pub sheet_id: Option<u32>,
    pub state: SheetState,
    pub part: String,
}

/// Read-only view of one OPC package, scoped to the lifetime of this value.
///
/// The workbook's sheet declarations are resolved eagerly through the two-hop
/// `<sheet r:id>` → `xl/_rels/workbook.xml.rels` indirection; worksheet parts themselves are
/// inflated on demand. Dropping the package releases the underlying archive handle.
pub struct RulePackage<R: Read + Seek> {
    archive: ZipArchive<R>,
    part_index: HashMap<String, String>,
    sheets: Vec<SheetPart>,
    max_part_bytes: u64,
}

impl RulePackage<File> {
    pub fn open(path: &Path) -> Result<Self, RulesError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl RulePackage<Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, RulesError> {
        Self::from_reader(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> RulePackage<R> {
    pub fn from_reader(reader: R) -> Result<Self, RulesError> {
        Self::from_reader_limited(reader, DEFAULT_MAX_PART_BYTES)
    }

    pub fn from_reader_limited(reader: R, max_part_bytes: u64) -> Result<Self, RulesError> {
        let mut archive = ZipArchive::new(reader)?;
        let part_index = index_part_names(&archive);

        let workbook_xml = read_part_optional(&mut archive, &part_index, WORKBOOK_PART, max_part_bytes)?
            .ok_or_else(|| RulesError::MissingPart(WORKBOOK_PART.to_string()))?;
        let workbook_error = |source| RulesError::MalformedWorkbook {
            part: WORKBOOK_PART.to_string(),
            source,
        };
        let declared = decode_part(workbook_xml)
            .and_then(|xml| parse_workbook_sheets(&xml))
            .map_err(workbook_error)?;

        let rels_name = rels_part_name(WORKBOOK_PART);
        let rels_xml = read_part_optional(&mut archive, &part_index, &rels_name, max_part_bytes)?
            .ok_or_else(|| RulesError::MissingPart(rels_name.clone()))?;
        let relationships = parse_relationships(&rels_xml).map_err(|source| {
            RulesError::MalformedWorkbook {
                part: rels_name.clone(),
                source,
            }
        })?;
        let rel_by_id: HashMap<&str, &Relationship> = relationships
            .iter()
            .map(|rel| (rel.id.as_str(), rel))
            .collect();

        let sheets = declared
            .into_iter()
            .map(|sheet| resolve_sheet_part(sheet, &rel_by_id, &part_index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            archive,
            part_index,
            sheets,
            max_part_bytes,
        })
    }

    /// Declared sheet names, in workbook order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheets(&self) -> &[SheetPart] {
        &self.sheets
    }

    /// Part path holding the content of `sheet_name`, if the workbook declares it.
    pub fn sheet_part(&self, sheet_name: &str) -> Option<&str> {
        self.sheets
            .iter()
            .find(|s| s.name == sheet_name)
            .map(|s| s.part.as_str())
    }

    /// Raw bytes of an arbitrary part.
    pub fn read_part(&mut self, part: &str) -> Result<Vec<u8>, RulesError> {
        read_part_optional(&mut self.archive, &self.part_index, part, self.max_part_bytes)?
            .ok_or_else(|| RulesError::MissingPart(part.to_string()))
    }

    /// Parse the worksheet part of `sheet_name` into rule records.
    pub fn sheet_rules(&mut self, sheet_name: &str) -> Result<WorksheetRules, RulesError> {
        let part = self
            .sheet_part(sheet_name)
            .ok_or_else(|| RulesError::MissingPart(format!("worksheet for sheet {sheet_name:?}")))?
            .to_string();
        let bytes = self.read_part(&part)?;
        decode_part(bytes)
            .and_then(|xml| parse_worksheet(&xml))
            .map_err(|source| RulesError::MalformedPart { part, source })
    }
}

fn resolve_sheet_part(
    sheet: WorkbookSheetInfo,
    rel_by_id: &HashMap<&str, &Relationship>,
    part_index: &HashMap<String, String>,
) -> Result<SheetPart, RulesError> {
    let unresolved = || RulesError::UnresolvedRelationship {
        sheet: sheet.name.clone(),
        rel_id: sheet.rel_id.clone().unwrap_or_default(),
    };

    let rel = sheet
        .rel_id
        .as_deref()
        .and_then(|id| rel_by_id.get(id))
        .filter(|rel| !rel.is_external())
        .ok_or_else(unresolved)?;
    let part = resolve_target(WORKBOOK_PART, &rel.target);
    if part.is_empty() || part == WORKBOOK_PART {
        return Err(unresolved());
    }
    if !part_index.contains_key(&crate::zip_util::part_name_lookup_key(&part)) {
        return Err(RulesError::MissingPart(part));
    }

    Ok(SheetPart {
        name: sheet.name,
        sheet_id: sheet.sheet_id,
        state: sheet.state,
        part,
    })
}

fn decode_part(bytes: Vec<u8>) -> Result<String, PartError> {
    // Tolerate a UTF-8 BOM; quick-xml would otherwise report it as stray text.
    let bytes = match bytes.strip_prefix(b"\xEF\xBB\xBF") {
        Some(rest) => rest.to_vec(),
        None => bytes,
    };
    String::from_utf8(bytes).map_err(|err| PartError::Utf8(err.utf8_error()))
}

/// Outcome of reading one sheet of a package.
#[derive(Debug)]
pub struct ExtractedSheet {
    pub sheet: SheetPart,
    pub rules: Result<WorksheetRules, RulesError>,
}

/// Every declared sheet of one package, in workbook order.
#[derive(Debug)]
pub struct WorkbookExtraction {
    pub sheets: Vec<ExtractedSheet>,
}

/// Open `path`, parse every declared worksheet and close the archive again.
///
/// Package-level failures abort the whole file. A worksheet that fails to parse is recorded as
/// a failed [`ExtractedSheet`] and its siblings are still processed.
pub fn extract_workbook_rules(path: &Path) -> Result<WorkbookExtraction, RulesError> {
    let mut package = RulePackage::open(path)?;
    Ok(extract_all(&mut package))
}

pub fn extract_workbook_rules_from_bytes(bytes: Vec<u8>) -> Result<WorkbookExtraction, RulesError> {
    let mut package = RulePackage::from_bytes(bytes)?;
    Ok(extract_all(&mut package))
}

fn extract_all<R: Read + Seek>(package: &mut RulePackage<R>) -> WorkbookExtraction {
    let declared = package.sheets().to_vec();
    let sheets = declared
        .into_iter()
        .map(|sheet| {
            let rules = package.sheet_rules(&sheet.name);
            if let Err(err) = &rules {
                log::warn!("skipping sheet {:?} ({}): {err}", sheet.name, sheet.part);
            }
            ExtractedSheet { sheet, rules }
        })
        .collect();
    WorkbookExtraction { sheets }
}
