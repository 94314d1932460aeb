//! Boundary for resolving list-validation sources to concrete values.
//!
//! Rule extraction never reads cell contents. A list validation's `formula1` is classified
//! here; reference forms are handed to a [`CellValueReader`] supplied by the caller.

use crate::formulas::CellRef;

/// Reads the non-empty values of a rectangular range on a sheet.
pub trait CellValueReader {
    type Error;

    fn non_empty_values(&self, sheet: &str, range: &str) -> Result<Vec<String>, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListSource {
    /// `"a,b,c"` literal list.
    Inline(Vec<String>),
    /// A range reference, optionally qualified with a sheet name.
    Reference { sheet: Option<String>, range: String },
    /// Anything else (named ranges, `INDIRECT`, `OFFSET`, ...).
    Other(String),
}

pub fn classify_list_source(formula1: &str) -> ListSource {
    let formula = formula1.trim();
    let formula = formula.strip_prefix('=').unwrap_or(formula);

    if let Some(inner) = formula
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        let items = inner
            .replace("\"\"", "\"")
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
        return ListSource::Inline(items);
    }

    let (sheet, range) = match formula.rsplit_once('!') {
        Some((sheet, range)) => (Some(unquote_sheet(sheet)), range),
        None => (None, formula),
    };

    if is_area(range) {
        ListSource::Reference {
            sheet,
            range: range.replace('$', ""),
        }
    } else {
        ListSource::Other(formula.to_string())
    }
}

fn unquote_sheet(sheet: &str) -> String {
    match sheet.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => sheet.to_string(),
    }
}

fn is_area(range: &str) -> bool {
    let mut parts = range.split(':');
    let (Some(first), second, None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    CellRef::from_a1(first).is_some() && second.map_or(true, |s| CellRef::from_a1(s).is_some())
}

/// Resolve a list validation's allowed values.
///
/// Inline lists resolve without a reader; references go through `reader`, unqualified ones
/// against `default_sheet`. Other expressions resolve to `None`.
pub fn resolve_list_values<R: CellValueReader>(
    reader: &R,
    default_sheet: &str,
    formula1: &str,
) -> Result<Option<Vec<String>>, R::Error> {
    match classify_list_source(formula1) {
        ListSource::Inline(items) => Ok(Some(items)),
        ListSource::Reference { sheet, range } => {
            let sheet = sheet.as_deref().unwrap_or(default_sheet);
            reader.non_empty_values(sheet, &range).map(Some)
        }
        ListSource::Other(expr) => {
            log::debug!("list source {expr:?} is not a plain reference");
            Ok(None)
        }
    }
}
