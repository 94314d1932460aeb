use std::collections::{BTreeMap, HashMap};
use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::openxml::strip_leading_equals;
use crate::worksheet::PartError;

/// Zero-based cell position. Orders row-major, like cells appear in `sheetData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse an A1-style reference (`$` markers allowed).
    pub fn from_a1(a1: &str) -> Option<Self> {
        let a1 = a1.trim().replace('$', "");
        let split = a1.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = a1.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        let mut col: u32 = 0;
        for c in letters.chars() {
            let v = (c.to_ascii_uppercase() as u8 - b'A' + 1) as u32;
            col = col.checked_mul(26)?.checked_add(v)?;
        }
        let row: u32 = digits.parse().ok()?;
        if row == 0 {
            return None;
        }
        Some(Self::new(row - 1, col - 1))
    }

    pub fn to_a1(self) -> String {
        let mut letters = Vec::new();
        let mut n = self.col + 1;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push(b'A' + rem as u8);
            n = (n - 1) / 26;
        }
        letters.reverse();
        format!("{}{}", String::from_utf8_lossy(&letters), self.row + 1)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaKind {
    Normal,
    /// Member of a shared-formula group (`t="shared"`); the master carries `ref`.
    Shared { index: u32 },
    /// Array formula spilling over `range`.
    Array { range: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaCell {
    /// Formula text without the leading `=`. Shared-group members carry their master's text.
    pub formula: String,
    pub kind: FormulaKind,
}

pub type SheetFormulas = BTreeMap<CellRef, FormulaCell>;

#[derive(Default)]
struct PendingCell {
    cell: Option<CellRef>,
    formula: Option<String>,
    kind: Option<FormulaKind>,
}

/// Collect every formula cell of a worksheet part.
///
/// This pass reads the whole part, so it also rejects parts that are not well formed: a part
/// without a root element or whose root is never closed (e.g. truncated) is an error.
pub fn read_formula_cells(xml: &str) -> Result<SheetFormulas, PartError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut out = SheetFormulas::new();
    let mut shared_masters: HashMap<u32, String> = HashMap::new();
    // Members seen before their master (unusual, but legal in document order terms).
    let mut orphans: Vec<(CellRef, u32)> = Vec::new();

    let mut depth: usize = 0;
    let mut saw_root = false;
    let mut root_closed = false;

    let mut row: Option<u32> = None;
    let mut next_col: u32 = 0;
    let mut current: Option<PendingCell> = None;
    let mut in_f = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => {
                if root_closed {
                    return Err(PartError::Invalid("content after the root element"));
                }
                saw_root = true;
                depth += 1;
                match e.local_name().as_ref() {
                    b"row" => {
                        row = Some(row_number(&e, row)?);
                        next_col = 0;
                    }
                    b"c" => {
                        let cell = cell_position(&e, row, next_col)?;
                        if let Some(cell) = cell {
                            next_col = cell.col + 1;
                        }
                        current = Some(PendingCell {
                            cell,
                            ..PendingCell::default()
                        });
                    }
                    b"f" if current.is_some() => {
                        let kind = formula_kind(&e)?;
                        if let Some(cur) = current.as_mut() {
                            cur.kind = Some(kind);
                            cur.formula = Some(String::new());
                        }
                        in_f = true;
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if !saw_root {
                    // `<worksheet/>`: well formed, nothing inside.
                    saw_root = true;
                    root_closed = true;
                    buf.clear();
                    continue;
                }
                match e.local_name().as_ref() {
                    b"row" => {
                        row = Some(row_number(&e, row)?);
                        next_col = 0;
                    }
                    b"c" => {
                        if let Some(cell) = cell_position(&e, row, next_col)? {
                            next_col = cell.col + 1;
                        }
                    }
                    b"f" => {
                        let kind = formula_kind(&e)?;
                        if let Some(cur) = current.as_mut() {
                            cur.kind = Some(kind);
                            cur.formula = Some(String::new());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) if in_f => {
                let text = e.unescape()?;
                if let Some(f) = current.as_mut().and_then(|c| c.formula.as_mut()) {
                    f.push_str(&text);
                }
            }
            Event::CData(e) if in_f => {
                if let Some(f) = current.as_mut().and_then(|c| c.formula.as_mut()) {
                    f.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::End(e) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(PartError::Invalid("unbalanced end tag"))?;
                if depth == 0 {
                    root_closed = true;
                }
                match e.local_name().as_ref() {
                    b"f" => in_f = false,
                    b"c" => {
                        if let Some(cur) = current.take() {
                            finish_cell(cur, &mut out, &mut shared_masters, &mut orphans);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(PartError::MissingRoot);
    }
    if !root_closed {
        return Err(PartError::Invalid("unexpected end of worksheet"));
    }

    for (cell, index) in orphans {
        match shared_masters.get(&index) {
            Some(text) => {
                if let Some(entry) = out.get_mut(&cell) {
                    entry.formula = text.clone();
                }
            }
            None => log::debug!("shared formula {index} at {cell} has no master"),
        }
    }

    Ok(out)
}

fn finish_cell(
    cur: PendingCell,
    out: &mut SheetFormulas,
    shared_masters: &mut HashMap<u32, String>,
    orphans: &mut Vec<(CellRef, u32)>,
) {
    let (Some(cell), Some(formula)) = (cur.cell, cur.formula) else {
        return;
    };
    let kind = cur.kind.unwrap_or(FormulaKind::Normal);
    let mut formula = strip_leading_equals(&formula).to_string();

    if let FormulaKind::Shared { index } = kind {
        if formula.is_empty() {
            match shared_masters.get(&index) {
                Some(text) => formula = text.clone(),
                None => orphans.push((cell, index)),
            }
        } else {
            shared_masters.entry(index).or_insert_with(|| formula.clone());
        }
    }

    out.insert(cell, FormulaCell { formula, kind });
}

fn row_number(e: &BytesStart<'_>, previous: Option<u32>) -> Result<u32, PartError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            if let Ok(r) = attr.unescape_value()?.trim().parse::<u32>() {
                if r > 0 {
                    return Ok(r - 1);
                }
            }
        }
    }
    Ok(previous.map_or(0, |r| r + 1))
}

fn cell_position(
    e: &BytesStart<'_>,
    row: Option<u32>,
    next_col: u32,
) -> Result<Option<CellRef>, PartError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            return Ok(CellRef::from_a1(&attr.unescape_value()?));
        }
    }
    Ok(Some(CellRef::new(row.unwrap_or(0), next_col)))
}

fn formula_kind(e: &BytesStart<'_>) -> Result<FormulaKind, PartError> {
    let mut t: Option<String> = None;
    let mut si: Option<u32> = None;
    let mut range: Option<String> = None;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"t" => t = Some(attr.unescape_value()?.into_owned()),
            b"si" => si = attr.unescape_value()?.trim().parse().ok(),
            b"ref" => range = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }
    Ok(match t.as_deref() {
        Some("shared") => match si {
            Some(index) => FormulaKind::Shared { index },
            None => FormulaKind::Normal,
        },
        Some("array") => FormulaKind::Array {
            range: range.unwrap_or_default(),
        },
        _ => FormulaKind::Normal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn a1(s: &str) -> CellRef {
        CellRef::from_a1(s).expect("valid A1")
    }

    #[test]
    fn a1_conversion() {
        assert_eq!(a1("A1"), CellRef::new(0, 0));
        assert_eq!(a1("$AB$12"), CellRef::new(11, 27));
        assert_eq!(CellRef::new(0, 701).to_a1(), "ZZ1");
        assert_eq!(CellRef::new(4, 702).to_a1(), "AAA5");
        assert_eq!(CellRef::from_a1("A0"), None);
        assert_eq!(CellRef::from_a1("12"), None);
    }

    #[test]
    fn shared_members_inherit_master_text() {
        let xml = r#"<worksheet><sheetData>
  <row r="2">
    <c r="C2"><f t="shared" ref="C2:C4" si="0">=A2+B2</f><v>3</v></c>
  </row>
  <row r="3"><c r="C3"><f t="shared" si="0"/><v>5</v></c></row>
  <row r="4"><c r="C4"><f t="array" ref="C4:D4">SUM(A1:A3*B1:B3)</f></c><c r="D4"><v>1</v></c></row>
</sheetData></worksheet>"#;
        let cells = read_formula_cells(xml).expect("read");
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[&a1("C2")].formula, "A2+B2");
        assert_eq!(cells[&a1("C3")].formula, "A2+B2");
        assert_eq!(cells[&a1("C3")].kind, FormulaKind::Shared { index: 0 });
        assert_eq!(
            cells[&a1("C4")].kind,
            FormulaKind::Array {
                range: "C4:D4".to_string()
            }
        );
    }

    #[test]
    fn positions_are_derived_when_r_is_missing() {
        let xml = r#"<worksheet><sheetData>
  <row><c><v>1</v></c><c><f>A1*2</f></c></row>
  <row><c><f>A1&amp;"x"</f></c></row>
</sheetData></worksheet>"#;
        let cells = read_formula_cells(xml).expect("read");
        let keys: Vec<String> = cells.keys().map(|c| c.to_a1()).collect();
        assert_eq!(keys, vec!["B1", "A2"]);
        assert_eq!(cells[&a1("A2")].formula, "A1&\"x\"");
    }

    #[test]
    fn truncated_part_is_rejected() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1"><f>1+1</f></c></row>"#;
        assert!(matches!(read_formula_cells(xml), Err(PartError::Invalid(_))));
        assert!(matches!(read_formula_cells(""), Err(PartError::MissingRoot)));
    }
}
