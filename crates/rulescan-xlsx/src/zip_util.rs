use std::collections::HashMap;
use std::io::{Read, Seek};

use zip::ZipArchive;

use crate::RulesError;

/// Default maximum uncompressed size permitted for any single ZIP part inflated into memory.
///
/// Guards against ZIP bombs (tiny compressed size, huge uncompressed size) and forged ZIP
/// metadata (an incorrect `uncompressed_size` field).
pub const DEFAULT_MAX_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

/// Canonical lookup key for a ZIP entry name: separators normalized to `/`, no leading
/// separators, ASCII case folded.
pub(crate) fn part_name_lookup_key(name: &str) -> String {
    name.trim_start_matches(|c| c == '/' || c == '\\')
        .replace('\\', "/")
        .to_ascii_lowercase()
}

/// Map canonical lookup keys to the entry names actually stored in the archive.
///
/// Exact names win over equivalent variants (`XL\Workbook.xml` vs `xl/workbook.xml`).
pub(crate) fn index_part_names<R: Read + Seek>(archive: &ZipArchive<R>) -> HashMap<String, String> {
    let mut index: HashMap<String, String> = HashMap::new();
    for name in archive.file_names() {
        if name.ends_with('/') {
            continue;
        }
        let key = part_name_lookup_key(name);
        let canonical = name.trim_start_matches('/') == key;
        match index.get(&key) {
            Some(existing) if !canonical || existing.trim_start_matches('/') == key => {}
            _ => {
                index.insert(key, name.to_string());
            }
        }
    }
    index
}

/// Inflate at most `max_bytes` from `reader`, erroring with [`RulesError::PartTooLarge`] when
/// either the declared or the observed size exceeds the limit.
pub(crate) fn read_bytes_with_limit<R: Read>(
    reader: R,
    declared_size: u64,
    part: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, RulesError> {
    if declared_size > max_bytes {
        return Err(RulesError::PartTooLarge {
            part: part.to_string(),
            size: declared_size,
            max: max_bytes,
        });
    }

    // Don't trust ZIP metadata alone: read one byte past the limit to detect forged sizes.
    let mut buf = Vec::new();
    let read_limit = max_bytes.checked_add(1).unwrap_or(u64::MAX);
    reader.take(read_limit).read_to_end(&mut buf)?;

    let observed = buf.len() as u64;
    if observed > max_bytes {
        return Err(RulesError::PartTooLarge {
            part: part.to_string(),
            size: observed,
            max: max_bytes,
        });
    }
    Ok(buf)
}

/// Read a ZIP part by canonical name, returning `Ok(None)` when the entry does not exist.
pub(crate) fn read_part_optional<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: &HashMap<String, String>,
    name: &str,
    max_bytes: u64,
) -> Result<Option<Vec<u8>>, RulesError> {
    let Some(entry_name) = index.get(&part_name_lookup_key(name)) else {
        return Ok(None);
    };
    let file = match archive.by_name(entry_name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let declared = file.size();
    read_bytes_with_limit(file, declared, name, max_bytes).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Cursor, Write};

    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn archive(entries: &[(&str, &[u8])]) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
        for (name, bytes) in entries {
            zip.start_file(*name, options).expect("start_file");
            zip.write_all(bytes).expect("write entry");
        }
        ZipArchive::new(zip.finish().expect("finish")).expect("reopen")
    }

    #[test]
    fn lookup_keys_fold_case_and_separators() {
        for raw in ["xl/workbook.xml", "/xl/workbook.xml", "XL\\Workbook.xml", "\\xl/WORKBOOK.xml"] {
            assert_eq!(part_name_lookup_key(raw), "xl/workbook.xml", "{raw}");
        }
    }

    #[test]
    fn stored_canonical_name_wins_over_variants() {
        let mut zip = archive(&[
            ("XL\\Worksheets\\Sheet1.xml", b"variant"),
            ("xl/worksheets/sheet1.xml", b"canonical"),
            ("/xl/styles.xml", b"slashed"),
        ]);
        let index = index_part_names(&zip);

        let sheet = read_part_optional(&mut zip, &index, "xl/worksheets/sheet1.xml", 64)
            .expect("read")
            .expect("present");
        assert_eq!(sheet, b"canonical");
        let styles = read_part_optional(&mut zip, &index, "xl/styles.xml", 64)
            .expect("read")
            .expect("present");
        assert_eq!(styles, b"slashed");
        assert!(read_part_optional(&mut zip, &index, "xl/workbook.xml", 64)
            .expect("read")
            .is_none());
    }

    #[test]
    fn size_limit_is_inclusive() {
        let mut zip = archive(&[("xl/worksheets/sheet1.xml", b"<worksheet/>")]);
        let index = index_part_names(&zip);
        let exact = b"<worksheet/>".len() as u64;

        assert!(read_part_optional(&mut zip, &index, "xl/worksheets/sheet1.xml", exact).is_ok());
        match read_part_optional(&mut zip, &index, "xl/worksheets/sheet1.xml", exact - 1) {
            Err(RulesError::PartTooLarge { size, max, .. }) => {
                assert_eq!((size, max), (exact, exact - 1));
            }
            other => panic!("expected PartTooLarge, got {other:?}"),
        }
    }
}
